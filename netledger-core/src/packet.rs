//! Packet data model shared by every pipeline stage.
//!
//! A frame enters the pipeline as a [`CapturedPacket`] (raw frame plus capture
//! metadata) and leaves it as a [`StoredPacketRecord`] (normalized addresses,
//! ports and protocol).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source/destination pair as rendered by the frame decoder.
///
/// Network flows carry addresses, transport flows carry port numbers. Both are
/// textual so the mapper decides how strictly to interpret them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    pub source: String,
    pub destination: String,
}

impl Flow {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Transport layer view of a frame: endpoints plus the layer's protocol name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFlow {
    /// Transport protocol name, e.g. `TCP` or `UDP`.
    pub protocol: String,
    pub flow: Flow,
}

/// Capabilities the pipeline needs from a captured frame.
///
/// Implementations decode on demand; nothing here requires the frame to keep
/// parsed state around. A frame that lacks a layer returns `None` for it.
pub trait CapturedFrame: fmt::Debug + Send + Sync {
    /// Network layer source/destination addresses.
    fn network_flow(&self) -> Option<Flow>;

    /// Transport layer source/destination ports and protocol name.
    fn transport_flow(&self) -> Option<TransportFlow>;

    /// Raw link-layer bytes as captured.
    fn raw_bytes(&self) -> &[u8];
}

/// A captured frame together with its capture metadata.
///
/// Owned by exactly one pipeline stage at a time; it is moved from capture to
/// queue to accumulator to store and never shared.
#[derive(Debug)]
pub struct CapturedPacket {
    /// Storage identifier, unset until the packet has been persisted.
    pub id: Option<i64>,
    pub frame: Box<dyn CapturedFrame>,
    pub captured_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub device_id: String,
}

impl CapturedPacket {
    /// Wraps a frame captured just now on `device_id`.
    pub fn new(frame: Box<dyn CapturedFrame>, device_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            frame,
            captured_at: now,
            updated_at: now,
            device_id: device_id.into(),
        }
    }
}

/// The capture source a session runs against.
///
/// A device value is consumed by the session that starts on it; a new session
/// needs a new device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Interface name handed to the capture backend.
    pub name: String,
    pub description: String,
}

impl Device {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Normalized, persisted form of a captured packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPacketRecord {
    /// Sequential identifier assigned by the store; `None` before insertion.
    pub id: Option<i64>,
    pub source_ip: String,
    pub destination_ip: String,
    pub source_port: u16,
    pub destination_port: u16,
    pub protocol: String,
    pub captured_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub device_id: String,
}
