//! Capture backends.
//!
//! [`CaptureBackend`] opens a [`CaptureHandle`] on a device; the session only
//! talks to these traits. [`PcapBackend`] is the libpcap implementation.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use netledger_core::packet::Device;
use pcap::{Active, Capture, Linktype};

use crate::error::CaptureError;

/// Snapshot length used for live capture. Mirror files share it.
pub const SNAPSHOT_LENGTH: u32 = 65535;

/// A frame read from a capture handle.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Bytes,
    pub timestamp: DateTime<Utc>,
    /// Length on the wire; may exceed `data.len()` when the frame was cut.
    pub original_len: u32,
}

impl RawFrame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let original_len = data.len() as u32;
        Self {
            data,
            timestamp: Utc::now(),
            original_len,
        }
    }
}

#[derive(Debug)]
pub enum NextFrame {
    Frame(RawFrame),
    /// The read timeout expired without a frame.
    TimedOut,
    /// The source has no more frames.
    Ended,
}

/// An open capture handle. Closed when dropped.
pub trait CaptureHandle: Send {
    /// Link-layer header type of the frames this handle yields.
    fn link_type(&self) -> Linktype;

    fn set_filter(&mut self, expression: &str) -> Result<(), CaptureError>;

    fn next_frame(&mut self) -> Result<NextFrame, CaptureError>;
}

pub trait CaptureBackend {
    type Handle: CaptureHandle;

    /// Opens a promiscuous capture with the given snapshot length and read
    /// timeout.
    fn open(
        &self,
        device: &Device,
        snaplen: u32,
        read_timeout: Duration,
    ) -> Result<Self::Handle, CaptureError>;
}

/// libpcap live capture.
#[derive(Debug, Default, Clone, Copy)]
pub struct PcapBackend;

pub struct PcapHandle {
    capture: Capture<Active>,
}

impl CaptureBackend for PcapBackend {
    type Handle = PcapHandle;

    fn open(
        &self,
        device: &Device,
        snaplen: u32,
        read_timeout: Duration,
    ) -> Result<PcapHandle, CaptureError> {
        let open_error = |source| CaptureError::Open {
            device: device.name.clone(),
            source,
        };
        let timeout_ms = i32::try_from(read_timeout.as_millis()).unwrap_or(i32::MAX);
        let snaplen = i32::try_from(snaplen).unwrap_or(i32::MAX);

        let capture = Capture::from_device(device.name.as_str())
            .map_err(open_error)?
            .promisc(true)
            .snaplen(snaplen)
            .timeout(timeout_ms)
            .open()
            .map_err(open_error)?;

        Ok(PcapHandle { capture })
    }
}

impl CaptureHandle for PcapHandle {
    fn link_type(&self) -> Linktype {
        self.capture.get_datalink()
    }

    fn set_filter(&mut self, expression: &str) -> Result<(), CaptureError> {
        self.capture
            .filter(expression, true)
            .map_err(|source| CaptureError::Filter {
                filter: expression.to_string(),
                source,
            })
    }

    fn next_frame(&mut self) -> Result<NextFrame, CaptureError> {
        match self.capture.next_packet() {
            Ok(packet) => {
                let ts = packet.header.ts;
                let timestamp = DateTime::from_timestamp(
                    ts.tv_sec as i64,
                    (ts.tv_usec as u32).saturating_mul(1_000),
                )
                .unwrap_or_else(Utc::now);
                Ok(NextFrame::Frame(RawFrame {
                    data: Bytes::copy_from_slice(packet.data),
                    timestamp,
                    original_len: packet.header.len,
                }))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(NextFrame::TimedOut),
            Err(pcap::Error::NoMorePackets) => Ok(NextFrame::Ended),
            Err(e) => Err(CaptureError::Read(e)),
        }
    }
}

/// Capture-capable interfaces as reported by libpcap.
pub fn list_devices() -> Result<Vec<Device>, CaptureError> {
    let devices = pcap::Device::list().map_err(CaptureError::Devices)?;
    Ok(devices
        .into_iter()
        .map(|d| Device::new(d.name, d.desc.unwrap_or_default()))
        .collect())
}
