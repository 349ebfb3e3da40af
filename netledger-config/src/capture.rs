//! Live capture configuration.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Packet capture configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct CaptureConfig {
    /// Network interface for live capture.
    #[validate(custom(function = validation::validate_interface))]
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Human readable description of the interface.
    #[serde(default)]
    pub description: String,

    /// BPF filter expression; empty captures everything.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Optional pcap file that mirrors every captured frame.
    #[serde(default)]
    pub mirror_file: Option<String>,

    /// Device read timeout (milliseconds). Bounds how long shutdown waits on
    /// an idle interface.
    #[validate(range(min = 1, max = 600000))]
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u32,
}

fn default_interface() -> String {
    "eth0".into()
}

fn default_filter() -> String {
    "tcp or udp".into()
}

fn default_read_timeout() -> u32 {
    30_000
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            description: String::new(),
            filter: default_filter(),
            mirror_file: None,
            read_timeout_ms: default_read_timeout(),
        }
    }
}
