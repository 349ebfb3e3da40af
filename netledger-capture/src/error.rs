use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Failed to open capture on '{device}': {source}")]
    Open {
        device: String,
        #[source]
        source: pcap::Error,
    },

    #[error("Failed to apply filter '{filter}': {source}")]
    Filter {
        filter: String,
        #[source]
        source: pcap::Error,
    },

    #[error("Capture read failed: {0}")]
    Read(#[source] pcap::Error),

    #[error("Mirror file {path}: {source}")]
    Mirror {
        path: PathBuf,
        #[source]
        source: pcap::Error,
    },

    #[error("Failed to list capture devices: {0}")]
    Devices(#[source] pcap::Error),
}
