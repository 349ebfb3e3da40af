//! netledger-capture
//!
//! Live frame capture for netledger. A [`CaptureSession`] owns a capture
//! handle and an optional pcap mirror file, decodes every frame as a
//! [`LinkFrame`] of the handle's link type and hands it to the capture queue.

pub mod backend;
pub mod error;
pub mod frame;
pub mod mirror;
pub mod session;

pub use backend::{list_devices, CaptureBackend, CaptureHandle, NextFrame, PcapBackend, RawFrame};
pub use error::CaptureError;
pub use frame::LinkFrame;
pub use mirror::MirrorWriter;
pub use pcap::Linktype;
pub use session::{CaptureOptions, CaptureSession, CaptureStop, CaptureSummary};
