//! pcap mirror file.
//!
//! A libpcap savefile opened on a dead capture with the live handle's link
//! type, so the file header describes the frames that follow it.

use std::path::{Path, PathBuf};

use pcap::{Capture, Linktype, Packet, PacketHeader, Savefile};

use crate::backend::{RawFrame, SNAPSHOT_LENGTH};
use crate::error::CaptureError;

pub struct MirrorWriter {
    path: PathBuf,
    link_type: Linktype,
    savefile: Savefile,
    frames: u64,
}

impl MirrorWriter {
    /// Creates or truncates `path` and writes the pcap file header.
    pub fn create(path: impl AsRef<Path>, link_type: Linktype) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_path_buf();
        let savefile = Capture::dead(link_type)
            .and_then(|dead| dead.savefile(&path))
            .map_err(|source| CaptureError::Mirror {
                path: path.clone(),
                source,
            })?;

        let mut writer = Self {
            path,
            link_type,
            savefile,
            frames: 0,
        };
        // libpcap buffers the header; put it on disk before capture starts.
        writer.flush()?;
        Ok(writer)
    }

    /// Appends one frame record. Data beyond the snapshot length is cut.
    pub fn write_frame(&mut self, frame: &RawFrame) {
        let data = &frame.data[..frame.data.len().min(SNAPSHOT_LENGTH as usize)];
        let header = PacketHeader {
            ts: libc::timeval {
                tv_sec: frame.timestamp.timestamp() as libc::time_t,
                tv_usec: frame.timestamp.timestamp_subsec_micros() as libc::suseconds_t,
            },
            caplen: data.len() as u32,
            len: frame.original_len.max(data.len() as u32),
        };
        self.savefile.write(&Packet::new(&header, data));
        self.frames += 1;
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn link_type(&self) -> Linktype {
        self.link_type
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&mut self) -> Result<(), CaptureError> {
        self.savefile.flush().map_err(|source| CaptureError::Mirror {
            path: self.path.clone(),
            source,
        })
    }
}
