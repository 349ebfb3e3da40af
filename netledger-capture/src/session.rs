//! Capture session: one device, one handle, one optional mirror file.

use std::path::PathBuf;
use std::time::Duration;

use netledger_core::packet::{CapturedPacket, Device};
use netledger_core::queue::{CaptureQueue, Enqueued};
use netledger_telemetry::{EventLogger, MetricsRecorder};
use opentelemetry::KeyValue;
use pcap::Linktype;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::backend::{CaptureBackend, CaptureHandle, NextFrame, SNAPSHOT_LENGTH};
use crate::error::CaptureError;
use crate::frame::LinkFrame;
use crate::mirror::MirrorWriter;

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// BPF expression; `None` or empty captures everything.
    pub filter: Option<String>,
    /// pcap file mirroring every captured frame; `None` or empty disables it.
    pub mirror_file: Option<PathBuf>,
    pub read_timeout: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            filter: None,
            mirror_file: None,
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Why a capture session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStop {
    Cancelled,
    /// The handle reported no more frames.
    CaptureEnded,
    /// The consumer closed the queue.
    QueueClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    pub device: String,
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub stop: CaptureStop,
}

/// A running capture on one device.
///
/// Resources are acquired handle first, mirror second. Fields drop in
/// declaration order, so the mirror file is closed before the handle.
pub struct CaptureSession<H: CaptureHandle> {
    mirror: Option<MirrorWriter>,
    handle: H,
    link_type: Linktype,
    device: Device,
    metrics: Option<MetricsRecorder>,
}

impl<H: CaptureHandle> CaptureSession<H> {
    /// Opens the handle, creates the mirror file with the handle's link type
    /// and applies the filter.
    ///
    /// Any failure aborts the session before a frame is read; resources
    /// acquired up to that point are released on return.
    pub fn open<B>(backend: &B, device: Device, options: &CaptureOptions) -> Result<Self, CaptureError>
    where
        B: CaptureBackend<Handle = H>,
    {
        let mut handle = backend.open(&device, SNAPSHOT_LENGTH, options.read_timeout)?;
        let link_type = handle.link_type();
        debug!(device = %device.name, link_type = link_type.0, "Capture handle opened");

        let mirror = match options.mirror_file.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            Some(path) => Some(MirrorWriter::create(path, link_type)?),
            None => None,
        };

        if let Some(filter) = options.filter.as_deref().filter(|f| !f.trim().is_empty()) {
            handle.set_filter(filter)?;
        }

        Ok(Self {
            mirror,
            handle,
            link_type,
            device,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Reads frames into `queue` until `cancel` fires, the handle ends or the
    /// queue is closed. Blocks the calling thread.
    ///
    /// `cancel` is checked between reads, so a stop request takes effect
    /// within one read timeout.
    #[instrument(name = "capture_session", skip_all, fields(device = %self.device.name))]
    pub fn run(
        mut self,
        queue: &CaptureQueue,
        cancel: &CancellationToken,
    ) -> Result<CaptureSummary, CaptureError> {
        EventLogger::log_event(
            "capture.session.started",
            vec![
                KeyValue::new("device", self.device.name.clone()),
                KeyValue::new("mirror", self.mirror.is_some()),
            ],
        );

        let mut frames_captured = 0u64;
        let mut frames_dropped = 0u64;

        let stop = loop {
            if cancel.is_cancelled() {
                break CaptureStop::Cancelled;
            }

            let raw = match self.handle.next_frame()? {
                NextFrame::Frame(raw) => raw,
                NextFrame::TimedOut => continue,
                NextFrame::Ended => break CaptureStop::CaptureEnded,
            };

            if let Some(mirror) = self.mirror.as_mut() {
                mirror.write_frame(&raw);
            }

            let packet = CapturedPacket::new(
                Box::new(LinkFrame::new(self.link_type, raw.data)),
                self.device.name.clone(),
            );
            match queue.push(packet) {
                Ok(Enqueued::Queued) => {}
                Ok(Enqueued::DisplacedOldest) | Ok(Enqueued::Discarded) => {
                    frames_dropped += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_dropped();
                    }
                }
                Err(_) => {
                    debug!("Queue closed, stopping capture");
                    break CaptureStop::QueueClosed;
                }
            }

            frames_captured += 1;
            if let Some(metrics) = &self.metrics {
                metrics.inc_captured();
                metrics.set_queue_depth(queue.len());
            }
        };

        if let Some(mirror) = self.mirror.as_mut() {
            if let Err(e) = mirror.flush() {
                warn!("{e}");
            }
        }

        let summary = CaptureSummary {
            device: self.device.name.clone(),
            frames_captured,
            frames_dropped,
            stop,
        };
        info!(?summary, "Capture session stopped");
        EventLogger::log_event(
            "capture.session.stopped",
            vec![
                KeyValue::new("device", summary.device.clone()),
                KeyValue::new("frames", frames_captured as i64),
            ],
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RawFrame;
    use crate::frame::tests::{raw_ip_tcp, tcp_frame};
    use pcap::Capture;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    type Events = Arc<Mutex<Vec<String>>>;

    struct MockHandle {
        frames: VecDeque<NextFrame>,
        events: Events,
        link_type: Linktype,
        filter_fails: bool,
    }

    impl CaptureHandle for MockHandle {
        fn link_type(&self) -> Linktype {
            self.link_type
        }

        fn set_filter(&mut self, expression: &str) -> Result<(), CaptureError> {
            self.events.lock().unwrap().push(format!("filter:{expression}"));
            if self.filter_fails {
                return Err(CaptureError::Filter {
                    filter: expression.into(),
                    source: pcap::Error::PcapError("syntax error".into()),
                });
            }
            Ok(())
        }

        fn next_frame(&mut self) -> Result<NextFrame, CaptureError> {
            Ok(self.frames.pop_front().unwrap_or(NextFrame::Ended))
        }
    }

    impl Drop for MockHandle {
        fn drop(&mut self) {
            self.events.lock().unwrap().push("handle:closed".into());
        }
    }

    struct MockBackend {
        frames: Mutex<Option<Vec<NextFrame>>>,
        events: Events,
        link_type: Linktype,
        open_fails: bool,
        filter_fails: bool,
    }

    impl MockBackend {
        fn new(frames: Vec<NextFrame>) -> Self {
            Self {
                frames: Mutex::new(Some(frames)),
                events: Events::default(),
                link_type: Linktype::ETHERNET,
                open_fails: false,
                filter_fails: false,
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl CaptureBackend for MockBackend {
        type Handle = MockHandle;

        fn open(&self, device: &Device, snaplen: u32, _: Duration) -> Result<MockHandle, CaptureError> {
            assert_eq!(snaplen, 65535);
            if self.open_fails {
                return Err(CaptureError::Open {
                    device: device.name.clone(),
                    source: pcap::Error::PcapError("no such device".into()),
                });
            }
            self.events.lock().unwrap().push(format!("handle:open:{}", device.name));
            Ok(MockHandle {
                frames: self.frames.lock().unwrap().take().unwrap_or_default().into(),
                events: self.events.clone(),
                link_type: self.link_type,
                filter_fails: self.filter_fails,
            })
        }
    }

    fn tcp(sport: u16) -> NextFrame {
        NextFrame::Frame(RawFrame::new(tcp_frame([10, 0, 0, 1], sport, [10, 0, 0, 2], 80)))
    }

    fn device() -> Device {
        Device::new("test0", "unit test device")
    }

    #[test]
    fn pushes_frames_in_capture_order() {
        let backend = MockBackend::new(vec![tcp(1000), NextFrame::TimedOut, tcp(1001), tcp(1002)]);
        let queue = CaptureQueue::unbounded();

        let session = CaptureSession::open(&backend, device(), &CaptureOptions::default()).unwrap();
        let summary = session.run(&queue, &CancellationToken::new()).unwrap();

        assert_eq!(summary.frames_captured, 3);
        assert_eq!(summary.stop, CaptureStop::CaptureEnded);

        let ports: Vec<String> = std::iter::from_fn(|| queue.try_recv())
            .map(|p| {
                assert_eq!(p.device_id, "test0");
                p.frame.transport_flow().unwrap().flow.source
            })
            .collect();
        assert_eq!(ports, ["1000", "1001", "1002"]);
    }

    #[test]
    fn applies_filter_and_closes_handle() {
        let backend = MockBackend::new(vec![tcp(1)]);
        let options = CaptureOptions {
            filter: Some("tcp".into()),
            ..Default::default()
        };

        let session = CaptureSession::open(&backend, device(), &options).unwrap();
        session.run(&CaptureQueue::unbounded(), &CancellationToken::new()).unwrap();

        assert_eq!(backend.events(), ["handle:open:test0", "filter:tcp", "handle:closed"]);
    }

    #[test]
    fn blank_filter_is_not_applied() {
        let backend = MockBackend::new(vec![]);
        let options = CaptureOptions {
            filter: Some("  ".into()),
            ..Default::default()
        };

        drop(CaptureSession::open(&backend, device(), &options).unwrap());
        assert_eq!(backend.events(), ["handle:open:test0", "handle:closed"]);
    }

    #[test]
    fn filter_failure_closes_handle() {
        let mut backend = MockBackend::new(vec![tcp(1)]);
        backend.filter_fails = true;
        let options = CaptureOptions {
            filter: Some("not a filter".into()),
            ..Default::default()
        };

        let err = CaptureSession::open(&backend, device(), &options).err().unwrap();
        assert!(matches!(err, CaptureError::Filter { .. }));
        assert_eq!(backend.events().last().map(String::as_str), Some("handle:closed"));
    }

    #[test]
    fn open_failure_leaves_no_mirror_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.pcap");
        let mut backend = MockBackend::new(vec![]);
        backend.open_fails = true;
        let options = CaptureOptions {
            mirror_file: Some(path.clone()),
            ..Default::default()
        };

        let err = CaptureSession::open(&backend, device(), &options).err().unwrap();
        assert!(matches!(err, CaptureError::Open { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn mirror_failure_closes_the_handle_before_any_read() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new(vec![tcp(1)]);
        let options = CaptureOptions {
            filter: Some("tcp".into()),
            mirror_file: Some(dir.path().join("no").join("such.pcap")),
            ..Default::default()
        };

        let err = CaptureSession::open(&backend, device(), &options).err().unwrap();
        assert!(matches!(err, CaptureError::Mirror { .. }));
        assert_eq!(backend.events(), ["handle:open:test0", "handle:closed"]);
    }

    #[test]
    fn mirror_header_is_written_before_the_first_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.pcap");
        let backend = MockBackend::new(vec![]);
        let options = CaptureOptions {
            mirror_file: Some(path.clone()),
            ..Default::default()
        };

        let session = CaptureSession::open(&backend, device(), &options).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 24);
        drop(session);
    }

    #[test]
    fn mirrors_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.pcap");
        let backend = MockBackend::new(vec![tcp(1), tcp(2)]);
        let options = CaptureOptions {
            mirror_file: Some(path.clone()),
            ..Default::default()
        };

        let session = CaptureSession::open(&backend, device(), &options).unwrap();
        session.run(&CaptureQueue::unbounded(), &CancellationToken::new()).unwrap();

        let mut offline = Capture::from_file(&path).unwrap();
        assert_eq!(offline.get_datalink(), Linktype::ETHERNET);
        let frame_len = tcp_frame([10, 0, 0, 1], 1, [10, 0, 0, 2], 80).len();
        for _ in 0..2 {
            assert_eq!(offline.next_packet().unwrap().data.len(), frame_len);
        }
        assert!(matches!(offline.next_packet(), Err(pcap::Error::NoMorePackets)));
    }

    #[test]
    fn raw_ip_device_frames_are_decoded_and_mirrored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tun.pcap");
        let mut backend = MockBackend::new(vec![NextFrame::Frame(RawFrame::new(raw_ip_tcp(7000, 53)))]);
        backend.link_type = Linktype::RAW;
        let queue = CaptureQueue::unbounded();
        let options = CaptureOptions {
            mirror_file: Some(path.clone()),
            ..Default::default()
        };

        let session = CaptureSession::open(&backend, Device::new("tun0", ""), &options).unwrap();
        session.run(&queue, &CancellationToken::new()).unwrap();

        let packet = queue.try_recv().unwrap();
        let record = netledger_core::mapper::map_packet(&packet).unwrap();
        assert_eq!(record.source_ip, "10.0.0.1");
        assert_eq!(record.source_port, 7000);
        assert_eq!(Capture::from_file(&path).unwrap().get_datalink(), Linktype::RAW);
    }

    #[test]
    fn cancellation_stops_before_next_read() {
        let backend = MockBackend::new(vec![tcp(1), tcp(2)]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let session = CaptureSession::open(&backend, device(), &CaptureOptions::default()).unwrap();
        let summary = session.run(&CaptureQueue::unbounded(), &cancel).unwrap();

        assert_eq!(summary.stop, CaptureStop::Cancelled);
        assert_eq!(summary.frames_captured, 0);
    }

    #[test]
    fn closed_queue_ends_the_session() {
        let backend = MockBackend::new(vec![tcp(1), tcp(2)]);
        let queue = CaptureQueue::unbounded();
        queue.close();

        let session = CaptureSession::open(&backend, device(), &CaptureOptions::default()).unwrap();
        let summary = session.run(&queue, &CancellationToken::new()).unwrap();

        assert_eq!(summary.stop, CaptureStop::QueueClosed);
        assert_eq!(backend.events().last().map(String::as_str), Some("handle:closed"));
    }

    #[test]
    fn counts_overflow_drops() {
        use netledger_core::queue::OverflowPolicy;

        let backend = MockBackend::new(vec![tcp(1), tcp(2), tcp(3)]);
        let queue = CaptureQueue::with_capacity(1, OverflowPolicy::DropNewest).unwrap();
        let metrics = MetricsRecorder::new().unwrap();

        let session = CaptureSession::open(&backend, device(), &CaptureOptions::default())
            .unwrap()
            .with_metrics(metrics.clone());
        let summary = session.run(&queue, &CancellationToken::new()).unwrap();

        assert_eq!(summary.frames_dropped, 2);
        assert_eq!(metrics.packets_dropped.get(), 2.0);
        assert_eq!(queue.len(), 1);
    }
}
