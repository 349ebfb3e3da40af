/*!
# Runtime Engine

Runs the capture pipeline against a live interface:

```text
capture thread ──push──▶ CaptureQueue ──recv──▶ BatchAccumulator ──save_batch──▶ SQLite
                                                                                  ▲
                                                  GET /packets ── QueryService ───┘
```

Shutdown is driven by a [`CancellationToken`]. The capture thread notices it
between reads and closes the queue; the accumulator then drains what is left,
flushes the partial batch and exits; the HTTP server stops accepting requests.
*/

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use netledger_api::AppState;
use netledger_capture::{
    CaptureBackend, CaptureOptions, CaptureSession, CaptureSummary, PcapBackend,
};
use netledger_config::{NetledgerConfig, OverflowMode, QueueConfig};
use netledger_core::accumulator::{AccumulatorSummary, BatchAccumulator};
use netledger_core::packet::Device;
use netledger_core::query::QueryService;
use netledger_core::queue::{CaptureQueue, OverflowPolicy};
use netledger_store::SqlitePacketStore;
use netledger_telemetry::{EventLogger, MetricsRecorder};
use opentelemetry::KeyValue;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, Instrument};

use crate::error::EngineError;

/// What the pipeline did before it stopped.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub capture: CaptureSummary,
    pub accumulator: AccumulatorSummary,
}

/// Runs production mode using live capture (pcap).
#[instrument(level = "info", name = "run_production_mode", skip_all, fields(interface = %config.capture.interface))]
pub async fn run_production_mode(
    config: NetledgerConfig,
    metrics: MetricsRecorder,
    cancel: CancellationToken,
) -> Result<RunSummary, EngineError> {
    run_with_backend(config, PcapBackend, metrics, cancel).await
}

/// Connects to the configured database and applies the schema file.
pub async fn init_schema(config: &NetledgerConfig) -> Result<SqlitePacketStore, EngineError> {
    let store =
        SqlitePacketStore::connect(&config.storage.database, config.storage.max_connections).await?;
    netledger_store::init_schema(store.pool(), &config.storage.schema_path).await?;
    EventLogger::log_event(
        "storage.schema.initialized",
        vec![KeyValue::new("database", config.storage.database.clone())],
    );
    Ok(store)
}

/// Runs the pipeline on an arbitrary capture backend.
///
/// Returns once `cancel` fires and every stage has stopped, or as soon as a
/// stage fails. When capture ends on its own the API keeps serving until
/// `cancel` fires.
pub async fn run_with_backend<B>(
    config: NetledgerConfig,
    backend: B,
    metrics: MetricsRecorder,
    cancel: CancellationToken,
) -> Result<RunSummary, EngineError>
where
    B: CaptureBackend + Send + 'static,
    B::Handle: 'static,
{
    let store = Arc::new(init_schema(&config).await?);
    let queue = build_queue(&config.queue)?;

    // Stops when the capture side closes the queue, so nothing already
    // captured is lost on shutdown. A failed save stops capture too.
    let accumulator = BatchAccumulator::new(store.clone())
        .with_threshold(config.batch.threshold)
        .with_flush_on_shutdown(config.batch.flush_on_shutdown)
        .with_metrics(metrics.clone());
    let accumulator_queue = queue.share();
    let accumulator_cancel = cancel.clone();
    let accumulator_task = tokio::spawn(
        async move {
            let result = accumulator
                .run(accumulator_queue, CancellationToken::new())
                .await;
            if result.is_err() {
                accumulator_cancel.cancel();
            }
            result
        }
        .instrument(tracing::info_span!("accumulator_task")),
    );

    let addr = SocketAddr::new(config.api.bind_address, config.api.port);
    let state = AppState {
        queries: QueryService::new(store),
        metrics: metrics.clone(),
    };
    let server_cancel = cancel.clone();
    let server_task = tokio::spawn(async move {
        let result = netledger_api::serve(addr, state, server_cancel.clone().cancelled_owned()).await;
        if let Err(e) = &result {
            error!("Read API failed: {e}");
            server_cancel.cancel();
        }
        result
    });

    let device = Device::new(&config.capture.interface, &config.capture.description);
    let options = capture_options(&config);
    let capture_queue = queue.share();
    let capture_cancel = cancel.clone();
    let capture_task = spawn_blocking(move || {
        info!("Starting packet capture on {}", device.name);
        let result = CaptureSession::open(&backend, device, &options)
            .and_then(|session| session.with_metrics(metrics).run(&capture_queue, &capture_cancel));
        capture_queue.close();
        result
    });

    let capture_result = capture_task.await?;
    let accumulator_result = accumulator_task.await?;

    let outcome = match (capture_result, accumulator_result) {
        (_, Err(e)) => Err(EngineError::from(e)),
        (Err(e), _) => Err(EngineError::from(e)),
        (Ok(capture), Ok(accumulator)) => Ok(RunSummary {
            capture,
            accumulator,
        }),
    };

    match &outcome {
        Ok(summary) if !cancel.is_cancelled() => {
            info!(
                frames = summary.capture.frames_captured,
                "Capture ended; read API keeps serving until shutdown"
            );
            cancel.cancelled().await;
        }
        Ok(_) => {}
        Err(e) => {
            error!("Pipeline stopped: {e}");
            cancel.cancel();
        }
    }

    server_task.await??;

    if let Ok(summary) = &outcome {
        EventLogger::log_event(
            "pipeline.stopped",
            vec![
                KeyValue::new("frames_captured", summary.capture.frames_captured as i64),
                KeyValue::new(
                    "packets_persisted",
                    summary.accumulator.packets_persisted as i64,
                ),
            ],
        );
    }
    outcome
}

fn build_queue(config: &QueueConfig) -> Result<CaptureQueue, EngineError> {
    let policy = match config.overflow {
        OverflowMode::Block => OverflowPolicy::Block,
        OverflowMode::DropOldest => OverflowPolicy::DropOldest,
        OverflowMode::DropNewest => OverflowPolicy::DropNewest,
    };
    match config.capacity {
        Some(capacity) => Ok(CaptureQueue::with_capacity(capacity, policy)?),
        None => Ok(CaptureQueue::unbounded()),
    }
}

fn capture_options(config: &NetledgerConfig) -> CaptureOptions {
    let capture = &config.capture;
    CaptureOptions {
        filter: Some(capture.filter.trim())
            .filter(|f| !f.is_empty())
            .map(str::to_string),
        mirror_file: capture
            .mirror_file
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from),
        read_timeout: Duration::from_millis(u64::from(capture.read_timeout_ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;
    use netledger_capture::{CaptureError, CaptureHandle, CaptureStop, Linktype, NextFrame, RawFrame};
    use netledger_core::error::StoreError;
    use netledger_core::store::{PacketQuery, PacketStore};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;

    /// Replays a fixed number of TCP frames, then requests shutdown.
    struct ReplayBackend {
        frames: usize,
        cancel: CancellationToken,
        filters: Arc<Mutex<Vec<String>>>,
    }

    struct ReplayHandle {
        remaining: usize,
        next_port: u16,
        cancel: CancellationToken,
        filters: Arc<Mutex<Vec<String>>>,
    }

    impl CaptureBackend for ReplayBackend {
        type Handle = ReplayHandle;

        fn open(&self, _: &Device, _: u32, _: Duration) -> Result<ReplayHandle, CaptureError> {
            Ok(ReplayHandle {
                remaining: self.frames,
                next_port: 10_000,
                cancel: self.cancel.clone(),
                filters: self.filters.clone(),
            })
        }
    }

    impl CaptureHandle for ReplayHandle {
        fn link_type(&self) -> Linktype {
            Linktype::ETHERNET
        }

        fn set_filter(&mut self, expression: &str) -> Result<(), CaptureError> {
            self.filters.lock().unwrap().push(expression.to_string());
            Ok(())
        }

        fn next_frame(&mut self) -> Result<NextFrame, CaptureError> {
            if self.remaining == 0 {
                self.cancel.cancel();
                return Ok(NextFrame::TimedOut);
            }
            self.remaining -= 1;
            self.next_port += 1;

            let builder = PacketBuilder::ethernet2([2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2])
                .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
                .tcp(self.next_port, 80, 1, 1024);
            let mut buf = Vec::with_capacity(builder.size(0));
            builder.write(&mut buf, &[]).unwrap();
            Ok(NextFrame::Frame(RawFrame::new(buf)))
        }
    }

    fn test_config(dir: &tempfile::TempDir) -> NetledgerConfig {
        let mut config = NetledgerConfig::default();
        config.capture.interface = "replay0".into();
        config.storage.database = dir.path().join("packets.db").display().to_string();
        config.api.bind_address = IpAddr::V4(Ipv4Addr::LOCALHOST);
        config.api.port = 0;
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn persists_every_captured_frame() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let cancel = CancellationToken::new();
        let filters = Arc::new(Mutex::new(Vec::new()));
        let backend = ReplayBackend {
            frames: 150,
            cancel: cancel.clone(),
            filters: filters.clone(),
        };

        let summary = run_with_backend(config.clone(), backend, MetricsRecorder::new().unwrap(), cancel)
            .await
            .unwrap();

        assert_eq!(summary.capture.frames_captured, 150);
        assert_eq!(summary.capture.stop, CaptureStop::Cancelled);
        // One threshold flush of 101, then the remaining 49 on shutdown.
        assert_eq!(summary.accumulator.batches_flushed, 2);
        assert_eq!(summary.accumulator.packets_persisted, 150);
        assert_eq!(*filters.lock().unwrap(), ["tcp or udp"]);

        let store = SqlitePacketStore::connect(&config.storage.database, 1).await.unwrap();
        let records = store.query(PacketQuery::new(1000, "source_port")).await.unwrap();
        assert_eq!(records.len(), 150);
        assert_eq!(records[0].source_port, 10_150);
        assert!(records.iter().all(|r| r.device_id == "replay0"));
    }

    #[tokio::test]
    async fn missing_schema_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.storage.schema_path = "schema/missing.sql".into();
        let cancel = CancellationToken::new();
        let backend = ReplayBackend {
            frames: 1,
            cancel: cancel.clone(),
            filters: Arc::default(),
        };

        let err = run_with_backend(config, backend, MetricsRecorder::new().unwrap(), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::Schema(_))));
    }

    #[test]
    fn builds_queue_from_config() {
        let unbounded = build_queue(&QueueConfig::default()).unwrap();
        assert_eq!(unbounded.capacity(), None);

        let bounded = build_queue(&QueueConfig {
            capacity: Some(8),
            overflow: OverflowMode::DropOldest,
        })
        .unwrap();
        assert_eq!(bounded.capacity(), Some(8));
    }

    #[test]
    fn blank_capture_settings_mean_none() {
        let mut config = NetledgerConfig::default();
        config.capture.filter = "  ".into();
        config.capture.mirror_file = Some(String::new());

        let options = capture_options(&config);
        assert!(options.filter.is_none());
        assert!(options.mirror_file.is_none());
        assert_eq!(options.read_timeout, Duration::from_secs(30));
    }
}
