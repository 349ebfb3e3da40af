//! ## netledger-telemetry::metrics
//! Prometheus counters for the capture pipeline.

use std::time::Duration;

use prometheus::{Counter, Encoder, Histogram, HistogramOpts, IntGauge, Registry, TextEncoder};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub packets_captured: Counter,
    pub packets_dropped: Counter,
    pub packets_persisted: Counter,
    pub batches_flushed: Counter,
    pub batch_flush_seconds: Histogram,
    pub queue_depth: IntGauge,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let packets_captured = Counter::new(
            "netledger_packets_captured_total",
            "Frames captured and handed to the queue",
        )?;
        let packets_dropped = Counter::new(
            "netledger_packets_dropped_total",
            "Packets lost to the queue overflow policy",
        )?;
        let packets_persisted = Counter::new(
            "netledger_packets_persisted_total",
            "Packet records written to storage",
        )?;
        let batches_flushed =
            Counter::new("netledger_batches_flushed_total", "Batches saved to storage")?;
        let batch_flush_seconds = Histogram::with_opts(
            HistogramOpts::new("netledger_batch_flush_seconds", "Time spent saving a batch")
                .buckets(vec![0.001, 0.01, 0.1, 1.0, 10.0]),
        )?;
        let queue_depth = IntGauge::new("netledger_queue_depth", "Packets waiting in the queue")?;

        registry.register(Box::new(packets_captured.clone()))?;
        registry.register(Box::new(packets_dropped.clone()))?;
        registry.register(Box::new(packets_persisted.clone()))?;
        registry.register(Box::new(batches_flushed.clone()))?;
        registry.register(Box::new(batch_flush_seconds.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            packets_captured,
            packets_dropped,
            packets_persisted,
            batches_flushed,
            batch_flush_seconds,
            queue_depth,
        })
    }

    /// Renders every registered metric in the Prometheus text format.
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn inc_captured(&self) {
        self.packets_captured.inc();
    }

    pub fn inc_dropped(&self) {
        self.packets_dropped.inc();
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    pub fn record_flush(&self, persisted: usize, elapsed: Duration) {
        self.batches_flushed.inc();
        self.packets_persisted.inc_by(persisted as f64);
        self.batch_flush_seconds.observe(elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_flushes() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.record_flush(101, Duration::from_millis(5));
        metrics.record_flush(101, Duration::from_millis(7));

        assert_eq!(metrics.batches_flushed.get(), 2.0);
        assert_eq!(metrics.packets_persisted.get(), 202.0);
        assert_eq!(metrics.batch_flush_seconds.get_sample_count(), 2);
    }

    #[test]
    fn renders_text_format() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.inc_captured();
        metrics.set_queue_depth(7);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("netledger_packets_captured_total 1"));
        assert!(text.contains("netledger_queue_depth 7"));
    }
}
