//! Batch accumulator: drains the capture queue into the packet store.
//!
//! Packets are collected until the batch holds more than `threshold` of them,
//! then the whole batch is saved in one call. A failed save stops the loop;
//! there is no retry.

use std::sync::Arc;
use std::time::Instant;

use netledger_telemetry::{EventLogger, MetricsRecorder};
use opentelemetry::KeyValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::PipelineError;
use crate::packet::CapturedPacket;
use crate::queue::CaptureQueue;
use crate::store::PacketStore;

/// Batch size that has to be exceeded before a flush.
pub const DEFAULT_BATCH_THRESHOLD: usize = 100;

/// Why the accumulator loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    QueueClosed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorSummary {
    pub batches_flushed: usize,
    pub packets_persisted: usize,
    /// Packets left in the partial batch and not saved at shutdown.
    pub discarded_on_shutdown: usize,
    pub stop: StopReason,
}

pub struct BatchAccumulator {
    store: Arc<dyn PacketStore>,
    threshold: usize,
    flush_on_shutdown: bool,
    metrics: Option<MetricsRecorder>,
    batches_flushed: usize,
    packets_persisted: usize,
}

impl BatchAccumulator {
    pub fn new(store: Arc<dyn PacketStore>) -> Self {
        Self {
            store,
            threshold: DEFAULT_BATCH_THRESHOLD,
            flush_on_shutdown: true,
            metrics: None,
            batches_flushed: 0,
            packets_persisted: 0,
        }
    }

    /// A flush happens once the batch holds more than `threshold` packets.
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    /// Whether the partial batch is saved when the loop stops.
    pub fn with_flush_on_shutdown(mut self, flush: bool) -> Self {
        self.flush_on_shutdown = flush;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs until the queue closes, `cancel` fires, or a save fails.
    ///
    /// On cancellation the packets already queued are drained first. The
    /// queue is closed on exit so a blocked producer does not wait forever.
    #[instrument(name = "batch_accumulator", skip_all, fields(threshold = self.threshold))]
    pub async fn run(
        mut self,
        queue: CaptureQueue,
        cancel: CancellationToken,
    ) -> Result<AccumulatorSummary, PipelineError> {
        info!("Batch accumulator started");
        let result = self.drive(&queue, &cancel).await;
        queue.close();

        match &result {
            Ok(summary) => info!(?summary, "Batch accumulator stopped"),
            Err(e) => error!("Batch accumulator failed: {e}"),
        }
        result
    }

    async fn drive(
        &mut self,
        queue: &CaptureQueue,
        cancel: &CancellationToken,
    ) -> Result<AccumulatorSummary, PipelineError> {
        let mut batch = self.empty_batch();

        let stop = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Cancelled,
                next = queue.recv() => next,
            };

            match next {
                Some(packet) => self.accept(&mut batch, packet).await?,
                None => break StopReason::QueueClosed,
            }
        };

        if stop == StopReason::Cancelled {
            while let Some(packet) = queue.try_recv() {
                self.accept(&mut batch, packet).await?;
            }
        }

        let mut discarded_on_shutdown = 0;
        if !batch.is_empty() {
            if self.flush_on_shutdown {
                debug!(size = batch.len(), "Flushing partial batch on shutdown");
                self.flush(&mut batch).await?;
            } else {
                discarded_on_shutdown = batch.len();
                warn!(
                    discarded = discarded_on_shutdown,
                    "Partial batch discarded on shutdown"
                );
            }
        }

        Ok(AccumulatorSummary {
            batches_flushed: self.batches_flushed,
            packets_persisted: self.packets_persisted,
            discarded_on_shutdown,
            stop,
        })
    }

    async fn accept(
        &mut self,
        batch: &mut Vec<CapturedPacket>,
        packet: CapturedPacket,
    ) -> Result<(), PipelineError> {
        batch.push(packet);
        if batch.len() > self.threshold {
            self.flush(batch).await?;
        }
        Ok(())
    }

    async fn flush(&mut self, batch: &mut Vec<CapturedPacket>) -> Result<(), PipelineError> {
        let packets = std::mem::replace(batch, self.empty_batch());
        let size = packets.len();
        let started = Instant::now();

        let written = self
            .store
            .save_batch(packets)
            .await
            .map_err(|source| PipelineError::Save { size, source })?;

        self.batches_flushed += 1;
        self.packets_persisted += written;
        if let Some(metrics) = &self.metrics {
            metrics.record_flush(written, started.elapsed());
        }
        EventLogger::log_event(
            "batch.flushed",
            vec![
                KeyValue::new("size", written as i64),
                KeyValue::new("batch", self.batches_flushed as i64),
            ],
        );
        debug!(size, "Batch saved");
        Ok(())
    }

    fn empty_batch(&self) -> Vec<CapturedPacket> {
        Vec::with_capacity(self.threshold + 1)
    }
}
