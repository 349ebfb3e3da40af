//! Capture queue: the hand-off between the capture loop and the accumulator.
//!
//! Backed by `concurrent-queue` with a tokio [`Notify`] to wake the consumer.
//! The producer side is synchronous (it runs on the capture thread); the
//! consumer side is async.
//!
//! Depth is unbounded unless a capacity is configured, in which case the
//! [`OverflowPolicy`] decides what happens to a packet that does not fit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use concurrent_queue::{ConcurrentQueue, ForcePushError, PopError, PushError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;

use crate::packet::CapturedPacket;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Capture queue is closed")]
    Closed,

    #[error("Invalid queue capacity (must be at least 1)")]
    InvalidCapacity,
}

/// What a full bounded queue does with the next packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// The producer yields until the consumer frees a slot.
    #[default]
    Block,
    /// The oldest queued packet is evicted to make room.
    DropOldest,
    /// The incoming packet is discarded.
    DropNewest,
}

/// Result of a successful push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    /// Queued after evicting the oldest packet.
    DisplacedOldest,
    /// Not queued; the queue was full.
    Discarded,
}

struct Inner {
    items: ConcurrentQueue<CapturedPacket>,
    overflow: OverflowPolicy,
    ready: Notify,
    dropped: AtomicU64,
}

/// FIFO hand-off of [`CapturedPacket`]s, one producer and one consumer.
///
/// Handles are created with [`CaptureQueue::share`]; all handles address the
/// same queue.
pub struct CaptureQueue {
    inner: Arc<Inner>,
}

impl CaptureQueue {
    /// Queue without a depth bound. Pushes never block or drop.
    pub fn unbounded() -> Self {
        Self::from_queue(ConcurrentQueue::unbounded(), OverflowPolicy::Block)
    }

    /// Queue holding at most `capacity` packets.
    pub fn with_capacity(capacity: usize, overflow: OverflowPolicy) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity);
        }
        Ok(Self::from_queue(ConcurrentQueue::bounded(capacity), overflow))
    }

    fn from_queue(items: ConcurrentQueue<CapturedPacket>, overflow: OverflowPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                items,
                overflow,
                ready: Notify::new(),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Creates another handle to the same queue.
    #[inline]
    pub fn share(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Appends a packet in capture order.
    ///
    /// With [`OverflowPolicy::Block`] on a full queue this spins with
    /// `yield_now`, so call it from a blocking thread, not from async code.
    pub fn push(&self, packet: CapturedPacket) -> Result<Enqueued, QueueError> {
        let outcome = match self.inner.overflow {
            OverflowPolicy::Block => self.push_blocking(packet)?,
            OverflowPolicy::DropOldest => match self.inner.items.force_push(packet) {
                Ok(None) => Enqueued::Queued,
                Ok(Some(_evicted)) => {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    Enqueued::DisplacedOldest
                }
                Err(ForcePushError(_)) => return Err(QueueError::Closed),
            },
            OverflowPolicy::DropNewest => match self.inner.items.push(packet) {
                Ok(()) => Enqueued::Queued,
                Err(PushError::Full(_)) => {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    Enqueued::Discarded
                }
                Err(PushError::Closed(_)) => return Err(QueueError::Closed),
            },
        };

        if outcome != Enqueued::Discarded {
            self.inner.ready.notify_one();
        }
        Ok(outcome)
    }

    fn push_blocking(&self, mut packet: CapturedPacket) -> Result<Enqueued, QueueError> {
        loop {
            match self.inner.items.push(packet) {
                Ok(()) => return Ok(Enqueued::Queued),
                Err(PushError::Full(rejected)) => {
                    packet = rejected;
                    // Make sure a parked consumer is awake to free a slot.
                    self.inner.ready.notify_one();
                    std::thread::yield_now();
                }
                Err(PushError::Closed(_)) => return Err(QueueError::Closed),
            }
        }
    }

    /// Appends several packets, preserving their order.
    ///
    /// Stops at the first packet rejected because the queue closed.
    pub fn push_multiple<I>(&self, packets: I) -> Result<(), QueueError>
    where
        I: IntoIterator<Item = CapturedPacket>,
    {
        for packet in packets {
            self.push(packet)?;
        }
        Ok(())
    }

    /// Waits for the next packet.
    ///
    /// Returns `None` once the queue is closed and its backlog is drained.
    pub async fn recv(&self) -> Option<CapturedPacket> {
        loop {
            match self.inner.items.pop() {
                Ok(packet) => return Some(packet),
                Err(PopError::Closed) => return None,
                // `notify_one` leaves a permit behind when nobody is waiting,
                // so a push racing with this branch is not lost.
                Err(PopError::Empty) => self.inner.ready.notified().await,
            }
        }
    }

    /// Takes the next packet if one is queued.
    pub fn try_recv(&self) -> Option<CapturedPacket> {
        self.inner.items.pop().ok()
    }

    /// Closes the queue. Further pushes fail; queued packets stay receivable.
    ///
    /// Returns `true` if this call closed it.
    pub fn close(&self) -> bool {
        let closed = self.inner.items.close();
        self.inner.ready.notify_waiters();
        self.inner.ready.notify_one();
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.items.is_closed()
    }

    pub fn len(&self) -> usize {
        self.inner.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.is_empty()
    }

    /// Configured capacity, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.inner.items.capacity()
    }

    /// Packets lost to the overflow policy since the queue was created.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}
