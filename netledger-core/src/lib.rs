//! # netledger-core
//!
//! Capture-to-storage pipeline core: the packet data model, the capture
//! queue, the batch accumulator, the record mapper and the read-side query
//! service.
//!
//! ### Key Submodules:
//! - `queue`: FIFO hand-off between the capture thread and the accumulator
//! - `accumulator`: threshold-triggered batching into a [`PacketStore`]
//! - `mapper`: [`CapturedPacket`] → [`StoredPacketRecord`]
//! - `store`: storage trait, sort-key allow-list and query normalization
//! - `query`: [`QueryService`] used by the read API

pub mod accumulator;
pub mod error;
pub mod mapper;
pub mod packet;
pub mod query;
pub mod queue;
pub mod store;

#[cfg(test)]
mod testing;

pub mod prelude {
    pub use crate::accumulator::*;
    pub use crate::error::*;
    pub use crate::mapper::*;
    pub use crate::packet::*;
    pub use crate::query::*;
    pub use crate::queue::*;
    pub use crate::store::*;
}

pub use accumulator::{AccumulatorSummary, BatchAccumulator, StopReason};
pub use error::{MappingError, PipelineError, StoreError};
pub use packet::{CapturedFrame, CapturedPacket, Device, Flow, StoredPacketRecord, TransportFlow};
pub use query::QueryService;
pub use queue::{CaptureQueue, Enqueued, OverflowPolicy, QueueError};
pub use store::{PacketQuery, PacketStore, SortKey};
