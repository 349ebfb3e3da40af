//! # netledger-engine
//!
//! Production runtime: wires the packet store, capture queue, batch
//! accumulator, capture session and read API together and owns shutdown.

pub mod error;
pub mod runtime;

pub use error::EngineError;
pub use runtime::{init_schema, run_production_mode, run_with_backend, RunSummary};
