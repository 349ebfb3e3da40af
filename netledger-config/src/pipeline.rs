//! Queue and batching configuration.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// What a full bounded queue does with the next packet.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowMode {
    #[default]
    Block,
    DropOldest,
    DropNewest,
}

/// Capture queue configuration.
#[derive(Default, Debug, Serialize, Deserialize, Validate, Clone)]
pub struct QueueConfig {
    /// Maximum queued packets; unset means unbounded.
    #[validate(range(min = 1))]
    #[serde(default)]
    pub capacity: Option<usize>,

    /// Overflow handling, only consulted when `capacity` is set.
    #[serde(default)]
    pub overflow: OverflowMode,
}

/// Batch accumulator configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct BatchConfig {
    /// A batch is flushed once it holds more than this many packets.
    #[validate(range(min = 1, max = 1_000_000))]
    #[serde(default = "default_threshold")]
    pub threshold: usize,

    /// Save the partial batch when the pipeline stops.
    #[serde(default = "default_true")]
    pub flush_on_shutdown: bool,
}

fn default_threshold() -> usize {
    100
}

fn default_true() -> bool {
    true
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            flush_on_shutdown: default_true(),
        }
    }
}
