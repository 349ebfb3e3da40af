use thiserror::Error;

/// Reasons a captured packet cannot become a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("Frame has no network layer")]
    MissingNetworkLayer,

    #[error("Frame has no transport layer")]
    MissingTransportLayer,

    #[error("Invalid {side} port '{value}'")]
    InvalidPort { side: &'static str, value: String },

    #[error("Transport layer has an empty protocol name")]
    EmptyProtocol,
}

/// Errors surfaced by a [`PacketStore`](crate::store::PacketStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Packet mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Corrupt stored record: {0}")]
    Corrupt(String),

    #[error("Schema error: {0}")]
    Schema(String),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

/// Fatal conditions that stop the batching loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Batch of {size} packets could not be saved: {source}")]
    Save {
        size: usize,
        #[source]
        source: StoreError,
    },
}
