//! Storage seam of the pipeline.
//!
//! The accumulator writes through [`PacketStore::save_batch`]; the query
//! service reads through [`PacketStore::query`]. Sort keys are an enum, so a
//! backend only ever interpolates one of the allow-listed column names.

use std::fmt;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::packet::{CapturedPacket, StoredPacketRecord};

/// Page size used when the caller asks for a non-positive limit.
pub const DEFAULT_QUERY_LIMIT: u32 = 100;

/// Columns records can be ordered by. Ordering is always descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortKey {
    #[default]
    CapturedAt,
    UpdatedAt,
    DeviceId,
    SourceIp,
    DestinationIp,
    SourcePort,
    DestinationPort,
    Protocol,
}

impl SortKey {
    pub const ALL: [SortKey; 8] = [
        SortKey::CapturedAt,
        SortKey::UpdatedAt,
        SortKey::DeviceId,
        SortKey::SourceIp,
        SortKey::DestinationIp,
        SortKey::SourcePort,
        SortKey::DestinationPort,
        SortKey::Protocol,
    ];

    /// Column name in the packet table.
    pub fn column(self) -> &'static str {
        match self {
            SortKey::CapturedAt => "captured_at",
            SortKey::UpdatedAt => "updated_at",
            SortKey::DeviceId => "device_id",
            SortKey::SourceIp => "source_ip",
            SortKey::DestinationIp => "destination_ip",
            SortKey::SourcePort => "source_port",
            SortKey::DestinationPort => "destination_port",
            SortKey::Protocol => "protocol",
        }
    }

    /// Looks a caller-supplied key up in the allow-list.
    ///
    /// Empty or unknown keys fall back to [`SortKey::CapturedAt`].
    pub fn parse_or_default(raw: &str) -> SortKey {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|key| key.column().eq_ignore_ascii_case(raw))
            .unwrap_or_default()
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A normalized read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketQuery {
    limit: u32,
    sort: SortKey,
}

impl PacketQuery {
    /// Normalizes raw parameters: non-positive limits become
    /// [`DEFAULT_QUERY_LIMIT`], unknown sort keys become `captured_at`.
    pub fn new(limit: i64, sort: &str) -> Self {
        let limit = if limit <= 0 {
            DEFAULT_QUERY_LIMIT
        } else {
            u32::try_from(limit).unwrap_or(u32::MAX)
        };
        Self {
            limit,
            sort: SortKey::parse_or_default(sort),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn sort(&self) -> SortKey {
        self.sort
    }
}

impl Default for PacketQuery {
    fn default() -> Self {
        Self::new(0, "")
    }
}

/// Durable packet storage.
#[async_trait]
pub trait PacketStore: Send + Sync {
    /// Persists a batch in one logical operation.
    ///
    /// Every packet is mapped before anything is written; a single mapping
    /// failure fails the whole batch. Returns the number of records written.
    async fn save_batch(&self, packets: Vec<CapturedPacket>) -> Result<usize, StoreError>;

    /// Reads at most `query.limit()` records, newest-first by `query.sort()`.
    async fn query(&self, query: PacketQuery) -> Result<Vec<StoredPacketRecord>, StoreError>;
}
