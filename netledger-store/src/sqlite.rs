//! SQLite implementation of [`PacketStore`].

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use netledger_core::error::StoreError;
use netledger_core::mapper::map_batch;
use netledger_core::packet::{CapturedPacket, StoredPacketRecord};
use netledger_core::store::{PacketQuery, PacketStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

const INSERT_PACKET: &str = "INSERT INTO packets \
    (source_ip, destination_ip, source_port, destination_port, protocol, captured_at, updated_at, device_id) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

/// Row shape of the `packets` table.
#[derive(Debug, FromRow)]
struct PacketRow {
    id: i64,
    source_ip: String,
    destination_ip: String,
    source_port: i64,
    destination_port: i64,
    protocol: String,
    captured_at: String,
    updated_at: String,
    device_id: String,
}

impl TryFrom<PacketRow> for StoredPacketRecord {
    type Error = StoreError;

    fn try_from(row: PacketRow) -> Result<Self, Self::Error> {
        Ok(StoredPacketRecord {
            id: Some(row.id),
            source_port: port(row.id, row.source_port)?,
            destination_port: port(row.id, row.destination_port)?,
            captured_at: timestamp(row.id, &row.captured_at)?,
            updated_at: timestamp(row.id, &row.updated_at)?,
            source_ip: row.source_ip,
            destination_ip: row.destination_ip,
            protocol: row.protocol,
            device_id: row.device_id,
        })
    }
}

fn port(id: i64, value: i64) -> Result<u16, StoreError> {
    u16::try_from(value).map_err(|_| StoreError::Corrupt(format!("row {id}: port {value} out of range")))
}

fn timestamp(id: i64, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("row {id}: timestamp '{value}': {e}")))
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone)]
pub struct SqlitePacketStore {
    pool: SqlitePool,
}

impl SqlitePacketStore {
    /// Opens (creating if needed) the database file at `path`.
    pub async fn connect(path: impl AsRef<Path>, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(StoreError::backend)?;
        debug!(path = %path.as_ref().display(), "Connected to packet database");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl PacketStore for SqlitePacketStore {
    #[instrument(level = "debug", skip_all, fields(size = packets.len()))]
    async fn save_batch(&self, packets: Vec<CapturedPacket>) -> Result<usize, StoreError> {
        let records = map_batch(&packets)?;
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;
        for record in &records {
            sqlx::query(INSERT_PACKET)
                .bind(&record.source_ip)
                .bind(&record.destination_ip)
                .bind(i64::from(record.source_port))
                .bind(i64::from(record.destination_port))
                .bind(&record.protocol)
                .bind(format_timestamp(&record.captured_at))
                .bind(format_timestamp(&record.updated_at))
                .bind(&record.device_id)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::backend)?;
        }
        tx.commit().await.map_err(StoreError::backend)?;

        Ok(records.len())
    }

    #[instrument(level = "debug", skip(self))]
    async fn query(&self, query: PacketQuery) -> Result<Vec<StoredPacketRecord>, StoreError> {
        // The column comes from the SortKey allow-list, never from the caller.
        let sql = format!(
            "SELECT id, source_ip, destination_ip, source_port, destination_port, protocol, \
             captured_at, updated_at, device_id FROM packets ORDER BY {} DESC, id DESC LIMIT ?",
            query.sort().column()
        );

        let rows: Vec<PacketRow> = sqlx::query_as(&sql)
            .bind(i64::from(query.limit()))
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        rows.into_iter().map(StoredPacketRecord::try_from).collect()
    }
}
