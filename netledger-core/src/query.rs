//! Read path: parameter normalization in front of the packet store.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::packet::StoredPacketRecord;
use crate::store::{PacketQuery, PacketStore};

/// Normalizes caller parameters and forwards them to the store.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn PacketStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn PacketStore>) -> Self {
        Self { store }
    }

    /// Returns up to `limit` records ordered newest-first by `sort`.
    ///
    /// `limit <= 0` means the default page size; an empty or unknown `sort`
    /// orders by capture time.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_packets(
        &self,
        limit: i64,
        sort: &str,
    ) -> Result<Vec<StoredPacketRecord>, StoreError> {
        let query = PacketQuery::new(limit, sort);
        debug!(limit = query.limit(), sort = %query.sort(), "Querying packets");
        self.store.query(query).await
    }
}
