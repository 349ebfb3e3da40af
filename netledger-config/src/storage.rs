//! Packet database configuration.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct StorageConfig {
    /// SQLite database file, created if missing.
    #[validate(length(min = 1))]
    #[serde(default = "default_database")]
    pub database: String,

    /// Schema definition executed at startup.
    #[validate(length(min = 1))]
    #[serde(default = "default_schema_path")]
    pub schema_path: String,

    #[validate(range(min = 1, max = 64))]
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database() -> String {
    "netledger.db".into()
}

fn default_schema_path() -> String {
    "schema/packets.sql".into()
}

fn default_max_connections() -> u32 {
    4
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            schema_path: default_schema_path(),
            max_connections: default_max_connections(),
        }
    }
}
