//! # netledger configuration
//!
//! Layered configuration for the capture pipeline, storage and read API.
//!
//! ## Features
//! - **Unified Configuration**: one struct shared by every component
//! - **Validation**: runtime validation of every loaded value
//! - **Environment Awareness**: per-environment YAML overlays and
//!   `NETLEDGER_*` environment overrides

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod api;
mod capture;
mod error;
mod pipeline;
mod storage;
mod telemetry;
mod validation;

pub use api::ApiConfig;
pub use capture::CaptureConfig;
pub use error::ConfigError;
pub use pipeline::{BatchConfig, OverflowMode, QueueConfig};
pub use storage::StorageConfig;
pub use telemetry::TelemetryConfig;

const BASE_CONFIG_PATH: &str = "config/netledger.yaml";
const ENV_PREFIX: &str = "NETLEDGER_";
const DEFAULT_ENV: &str = "production";

/// Top-level configuration container for all netledger components.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct NetledgerConfig {
    /// Live capture parameters.
    #[validate(nested)]
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Capture queue depth and overflow handling.
    #[validate(nested)]
    #[serde(default)]
    pub queue: QueueConfig,

    /// Batch flushing behaviour.
    #[validate(nested)]
    #[serde(default)]
    pub batch: BatchConfig,

    /// Packet database location and schema.
    #[validate(nested)]
    #[serde(default)]
    pub storage: StorageConfig,

    /// Read API listener.
    #[validate(nested)]
    #[serde(default)]
    pub api: ApiConfig,

    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl NetledgerConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/netledger.yaml`, if present
    /// 3. `config/<NETLEDGER_ENV>.yaml`; optional for the default `production`,
    ///    required when `NETLEDGER_ENV` names another environment
    /// 4. `NETLEDGER_*` environment variables, `__` separating nested keys
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(NetledgerConfig::default()));

        if Path::new(BASE_CONFIG_PATH).exists() {
            figment = figment.merge(Yaml::file(BASE_CONFIG_PATH));
        }

        let env = std::env::var("NETLEDGER_ENV").unwrap_or_else(|_| DEFAULT_ENV.into());
        let env_file = Path::new("config").join(format!("{env}.yaml"));
        if env_file.exists() {
            figment = figment.merge(Yaml::file(&env_file));
        } else if env != DEFAULT_ENV {
            return Err(ConfigError::UnknownEnvironment {
                env,
                path: env_file,
            });
        }

        Self::extract(figment)
    }

    /// Load configuration from a specific file, still honouring environment
    /// overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let figment =
            Figment::from(Serialized::defaults(NetledgerConfig::default())).merge(Yaml::file(path));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
