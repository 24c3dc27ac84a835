use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::account::BANK_EQUITY_ACCOUNT_NUMBER;
use crate::dispatch::DispatchWorkerConfig;
use crate::transfer::{EngineConfig, RecoveryConfig};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL; `DATABASE_URL` overrides it
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub recovery: RecoverySection,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "fjord_ledger.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
            postgres_url: None,
            database: DatabaseConfig::default(),
            engine: EngineSection::default(),
            dispatch: DispatchConfig::default(),
            recovery: RecoverySection::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            acquire_timeout_ms: 5000,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineSection {
    pub unit_timeout_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            unit_timeout_ms: 5000,
        }
    }
}

impl EngineSection {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            unit_timeout: Duration::from_millis(self.unit_timeout_ms),
        }
    }
}

/// Dispatch Layer. When disabled, intake executes transfers inline.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DispatchConfig {
    pub enabled: bool,
    pub receive_timeout_ms: u64,
    pub visibility_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub error_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            receive_timeout_ms: 5000,
            visibility_timeout_ms: 30_000,
            poll_interval_ms: 200,
            error_backoff_ms: 1000,
        }
    }
}

impl DispatchConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn to_worker_config(&self) -> DispatchWorkerConfig {
        DispatchWorkerConfig {
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
            error_backoff: Duration::from_millis(self.error_backoff_ms),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecoverySection {
    pub enabled: bool,
    pub scan_interval_secs: u64,
    pub stale_threshold_secs: u64,
    pub batch_size: i64,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            enabled: false,
            scan_interval_secs: 30,
            stale_threshold_secs: 60,
            batch_size: 100,
        }
    }
}

impl RecoverySection {
    pub fn to_recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            scan_interval: Duration::from_secs(self.scan_interval_secs),
            stale_threshold: Duration::from_secs(self.stale_threshold_secs),
            batch_size: self.batch_size,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BootstrapConfig {
    pub equity_account_number: String,
    pub equity_currency: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            equity_account_number: BANK_EQUITY_ACCOUNT_NUMBER.to_string(),
            equity_currency: "NOK".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let mut config: AppConfig = serde_yaml::from_str(content)?;
        if let Ok(url) = std::env::var("DATABASE_URL")
            && !url.is_empty()
        {
            config.postgres_url = Some(url);
        }
        Ok(config)
    }
}
