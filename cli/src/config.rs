//! Service configuration: JSON file, then environment and flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, ValueEnum};
use serde::Deserialize;

use stakeindex_core::{IndexerConfig, IndexerError, Percentage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    #[default]
    Development,
    Production,
}

/// One configuration layer. The file and the command line both produce
/// one; command-line values win.
#[derive(Debug, Clone, Default, Deserialize, Args)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Application mode; production logs JSON
    #[arg(long, env = "APP_ENV", value_enum)]
    pub app_env: Option<AppEnv>,

    /// Mina daemon GraphQL endpoint
    #[arg(long, env = "MINA_ENDPOINT")]
    #[serde(alias = "coda_endpoint")]
    pub mina_endpoint: Option<String>,

    #[arg(long, env = "SERVER_ADDR")]
    pub server_addr: Option<String>,

    #[arg(long, env = "SERVER_PORT")]
    pub server_port: Option<u16>,

    #[arg(long, env = "FIRST_BLOCK_HEIGHT")]
    pub first_block_height: Option<u64>,

    /// e.g. `10s`, `500ms`, `2m`
    #[arg(long, env = "SYNC_INTERVAL")]
    pub sync_interval: Option<String>,

    #[arg(long, env = "CLEANUP_INTERVAL")]
    pub cleanup_interval: Option<String>,

    /// Heights below the tip whose orphans are kept; 0 disables cleanup
    #[arg(long, env = "CLEANUP_THRESHOLD")]
    pub cleanup_threshold: Option<u64>,

    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(
        long,
        env = "DEBUG",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub debug: Option<bool>,

    /// Rows per bulk upsert statement
    #[arg(long, env = "BATCH_SIZE")]
    pub batch_size: Option<usize>,

    #[arg(long, env = "MAX_HEIGHTS_PER_CYCLE")]
    pub max_heights_per_cycle: Option<u64>,

    /// Fee in percent recorded for block producers
    #[arg(long, env = "DEFAULT_VALIDATOR_FEE")]
    pub default_validator_fee: Option<String>,
}

impl Settings {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Fill every unset field from `lower`.
    pub fn or(self, lower: Settings) -> Settings {
        Settings {
            app_env: self.app_env.or(lower.app_env),
            mina_endpoint: self.mina_endpoint.or(lower.mina_endpoint),
            server_addr: self.server_addr.or(lower.server_addr),
            server_port: self.server_port.or(lower.server_port),
            first_block_height: self.first_block_height.or(lower.first_block_height),
            sync_interval: self.sync_interval.or(lower.sync_interval),
            cleanup_interval: self.cleanup_interval.or(lower.cleanup_interval),
            cleanup_threshold: self.cleanup_threshold.or(lower.cleanup_threshold),
            database_url: self.database_url.or(lower.database_url),
            debug: self.debug.or(lower.debug),
            batch_size: self.batch_size.or(lower.batch_size),
            max_heights_per_cycle: self.max_heights_per_cycle.or(lower.max_heights_per_cycle),
            default_validator_fee: self.default_validator_fee.or(lower.default_validator_fee),
        }
    }
}

/// Validated service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_env: AppEnv,
    pub mina_endpoint: String,
    pub server_addr: String,
    pub server_port: u16,
    pub first_block_height: u64,
    pub sync_interval: Duration,
    pub cleanup_interval: Duration,
    pub cleanup_threshold: u64,
    pub database_url: String,
    pub debug: bool,
    pub batch_size: usize,
    pub max_heights_per_cycle: u64,
    pub default_validator_fee: Percentage,
}

impl AppConfig {
    /// Merge the command line over the optional config file and validate.
    pub fn load(args: Settings, file: Option<&PathBuf>) -> anyhow::Result<Self> {
        let file = match file {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };
        Self::from_settings(args.or(file))
    }

    pub fn from_settings(s: Settings) -> anyhow::Result<Self> {
        let defaults = IndexerConfig::default();

        let Some(mina_endpoint) = s.mina_endpoint.filter(|v| !v.trim().is_empty()) else {
            bail!(IndexerError::Config("Mina API endpoint is required".into()));
        };
        let Some(database_url) = s.database_url.filter(|v| !v.trim().is_empty()) else {
            bail!(IndexerError::Config("database URL is required".into()));
        };

        let first_block_height = s.first_block_height.unwrap_or(1);
        if first_block_height == 0 {
            bail!(IndexerError::Config("first block height must be at least 1".into()));
        }
        let batch_size = s.batch_size.unwrap_or(defaults.batch_size);
        if batch_size == 0 {
            bail!(IndexerError::Config("batch size must be positive".into()));
        }
        let max_heights_per_cycle = s.max_heights_per_cycle.unwrap_or(defaults.max_heights_per_cycle);
        if max_heights_per_cycle == 0 {
            bail!(IndexerError::Config("max heights per cycle must be positive".into()));
        }

        let default_validator_fee: Percentage = s
            .default_validator_fee
            .as_deref()
            .unwrap_or("5")
            .parse()
            .context("invalid default validator fee")?;
        if !default_validator_fee.is_valid_fee() {
            bail!(IndexerError::Config("default validator fee must be within 0..=100".into()));
        }

        Ok(Self {
            app_env: s.app_env.unwrap_or_default(),
            mina_endpoint,
            server_addr: s.server_addr.unwrap_or_else(|| "0.0.0.0".into()),
            server_port: s.server_port.unwrap_or(8081),
            first_block_height,
            sync_interval: parse_duration(s.sync_interval.as_deref().unwrap_or("10s"))
                .context("invalid sync interval")?,
            cleanup_interval: parse_duration(s.cleanup_interval.as_deref().unwrap_or("10min"))
                .context("invalid cleanup interval")?,
            cleanup_threshold: s.cleanup_threshold.unwrap_or(0),
            database_url,
            debug: s.debug.unwrap_or(false),
            batch_size,
            max_heights_per_cycle,
            default_validator_fee,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env == AppEnv::Production
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_addr, self.server_port)
    }

    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            first_height: self.first_block_height,
            batch_size: self.batch_size,
            max_heights_per_cycle: self.max_heights_per_cycle,
            default_validator_fee: self.default_validator_fee,
            sync_interval: self.sync_interval,
            cleanup_interval: self.cleanup_interval,
            cleanup_threshold: self.cleanup_threshold,
            ..IndexerConfig::default()
        }
    }
}

/// Parse `500ms`, `10s`, `2m`, `10min` or `1h`. A bare number is seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, IndexerError> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| IndexerError::Config(format!("invalid duration: {raw:?}")))?;
    let duration = match unit.trim() {
        "ms" => Duration::from_millis(value),
        "" | "s" | "sec" => Duration::from_secs(value),
        "m" | "min" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 3600),
        other => {
            return Err(IndexerError::Config(format!(
                "invalid duration unit {other:?} in {raw:?}"
            )))
        }
    };
    if duration.is_zero() {
        return Err(IndexerError::Config(format!("duration must be positive: {raw:?}")));
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required() -> Settings {
        Settings {
            mina_endpoint: Some("http://localhost:3085/graphql".into()),
            database_url: Some("postgres://localhost/stakeindex".into()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_apply() {
        let cfg = AppConfig::from_settings(required()).unwrap();
        assert_eq!(cfg.app_env, AppEnv::Development);
        assert_eq!(cfg.listen_addr(), "0.0.0.0:8081");
        assert_eq!(cfg.first_block_height, 1);
        assert_eq!(cfg.sync_interval, Duration::from_secs(10));
        assert_eq!(cfg.cleanup_interval, Duration::from_secs(600));
        assert_eq!(cfg.cleanup_threshold, 0);
        assert_eq!(cfg.default_validator_fee, "5".parse().unwrap());
        assert!(!cfg.debug);
    }

    #[test]
    fn missing_endpoint_or_database_is_fatal() {
        let err = AppConfig::from_settings(Settings {
            mina_endpoint: None,
            ..required()
        })
        .unwrap_err();
        assert!(err.to_string().contains("endpoint is required"));

        let err = AppConfig::from_settings(Settings {
            database_url: Some("  ".into()),
            ..required()
        })
        .unwrap_err();
        assert!(err.to_string().contains("database URL is required"));
    }

    #[test]
    fn command_line_overrides_file() {
        let file: Settings = serde_json::from_str(
            r#"{
                "app_env": "production",
                "coda_endpoint": "http://file:3085/graphql",
                "database_url": "postgres://file/db",
                "server_port": 9000,
                "sync_interval": "30s"
            }"#,
        )
        .unwrap();
        let args = Settings {
            server_port: Some(9100),
            ..Default::default()
        };
        let cfg = AppConfig::from_settings(args.or(file)).unwrap();
        assert!(cfg.is_production());
        assert_eq!(cfg.mina_endpoint, "http://file:3085/graphql");
        assert_eq!(cfg.server_port, 9100);
        assert_eq!(cfg.sync_interval, Duration::from_secs(30));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(serde_json::from_str::<Settings>(r#"{"mina_endpoint_typo": "x"}"#).is_err());
    }

    #[test]
    fn out_of_range_fee_is_rejected() {
        let err = AppConfig::from_settings(Settings {
            default_validator_fee: Some("150".into()),
            ..required()
        });
        assert!(err.is_err());
    }

    #[test]
    fn indexer_config_carries_settings() {
        let cfg = AppConfig::from_settings(Settings {
            first_block_height: Some(1000),
            cleanup_threshold: Some(50),
            ..required()
        })
        .unwrap()
        .indexer_config();
        assert_eq!(cfg.first_height, 1000);
        assert_eq!(cfg.cleanup_threshold, 50);
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("10min").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("15").unwrap(), Duration::from_secs(15));
        assert!(parse_duration("10 fortnights").is_err());
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("s").is_err());
    }
}
