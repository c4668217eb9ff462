//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::str::FromStr;

use clap::Parser;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::CacheConfig;

mod cli;

pub use cli::{CliArgs, Command, SettingsOverrides, ShowConfigArgs, SimulateArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "deckcache";
const ENV_PREFIX: &str = "DECKCACHE";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingSettings {
    #[serde(serialize_with = "serialize_level")]
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::ShowConfig(args)) => raw.apply_overrides(&args.overrides),
        Some(Command::Simulate(args)) => raw.apply_overrides(&args.overrides),
        None => raw.apply_overrides(&SettingsOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    known_cards: RawKnownCardsSettings,
    pagination_count: RawPaginationCountSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawKnownCardsSettings {
    ttl_ms: Option<u64>,
    max_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPaginationCountSettings {
    ttl_ms: Option<u64>,
    max_size: Option<usize>,
    debounce_cooldown_ms: Option<u64>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &SettingsOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(ttl) = overrides.known_cards_ttl_ms {
            self.known_cards.ttl_ms = Some(ttl);
        }
        if let Some(max) = overrides.known_cards_max_size {
            self.known_cards.max_size = Some(max);
        }
        if let Some(ttl) = overrides.pagination_count_ttl_ms {
            self.pagination_count.ttl_ms = Some(ttl);
        }
        if let Some(max) = overrides.pagination_count_max_size {
            self.pagination_count.max_size = Some(max);
        }
        if let Some(cooldown) = overrides.pagination_count_debounce_cooldown_ms {
            self.pagination_count.debounce_cooldown_ms = Some(cooldown);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            known_cards,
            pagination_count,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_config(known_cards, pagination_count)?;

        Ok(Self { logging, cache })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_config(
    known_cards: RawKnownCardsSettings,
    pagination_count: RawPaginationCountSettings,
) -> Result<CacheConfig, LoadError> {
    let defaults = CacheConfig::default();

    let known_cards_max_size = non_zero_size(
        known_cards.max_size.unwrap_or(defaults.known_cards_max_size),
        "known_cards.max_size",
    )?;
    let pagination_count_max_size = non_zero_size(
        pagination_count
            .max_size
            .unwrap_or(defaults.pagination_count_max_size),
        "pagination_count.max_size",
    )?;

    Ok(CacheConfig {
        known_cards_ttl_ms: known_cards.ttl_ms.unwrap_or(defaults.known_cards_ttl_ms),
        known_cards_max_size,
        pagination_count_ttl_ms: pagination_count
            .ttl_ms
            .unwrap_or(defaults.pagination_count_ttl_ms),
        pagination_count_max_size,
        pagination_count_debounce_cooldown_ms: pagination_count
            .debounce_cooldown_ms
            .unwrap_or(defaults.pagination_count_debounce_cooldown_ms),
    })
}

fn non_zero_size(value: usize, key: &'static str) -> Result<usize, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(value)
}

fn serialize_level<S>(level: &LevelFilter, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&level.to_string().to_ascii_lowercase())
}
