use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the deckcache binary.
#[derive(Debug, Parser)]
#[command(
    name = "deckcache",
    version,
    about = "Session cache diagnostics for the flashcard study service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "DECKCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the resolved configuration as JSON.
    #[command(name = "config")]
    ShowConfig(ShowConfigArgs),
    /// Replay a deterministic practice session and report cache effectiveness.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ShowConfigArgs {
    #[command(flatten)]
    pub overrides: SettingsOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub overrides: SettingsOverrides,

    /// Number of decks in the simulated library.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub decks: u32,

    /// Cards per deck.
    #[arg(long, default_value_t = 40, value_parser = clap::value_parser!(u32).range(1..))]
    pub cards: u32,

    /// Number of card flips to replay.
    #[arg(long, default_value_t = 200)]
    pub flips: u32,

    /// Simulated time between two flips, in milliseconds.
    #[arg(long = "think-ms", default_value_t = 500, value_name = "MILLIS")]
    pub think_ms: u64,
}

impl Default for SimulateArgs {
    fn default() -> Self {
        Self {
            overrides: SettingsOverrides::default(),
            decks: 3,
            cards: 40,
            flips: 200,
            think_ms: 500,
        }
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct SettingsOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the known-cards TTL in milliseconds.
    #[arg(long = "known-cards-ttl-ms", value_name = "MILLIS")]
    pub known_cards_ttl_ms: Option<u64>,

    /// Override the maximum number of decks in the known-cards cache.
    #[arg(long = "known-cards-max-size", value_name = "COUNT")]
    pub known_cards_max_size: Option<usize>,

    /// Override the pagination-count TTL in milliseconds.
    #[arg(long = "pagination-count-ttl-ms", value_name = "MILLIS")]
    pub pagination_count_ttl_ms: Option<u64>,

    /// Override the maximum number of keys in the pagination-count cache.
    #[arg(long = "pagination-count-max-size", value_name = "COUNT")]
    pub pagination_count_max_size: Option<usize>,

    /// Override the per-deck invalidation cooldown in milliseconds.
    #[arg(long = "pagination-count-debounce-cooldown-ms", value_name = "MILLIS")]
    pub pagination_count_debounce_cooldown_ms: Option<u64>,
}
