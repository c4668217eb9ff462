use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metric_names;
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every cache metric with the installed recorder.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            metric_names::METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of cache hits, labelled by cache."
        );
        describe_counter!(
            metric_names::METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of cache misses (absent or expired), labelled by cache."
        );
        describe_counter!(
            metric_names::METRIC_CACHE_EVICT,
            Unit::Count,
            "Total number of cache evictions due to capacity, labelled by cache."
        );
        describe_counter!(
            metric_names::METRIC_INVALIDATION_SKIPPED,
            Unit::Count,
            "Total number of progress invalidations skipped by the per-deck cooldown."
        );
        describe_counter!(
            metric_names::METRIC_EVENT_PUBLISHED,
            Unit::Count,
            "Total number of domain events published, labelled by kind."
        );
    });
}
