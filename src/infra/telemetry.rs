use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

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
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "lettura_cache_hit_total",
            Unit::Count,
            "Total number of fresh cache hits."
        );
        describe_counter!(
            "lettura_cache_stale_hit_total",
            Unit::Count,
            "Total number of stale cache hits served while revalidating."
        );
        describe_counter!(
            "lettura_cache_miss_total",
            Unit::Count,
            "Total number of cache misses and forced recomputes."
        );
        describe_histogram!(
            "lettura_cache_lookup_ms",
            Unit::Milliseconds,
            "Cachified lookup latency in milliseconds."
        );
        describe_counter!(
            "lettura_reads_recorded_total",
            Unit::Count,
            "Total number of post reads persisted."
        );
        describe_counter!(
            "lettura_notify_sent_total",
            Unit::Count,
            "Total number of leaderboard notifications delivered."
        );
        describe_counter!(
            "lettura_notify_failed_total",
            Unit::Count,
            "Total number of leaderboard notifications that failed to send."
        );
    });
}
