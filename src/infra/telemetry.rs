//! Tracing subscriber and metric descriptions.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_CACHE_FETCH_MS, METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_INVALIDATION_TOTAL,
    METRIC_CACHE_MISS_TOTAL, METRIC_CACHE_REGENERATION_FAILURE_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Connection-level chatter from the HTTP stack, capped unless `RUST_LOG` says otherwise.
const QUIET_DEPENDENCIES: [&str; 3] = ["hyper=warn", "hyper_util=warn", "reqwest=warn"];

/// Install the global subscriber: env filter, span-trace capture and a
/// compact or JSON formatter.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter(logging)?)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn env_filter(logging: &LoggingSettings) -> Result<EnvFilter, InfraError> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
        for directive in QUIET_DEPENDENCIES {
            let directive = directive.parse().map_err(|err| {
                InfraError::telemetry(format!("invalid log directive `{directive}`: {err}"))
            })?;
            filter = filter.add_directive(directive);
        }
    }
    Ok(filter)
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT_TOTAL,
            Unit::Count,
            "Listing cache hits, labelled by resource type."
        );
        describe_counter!(
            METRIC_CACHE_MISS_TOTAL,
            Unit::Count,
            "Listing cache misses, labelled by resource type and reason."
        );
        describe_counter!(
            METRIC_CACHE_INVALIDATION_TOTAL,
            Unit::Count,
            "Accepted invalidations, labelled by resource type."
        );
        describe_counter!(
            METRIC_CACHE_REGENERATION_FAILURE_TOTAL,
            Unit::Count,
            "Failed page regeneration requests, labelled by hook."
        );
        describe_histogram!(
            METRIC_CACHE_FETCH_MS,
            Unit::Milliseconds,
            "Store fetch latency on a listing cache miss."
        );
    });
}
