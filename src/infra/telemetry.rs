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
            "conteggio_events_extracted_total",
            Unit::Count,
            "Total number of event rows consumed from the source."
        );
        describe_counter!(
            "conteggio_artifacts_built_total",
            Unit::Count,
            "Total number of artifacts partitioned from rollup output."
        );
        describe_counter!(
            "conteggio_artifacts_uploaded_total",
            Unit::Count,
            "Total number of artifacts uploaded to the object store."
        );
        describe_counter!(
            "conteggio_upload_bytes_total",
            Unit::Bytes,
            "Total bytes uploaded to the object store."
        );
        describe_histogram!(
            "conteggio_publish_ms",
            Unit::Milliseconds,
            "Publish phase latency in milliseconds."
        );
    });
}
