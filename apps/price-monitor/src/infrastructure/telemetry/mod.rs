//! Logging and Span Export
//!
//! Installs the global `tracing` subscriber: a text or JSON log layer, plus
//! an OTLP span exporter when enabled.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: [`DEFAULT_LOG_FILTER`])
//! - `LOG_FORMAT`: `json` for one JSON object per line (default: text)
//! - `OTEL_ENABLED`: `true` or `1` to export spans (default: off)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: collector address (default: http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: reported service name (default: price-monitor)

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset or unparsable. Browser, WebSocket
/// and HTTP internals stay at warn.
pub const DEFAULT_LOG_FILTER: &str = "price_monitor=info,chromiumoxide=warn,tungstenite=warn,hyper=warn";

const DEFAULT_SERVICE_NAME: &str = "price-monitor";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value; anything but `json` means text.
    #[must_use]
    pub fn from_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Where spans go besides the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanExport {
    /// OTLP gRPC endpoint.
    pub endpoint: String,
    /// Reported service name.
    pub service_name: String,
}

/// Subscriber settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Log line layout.
    pub format: LogFormat,
    /// Span export target; `None` keeps spans local.
    pub export: Option<SpanExport>,
}

impl TelemetryConfig {
    /// Read the settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let format = lookup("LOG_FORMAT")
            .map(|v| LogFormat::from_value(&v))
            .unwrap_or_default();

        let enabled = lookup("OTEL_ENABLED")
            .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"));
        let export = enabled.then(|| SpanExport {
            endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_string()),
            service_name: lookup("OTEL_SERVICE_NAME")
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
        });

        Self { format, export }
    }
}

/// Flushes and shuts down span export when dropped.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to flush span exporter: {e}");
        }
    }
}

/// Install the subscriber configured from the environment.
///
/// Keep the guard alive until shutdown.
#[must_use]
pub fn init() -> TelemetryGuard {
    init_with_config(&TelemetryConfig::from_env())
}

/// Install the subscriber with explicit settings.
///
/// An exporter that cannot be built is reported on stderr and skipped; logging
/// still comes up.
#[must_use]
pub fn init_with_config(config: &TelemetryConfig) -> TelemetryGuard {
    let provider = config.export.as_ref().and_then(|export| {
        tracer_provider(export)
            .inspect_err(|e| eprintln!("Span export to {} disabled: {e}", export.endpoint))
            .ok()
    });
    let otel_layer = provider.as_ref().zip(config.export.as_ref()).map(|(p, export)| {
        tracing_opentelemetry::layer().with_tracer(p.tracer(export.service_name.clone()))
    });

    let json = config.format == LogFormat::Json;
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_target(true));
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false)
    });

    tracing_subscriber::registry()
        .with(log_filter())
        .with(text_layer)
        .with(json_layer)
        .with(otel_layer)
        .init();

    TelemetryGuard { provider }
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn tracer_provider(
    export: &SpanExport,
) -> Result<SdkTracerProvider, opentelemetry_otlp::ExporterBuildError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&export.endpoint)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            Resource::builder()
                .with_service_name(export.service_name.clone())
                .build(),
        )
        .build())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tracing_subscriber::filter::Directive;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> TelemetryConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        TelemetryConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_log_text_without_export() {
        let config = config_from(&[]);
        assert_eq!(config, TelemetryConfig::default());
        assert_eq!(config.format, LogFormat::Text);
        assert!(config.export.is_none());
    }

    #[test]
    fn export_uses_default_endpoint_and_name() {
        let config = config_from(&[("OTEL_ENABLED", "1"), ("LOG_FORMAT", "JSON")]);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(
            config.export,
            Some(SpanExport {
                endpoint: "http://localhost:4317".to_string(),
                service_name: "price-monitor".to_string(),
            })
        );
    }

    #[test]
    fn export_disabled_ignores_endpoint() {
        let config = config_from(&[
            ("OTEL_ENABLED", "no"),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4317"),
        ]);
        assert!(config.export.is_none());
    }

    #[test]
    fn unknown_format_falls_back_to_text() {
        assert_eq!(LogFormat::from_value("pretty"), LogFormat::Text);
        assert_eq!(LogFormat::from_value(" json "), LogFormat::Json);
    }

    #[test]
    fn default_filter_directives_parse() {
        for directive in DEFAULT_LOG_FILTER.split(',') {
            assert!(directive.parse::<Directive>().is_ok(), "{directive}");
        }
    }
}
