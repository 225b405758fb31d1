//! OpenTelemetry integration for auth-gateway
//!
//! This module sets up the tracing subscriber and, when enabled, exports
//! spans and metrics to an OTLP endpoint.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::OtelConfig;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, MeterProvider as _},
    trace::TracerProvider as TracerProviderTrait,
    KeyValue,
};
use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::TracerProvider, Resource};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// OpenTelemetry error types
#[derive(Debug, Error)]
pub enum OtelError {
    /// Failed to initialize tracer
    #[error("Failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to initialize meter
    #[error("Failed to initialize meter: {0}")]
    MeterInit(String),

    /// Failed to shutdown
    #[error("Failed to shutdown: {0}")]
    Shutdown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// OpenTelemetry provider for auth-gateway
///
/// Owns the tracer and meter providers. Built once at startup. Pending
/// exports are flushed by [`OtelProvider::shutdown`] or, failing that, on drop.
/// Only the first shutdown does any work.
pub struct OtelProvider {
    tracer_provider: Option<TracerProvider>,
    meter_provider: SdkMeterProvider,
    config: OtelConfig,
    shut_down: AtomicBool,
}

impl OtelProvider {
    /// Create a new OtelProvider with the given configuration
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let resource = Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]);

        let (tracer_provider, meter_provider) = if config.enabled {
            let endpoint = config.endpoint.as_ref().ok_or_else(|| {
                OtelError::Config("OTLP endpoint is required when enabled".into())
            })?;

            let tracer_provider = Self::init_tracer_provider(endpoint, &resource)?;
            let meter_provider = Self::init_meter_provider(endpoint, &resource)?;

            (Some(tracer_provider), meter_provider)
        } else {
            // No reader attached: instruments work but nothing is exported.
            let meter_provider = SdkMeterProvider::builder().with_resource(resource).build();
            (None, meter_provider)
        };

        if let Some(ref tp) = tracer_provider {
            global::set_tracer_provider(tp.clone());
        }

        Ok(Self {
            tracer_provider,
            meter_provider,
            config: config.clone(),
            shut_down: AtomicBool::new(false),
        })
    }

    fn init_tracer_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<TracerProvider, OtelError> {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::runtime;
        use opentelemetry_sdk::trace::{Config, Sampler};

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .build_span_exporter()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;

        let trace_config = Config::default()
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(resource.clone());

        Ok(TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(trace_config)
            .build())
    }

    fn init_meter_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<SdkMeterProvider, OtelError> {
        use opentelemetry_otlp::{MetricsExporterBuilder, WithExportConfig};
        use opentelemetry_sdk::metrics::reader::{
            DefaultAggregationSelector, DefaultTemporalitySelector,
        };
        use opentelemetry_sdk::{metrics::PeriodicReader, runtime};

        let exporter = MetricsExporterBuilder::from(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .build_metrics_exporter(
            Box::new(DefaultTemporalitySelector::new()),
            Box::new(DefaultAggregationSelector::new()),
        )
        .map_err(|e| OtelError::MeterInit(e.to_string()))?;

        let reader = PeriodicReader::builder(exporter, runtime::Tokio).build();

        Ok(SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build())
    }

    /// Get a tracer from the provider
    pub fn tracer(&self, name: &'static str) -> opentelemetry_sdk::trace::Tracer {
        match self.tracer_provider {
            Some(ref tp) => tp.tracer(name),
            None => TracerProvider::builder().build().tracer(name),
        }
    }

    /// Get the meter for creating metrics
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(self.config.service_name.clone())
    }

    /// Check if OpenTelemetry export is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Flush and shut down the providers
    pub fn shutdown(&self) -> Result<(), OtelError> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let flushed = match self.tracer_provider {
            Some(ref tp) => tp
                .force_flush()
                .into_iter()
                .find_map(Result::err)
                .map(|e| OtelError::Shutdown(format!("Tracer flush failed: {:?}", e))),
            None => None,
        };

        self.meter_provider
            .shutdown()
            .map_err(|e| OtelError::Shutdown(format!("Meter shutdown failed: {:?}", e)))?;

        flushed.map_or(Ok(()), Err)
    }

    /// Whether the providers have been shut down
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Drop for OtelProvider {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "OpenTelemetry shutdown on drop failed");
        }
    }
}

/// Authentication metrics
pub struct Metrics {
    /// Authentication outcomes by scheme, outcome and reason
    pub outcomes_total: Counter<u64>,

    /// Signed tokens issued
    pub tokens_issued_total: Counter<u64>,

    /// Time spent in `authenticate`, in seconds
    pub verify_duration: Histogram<f64>,
}

impl Metrics {
    /// Create metrics on the given meter
    pub fn new(meter: &Meter) -> Self {
        let outcomes_total = meter
            .u64_counter("auth_gateway_outcomes_total")
            .with_description("Authentication outcomes")
            .init();

        let tokens_issued_total = meter
            .u64_counter("auth_gateway_tokens_issued_total")
            .with_description("Signed tokens issued")
            .init();

        let verify_duration = meter
            .f64_histogram("auth_gateway_verify_duration_seconds")
            .with_description("Authentication duration in seconds")
            .init();

        Self {
            outcomes_total,
            tokens_issued_total,
            verify_duration,
        }
    }

    /// Record one authentication outcome
    ///
    /// `reason` is empty for successful outcomes.
    pub fn record_outcome(&self, scheme: &str, outcome: &str, reason: &str) {
        self.outcomes_total.add(
            1,
            &[
                KeyValue::new("scheme", scheme.to_string()),
                KeyValue::new("outcome", outcome.to_string()),
                KeyValue::new("reason", reason.to_string()),
            ],
        );
    }

    /// Record a token issuance
    pub fn record_token_issued(&self) {
        self.tokens_issued_total.add(1, &[]);
    }

    /// Record how long an authentication took
    pub fn record_verify_duration(&self, scheme: &str, duration_secs: f64) {
        self.verify_duration.record(
            duration_secs,
            &[KeyValue::new("scheme", scheme.to_string())],
        );
    }
}

/// Initialize tracing subscriber with OpenTelemetry integration
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_tracing(otel: &OtelProvider, log_level: &str) -> Result<(), OtelError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(log_level)));

    let otel_layer = otel
        .is_enabled()
        .then(|| tracing_opentelemetry::layer().with_tracer(otel.tracer("auth-gateway")));

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| OtelError::TracerInit(e.to_string()))
}

/// Normalize a configured level name; unknown names fall back to `info`
fn level_directive(log_level: &str) -> &'static str {
    match log_level.trim().to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" => "error",
        "off" => "off",
        _ => "info",
    }
}
