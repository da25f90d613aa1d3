use crate::app_env;
use anyhow::Context;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use opentelemetry::trace::TracerProvider;
use opentelemetry::{KeyValue, global};
use opentelemetry_http::HeaderExtractor;
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::Tracer;
use opentelemetry_sdk::{Resource, runtime};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing::{Span, debug, field, info_span};
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer, OpenTelemetrySpanExt};
use tracing_subscriber::{EnvFilter, prelude::*, registry};

const SERVICE_NAME: &str = "todo-rest";

/// Span and metric pipelines feeding an OTLP collector
pub struct OtelExporters {
    pub tracer: Tracer,
    pub meter: SdkMeterProvider,
}

/// Opens a span per request, parented to the caller's `traceparent` header when one was sent
pub fn attach_tracing_http<T>(router: Router<T>) -> Router<T>
where
    T: Clone + Send + Sync + 'static,
{
    let http_tracing = TraceLayer::new_for_http()
        .make_span_with(request_span)
        .on_response(record_response);

    router.layer(ServiceBuilder::new().layer(http_tracing))
}

fn request_span(request: &Request<Body>) -> Span {
    let span = info_span!(
        "request",
        method = request.method().as_str(),
        path = request.uri().path(),
        response_status = field::Empty,
    );
    let caller_context = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(request.headers()))
    });
    span.set_parent(caller_context);

    span
}

fn record_response(response: &Response<Body>, latency: Duration, span: &Span) {
    span.record("response_status", field::display(response.status()));
    debug!(latency_ms = latency.as_millis() as u64, "request finished");
}

fn service_resource() -> Resource {
    Resource::new([KeyValue::new("service.name", SERVICE_NAME)])
}

/// Builds batching OTLP/gRPC exporters. They flush on the tokio runtime, so call this from
/// inside it.
pub fn init_exporters(endpoints: &app_env::OtelEndpoints) -> Result<OtelExporters, anyhow::Error> {
    let spans = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoints.spans)
        .build()
        .with_context(|| format!("building a span exporter for {}", endpoints.spans))?;
    let metrics = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoints.metrics)
        .build()
        .with_context(|| format!("building a metric exporter for {}", endpoints.metrics))?;

    let tracer = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(spans, runtime::Tokio)
        .with_resource(service_resource())
        .build()
        .tracer(SERVICE_NAME);
    let meter = SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(metrics, runtime::Tokio).build())
        .with_resource(service_resource())
        .build();

    Ok(OtelExporters { tracer, meter })
}

/// Reads per-module directives from [app_env::LOG_LEVEL], falling back to "info"
pub fn init_env_filter() -> Result<EnvFilter, anyhow::Error> {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(app_env::LOG_LEVEL)
        .from_env()
        .with_context(|| format!("parsing {} directives", app_env::LOG_LEVEL))
}

/// Installs the global subscriber. `env_filter` only narrows the JSON lines on stdout, the
/// OpenTelemetry layers (when present) see everything from debug up.
pub fn setup_logging_and_tracing(env_filter: EnvFilter, otel_exporters: Option<OtelExporters>) {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let (span_layer, metrics_layer) = match otel_exporters {
        Some(exporters) => (
            Some(OpenTelemetryLayer::new(exporters.tracer)),
            Some(MetricsLayer::new(exporters.meter)),
        ),
        None => (None, None),
    };
    let stdout_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_filter(env_filter);

    registry()
        .with(LevelFilter::DEBUG)
        .with(span_layer)
        .with(metrics_layer)
        .with(stdout_layer)
        .init();
}
