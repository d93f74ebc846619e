use crate::app::config::{FileRotation, LogSink, LoggingConfig, OtelProto};
use anyhow::{Context, Result, anyhow};
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use std::path::Path;
use tracing::debug;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::{FmtSpan, Writer};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

type DynLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Keeps the background log writers and the span exporter alive.
/// Dropping it loses buffered lines, call [`shutdown`] instead.
pub struct Observability {
    tracer: Option<SdkTracerProvider>,
    guards: Vec<WorkerGuard>,
}

impl Observability {
    pub fn exports_spans(&self) -> bool {
        self.tracer.is_some()
    }
}

struct LogTime;

impl FormatTime for LogTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

fn fmt_layer<W>(writer: W, json: bool, ansi: bool, spans: bool) -> DynLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let span_events = if spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if json {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_span_events(span_events)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_timer(LogTime)
            .with_ansi(ansi)
            .with_writer(writer)
            .with_span_events(span_events)
            .boxed()
    }
}

pub fn init(config: &LoggingConfig) -> Result<Observability> {
    config.validate()?;

    let crate_name = env!("CARGO_PKG_NAME");
    let filter = EnvFilter::from_default_env()
        .add_directive("warn".parse()?)
        .add_directive(format!("{}={}", crate_name, config.level).parse()?);

    let mut layers: Vec<DynLayer> = Vec::new();
    let mut guards = Vec::new();
    let mut tracer = None;

    for sink in &config.sinks {
        match sink {
            LogSink::Stdout { color, json, spans } => {
                let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
                guards.push(guard);
                layers.push(fmt_layer(writer, *json, *color, *spans));
            }
            LogSink::File {
                path,
                json,
                rotation,
                max_files,
                spans,
            } => {
                let (writer, guard) = file_writer(path, rotation, *max_files)?;
                guards.push(guard);
                layers.push(fmt_layer(writer, *json, false, *spans));
            }
            LogSink::Otel { endpoint, proto } => {
                let (layer, provider) = otel_layer(endpoint, proto, config.span_sample_rate)?;
                layers.push(layer);
                tracer = Some(provider);
            }
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    if let Some(provider) = &tracer {
        global::set_text_map_propagator(TraceContextPropagator::new());
        let _ = global::set_tracer_provider(provider.clone());
    }

    Ok(Observability { tracer, guards })
}

/// Flushes exported spans, then the buffered log writers
pub fn shutdown(observability: Observability) -> Result<()> {
    if let Some(provider) = &observability.tracer {
        provider
            .shutdown()
            .context("failed to shutdown tracer provider")?;
    }

    debug!("Flushing {} log writers", observability.guards.len());
    drop(observability.guards);

    Ok(())
}

fn file_writer(
    path: &Path,
    rotation: &FileRotation,
    max_files: usize,
) -> Result<(NonBlocking, WorkerGuard)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid log file name: {}", path.display()))?;

    let directory = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    std::fs::create_dir_all(directory)
        .with_context(|| format!("failed to create log directory {}", directory.display()))?;

    let rotation = match rotation {
        FileRotation::Daily => tracing_appender::rolling::Rotation::DAILY,
        FileRotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
        FileRotation::Never => tracing_appender::rolling::Rotation::NEVER,
    };

    let mut builder = tracing_appender::rolling::Builder::new()
        .rotation(rotation)
        .filename_prefix(file_name);
    if max_files > 0 {
        builder = builder.max_log_files(max_files);
    }

    let appender = builder
        .build(directory)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    Ok(tracing_appender::non_blocking(appender))
}

fn otel_layer(endpoint: &str, proto: &OtelProto, sample_rate: f32) -> Result<(DynLayer, SdkTracerProvider)> {
    use opentelemetry_otlp::WithExportConfig;

    let exporter = match proto {
        OtelProto::Grpc => {
            let mut builder = opentelemetry_otlp::SpanExporter::builder().with_tonic();
            if !endpoint.is_empty() {
                builder = builder.with_endpoint(endpoint);
            }

            builder
                .build()
                .context("failed to build OTLP gRPC exporter")?
        }
        OtelProto::Http => http_exporter(endpoint)?,
    };

    let sampler = Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(sample_rate as f64)));

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string());
    let resource = Resource::builder()
        .with_service_name(service_name)
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build();

    let provider = SdkTracerProvider::builder()
        .with_sampler(sampler)
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build();

    let tracer = provider.tracer(env!("CARGO_PKG_NAME"));
    let layer = tracing_opentelemetry::layer().with_tracer(tracer).boxed();

    Ok((layer, provider))
}

#[cfg(feature = "otel-http")]
fn http_exporter(endpoint: &str) -> Result<opentelemetry_otlp::SpanExporter> {
    use opentelemetry_otlp::WithExportConfig;

    let mut builder = opentelemetry_otlp::SpanExporter::builder().with_http();
    if !endpoint.is_empty() {
        builder = builder.with_endpoint(endpoint);
    }

    builder
        .build()
        .context("failed to build OTLP HTTP exporter")
}

#[cfg(not(feature = "otel-http"))]
fn http_exporter(_: &str) -> Result<opentelemetry_otlp::SpanExporter> {
    Err(anyhow!(
        "OTLP HTTP exporter requested but the build does not enable the `otel-http` feature"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_writer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/circeco.log");

        let (_writer, _guard) = file_writer(&path, &FileRotation::Never, 2).unwrap();
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_file_writer_rejects_bare_root() {
        assert!(file_writer(Path::new("/"), &FileRotation::Daily, 0).is_err());
    }
}
