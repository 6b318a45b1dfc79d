//! Logging and OpenTelemetry initialisation for the bridge binary.
//!
//! Call [`init_tracing`] once at process startup, before the Tokio runtime
//! is built.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `MOTORLINK_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL. When set, spans are exported over OTLP/HTTP. |

use std::path::{Path, PathBuf};

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global `tracing` subscriber.
///
/// Console output is always on.  When `log_dir` is given, a session file
/// `bridge_<YYYYMMDD_HHMMSS>.log` is also written there; failure to create
/// it is reported on stderr and logging continues without it.
///
/// The returned guard must be held for the lifetime of the process.
/// Dropping it flushes the file writer and pending spans.
pub fn init_tracing(service_name: &str, log_dir: Option<&Path>) -> TelemetryGuard {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let use_json = std::env::var("MOTORLINK_LOG_FORMAT").as_deref() == Ok("json");

    let provider = build_provider(
        service_name,
        std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
    );
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("motorlink")));

    let (file_writer, file_guard, log_file) = match log_dir.map(open_session_log) {
        Some(Ok((writer, guard, path))) => (Some(writer), Some(guard), Some(path)),
        Some(Err(e)) => {
            eprintln!("[motorlink] session log disabled: {e}");
            (None, None, None)
        }
        None => (None, None, None),
    };
    let file_layer = file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(file_layer);
    if use_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }

    TelemetryGuard {
        provider,
        log_file,
        _file_guard: file_guard,
    }
}

/// Keeps the OTel provider and the file writer alive.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
    log_file: Option<PathBuf>,
    _file_guard: Option<WorkerGuard>,
}

impl TelemetryGuard {
    /// Session log path, when one is being written.
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[motorlink] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

pub(crate) fn session_log_name(started: chrono::DateTime<chrono::Local>) -> String {
    format!("bridge_{}", started.format("%Y%m%d_%H%M%S"))
}

fn open_session_log(dir: &Path) -> Result<(NonBlocking, WorkerGuard, PathBuf), String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("cannot create {}: {e}", dir.display()))?;
    let prefix = session_log_name(chrono::Local::now());
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(&prefix)
        .filename_suffix("log")
        .build(dir)
        .map_err(|e| format!("cannot open log file in {}: {e}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((writer, guard, dir.join(format!("{prefix}.log"))))
}

/// Build an OTLP provider when an endpoint is configured.
///
/// Uses the simple exporter: the runtime does not exist yet when this runs.
fn build_provider(service_name: &str, endpoint: Option<String>) -> Option<SdkTracerProvider> {
    let endpoint = endpoint?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[motorlink] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}
