use anyhow::{Context, Error, Result};
use once_cell::sync::OnceCell;
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracer, SdkTracerProvider},
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Tracing サブスクライバを一度だけ初期化する。
///
/// 構成に OTLP エンドポイントがある場合はそこへスパンを送信し、
/// ない場合は JSON の fmt レイヤーのみを使う。エクスポーターの構築に
/// 失敗してもログ出力だけで起動は継続する。
///
/// # Errors
/// サブスクライバの初期化に失敗した場合はエラーを返す。
pub fn init(config: &Config) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false).json();

        if let Some(endpoint) = config.otel_exporter_endpoint() {
            match init_tracer(endpoint, config.otel_sampling_ratio()) {
                Ok(tracer) => {
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt_layer)
                        .with(otel_layer)
                        .try_init()
                        .map_err(|e: tracing_subscriber::util::TryInitError| {
                            Error::msg(e.to_string())
                        })?;
                    info!(
                        otel_enabled = true,
                        endpoint = %endpoint,
                        "tracing initialized with OpenTelemetry"
                    );
                }
                Err(e) => {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt_layer)
                        .try_init()
                        .map_err(|e: tracing_subscriber::util::TryInitError| {
                            Error::msg(e.to_string())
                        })?;
                    info!(
                        otel_enabled = false,
                        error = %e,
                        "tracing initialized without OpenTelemetry (exporter init failed)"
                    );
                }
            }
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .map_err(|e: tracing_subscriber::util::TryInitError| Error::msg(e.to_string()))?;
            info!(otel_enabled = false, "standard tracing initialized");
        }

        Ok::<(), Error>(())
    })?;
    Ok(())
}

/// OTLP エクスポーター経由で OpenTelemetry トレーサーを初期化する。
fn init_tracer(endpoint: &str, sampling_ratio: f64) -> Result<SdkTracer> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("failed to build OTLP span exporter")?;

    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", "podcast-worker"),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])
        .build();

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::TraceIdRatioBased(sampling_ratio))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = tracer_provider.tracer("podcast-worker");

    global::set_tracer_provider(tracer_provider);

    Ok(tracer)
}
