pub(crate) mod metrics;
pub(crate) mod tracing;

use std::sync::Arc;

use anyhow::Result;
use prometheus::{Encoder, Registry, TextEncoder};

use self::metrics::Metrics;
use crate::config::Config;

/// Telemetry（メトリクスとトレーシング）を管理する構造体。
///
/// メトリクスは Telemetry が所有するレジストリに登録され、エクスポートも
/// 同じレジストリから行う。グローバルレジストリには依存しない。
#[derive(Debug, Clone)]
pub struct Telemetry {
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
}

impl Telemetry {
    /// 新しいTelemetryインスタンスを作成し、トレーシングとメトリクスを初期化する。
    ///
    /// # Errors
    /// トレーシングの初期化またはメトリクスの登録に失敗した場合はエラーを返す。
    pub fn new(config: &Config) -> Result<Self> {
        tracing::init(config)?;
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(Metrics::new(Arc::clone(&registry))?);
        Ok(Self { registry, metrics })
    }

    /// メトリクスへのアクセスを提供する。
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// 共有用に Arc のままメトリクスを取り出す。
    #[must_use]
    pub fn metrics_arc(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// 準備完了プローブを記録する。
    pub fn record_ready_probe(&self) {
        ::tracing::info!("service ready probe recorded");
    }

    /// ライブプローブを記録する。
    pub fn record_live_probe(&self) {
        ::tracing::debug!("service live probe");
    }

    /// 手動生成呼び出しを記録する。
    pub fn record_manual_generate_invocation(&self) {
        ::tracing::info!("manual generation invoked");
    }

    /// 週次バッチ呼び出しを記録する。
    pub fn record_batch_invocation(&self) {
        ::tracing::info!("weekly batch invoked");
    }

    /// Prometheusメトリクスをレンダリングする。
    pub fn render_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        String::from_utf8(buffer).unwrap_or_default()
    }
}
