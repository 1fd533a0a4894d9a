/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub episodes_generated: Counter,
    pub episodes_failed: Counter,
    pub users_skipped: Counter,
    pub fallback_scripts: Counter,
    pub batch_runs: Counter,

    // ヒストグラム
    pub script_duration: Histogram,
    pub voice_duration: Histogram,
    pub mix_duration: Histogram,
    pub publish_duration: Histogram,
    pub pipeline_duration: Histogram,
    pub batch_duration: Histogram,
    pub api_history_fetch_duration: Histogram,

    // ゲージ
    pub batch_in_progress: Gauge,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            episodes_generated: register_counter_with_registry!(
                "podcast_episodes_generated_total",
                "Total number of episodes generated and published",
                registry
            )?,
            episodes_failed: register_counter_with_registry!(
                "podcast_episodes_failed_total",
                "Total number of episode pipelines that failed",
                registry
            )?,
            users_skipped: register_counter_with_registry!(
                "podcast_users_skipped_total",
                "Total number of users skipped as not yet due",
                registry
            )?,
            fallback_scripts: register_counter_with_registry!(
                "podcast_fallback_scripts_total",
                "Total number of episodes that used the canned fallback script",
                registry
            )?,
            batch_runs: register_counter_with_registry!(
                "podcast_batch_runs_total",
                "Total number of weekly batch runs started",
                registry
            )?,
            script_duration: register_histogram_with_registry!(
                "podcast_script_duration_seconds",
                "Time spent composing an episode script",
                registry
            )?,
            voice_duration: register_histogram_with_registry!(
                "podcast_voice_duration_seconds",
                "Time spent synthesizing narration audio",
                registry
            )?,
            mix_duration: register_histogram_with_registry!(
                "podcast_mix_duration_seconds",
                "Time spent mixing intro and narration",
                registry
            )?,
            publish_duration: register_histogram_with_registry!(
                "podcast_publish_duration_seconds",
                "Time spent uploading and persisting an episode",
                registry
            )?,
            pipeline_duration: register_histogram_with_registry!(
                "podcast_pipeline_duration_seconds",
                "End-to-end duration of a single episode pipeline",
                registry
            )?,
            batch_duration: register_histogram_with_registry!(
                "podcast_batch_duration_seconds",
                "End-to-end duration of a weekly batch run",
                registry
            )?,
            api_history_fetch_duration: register_histogram_with_registry!(
                "podcast_api_history_fetch_duration_seconds",
                "Time spent serving the episode history endpoint",
                registry
            )?,
            batch_in_progress: register_gauge_with_registry!(
                "podcast_batch_in_progress",
                "Whether a weekly batch run is currently executing",
                registry
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use prometheus::{Encoder, TextEncoder};

    use super::*;

    #[test]
    fn metrics_register_against_a_fresh_registry() {
        let registry = Arc::new(Registry::new());
        let metrics = Metrics::new(Arc::clone(&registry)).expect("metrics register");

        metrics.episodes_generated.inc();
        metrics.batch_in_progress.set(1.0);
        metrics.pipeline_duration.observe(0.25);

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .expect("encode");
        let rendered = String::from_utf8(buffer).expect("utf8 exposition");
        assert!(rendered.contains("podcast_episodes_generated_total 1"));
        assert!(rendered.contains("podcast_pipeline_duration_seconds"));
        assert!(rendered.contains("podcast_batch_in_progress 1"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = Arc::new(Registry::new());
        let _first = Metrics::new(Arc::clone(&registry)).expect("first registration");
        assert!(Metrics::new(registry).is_err());
    }
}
