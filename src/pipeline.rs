pub(crate) mod mix;
pub(crate) mod publish;
pub(crate) mod script;
pub(crate) mod voice;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{error, info};

use crate::clients::{MediaStoreClient, ScriptGeneratorClient, SpeechClient};
use crate::config::Config;
use crate::observability::metrics::Metrics;
use crate::store::dao::PodcastStore;
use crate::store::models::{PodcastRecord, UserRecord};

use mix::{MixStage, StingerLibrary, StingerMixStage};
use publish::{PublishStage, StorePublishStage};
use script::{LlmScriptStage, ScriptSource, ScriptStage, StaticMarketData};
use voice::{SpeechVoiceStage, VoiceStage};

/// エピソード 1 本分のパイプライン。台本、ナレーション、ミックス、公開の
/// 4 ステージを直列に流す。各ステージは trait で差し替え可能。
pub(crate) struct EpisodePipeline {
    stages: PipelineStages,
    metrics: Arc<Metrics>,
}

struct PipelineStages {
    script: Arc<dyn ScriptStage>,
    voice: Arc<dyn VoiceStage>,
    mix: Arc<dyn MixStage>,
    publish: Arc<dyn PublishStage>,
}

/// パイプラインの最終結果。レコードに加えて台本の出所を API 層へ引き継ぐ。
#[derive(Debug)]
pub(crate) struct EpisodeOutcome {
    pub(crate) record: PodcastRecord,
    pub(crate) script_source: ScriptSource,
}

impl EpisodePipeline {
    pub(crate) fn new(
        config: &Config,
        script_client: Arc<ScriptGeneratorClient>,
        speech_client: Arc<SpeechClient>,
        media_store: Arc<MediaStoreClient>,
        store: Arc<dyn PodcastStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let stingers = StingerLibrary::new(config.intro_dir(), config.intro_stingers().to_vec());

        PipelineBuilder::new()
            .with_script_stage(Arc::new(LlmScriptStage::new(
                script_client,
                Arc::new(StaticMarketData),
            )))
            .with_voice_stage(Arc::new(SpeechVoiceStage::new(
                speech_client,
                config.default_voice_id(),
            )))
            .with_mix_stage(Arc::new(StingerMixStage::new(stingers)))
            .with_publish_stage(Arc::new(StorePublishStage::new(media_store, store)))
            .build(metrics)
    }

    #[cfg(test)]
    pub(crate) fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// 1 ユーザー分のエピソードを生成して公開する。
    pub(crate) async fn execute(&self, user: &UserRecord) -> Result<EpisodeOutcome> {
        let pipeline_started = Instant::now();
        let result = self.run_stages(user).await;
        self.metrics
            .pipeline_duration
            .observe(pipeline_started.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => {
                self.metrics.episodes_generated.inc();
                info!(
                    user_id = %user.id,
                    podcast_id = %outcome.record.id,
                    script_source = outcome.script_source.as_str(),
                    duration_seconds = outcome.record.duration_seconds,
                    "episode published"
                );
            }
            Err(error) => {
                self.metrics.episodes_failed.inc();
                error!(user_id = %user.id, error = ?error, "episode pipeline failed");
            }
        }

        result
    }

    async fn run_stages(&self, user: &UserRecord) -> Result<EpisodeOutcome> {
        let script_started = Instant::now();
        let script = self.stages.script.compose(user).await?;
        self.metrics
            .script_duration
            .observe(script_started.elapsed().as_secs_f64());
        if script.source == ScriptSource::Fallback {
            self.metrics.fallback_scripts.inc();
        }

        let voice_started = Instant::now();
        let voice = self.stages.voice.narrate(user, &script.text).await?;
        self.metrics
            .voice_duration
            .observe(voice_started.elapsed().as_secs_f64());

        let mix_started = Instant::now();
        let episode = self.stages.mix.mix(voice).await?;
        self.metrics
            .mix_duration
            .observe(mix_started.elapsed().as_secs_f64());

        let publish_started = Instant::now();
        let record = self.stages.publish.publish(user, &script, episode).await?;
        self.metrics
            .publish_duration
            .observe(publish_started.elapsed().as_secs_f64());

        Ok(EpisodeOutcome {
            record,
            script_source: script.source,
        })
    }
}

pub(crate) struct PipelineBuilder {
    script: Option<Arc<dyn ScriptStage>>,
    voice: Option<Arc<dyn VoiceStage>>,
    mix: Option<Arc<dyn MixStage>>,
    publish: Option<Arc<dyn PublishStage>>,
}

impl PipelineBuilder {
    pub(crate) fn new() -> Self {
        Self {
            script: None,
            voice: None,
            mix: None,
            publish: None,
        }
    }

    pub(crate) fn with_script_stage(mut self, stage: Arc<dyn ScriptStage>) -> Self {
        self.script = Some(stage);
        self
    }

    pub(crate) fn with_voice_stage(mut self, stage: Arc<dyn VoiceStage>) -> Self {
        self.voice = Some(stage);
        self
    }

    pub(crate) fn with_mix_stage(mut self, stage: Arc<dyn MixStage>) -> Self {
        self.mix = Some(stage);
        self
    }

    pub(crate) fn with_publish_stage(mut self, stage: Arc<dyn PublishStage>) -> Self {
        self.publish = Some(stage);
        self
    }

    pub(crate) fn build(self, metrics: Arc<Metrics>) -> EpisodePipeline {
        EpisodePipeline {
            stages: PipelineStages {
                script: self.script.expect("script stage must be configured"),
                voice: self.voice.expect("voice stage must be configured"),
                mix: self.mix.expect("mix stage must be configured"),
                publish: self.publish.expect("publish stage must be configured"),
            },
            metrics,
        }
    }
}
