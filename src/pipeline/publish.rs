use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::clients::MediaStoreClient;
use crate::pipeline::mix::MixedEpisode;
use crate::pipeline::script::ScriptOutcome;
use crate::store::dao::PodcastStore;
use crate::store::models::{NewPodcast, PodcastRecord, UserRecord};

const AUDIO_CONTENT_TYPE: &str = "audio/wav";

/// 公開ステージ。音声のアップロード、エピソード行の挿入、ユーザーの
/// 最終生成マーカー更新をこの順で行う。途中で失敗してもロールバックは
/// しない。孤児になった Blob は警告ログで追跡する。
#[async_trait]
pub(crate) trait PublishStage: Send + Sync {
    async fn publish(
        &self,
        user: &UserRecord,
        script: &ScriptOutcome,
        episode: MixedEpisode,
    ) -> Result<PodcastRecord>;
}

pub(crate) struct StorePublishStage {
    media_store: Arc<MediaStoreClient>,
    store: Arc<dyn PodcastStore>,
}

impl StorePublishStage {
    pub(crate) fn new(media_store: Arc<MediaStoreClient>, store: Arc<dyn PodcastStore>) -> Self {
        Self { media_store, store }
    }
}

#[async_trait]
impl PublishStage for StorePublishStage {
    async fn publish(
        &self,
        user: &UserRecord,
        script: &ScriptOutcome,
        episode: MixedEpisode,
    ) -> Result<PodcastRecord> {
        let now = Utc::now();
        let object_path = blob_path(user.id, now);

        let audio_url = self
            .media_store
            .put_public(&object_path, episode.wav, AUDIO_CONTENT_TYPE)
            .await
            .context("failed to upload mixed episode")?;

        let new_podcast = NewPodcast::new(
            user.id,
            episode_title(now),
            script.text.clone(),
            audio_url,
            episode.duration_seconds,
            episode.voice_id,
            episode.intro_stinger,
        );

        let record = match self.store.insert_podcast(&new_podcast).await {
            Ok(record) => record,
            Err(error) => {
                warn!(
                    user_id = %user.id,
                    object = %object_path,
                    "episode record insert failed, uploaded blob is orphaned"
                );
                return Err(error).context("failed to insert episode record");
            }
        };

        if let Err(error) = self
            .store
            .mark_user_generated(user.id, record.created_at, &record.audio_url)
            .await
        {
            warn!(
                user_id = %user.id,
                podcast_id = %record.id,
                object = %object_path,
                "episode stored but user generation marker update failed"
            );
            return Err(error).context("failed to update user generation marker");
        }

        Ok(record)
    }
}

fn blob_path(user_id: Uuid, now: DateTime<Utc>) -> String {
    format!(
        "podcasts/{user_id}/podcast_{}.wav",
        now.format("%Y%m%d_%H%M%S")
    )
}

fn episode_title(now: DateTime<Utc>) -> String {
    format!("Weekly Market Update - {}", now.format("%B %d, %Y"))
}
