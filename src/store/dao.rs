use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::models::{NewPodcast, PodcastPreferences, PodcastRecord, UserRecord};

/// 永続化層の抽象。パイプラインと API はこのトレイト経由でストアを操作する。
#[async_trait]
pub trait PodcastStore: Send + Sync {
    /// 接続確認。readiness プローブから呼ばれる。
    async fn ping(&self) -> Result<()>;

    /// 週次バッチの走査対象となる全ユーザーを返す。
    async fn list_users(&self) -> Result<Vec<UserRecord>>;

    /// 単一ユーザーを取得する。存在しなければ `None`。
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserRecord>>;

    /// 完成したエピソードを保存し、採番済みレコードを返す。
    async fn insert_podcast(&self, podcast: &NewPodcast) -> Result<PodcastRecord>;

    /// ユーザーの最終生成時刻と最新エピソード URL を更新する。
    async fn mark_user_generated(
        &self,
        user_id: Uuid,
        generated_at: DateTime<Utc>,
        episode_url: &str,
    ) -> Result<()>;

    /// ユーザーのエピソード履歴を新しい順に最大 `limit` 件返す。
    async fn podcasts_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<PodcastRecord>>;
}

/// Postgres 実装。
#[derive(Debug, Clone)]
pub struct PgPodcastStore {
    pool: PgPool,
}

impl PgPodcastStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PodcastStore for PgPodcastStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("podcast_db ping failed")?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, email, podcast_preferences, preferred_voice_id,
                   last_podcast_generated_at, last_podcast_url
            FROM users
            ORDER BY id
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list users")?;

        rows.iter().map(user_from_row).collect()
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, email, podcast_preferences, preferred_voice_id,
                   last_podcast_generated_at, last_podcast_url
            FROM users
            WHERE id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch user")?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert_podcast(&self, podcast: &NewPodcast) -> Result<PodcastRecord> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r"
            INSERT INTO podcasts (
                id, user_id, title, script, audio_url, duration_seconds,
                created_at, voice_id, intro_stinger, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), $7, $8, $9)
            RETURNING created_at
            ",
        )
        .bind(id)
        .bind(podcast.user_id)
        .bind(&podcast.title)
        .bind(&podcast.script)
        .bind(&podcast.audio_url)
        .bind(podcast.duration_seconds)
        .bind(&podcast.voice_id)
        .bind(&podcast.intro_stinger)
        .bind(podcast.status.as_str())
        .fetch_one(&self.pool)
        .await
        .context("failed to insert podcast record")?;

        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .context("failed to read podcasts.created_at")?;

        Ok(PodcastRecord {
            id,
            user_id: podcast.user_id,
            title: podcast.title.clone(),
            script: podcast.script.clone(),
            audio_url: podcast.audio_url.clone(),
            duration_seconds: podcast.duration_seconds,
            created_at,
            voice_id: podcast.voice_id.clone(),
            intro_stinger: podcast.intro_stinger.clone(),
            status: podcast.status.as_str().to_string(),
        })
    }

    async fn mark_user_generated(
        &self,
        user_id: Uuid,
        generated_at: DateTime<Utc>,
        episode_url: &str,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE users
            SET last_podcast_generated_at = $2,
                last_podcast_url = $3
            WHERE id = $1
            ",
        )
        .bind(user_id)
        .bind(generated_at)
        .bind(episode_url)
        .execute(&self.pool)
        .await
        .context("failed to update user last-generation fields")?;

        Ok(())
    }

    async fn podcasts_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<PodcastRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, title, script, audio_url, duration_seconds,
                   created_at, voice_id, intro_stinger, status
            FROM podcasts
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            ",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch podcast history")?;

        rows.iter().map(podcast_from_row).collect()
    }
}

fn user_from_row(row: &PgRow) -> Result<UserRecord> {
    // podcast_preferences は旧ストア由来の camelCase JSONB。NULL はデフォルト設定扱い。
    let preferences = row
        .try_get::<Option<Json<PodcastPreferences>>, _>("podcast_preferences")
        .context("failed to read users.podcast_preferences")?
        .map_or_else(PodcastPreferences::default, |json| json.0);

    Ok(UserRecord {
        id: row.try_get("id").context("failed to read users.id")?,
        email: row.try_get("email").context("failed to read users.email")?,
        preferences,
        preferred_voice_id: row
            .try_get("preferred_voice_id")
            .context("failed to read users.preferred_voice_id")?,
        last_generated_at: row
            .try_get("last_podcast_generated_at")
            .context("failed to read users.last_podcast_generated_at")?,
        last_episode_url: row
            .try_get("last_podcast_url")
            .context("failed to read users.last_podcast_url")?,
    })
}

fn podcast_from_row(row: &PgRow) -> Result<PodcastRecord> {
    Ok(PodcastRecord {
        id: row.try_get("id").context("failed to read podcasts.id")?,
        user_id: row
            .try_get("user_id")
            .context("failed to read podcasts.user_id")?,
        title: row
            .try_get("title")
            .context("failed to read podcasts.title")?,
        script: row
            .try_get("script")
            .context("failed to read podcasts.script")?,
        audio_url: row
            .try_get("audio_url")
            .context("failed to read podcasts.audio_url")?,
        duration_seconds: row
            .try_get("duration_seconds")
            .context("failed to read podcasts.duration_seconds")?,
        created_at: row
            .try_get("created_at")
            .context("failed to read podcasts.created_at")?,
        voice_id: row
            .try_get("voice_id")
            .context("failed to read podcasts.voice_id")?,
        intro_stinger: row
            .try_get("intro_stinger")
            .context("failed to read podcasts.intro_stinger")?,
        status: row
            .try_get("status")
            .context("failed to read podcasts.status")?,
    })
}
