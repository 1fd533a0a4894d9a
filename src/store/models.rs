use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::eligibility::LastGeneration;

/// ユーザーの番組設定。`users.podcast_preferences` の JSONB 列に
/// 旧ストア由来の camelCase キーのまま保存されている。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodcastPreferences {
    pub include_market_analysis: bool,
    pub include_community_highlights: bool,
    pub include_educational_content: bool,
    pub include_personalized_insights: bool,
    pub preferred_length: String,
}

impl Default for PodcastPreferences {
    fn default() -> Self {
        Self {
            include_market_analysis: true,
            include_community_highlights: true,
            include_educational_content: true,
            include_personalized_insights: true,
            preferred_length: "5 minutes".to_string(),
        }
    }
}

/// `users` テーブルの 1 行。Publisher は最終生成フィールドのみ更新する。
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub preferences: PodcastPreferences,
    pub preferred_voice_id: Option<String>,
    pub last_generated_at: Option<DateTime<Utc>>,
    pub last_episode_url: Option<String>,
}

impl UserRecord {
    /// 適格性判定に渡す最終生成マーカーを返す。
    #[must_use]
    pub fn last_generation(&self) -> Option<LastGeneration> {
        self.last_generated_at.map(LastGeneration::Timestamp)
    }
}

/// 永続化されるエピソードの状態。部分的な失敗は保存されないため、
/// 現状は終端値のみを持つ。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodcastStatus {
    Completed,
}

impl PodcastStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PodcastStatus::Completed => "completed",
        }
    }
}

/// 挿入前のエピソードメタデータ。`id` と `created_at` はストアが採番する。
#[derive(Debug, Clone, PartialEq)]
pub struct NewPodcast {
    pub user_id: Uuid,
    pub title: String,
    pub script: String,
    pub audio_url: String,
    pub duration_seconds: f64,
    pub voice_id: String,
    pub intro_stinger: String,
    pub status: PodcastStatus,
}

impl NewPodcast {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        title: impl Into<String>,
        script: impl Into<String>,
        audio_url: impl Into<String>,
        duration_seconds: f64,
        voice_id: impl Into<String>,
        intro_stinger: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            title: title.into(),
            script: script.into(),
            audio_url: audio_url.into(),
            duration_seconds,
            voice_id: voice_id.into(),
            intro_stinger: intro_stinger.into(),
            status: PodcastStatus::Completed,
        }
    }
}

/// 保存済みエピソード。作成後は不変で、このサービスから削除されることはない。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodcastRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub script: String,
    pub audio_url: String,
    #[serde(rename = "duration")]
    pub duration_seconds: f64,
    pub created_at: DateTime<Utc>,
    pub voice_id: String,
    pub intro_stinger: String,
    pub status: String,
}
