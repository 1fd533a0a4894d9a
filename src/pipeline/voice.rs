use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::clients::SpeechClient;
use crate::store::models::UserRecord;

/// 合成済みナレーション。ボイス ID は後段が記録用に引き継ぐ。
#[derive(Debug)]
pub(crate) struct VoiceTrack {
    pub(crate) audio: Vec<u8>,
    pub(crate) voice_id: String,
}

/// ナレーション合成ステージ。台本と違いフォールバック音声は存在しないため、
/// 失敗はそのままエピソードの失敗として伝播する。
#[async_trait]
pub(crate) trait VoiceStage: Send + Sync {
    async fn narrate(&self, user: &UserRecord, script: &str) -> Result<VoiceTrack>;
}

pub(crate) struct SpeechVoiceStage {
    client: Arc<SpeechClient>,
    default_voice_id: String,
}

impl SpeechVoiceStage {
    pub(crate) fn new(client: Arc<SpeechClient>, default_voice_id: impl Into<String>) -> Self {
        Self {
            client,
            default_voice_id: default_voice_id.into(),
        }
    }
}

#[async_trait]
impl VoiceStage for SpeechVoiceStage {
    async fn narrate(&self, user: &UserRecord, script: &str) -> Result<VoiceTrack> {
        let voice_id = user
            .preferred_voice_id
            .as_deref()
            .unwrap_or(&self.default_voice_id)
            .to_string();

        let audio = self
            .client
            .synthesize(script, &voice_id)
            .await
            .with_context(|| format!("voice synthesis failed for user {}", user.id))?;

        Ok(VoiceTrack { audio, voice_id })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::store::models::PodcastPreferences;

    fn user_with_voice(preferred_voice_id: Option<&str>) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: "sam@example.com".to_string(),
            preferences: PodcastPreferences::default(),
            preferred_voice_id: preferred_voice_id.map(str::to_string),
            last_generated_at: None,
            last_episode_url: None,
        }
    }

    fn stage_for(server_uri: &str) -> SpeechVoiceStage {
        let client = Arc::new(SpeechClient::new_for_test(server_uri));
        SpeechVoiceStage::new(client, "default-voice")
    }

    #[tokio::test]
    async fn narrate_uses_the_preferred_voice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/custom-voice"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .expect(1)
            .mount(&server)
            .await;

        let track = stage_for(&server.uri())
            .narrate(&user_with_voice(Some("custom-voice")), "hello")
            .await
            .expect("synthesis succeeds");

        assert_eq!(track.voice_id, "custom-voice");
        assert_eq!(track.audio, vec![1u8, 2, 3]);
    }

    #[tokio::test]
    async fn narrate_falls_back_to_the_default_voice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/default-voice"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8]))
            .expect(1)
            .mount(&server)
            .await;

        let track = stage_for(&server.uri())
            .narrate(&user_with_voice(None), "hello")
            .await
            .expect("synthesis succeeds");

        assert_eq!(track.voice_id, "default-voice");
    }

    #[tokio::test]
    async fn narrate_propagates_backend_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/default-voice"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let error = stage_for(&server.uri())
            .narrate(&user_with_voice(None), "hello")
            .await
            .expect_err("synthesis must fail");

        assert!(format!("{error:#}").contains("voice synthesis failed"));
    }
}
