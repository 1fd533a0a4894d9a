use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::debug;

use crate::config::Config;

use super::truncate_error_body;

/// ElevenLabs 互換の音声合成バックエンドを呼び出すクライアント。
/// 返り値はエンコード済み音声（通常は MP3）のバイト列。
#[derive(Debug, Clone)]
pub(crate) struct SpeechClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    model_id: String,
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.5,
        }
    }
}

impl SpeechClient {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.speech_timeout())
            .build()
            .context("failed to build speech-synthesizer client")?;

        let base_url =
            Url::parse(config.speech_base_url()).context("invalid speech-synthesizer base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.speech_api_key().map(ToString::to_string),
            model_id: config.speech_model_id().to_string(),
        })
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: Url::parse(&base_url.into()).unwrap(),
            api_key: Some("test-key".to_string()),
            model_id: "eleven_monolingual_v1".to_string(),
        }
    }

    /// 台本をナレーション音声に変換する。
    pub(crate) async fn synthesize(&self, script: &str, voice_id: &str) -> Result<Vec<u8>> {
        let url = self
            .base_url
            .join(&format!("v1/text-to-speech/{voice_id}"))
            .context("failed to build text-to-speech URL")?;

        let request = SynthesisRequest {
            text: script,
            model_id: &self.model_id,
            voice_settings: VoiceSettings::default(),
        };

        debug!(%voice_id, script_chars = script.chars().count(), "sending speech synthesis request");

        let mut builder = self
            .client
            .post(url)
            .header("Accept", "audio/mpeg")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("xi-api-key", key);
        }

        let response = builder
            .send()
            .await
            .context("speech synthesis request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "speech synthesis endpoint returned error status {status}: {}",
                truncate_error_body(&body)
            ));
        }

        let audio = response
            .bytes()
            .await
            .context("failed to read speech synthesis response body")?;

        if audio.is_empty() {
            return Err(anyhow!("speech synthesis returned an empty audio payload"));
        }

        Ok(audio.to_vec())
    }
}
