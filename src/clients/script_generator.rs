use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;

use super::truncate_error_body;

/// chat-completions 互換バックエンドに台本生成を依頼するクライアント。
///
/// 生成失敗時の定型台本への切り替えはパイプライン側の責務で、
/// このクライアントは失敗をそのままエラーとして返す。
#[derive(Debug, Clone)]
pub(crate) struct ScriptGeneratorClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

/// 台本生成プロンプト。system で語り口、user で番組素材を渡す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScriptPrompt {
    pub(crate) system: String,
    pub(crate) user: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ScriptGeneratorClient {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.script_generator_timeout())
            .build()
            .context("failed to build script-generator client")?;

        let base_url = Url::parse(config.script_generator_base_url())
            .context("invalid script-generator base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.script_generator_api_key().map(ToString::to_string),
            model: config.script_model().to_string(),
            temperature: config.script_temperature(),
            max_tokens: config.script_max_tokens(),
        })
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: Url::parse(&base_url.into()).unwrap(),
            api_key: Some("test-key".to_string()),
            model: "gpt-4".to_string(),
            temperature: 0.7,
            max_tokens: 800,
        }
    }

    /// 台本本文を生成する。空の応答はエラーとして扱う。
    pub(crate) async fn generate_script(&self, prompt: &ScriptPrompt) -> Result<String> {
        let url = self
            .base_url
            .join("v1/chat/completions")
            .context("failed to build chat-completions URL")?;

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(model = %self.model, "sending script generation request");

        let mut builder = self.client.post(url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .context("script generation request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "script generation endpoint returned error status {status}: {}",
                truncate_error_body(&body)
            ));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("failed to deserialize chat-completions response")?;

        let script = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat-completions response contained no script"))?;

        let script = script.trim().to_string();
        if script.is_empty() {
            return Err(anyhow!("chat-completions response contained an empty script"));
        }

        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prompt() -> ScriptPrompt {
        ScriptPrompt {
            system: "You are a witty podcast host.".to_string(),
            user: "Create this week's episode.".to_string(),
        }
    }

    #[tokio::test]
    async fn generate_script_extracts_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4",
                "temperature": 0.7,
                "max_tokens": 800,
                "messages": [
                    {"role": "system", "content": "You are a witty podcast host."},
                    {"role": "user", "content": "Create this week's episode."}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "  Welcome back, traders.  "}}
                ]
            })))
            .mount(&server)
            .await;

        let client = ScriptGeneratorClient::new_for_test(server.uri());

        let script = client
            .generate_script(&prompt())
            .await
            .expect("script generation should succeed");

        assert_eq!(script, "Welcome back, traders.");
    }

    #[tokio::test]
    async fn generate_script_fails_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
            .mount(&server)
            .await;

        let client = ScriptGeneratorClient::new_for_test(server.uri());

        let error = client
            .generate_script(&prompt())
            .await
            .expect_err("error status should fail");

        assert!(error.to_string().contains("error status"));
        assert!(error.to_string().contains("model overloaded"));
    }

    #[tokio::test]
    async fn generate_script_fails_on_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let client = ScriptGeneratorClient::new_for_test(server.uri());

        let error = client
            .generate_script(&prompt())
            .await
            .expect_err("empty choices should fail");

        assert!(error.to_string().contains("no script"));
    }

    #[tokio::test]
    async fn generate_script_fails_on_blank_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "   "}}]
            })))
            .mount(&server)
            .await;

        let client = ScriptGeneratorClient::new_for_test(server.uri());

        let error = client
            .generate_script(&prompt())
            .await
            .expect_err("blank content should fail");

        assert!(error.to_string().contains("empty script"));
    }

    #[tokio::test]
    async fn generate_script_truncates_large_error_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("x".repeat(10_000)))
            .mount(&server)
            .await;

        let client = ScriptGeneratorClient::new_for_test(server.uri());

        let error = client
            .generate_script(&prompt())
            .await
            .expect_err("should fail with 400 status");

        let message = error.to_string();
        assert!(message.len() < 1000, "expected truncation, got {} chars", message.len());
        assert!(message.contains("truncated"));
    }
}
