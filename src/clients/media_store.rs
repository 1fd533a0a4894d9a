use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Url, header::CONTENT_TYPE};
use tracing::debug;

use crate::config::Config;

use super::truncate_error_body;

/// S3 互換オブジェクトストレージへ完成エピソードを配置するクライアント。
///
/// アップロード先は `{base}/{bucket}/{object_path}`、リスナーへ返す公開 URL は
/// `{public_base}/{bucket}/{object_path}`。公開ベース URL が未設定の場合は
/// アップロード先と同じオリジンを公開 URL として使う。
#[derive(Debug, Clone)]
pub(crate) struct MediaStoreClient {
    client: Client,
    base_url: Url,
    public_base_url: Url,
    bucket: String,
}

impl MediaStoreClient {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.media_store_timeout())
            .build()
            .context("failed to build media-store client")?;

        let base_url =
            Url::parse(config.media_store_base_url()).context("invalid media-store base URL")?;

        let public_base_url = match config.media_store_public_base_url() {
            Some(raw) => Url::parse(raw).context("invalid media-store public base URL")?,
            None => base_url.clone(),
        };

        Ok(Self {
            client,
            base_url,
            public_base_url,
            bucket: config.media_store_bucket().to_string(),
        })
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(base_url: impl Into<String>) -> Self {
        let base_url = Url::parse(&base_url.into()).unwrap();
        Self {
            client: Client::new(),
            base_url: base_url.clone(),
            public_base_url: base_url,
            bucket: "podcast-media".to_string(),
        }
    }

    /// オブジェクトを public-read で配置し、公開 URL を返す。
    pub(crate) async fn put_public(
        &self,
        object_path: &str,
        bytes: Vec<u8>,
        content_type: &'static str,
    ) -> Result<String> {
        let url = self.object_url(&self.base_url, object_path)?;

        debug!(object = %object_path, bytes = bytes.len(), "uploading episode to media store");

        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .header("x-amz-acl", "public-read")
            .body(bytes)
            .send()
            .await
            .context("media store upload request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "media store returned error status {status}: {}",
                truncate_error_body(&body)
            ));
        }

        Ok(self
            .object_url(&self.public_base_url, object_path)?
            .to_string())
    }

    fn object_url(&self, base: &Url, object_path: &str) -> Result<Url> {
        let trimmed = object_path.trim_start_matches('/');
        base.join(&format!("{}/{trimmed}", self.bucket))
            .context("failed to build media store object URL")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn put_public_uploads_and_returns_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/podcast-media/podcasts/user-1/podcast_20260101_060000.wav"))
            .and(header("content-type", "audio/wav"))
            .and(header("x-amz-acl", "public-read"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = MediaStoreClient::new_for_test(server.uri());

        let url = client
            .put_public(
                "podcasts/user-1/podcast_20260101_060000.wav",
                vec![0u8; 16],
                "audio/wav",
            )
            .await
            .expect("upload should succeed");

        assert_eq!(
            url,
            format!(
                "{}/podcast-media/podcasts/user-1/podcast_20260101_060000.wav",
                server.uri()
            )
        );
    }

    #[tokio::test]
    async fn put_public_prefers_public_base_url() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut client = MediaStoreClient::new_for_test(server.uri());
        client.public_base_url = Url::parse("https://cdn.example.com/").unwrap();

        let url = client
            .put_public("podcasts/user-1/episode.wav", vec![0u8; 4], "audio/wav")
            .await
            .expect("upload should succeed");

        assert_eq!(
            url,
            "https://cdn.example.com/podcast-media/podcasts/user-1/episode.wav"
        );
    }

    #[tokio::test]
    async fn put_public_fails_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("access denied"))
            .mount(&server)
            .await;

        let client = MediaStoreClient::new_for_test(server.uri());

        let error = client
            .put_public("podcasts/user-1/episode.wav", vec![0u8; 4], "audio/wav")
            .await
            .expect_err("error status should fail");

        assert!(error.to_string().contains("error status"));
        assert!(error.to_string().contains("access denied"));
    }
}
