//! HTTP text-to-speech provider.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

use super::{classify_status, retry_after_header, Named, ProviderOutcome, TtsProvider};
use crate::config::TtsProviderConfig;

/// A speech-synthesis service reached over HTTP.
///
/// Expects a `POST {base}/speech` endpoint taking `{voice, input,
/// instructions}` and returning raw audio bytes.
pub struct HttpTtsProvider {
    name: String,
    client: reqwest::Client,
    base_url: String,
    voice: String,
    api_key: String,
}

impl HttpTtsProvider {
    pub fn from_config(client: reqwest::Client, config: &TtsProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            voice: config.voice.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

impl Named for HttpTtsProvider {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl TtsProvider for HttpTtsProvider {
    async fn synthesize(&self, script: &str, director: &str) -> ProviderOutcome<Bytes> {
        let body = json!({
            "voice": self.voice,
            "input": script,
            "instructions": director,
            "response_format": "mp3",
        });

        let response = match self
            .client
            .post(format!("{}/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ProviderOutcome::Transient(e.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_header(response.headers());
            let detail = format!(
                "{status}: {}",
                response
                    .text()
                    .await
                    .unwrap_or_default()
                    .chars()
                    .take(200)
                    .collect::<String>()
            );
            return classify_status(status, retry_after, detail);
        }

        match response.bytes().await {
            Ok(audio) if !audio.is_empty() => ProviderOutcome::Ok(audio),
            Ok(_) => ProviderOutcome::Permanent("empty audio body".into()),
            Err(e) => ProviderOutcome::Transient(format!("audio body read failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_carries_configured_voice() {
        let config = TtsProviderConfig {
            name: "tts-primary".into(),
            base_url: "https://tts.example.com/v1".into(),
            voice: "夜間ホスト".into(),
            api_key_env: "KEY".into(),
            api_key: "secret".into(),
        };
        let provider = HttpTtsProvider::from_config(reqwest::Client::new(), &config);
        assert_eq!(provider.voice, "夜間ホスト");
        assert_eq!(provider.name(), "tts-primary");
    }
}
