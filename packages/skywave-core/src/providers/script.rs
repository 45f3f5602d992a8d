//! HTTP script provider against a chat-completions compatible API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{classify_status, retry_after_header, Named, PromptBundle, ProviderOutcome, ScriptProvider};
use crate::config::ScriptProviderConfig;

/// A script LLM reached over HTTP.
pub struct HttpScriptProvider {
    name: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl HttpScriptProvider {
    pub fn from_config(client: reqwest::Client, config: &ScriptProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl Named for HttpScriptProvider {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ScriptProvider for HttpScriptProvider {
    async fn generate(&self, prompt: &PromptBundle) -> ProviderOutcome<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "max_tokens": 1024,
        });

        let response = match self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            // Transport-level trouble (refused, reset, timeout) is always
            // worth an in-provider retry.
            Err(e) => return ProviderOutcome::Transient(e.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_header(response.headers());
            let detail = format!("{status}: {}", truncate(&response.text().await.unwrap_or_default()));
            return classify_status(status, retry_after, detail);
        }

        match response.json::<ChatResponse>().await {
            Ok(parsed) => match parsed.choices.into_iter().next() {
                Some(choice) if !choice.message.content.trim().is_empty() => {
                    ProviderOutcome::Ok(choice.message.content)
                }
                _ => ProviderOutcome::Permanent("response held no completion".into()),
            },
            Err(e) => ProviderOutcome::Permanent(format!("malformed completion body: {e}")),
        }
    }
}

/// Keeps error details log-sized.
fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let config = ScriptProviderConfig {
            name: "primary".into(),
            base_url: "https://api.example.com/v1/".into(),
            model: "writer-large".into(),
            api_key_env: "KEY".into(),
            api_key: "secret".into(),
        };
        let provider = HttpScriptProvider::from_config(reqwest::Client::new(), &config);
        assert_eq!(provider.base_url, "https://api.example.com/v1");
        assert_eq!(provider.name(), "primary");
    }

    #[test]
    fn chat_response_parses_first_choice() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"Good evening."}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Good evening.");
    }
}
