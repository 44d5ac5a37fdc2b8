use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::services::pipeline::TextGenerator;

/// Client for the Gemini generateContent endpoint.
#[derive(Clone)]
pub struct GeminiService {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiService {
    pub fn new(api_key: String, model: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiService {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );
        let payload = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let res = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .timeout(Duration::from_secs(120))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Gemini API Error {}: {}", status, text));
        }

        let body: JsonValue = res.json().await?;

        body.get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response format"))
    }
}
