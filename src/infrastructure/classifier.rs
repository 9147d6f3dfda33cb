//! Vision classification client.
//!
//! Talks to a generateContent-style vision endpoint: the listing screenshot
//! goes up as inline base64 PNG alongside the task instruction, and the raw
//! candidate text comes back for the extraction adapter to make sense of.
//! Calls are rate limited so a long candidate queue cannot burn through the
//! endpoint quota.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use governor::clock::DefaultClock;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use crate::domain::services::VisionClassifier;
use crate::infrastructure::config::ClassifierConfig;

/// Client for a Gemini-style vision endpoint.
pub struct GeminiVisionClassifier {
    http: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiVisionClassifier {
    /// Build a client from config; the API key is read from the configured
    /// environment variable.
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("classifier API key env var {} not set", config.api_key_env))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build classifier HTTP client")?;

        let per_minute = NonZeroU32::new(config.max_requests_per_minute.max(1))
            .ok_or_else(|| anyhow!("classifier rate limit must be greater than 0"))?;
        let rate_limiter = RateLimiter::direct(Quota::per_minute(per_minute));

        Ok(Self {
            http,
            rate_limiter,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl VisionClassifier for GeminiVisionClassifier {
    async fn classify(&self, snapshot_png: &[u8], instruction: &str) -> Result<String> {
        self.rate_limiter.until_ready().await;

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        );
        let payload = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inline_data": {
                            "mime_type": "image/png",
                            "data": BASE64.encode(snapshot_png),
                        }
                    },
                    { "text": instruction }
                ]
            }]
        });

        debug!(
            "submitting {} byte snapshot to classifier model {}",
            snapshot_png.len(),
            self.model
        );

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("classifier request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("classifier returned status {}", response.status());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .context("classifier response was not JSON")?;

        let text = body
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow!("classifier response had no candidate text"))?;

        Ok(text.to_string())
    }
}
