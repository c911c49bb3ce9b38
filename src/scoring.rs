//! Scoring client: turns an [`Item`] into a [`ScoreResult`] via a language model.
//!
//! # Scorers
//!
//! - **[`ModelScorer`]**: builds the prompt, calls a [`ScoringBackend`], and
//!   parses the reply. Every call passes through a [`Pacer`] so upstream calls
//!   are at least `min_interval_ms` apart.
//! - **[`DisabledScorer`]**: returned when no API key is configured; always
//!   yields the neutral result without any network call.
//!
//! # Failure Policy
//!
//! `score()` never fails. Upstream errors and unparsable replies are logged
//! and converted to [`neutral_failure`] with the reason in `reasoning`, so one
//! bad item can never halt a cycle.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use leadwatch_core::models::{Item, ScoreResult};
use leadwatch_core::scoring::{
    build_prompt, neutral_disabled, neutral_failure, parse_score_response, sanitize,
};
use leadwatch_core::{LeadError, Result};

use crate::config::ScoringConfig;

// ============ Traits ============

/// Scores items for lead relevance.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Whether real scoring calls are made.
    fn is_enabled(&self) -> bool;

    /// Score one item. Never fails; degraded calls return a neutral result.
    async fn score(&self, item: &Item) -> ScoreResult;
}

/// Raw text completion against a model provider.
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

// ============ Pacing ============

/// Enforces a minimum spacing between consecutive calls.
///
/// The first call goes through immediately. Concurrent callers queue on the
/// inner lock, so calls are strictly serialized.
pub struct Pacer {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Run `f` once at least `min_interval` has passed since the previous call started.
    pub async fn run<F, T>(&self, f: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.min_interval).await;
        }
        *last = Some(Instant::now());
        f.await
    }
}

// ============ Model scorer ============

pub struct ModelScorer<B> {
    backend: B,
    pacer: Pacer,
    product: String,
    max_body_chars: usize,
}

impl<B: ScoringBackend> ModelScorer<B> {
    pub fn new(backend: B, config: &ScoringConfig) -> Self {
        Self {
            backend,
            pacer: Pacer::new(Duration::from_millis(config.min_interval_ms)),
            product: config.product.clone(),
            max_body_chars: config.max_body_chars,
        }
    }

    async fn try_score(&self, item: &Item) -> Result<ScoreResult> {
        let prompt = build_prompt(&self.product, &sanitize(item, self.max_body_chars));
        let text = self.pacer.run(self.backend.complete(&prompt)).await?;
        parse_score_response(&text)
    }
}

#[async_trait]
impl<B: ScoringBackend> Scorer for ModelScorer<B> {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn score(&self, item: &Item) -> ScoreResult {
        match self.try_score(item).await {
            Ok(result) => {
                tracing::debug!(id = %item.id, score = result.score, "item scored");
                result
            }
            Err(e) => {
                tracing::warn!(
                    id = %item.id,
                    model = self.backend.model_name(),
                    error = %e,
                    "scoring degraded to neutral result"
                );
                let reason = match e {
                    LeadError::ScoringDegraded(msg) | LeadError::UpstreamUnavailable(msg) => msg,
                    other => other.to_string(),
                };
                neutral_failure(&reason)
            }
        }
    }
}

/// Scorer used when no provider credential is configured.
pub struct DisabledScorer;

#[async_trait]
impl Scorer for DisabledScorer {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn score(&self, _item: &Item) -> ScoreResult {
        neutral_disabled()
    }
}

// ============ Gemini ============

/// Google Gemini `generateContent` backend.
pub struct GeminiBackend {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(config: &ScoringConfig, api_key: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl ScoringBackend for GeminiBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| LeadError::upstream(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LeadError::upstream(format!(
                "Gemini API error {}: {}",
                status, body_text
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| LeadError::upstream(format!("invalid Gemini response: {}", e)))?;
        extract_text(&json)
    }
}

/// Concatenate `candidates[0].content.parts[*].text`.
pub fn extract_text(json: &Value) -> Result<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| LeadError::ScoringDegraded("Gemini response has no candidates".into()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        return Err(LeadError::ScoringDegraded(
            "Gemini response contained no text".into(),
        ));
    }
    Ok(text)
}

// ============ Construction & batch ============

/// Pick the scorer for this configuration.
///
/// Scoring is enabled only for the `gemini` provider with a usable API key in
/// the environment; anything else yields [`DisabledScorer`].
pub fn build_scorer(config: &ScoringConfig) -> anyhow::Result<Arc<dyn Scorer>> {
    match (config.provider.as_str(), config.api_key()) {
        ("gemini", Some(key)) => {
            tracing::info!(model = %config.model, "Gemini scoring enabled");
            let backend = GeminiBackend::new(config, key)?;
            Ok(Arc::new(ModelScorer::new(backend, config)))
        }
        (provider, _) => {
            tracing::warn!(
                provider,
                api_key_env = %config.api_key_env,
                "scoring disabled; every item gets a neutral score"
            );
            Ok(Arc::new(DisabledScorer))
        }
    }
}

/// Score items one at a time and return them best-first.
///
/// Calls are sequential; spacing comes from the scorer's own pacer, so a
/// disabled scorer returns immediately.
pub async fn score_batch(scorer: &dyn Scorer, items: &[Item]) -> Vec<(Item, ScoreResult)> {
    let mut scored = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let result = scorer.score(item).await;
        tracing::debug!(done = i + 1, total = items.len(), "batch scoring progress");
        scored.push((item.clone(), result));
    }
    scored.sort_by(|a, b| b.1.score.cmp(&a.1.score));
    scored
}
