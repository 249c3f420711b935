//! Gemini generative content client
//!
//! Produces an [`ArticleDraft`] from an image and its submission context.
//!
//! # Model selection
//! The model list is fetched from the provider on every generation and
//! reduced to models supporting `generateContent`:
//! - [`ModelStrategy::FirstMatch`]: the first model whose name contains the
//!   preferred token (default `flash`)
//! - [`ModelStrategy::Ranked`]: every capable model, ordered by
//!   [`score_model`]
//!
//! If listing fails or nothing matches, the configured default model is
//! used.
//!
//! # Fallback
//! Candidates are tried in order. A non-success status or transport error
//! moves on to the next candidate after a fixed backoff. When every
//! candidate fails the last upstream error is returned in
//! [`PipelineError::AllModelsFailed`].
//!
//! # API Reference
//! - Models: `GET {base}/models?key=`
//! - Generate: `POST {base}/models/{model}:generateContent?key=`

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::prompt::build_prompt;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{ArticleDraft, ContentContext, ContentGenerator, ImageBlob};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when listing fails or yields no candidate
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Upper bound on model-list pages followed
const MAX_MODEL_PAGES: usize = 10;

/// Generation method a model must support to be a candidate
const GENERATE_METHOD: &str = "generateContent";

/// How candidate models are chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStrategy {
    /// First capable model matching the preferred token
    #[default]
    FirstMatch,
    /// All capable models ordered by score
    Ranked,
}

/// Gemini client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// API key (`GEMINI_API_KEY` overrides)
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    /// Name fragment preferred by [`ModelStrategy::FirstMatch`]
    pub preferred_token: String,
    pub model_strategy: ModelStrategy,
    /// Pause before trying the next candidate
    pub backoff_ms: u64,
    pub timeout_secs: u64,
    /// Language the article is written in
    pub language: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: GEMINI_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            preferred_token: "flash".to_string(),
            model_strategy: ModelStrategy::FirstMatch,
            backoff_ms: 1000,
            timeout_secs: 30,
            language: "Japanese".to_string(),
        }
    }
}

// ============================================================================
// Model ranking
// ============================================================================

/// Model entry from the listing endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Full resource name, e.g. `models/gemini-1.5-flash`
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    /// Name without the `models/` prefix
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn can_generate(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == GENERATE_METHOD)
    }
}

/// Preference score: `flash` +10, `pro` +5, `latest` +2
pub fn score_model(name: &str) -> i32 {
    let mut score = 0;
    if name.contains("flash") {
        score += 10;
    }
    if name.contains("pro") {
        score += 5;
    }
    if name.contains("latest") {
        score += 2;
    }
    score
}

/// Ordered candidate list for `strategy`
///
/// Never empty: falls back to `default_model`. In ranked mode the default
/// model is appended when the listing did not include it.
pub fn candidate_models(
    models: &[ModelInfo],
    strategy: ModelStrategy,
    preferred_token: &str,
    default_model: &str,
) -> Vec<String> {
    let capable = models.iter().filter(|m| m.can_generate());

    let mut candidates: Vec<String> = match strategy {
        ModelStrategy::FirstMatch => capable
            .map(ModelInfo::short_name)
            .find(|name| name.contains(preferred_token))
            .map(|name| vec![name.to_string()])
            .unwrap_or_default(),
        ModelStrategy::Ranked => {
            let mut ranked: Vec<&str> = capable.map(ModelInfo::short_name).collect();
            // Stable sort keeps listing order among equal scores
            ranked.sort_by_key(|name| std::cmp::Reverse(score_model(name)));
            ranked.into_iter().map(str::to_string).collect()
        }
    };

    let has_default = candidates.iter().any(|c| c == default_model);
    if candidates.is_empty() || (strategy == ModelStrategy::Ranked && !has_default) {
        candidates.push(default_model.to_string());
    }
    candidates
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Parse a successful generate response body into an article
///
/// The article is JSON encoded inside `candidates[0].content.parts[0].text`.
pub fn parse_generation(body: &str) -> PipelineResult<ArticleDraft> {
    let envelope: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| PipelineError::MalformedGeneration(format!("response envelope: {}", e)))?;

    let text = envelope
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| {
            PipelineError::MalformedGeneration(
                "response has no candidates[0].content.parts[0].text".to_string(),
            )
        })?;

    serde_json::from_str(text.trim())
        .map_err(|e| PipelineError::MalformedGeneration(format!("article JSON: {}", e)))
}

// ============================================================================
// Client
// ============================================================================

/// Gemini API client
pub struct GeminiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    preferred_token: String,
    strategy: ModelStrategy,
    backoff: Duration,
    language: String,
}

impl GeminiClient {
    /// Create a client; fails when no API key is configured
    pub fn new(config: &GeminiConfig) -> PipelineResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PipelineError::Config("GEMINI_API_KEY is not configured".to_string()))?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_model: config.default_model.clone(),
            preferred_token: config.preferred_token.clone(),
            strategy: config.model_strategy,
            backoff: Duration::from_millis(config.backoff_ms),
            language: config.language.clone(),
        })
    }

    /// List all models visible to the API key
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, String> {
        let url = format!("{}/models", self.base_url);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_MODEL_PAGES {
            let mut request = self.http_client.get(&url).query(&[("key", &self.api_key)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = request.send().await.map_err(|e| e.to_string())?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(format!("model listing returned {}: {}", status, body));
            }

            let page: ListModelsResponse = response.json().await.map_err(|e| e.to_string())?;
            models.extend(page.models);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }

    /// Candidate models in preference order (never empty)
    pub async fn candidate_models(&self) -> Vec<String> {
        let models = match self.list_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!("Model listing failed, using default model: {}", e);
                Vec::new()
            }
        };

        let candidates = candidate_models(
            &models,
            self.strategy,
            &self.preferred_token,
            &self.default_model,
        );
        info!(candidates = ?candidates, strategy = ?self.strategy, "Selected candidate models");
        candidates
    }

    async fn generate_once(&self, model: &str, request: &GenerateRequest<'_>) -> Result<String, String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let response = self
            .http_client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("request to {} timed out: {}", model, e)
                } else {
                    e.to_string()
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| e.to_string())?;
        if status.is_success() {
            Ok(body)
        } else {
            warn!(model, status = status.as_u16(), "Model failed");
            Err(body)
        }
    }
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn generate(
        &self,
        image: &ImageBlob,
        context: &ContentContext,
    ) -> PipelineResult<ArticleDraft> {
        let candidates = self.candidate_models().await;
        let prompt = build_prompt(context, &self.language);
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Text { text: &prompt },
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: &image.mime_type,
                            data: BASE64.encode(&image.bytes),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let mut last_error = String::from("no candidate models");
        for (index, model) in candidates.iter().enumerate() {
            debug!(model = %model, "Trying model");
            match self.generate_once(model, &request).await {
                Ok(body) => {
                    let draft = parse_generation(&body)?;
                    info!(model = %model, title = %draft.title, "Article generated");
                    return Ok(draft);
                }
                Err(error) => {
                    last_error = error;
                    if index + 1 < candidates.len() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        Err(PipelineError::AllModelsFailed { last_error })
    }
}

// ============================================================================
// Tests
// ============================================================================
