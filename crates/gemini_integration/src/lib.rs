use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::domain::CourseDraft;
use tracing::{debug, warn};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(20),
        }
    }
}

/// Drafts marketing copy for a new course. Never fails: `None` means the
/// caller keeps whatever the user already typed.
#[async_trait]
pub trait DescriptionDrafter: Send + Sync {
    async fn draft(&self, title: &str) -> Option<CourseDraft>;
}

/// Used when no API key is configured.
pub struct MissingDrafter;

#[async_trait]
impl DescriptionDrafter for MissingDrafter {
    async fn draft(&self, _title: &str) -> Option<CourseDraft> {
        None
    }
}

pub struct GeminiDrafter {
    http: Client,
    cfg: GeminiConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct RawDraft {
    description: String,
    #[serde(default)]
    prerequisites: Value,
}

impl GeminiDrafter {
    pub fn new(cfg: GeminiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("failed to build gemini http client")?;
        Ok(Self { http, cfg })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.cfg.base_url.trim_end_matches('/'),
            self.cfg.model
        )
    }

    async fn request_draft(&self, title: &str) -> Result<CourseDraft> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(course_prompt(title)),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let res = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.cfg.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let reply: GenerateContentResponse = res.json().await?;

        let text = reply
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.text)
            .collect::<String>();
        if text.trim().is_empty() {
            return Err(anyhow!("empty generation reply"));
        }
        parse_draft(&text)
    }
}

#[async_trait]
impl DescriptionDrafter for GeminiDrafter {
    async fn draft(&self, title: &str) -> Option<CourseDraft> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        match self.request_draft(title).await {
            Ok(draft) => {
                debug!(%title, "course description drafted");
                Some(draft)
            }
            Err(error) => {
                warn!(%title, %error, "course description draft unavailable");
                None
            }
        }
    }
}

/// Picks the Gemini drafter when a non-empty key is present.
pub fn drafter_from_config(cfg: Option<GeminiConfig>) -> Arc<dyn DescriptionDrafter> {
    let Some(cfg) = cfg.filter(|cfg| !cfg.api_key.trim().is_empty()) else {
        warn!("no text generation api key configured; description drafting disabled");
        return Arc::new(MissingDrafter);
    };
    match GeminiDrafter::new(cfg) {
        Ok(drafter) => Arc::new(drafter),
        Err(error) => {
            warn!(%error, "description drafting disabled");
            Arc::new(MissingDrafter)
        }
    }
}

pub fn course_prompt(title: &str) -> String {
    format!(
        "You are an expert curriculum designer for handmade crafts and DIY workshops.\n\
         Create a compelling, warm, and inviting course description (approx 80-100 words) for a workshop titled \"{title}\".\n\
         Also list 3 short prerequisites or things to bring.\n\
         \n\
         Return the response in strictly valid JSON format with keys: \"description\" (string) and \"prerequisites\" (string).\n\
         Do not include markdown code blocks."
    )
}

/// Parses the model's JSON reply. Tolerates a fenced code block and a list
/// of prerequisites in place of a single string.
pub fn parse_draft(text: &str) -> Result<CourseDraft> {
    let trimmed = text.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    let raw: RawDraft =
        serde_json::from_str(json.trim()).context("generation reply is not a course draft")?;
    let prerequisites = match raw.prerequisites {
        Value::String(text) => text,
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => String::new(),
        other => other.to_string(),
    };

    Ok(CourseDraft {
        description: raw.description,
        prerequisites,
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
