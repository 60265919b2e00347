//! Asks a content-understanding model where a page keeps its chapter.
//!
//! The model sees one chunk of raw markup at a time and answers with a JSON object
//! naming three CSS selectors. Replies are often not quite JSON (fenced in markdown,
//! trailing commas, bare keys), so they go through a staged repair before parsing.
//! A chunk whose reply cannot be salvaged, or whose request fails, simply contributes
//! nothing; it never aborts the run.

use crate::cancel::CancellationToken;
use crate::error::{Result, ScanError};
use crate::selectors::SelectorSet;
use futures::stream::{self, StreamExt};
use regex::{Captures, Regex};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_CONCURRENCY: usize = 4;

const SYSTEM_PROMPT: &str = "You analyze web pages that host books or serialized stories. \
Identify the CSS selectors for the chapter title, the story content (one match per \
paragraph or image), and the control that leads to the next page. \
Reply with a single JSON object with exactly these keys: \
{\"titleSelector\": \"<CSS selector for the title>\", \
\"contentSelector\": \"<CSS selector for the content>\", \
\"nextPageSelector\": \"<CSS selector for the next page link>\"}. \
Use an empty string for anything this fragment does not show. Reply with JSON only.";

/// Narrow seam over the model: one chunk in, maybe one candidate out.
pub trait SelectorInference: Send + Sync {
    fn infer(&self, chunk: &str) -> impl Future<Output = Option<SelectorSet>> + Send;
}

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 60,
        }
    }
}

impl ModelConfig {
    /// Reads `OPENAI_API_KEY`, `FOLIO_MODEL` and `FOLIO_API_BASE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(key) = non_empty_env("OPENAI_API_KEY") {
            config.api_key = Some(key);
        }
        if let Some(model) = non_empty_env("FOLIO_MODEL") {
            config.model = model;
        }
        if let Some(base) = non_empty_env("FOLIO_API_BASE") {
            config.api_base = base;
        }
        config
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// `SelectorInference` backed by an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct OpenAiSelectorClient {
    client: Client,
    config: ModelConfig,
}

impl OpenAiSelectorClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("Folio/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self { client, config })
    }

    /// One round trip to the model. Errors here are absorbed by `infer`.
    pub async fn request_selectors(&self, chunk: &str) -> Result<SelectorSet> {
        let user_content = format!(
            "Here is a section of HTML from a page hosting a book:\n\n{}",
            chunk
        );
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_content,
                },
            ],
            temperature: 0.0,
        };

        let mut request = self.client.post(self.config.completions_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::InferenceError(format!(
                "model endpoint answered with HTTP {}",
                status.as_u16()
            )));
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        parse_selector_reply(&content)
    }
}

impl SelectorInference for OpenAiSelectorClient {
    async fn infer(&self, chunk: &str) -> Option<SelectorSet> {
        match self.request_selectors(chunk).await {
            Ok(selectors) => {
                debug!("Model suggested {:?}", selectors);
                Some(selectors)
            }
            Err(e) => {
                warn!("Selector inference failed for chunk: {}", e);
                None
            }
        }
    }
}

/// Run inference over every chunk with at most `concurrency` requests in flight.
///
/// Results come back in chunk order whatever order the requests finish in, so the
/// first-non-empty-wins merge stays deterministic. Chunks not yet started when
/// `cancel` fires are skipped and yield `None`.
pub async fn infer_chunks<I>(
    inference: &I,
    chunks: &[&str],
    concurrency: usize,
    cancel: &CancellationToken,
) -> Vec<Option<SelectorSet>>
where
    I: SelectorInference,
{
    let mut tagged: Vec<(usize, Option<SelectorSet>)> = stream::iter(chunks.iter().enumerate())
        .map(|(idx, chunk)| async move {
            if cancel.is_cancelled() {
                debug!("Skipping inference for chunk {} (cancelled)", idx);
                return (idx, None);
            }
            (idx, inference.infer(chunk).await)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    tagged.sort_by_key(|(idx, _)| *idx);
    tagged.into_iter().map(|(_, candidate)| candidate).collect()
}

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*(.*?)\s*```$").expect("fence regex is valid")
});

static TRAILING_COMMA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"|,(\s*[}\]])"#).expect("trailing comma regex is valid")
});

static BARE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"|([{,]\s*)([A-Za-z_$][A-Za-z0-9_$]*)(\s*:)"#)
        .expect("bare key regex is valid")
});

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectorReply {
    #[serde(default)]
    title_selector: Option<String>,
    #[serde(default)]
    content_selector: Option<String>,
    #[serde(default)]
    next_page_selector: Option<String>,
}

impl From<SelectorReply> for SelectorSet {
    fn from(reply: SelectorReply) -> Self {
        SelectorSet::new(
            reply.title_selector.as_deref().unwrap_or_default(),
            reply.content_selector.as_deref().unwrap_or_default(),
            reply.next_page_selector.as_deref().unwrap_or_default(),
        )
    }
}

/// Parse a model reply into a selector set, repairing it only as far as needed.
///
/// Each repair stage is tried only when the previous form failed to parse, so a reply
/// that is already valid JSON is never rewritten.
pub fn parse_selector_reply(raw: &str) -> Result<SelectorSet> {
    let mut candidate = raw.trim().to_string();
    let mut last_error = match try_parse(&candidate) {
        Ok(selectors) => return Ok(selectors),
        Err(e) => e,
    };

    let stages: [fn(&str) -> String; 3] = [strip_wrapping, drop_trailing_commas, quote_bare_keys];
    for stage in stages {
        candidate = stage(&candidate);
        match try_parse(&candidate) {
            Ok(selectors) => return Ok(selectors),
            Err(e) => last_error = e,
        }
    }

    Err(ScanError::ParseError(format!(
        "unusable selector reply ({}): {}",
        last_error,
        preview(raw)
    )))
}

fn try_parse(text: &str) -> std::result::Result<SelectorSet, serde_json::Error> {
    serde_json::from_str::<SelectorReply>(text).map(SelectorSet::from)
}

/// Remove a markdown code fence and anything outside the outermost braces.
fn strip_wrapping(text: &str) -> String {
    let text = text.trim();
    let unfenced = FENCE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str());

    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => unfenced[start..=end].to_string(),
        _ => unfenced.to_string(),
    }
}

fn drop_trailing_commas(text: &str) -> String {
    TRAILING_COMMA_RE
        .replace_all(text, |caps: &Captures| match caps.get(1) {
            Some(closing) => closing.as_str().to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn quote_bare_keys(text: &str) -> String {
    BARE_KEY_RE
        .replace_all(text, |caps: &Captures| match (caps.get(1), caps.get(2), caps.get(3)) {
            (Some(lead), Some(key), Some(colon)) => {
                format!("{}\"{}\"{}", lead.as_str(), key.as_str(), colon.as_str())
            }
            _ => caps[0].to_string(),
        })
        .into_owned()
}

fn preview(raw: &str) -> String {
    let mut preview: String = raw.chars().take(120).collect();
    if raw.chars().count() > 120 {
        preview.push('…');
    }
    preview
}
