use crate::error::ReasoningError;
use futures::future::{BoxFuture, FutureExt};
use rig::client::{completion::CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::message::{ImageMediaType, Message, MimeType, UserContent};
use rig::providers::openai;
use rig::OneOrMany;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: 0.2,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Base64 media parsed from a `data:<mime>;base64,<payload>` URI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub mime_type: String,
    pub data: String,
}

impl MediaPayload {
    pub fn from_data_uri(uri: &str) -> Result<Self, ReasoningError> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| ReasoningError::InvalidMedia("expected a data: URI".into()))?;
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| ReasoningError::InvalidMedia("missing ',' separator".into()))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| ReasoningError::InvalidMedia("payload must be base64".into()))?;

        if !mime_type.contains('/') {
            return Err(ReasoningError::InvalidMedia(format!("bad mime type '{mime_type}'")));
        }
        if data.trim().is_empty() {
            return Err(ReasoningError::InvalidMedia("empty payload".into()));
        }

        Ok(Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        })
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReasoningRequest {
    pub preamble: String,
    pub prompt: String,
    pub media: Vec<MediaPayload>,
}

impl ReasoningRequest {
    pub fn new(preamble: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            preamble: preamble.into(),
            prompt: prompt.into(),
            media: Vec::new(),
        }
    }

    pub fn with_media(mut self, media: MediaPayload) -> Self {
        self.media.push(media);
        self
    }
}

/// The hosted model, reached through one request/response call.
pub trait ReasoningService: Send + Sync {
    fn complete<'a>(
        &'a self,
        request: &'a ReasoningRequest,
    ) -> BoxFuture<'a, Result<String, ReasoningError>>;
}

/// OpenAI backend through rig. Images travel as base64 content parts;
/// other media kinds are rejected before any network call.
pub struct OpenAiReasoner {
    client: openai::Client,
    config: LlmConfig,
}

impl OpenAiReasoner {
    pub fn new(config: LlmConfig) -> Result<Self, ReasoningError> {
        if config.provider.to_lowercase() != "openai" {
            return Err(ReasoningError::Config(format!(
                "unsupported llm provider '{}'",
                config.provider
            )));
        }

        let client = if config.api_key_env == "OPENAI_API_KEY" {
            openai::Client::from_env()
        } else {
            let api_key = std::env::var(&config.api_key_env)
                .map_err(|_| ReasoningError::Config(format!("missing env var {}", config.api_key_env)))?;
            openai::Client::new(&api_key)
                .map_err(|e| ReasoningError::Config(format!("openai client error: {e}")))?
        };

        Ok(Self { client, config })
    }
}

impl ReasoningService for OpenAiReasoner {
    fn complete<'a>(
        &'a self,
        request: &'a ReasoningRequest,
    ) -> BoxFuture<'a, Result<String, ReasoningError>> {
        async move {
            let message = user_message(request)?;
            let agent = self
                .client
                .agent(&self.config.model)
                .preamble(&request.preamble)
                .temperature(self.config.temperature)
                .build();

            let out: Result<String, _> = agent.prompt(message).await;
            out.map_err(|e| classify_failure(&e.to_string()))
        }
        .boxed()
    }
}

/// Prompt text followed by one image part per attachment.
fn user_message(request: &ReasoningRequest) -> Result<Message, ReasoningError> {
    let mut content = OneOrMany::one(UserContent::text(request.prompt.as_str()));
    for media in &request.media {
        let media_type = ImageMediaType::from_mime_type(&media.mime_type)
            .ok_or_else(|| ReasoningError::UnsupportedMedia(media.mime_type.clone()))?;
        content.push(UserContent::image_base64(media.data.as_str(), Some(media_type), None));
    }
    Ok(Message::User { content })
}

fn classify_failure(message: &str) -> ReasoningError {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("quota") || lower.contains("rate limit") {
        ReasoningError::Quota(message.to_string())
    } else if lower.contains("http")
        || lower.contains("connect")
        || lower.contains("request")
        || lower.contains("timed out")
    {
        ReasoningError::Transport(message.to_string())
    } else {
        ReasoningError::InvalidResponse(message.to_string())
    }
}

/// Per-attempt timeout plus exactly one retry on transient failures.
#[derive(Clone)]
pub struct ResilientReasoner {
    inner: Arc<dyn ReasoningService>,
    timeout: Duration,
}

impl ResilientReasoner {
    pub fn new(inner: Arc<dyn ReasoningService>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn attempt(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        match tokio::time::timeout(self.timeout, self.inner.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ReasoningError::Timeout(self.timeout.as_secs())),
        }
    }
}

impl ReasoningService for ResilientReasoner {
    fn complete<'a>(
        &'a self,
        request: &'a ReasoningRequest,
    ) -> BoxFuture<'a, Result<String, ReasoningError>> {
        async move {
            match self.attempt(request).await {
                Err(err) if err.is_transient() => {
                    warn!(error = %err, "reasoning call failed, retrying once");
                    self.attempt(request).await
                }
                other => other,
            }
        }
        .boxed()
    }
}

/// Sends `task` with the JSON schema of `T` attached and parses the reply.
pub async fn ask_structured<T>(
    service: &dyn ReasoningService,
    preamble: &str,
    task: &str,
    media: Vec<MediaPayload>,
) -> Result<T, ReasoningError>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = serde_json::to_string(&schemars::schema_for!(T))
        .map_err(|e| ReasoningError::InvalidResponse(e.to_string()))?;
    let prompt = format!("{task}\n\nReturn JSON only, matching this schema:\n{schema}");

    let request = media
        .into_iter()
        .fold(ReasoningRequest::new(preamble, prompt), ReasoningRequest::with_media);
    let raw = service.complete(&request).await?;
    debug!(bytes = raw.len(), "structured reply received");
    parse_json_reply(&raw)
}

/// Parses a JSON object out of a model reply, tolerating a Markdown fence.
pub fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> Result<T, ReasoningError> {
    let trimmed = raw.trim();
    let body = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start <= end => &trimmed[start..=end],
        _ => trimmed,
    };
    serde_json::from_str(body).map_err(|e| ReasoningError::InvalidResponse(format!("invalid json reply: {e}")))
}
