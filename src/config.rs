use crate::error::{AppError, Result};
use crate::types::Language;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

// ============================================================================
// Session Configuration
// ============================================================================

#[derive(Clone)]
pub struct SessionConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub language: Language,
    pub with_credentials: bool,
    /// Close a stream that delivers no bytes for this long. `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            language: Language::default(),
            with_credentials: false,
            idle_timeout: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(AppError::config("API key is empty"));
        }
        if self.model.trim().is_empty() {
            return Err(AppError::config("Model is empty"));
        }
        if !is_http_url(&self.endpoint) {
            return Err(AppError::config(format!(
                "Endpoint must be an http(s) URL: {}",
                self.endpoint
            )));
        }
        if self.idle_timeout == Some(Duration::ZERO) {
            return Err(AppError::config("Idle timeout must be greater than zero"));
        }
        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty())
}

// Keeps the key out of logs.
impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("language", &self.language)
            .field("with_credentials", &self.with_credentials)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}
