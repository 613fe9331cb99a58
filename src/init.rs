use crate::config::SessionConfig;
use crate::error::{AppError, Result};
use crate::types::Language;
use std::time::Duration;

// ============================================================================
// Logging
// ============================================================================

/// `RUST_LOG` wins; otherwise `info`.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

// ============================================================================
// Configuration
// ============================================================================

/// Build a [`SessionConfig`] from `CHAT_*` variables (`.env` is loaded first).
pub fn config_from_env() -> Result<SessionConfig> {
    dotenv::dotenv().ok();
    config_from_lookup(|key| std::env::var(key).ok())
}

fn config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<SessionConfig> {
    let api_key = lookup("CHAT_API_KEY")
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::config("CHAT_API_KEY is not set"))?;

    let mut config = SessionConfig::new(api_key);
    if let Some(model) = lookup("CHAT_MODEL") {
        config = config.with_model(model);
    }
    if let Some(endpoint) = lookup("CHAT_ENDPOINT") {
        config = config.with_endpoint(endpoint);
    }
    if let Some(language) = lookup("CHAT_LANGUAGE") {
        config = config.with_language(Language::from_code(&language));
    }
    if let Some(secs) = lookup("CHAT_IDLE_TIMEOUT_SECS") {
        let secs: u64 = secs.trim().parse().map_err(|_| {
            AppError::config(format!("CHAT_IDLE_TIMEOUT_SECS is not a number: {}", secs))
        })?;
        config = config.with_idle_timeout(Some(Duration::from_secs(secs)));
    }
    if let Some(flag) = lookup("CHAT_WITH_CREDENTIALS") {
        config = config.with_credentials(matches!(
            flag.trim().to_lowercase().as_str(),
            "1" | "true" | "yes"
        ));
    }

    config.validate()?;
    log::info!("✅ Configuration loaded: {:?}", config);
    Ok(config)
}
