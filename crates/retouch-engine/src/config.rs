use std::env;
use std::fmt;
use std::time::Duration;

use retouch_contracts::models::{Capability, Fallback, ModelSelector};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are the helpful assistant for the Retouch photo studio. You help users remove or replace backgrounds, create passport photos, and enhance images.";
pub const DEFAULT_GREETING: &str = "Hello! I can help you use the app, suggest background colors, or explain how the editing tools work. Ask me anything!";

#[derive(Clone)]
pub struct StudioConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub image_model: Option<String>,
    pub text_model: Option<String>,
    pub request_timeout_s: f64,
    pub system_instruction: String,
    pub greeting: Option<String>,
}

/// Concrete model names after registry resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModels {
    pub image: String,
    pub text: String,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            image_model: None,
            text_model: None,
            request_timeout_s: DEFAULT_REQUEST_TIMEOUT_S,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            greeting: Some(DEFAULT_GREETING.to_string()),
        }
    }
}

impl StudioConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();
        Self {
            api_base: non_empty("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            api_key: non_empty("GEMINI_API_KEY").or_else(|| non_empty("GOOGLE_API_KEY")),
            image_model: non_empty("RETOUCH_IMAGE_MODEL"),
            text_model: non_empty("RETOUCH_TEXT_MODEL"),
            request_timeout_s: clamp_seconds(
                non_empty("RETOUCH_REQUEST_TIMEOUT").as_deref(),
                DEFAULT_REQUEST_TIMEOUT_S,
                15.0,
                300.0,
            ),
            system_instruction: defaults.system_instruction,
            greeting: defaults.greeting,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_s.clamp(15.0, 300.0))
    }

    /// Resolves configured model names against the registry, falling back to
    /// each capability's default when a name is unknown or unsuitable.
    pub fn resolve_models(&self) -> ResolvedModels {
        let selector = ModelSelector::default();
        ResolvedModels {
            image: resolve_one(&selector, self.image_model.as_deref(), Capability::ImageEdit),
            text: resolve_one(&selector, self.text_model.as_deref(), Capability::Vision),
        }
    }
}

impl fmt::Debug for StudioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudioConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("image_model", &self.image_model)
            .field("text_model", &self.text_model)
            .field("request_timeout_s", &self.request_timeout_s)
            .finish_non_exhaustive()
    }
}

fn resolve_one(selector: &ModelSelector, requested: Option<&str>, capability: Capability) -> String {
    match selector.select(requested, capability) {
        Ok(selection) => {
            match selection.fallback {
                None | Some(Fallback::Unrequested) => {}
                Some(reason) => {
                    tracing::warn!(model = %selection.model.name, %capability, "{reason}; falling back")
                }
            }
            selection.model.name
        }
        Err(err) => {
            tracing::warn!("{err}");
            requested.unwrap_or_default().to_string()
        }
    }
}

fn clamp_seconds(raw: Option<&str>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}
