use std::env;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

mod acquire;
mod controller;
mod export;
mod generation;
mod preview;

pub use acquire::{
    file_name_from_url, import_camera_still, import_file, import_url, validate_image,
    FetchedBytes, HttpImageFetcher, ImageFetcher, ImageSource,
};
pub use controller::{PreviewSlot, WorkspaceEngine};
pub use export::{download_file_name, download_image, ShareOutcome, ShareTarget, SystemShare};
pub use generation::{
    compose_instruction, DryrunClient, GeminiClient, GenerationClient, GenerationRequest,
};
pub use preview::{PreviewFile, PreviewStore};

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DRYRUN_MODEL: &str = "dryrun";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_APP_NAME: &str = "stagehand";

/// Engine settings, resolved once from the environment and then overridden
/// by command-line flags.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub image_proxy: Option<String>,
    pub app_name: String,
    /// `None` waits for the endpoint however long it takes.
    pub request_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
            image_proxy: None,
            app_name: DEFAULT_APP_NAME.to_string(),
            request_timeout: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY")),
            api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            model: non_empty_env("STAGEHAND_IMAGE_MODEL").unwrap_or(defaults.model),
            image_proxy: non_empty_env("STAGEHAND_IMAGE_PROXY"),
            app_name: defaults.app_name,
            request_timeout: defaults.request_timeout,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.map(|value| value.trim().to_string()) {
            if !model.is_empty() {
                self.model = model;
            }
        }
        self
    }

    pub fn with_image_proxy(mut self, proxy: Option<String>) -> Self {
        if proxy.is_some() {
            self.image_proxy = proxy;
        }
        self
    }

    pub fn with_app_name(mut self, app_name: Option<String>) -> Self {
        if let Some(app_name) = app_name.filter(|value| !value.trim().is_empty()) {
            self.app_name = app_name.trim().to_string();
        }
        self
    }

    pub fn with_request_timeout(mut self, seconds: Option<f64>) -> Self {
        if let Some(seconds) = seconds.filter(|value| value.is_finite() && *value > 0.0) {
            self.request_timeout = Some(Duration::from_secs_f64(seconds));
        }
        self
    }
}

/// Builds the client named by `config.model`.
pub fn build_generation_client(config: &EngineConfig) -> anyhow::Result<Box<dyn GenerationClient>> {
    if config.model.trim().eq_ignore_ascii_case(DRYRUN_MODEL) {
        return Ok(Box::new(DryrunClient));
    }
    Ok(Box::new(GeminiClient::new(config)?))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}
