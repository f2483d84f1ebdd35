//! Provider credentials and defaults.
//!
//! Values come from an optional settings TOML, then from the process
//! environment (a `.env` file is loaded first when present). API keys from the
//! environment only fill keys the file left empty; model names and base URLs
//! from the environment win over the file.

use super::{is_unresolved, substitute_env_vars};
use crate::adapters::llm::gemini::{DEFAULT_GEMINI_MODEL, GEMINI_API_BASE};
use crate::adapters::llm::openai::{DEFAULT_OPENAI_MODEL, OPENAI_API_BASE};
use crate::adapters::llm::{GeminiProvider, OpenAiProvider, ProviderKind, RetryPolicy};
use crate::adapters::tools::{SearchBackend, SERPER_API_BASE};
use crate::domain::ports::LlmProvider;
use crate::utils::error::{DocCrewError, Result};
use crate::utils::validation::{validate_range, validate_url, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub openai: OpenAiSettings,
    pub gemini: GeminiSettings,
    pub serper: SerperSettings,
    pub retry: RetryPolicy,
    pub monitoring: MonitoringSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// SOW 產生時的 max_tokens
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_OPENAI_MODEL.to_string(),
            base_url: OPENAI_API_BASE.to_string(),
            max_tokens: 1500,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: Option<f32>,
    pub timeout_seconds: u64,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: GEMINI_API_BASE.to_string(),
            temperature: Some(0.5),
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerperSettings {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for SerperSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: SERPER_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    pub enabled: bool,
}

impl Settings {
    /// 載入 .env、設定檔 (可選) 與環境變數
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(env_file) => tracing::debug!("Loaded environment from {}", env_file.display()),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("⚠️ Failed to load .env file: {}", e),
        }

        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env_from(|name| std::env::var(name).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(DocCrewError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content);
        let mut settings: Self =
            toml::from_str(&processed).map_err(|e| DocCrewError::ConfigValidationError {
                field: "settings_toml_parsing".to_string(),
                message: format!("Settings TOML parsing error: {}", e),
            })?;
        settings.clear_unresolved_keys();
        Ok(settings)
    }

    // `${OPENAI_API_KEY}` 沒被替換時視為未設定
    fn clear_unresolved_keys(&mut self) {
        for key in [
            &mut self.openai.api_key,
            &mut self.gemini.api_key,
            &mut self.serper.api_key,
        ] {
            if key.as_deref().is_some_and(|k| k.trim().is_empty() || is_unresolved(k)) {
                *key = None;
            }
        }
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if self.openai.api_key.is_none() {
            self.openai.api_key = lookup("OPENAI_API_KEY");
        }
        if self.gemini.api_key.is_none() {
            self.gemini.api_key = lookup("GOOGLE_API_KEY").or_else(|| lookup("GEMINI_API_KEY"));
        }
        if self.serper.api_key.is_none() {
            self.serper.api_key = lookup("SERPER_API_KEY");
        }

        if let Some(model) = lookup("GPT_MODEL").or_else(|| lookup("OPENAI_MODEL_NAME")) {
            self.openai.model = model;
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.gemini.model = model;
        }
        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            self.openai.base_url = base_url;
        }
        if let Some(base_url) = lookup("GEMINI_BASE_URL") {
            self.gemini.base_url = base_url;
        }
        if let Some(base_url) = lookup("SERPER_BASE_URL") {
            self.serper.base_url = base_url;
        }
    }

    pub fn provider(&self, kind: ProviderKind) -> Result<Arc<dyn LlmProvider>> {
        match kind {
            ProviderKind::OpenAi => {
                let api_key = self.openai.api_key.clone().ok_or_else(|| DocCrewError::MissingConfigError {
                    field: "OPENAI_API_KEY".to_string(),
                })?;
                let provider = OpenAiProvider::with_timeout(
                    api_key,
                    Duration::from_secs(self.openai.timeout_seconds),
                )?
                .with_base_url(self.openai.base_url.clone())
                .with_model(self.openai.model.clone())
                .with_retry(self.retry);
                Ok(Arc::new(provider))
            }
            ProviderKind::Gemini => {
                let api_key = self.gemini.api_key.clone().ok_or_else(|| DocCrewError::MissingConfigError {
                    field: "GOOGLE_API_KEY".to_string(),
                })?;
                let provider = GeminiProvider::with_timeout(
                    api_key,
                    Duration::from_secs(self.gemini.timeout_seconds),
                )?
                .with_base_url(self.gemini.base_url.clone())
                .with_model(self.gemini.model.clone())
                .with_temperature(self.gemini.temperature)
                .with_retry(self.retry);
                Ok(Arc::new(provider))
            }
        }
    }

    pub fn search_backend(&self) -> SearchBackend {
        SearchBackend {
            api_key: self.serper.api_key.clone(),
            base_url: self.serper.base_url.clone(),
        }
    }

    /// 不含金鑰的設定摘要
    pub fn summary(&self) -> String {
        let key_state = |key: &Option<String>| if key.is_some() { "set" } else { "missing" };
        format!(
            "openai: {} ({} key), gemini: {} ({} key), serper: {} key, retries: {}",
            self.openai.model,
            key_state(&self.openai.api_key),
            self.gemini.model,
            key_state(&self.gemini.api_key),
            key_state(&self.serper.api_key),
            self.retry.max_retries
        )
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validate_url("openai.base_url", &self.openai.base_url)?;
        validate_url("gemini.base_url", &self.gemini.base_url)?;
        validate_url("serper.base_url", &self.serper.base_url)?;

        validate_range("openai.max_tokens", self.openai.max_tokens, 1, 128_000)?;
        validate_range("openai.timeout_seconds", self.openai.timeout_seconds, 1, 3_600)?;
        validate_range("gemini.timeout_seconds", self.gemini.timeout_seconds, 1, 3_600)?;
        if let Some(temperature) = self.gemini.temperature {
            validate_range("gemini.temperature", temperature, 0.0, 2.0)?;
        }
        validate_range("retry.max_retries", self.retry.max_retries, 0, 10)?;
        validate_range("retry.backoff_multiplier", self.retry.backoff_multiplier, 1.0, 10.0)?;
        validate_range("retry.max_delay_ms", self.retry.max_delay_ms, 1, 300_000)?;
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(DocCrewError::InvalidConfigValueError {
                field: "retry.initial_delay_ms".to_string(),
                value: self.retry.initial_delay_ms.to_string(),
                reason: format!("Must not exceed retry.max_delay_ms ({})", self.retry.max_delay_ms),
            });
        }

        Ok(())
    }
}
