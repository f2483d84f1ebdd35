pub mod gemini;
pub mod openai;
pub mod retry;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use retry::RetryPolicy;

use crate::utils::error::DocCrewError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(alias = "gpt")]
    OpenAi,
    #[serde(alias = "google")]
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = DocCrewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "gpt" => Ok(ProviderKind::OpenAi),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            other => Err(DocCrewError::InvalidConfigValueError {
                field: "provider".to_string(),
                value: other.to_string(),
                reason: "Supported providers: openai, gemini".to_string(),
            }),
        }
    }
}
