use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocCrewError {
    #[error("Document packaging failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Missing required fields: {}", .fields.join(", "))]
    MissingFields { fields: Vec<String> },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("{provider} request failed{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    ProviderError {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Tool '{tool}' failed: {message}")]
    ToolError { tool: String, message: String },

    #[error("Task '{task}' failed: {details}")]
    TaskError { task: String, details: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Network,
    Processing,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// 警告，流程被略過但不算失敗
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// 程式結束碼
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorSeverity::Low => 0,      // 警告，但成功
            ErrorSeverity::Medium => 2,   // 可重試的錯誤
            ErrorSeverity::High => 1,     // 處理錯誤
            ErrorSeverity::Critical => 3, // 系統錯誤
        }
    }
}

impl DocCrewError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DocCrewError::ConfigError { .. }
            | DocCrewError::ConfigValidationError { .. }
            | DocCrewError::InvalidConfigValueError { .. }
            | DocCrewError::MissingConfigError { .. }
            | DocCrewError::TomlError(_) => ErrorCategory::Configuration,
            DocCrewError::MissingFields { .. } | DocCrewError::ValidationError { .. } => {
                ErrorCategory::Input
            }
            DocCrewError::HttpError(_) | DocCrewError::ProviderError { .. } => {
                ErrorCategory::Network
            }
            DocCrewError::ToolError { .. }
            | DocCrewError::TaskError { .. }
            | DocCrewError::CsvError(_)
            | DocCrewError::SerializationError(_) => ErrorCategory::Processing,
            DocCrewError::IoError(_) | DocCrewError::ZipError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DocCrewError::MissingFields { .. } => ErrorSeverity::Low,
            DocCrewError::HttpError(_) => ErrorSeverity::Medium,
            DocCrewError::ProviderError { .. } if self.is_retryable() => ErrorSeverity::Medium,
            DocCrewError::IoError(_) | DocCrewError::ZipError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// 是否值得重試 (逾時、限流、伺服器錯誤)
    pub fn is_retryable(&self) -> bool {
        match self {
            DocCrewError::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            DocCrewError::ProviderError { status, .. } => {
                matches!(status, Some(408 | 429 | 500..=599))
            }
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            DocCrewError::MissingFields { .. } => {
                "Fill in every required field (title, client, description, dates, budget, SOW type) and run again"
            }
            DocCrewError::MissingConfigError { .. } => {
                "Set the missing value in your .env file, environment, or config TOML"
            }
            DocCrewError::ConfigError { .. }
            | DocCrewError::ConfigValidationError { .. }
            | DocCrewError::InvalidConfigValueError { .. }
            | DocCrewError::TomlError(_) => "Check the configuration file syntax and values",
            DocCrewError::ValidationError { .. } => "Correct the input values and try again",
            DocCrewError::HttpError(_) => "Check network connectivity and the API base URL",
            DocCrewError::ProviderError { status: Some(401 | 403), .. } => {
                "Verify the API key for the selected model provider"
            }
            DocCrewError::ProviderError { .. } => {
                "Retry later or switch model; check provider status and rate limits"
            }
            DocCrewError::ToolError { .. } => "Check the tool configuration and its API key",
            DocCrewError::TaskError { .. } => "Inspect the task log above and the agent's model settings",
            DocCrewError::CsvError(_) | DocCrewError::SerializationError(_) => {
                "Report this issue with the generated output attached"
            }
            DocCrewError::IoError(_) | DocCrewError::ZipError(_) => {
                "Check that the output directory exists and is writable"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            DocCrewError::MissingFields { fields } => {
                format!("Please fill in all fields before generating the SOW (missing: {})", fields.join(", "))
            }
            DocCrewError::ProviderError { provider, status, .. } => match status {
                Some(code) => format!("The {} model service returned HTTP {}", provider, code),
                None => format!("The {} model service could not be reached", provider),
            },
            DocCrewError::TaskError { task, .. } => format!("Crew stopped at task '{}'", task),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DocCrewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_is_low_severity() {
        let err = DocCrewError::MissingFields {
            fields: vec!["Budget".to_string(), "Client Name".to_string()],
        };
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert_eq!(err.category(), ErrorCategory::Input);
        assert_eq!(err.severity().exit_code(), 0);
        assert!(err.to_string().contains("Budget, Client Name"));
    }

    #[test]
    fn test_provider_error_retryability() {
        let throttled = DocCrewError::ProviderError {
            provider: "openai".to_string(),
            status: Some(429),
            message: "rate limited".to_string(),
        };
        assert!(throttled.is_retryable());
        assert_eq!(throttled.severity(), ErrorSeverity::Medium);

        for status in [408, 500, 507, 599] {
            let err = DocCrewError::ProviderError {
                provider: "gemini".to_string(),
                status: Some(status),
                message: String::new(),
            };
            assert!(err.is_retryable(), "HTTP {} should be retried", status);
        }

        let unauthorized = DocCrewError::ProviderError {
            provider: "openai".to_string(),
            status: Some(401),
            message: "bad key".to_string(),
        };
        assert!(!unauthorized.is_retryable());
        assert_eq!(unauthorized.severity(), ErrorSeverity::High);
        assert!(unauthorized.recovery_suggestion().contains("API key"));
        assert!(unauthorized.to_string().contains("HTTP 401"));
    }
}
