use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChorusError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Discord adapter error: {0}")]
    Discord(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("Media upload error: {0}")]
    MediaUpload(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChorusError {
    /// Short machine-readable code, used in log fields and failure embeds.
    pub fn code(&self) -> &'static str {
        match self {
            ChorusError::Config(_) => "CONFIG_ERROR",
            ChorusError::Storage(_) => "STORAGE_ERROR",
            ChorusError::Discord(_) => "DISCORD_ERROR",
            ChorusError::LlmProvider(_) => "LLM_PROVIDER_ERROR",
            ChorusError::MediaUpload(_) => "MEDIA_UPLOAD_ERROR",
            ChorusError::Validation(_) => "VALIDATION_ERROR",
            ChorusError::PermissionDenied { .. } => "PERMISSION_DENIED",
            ChorusError::NotFound(_) => "NOT_FOUND",
            ChorusError::Serialization(_) => "SERIALIZATION_ERROR",
            ChorusError::Io(_) => "IO_ERROR",
            ChorusError::Timeout { .. } => "TIMEOUT",
            ChorusError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for failures that a retry/fail-over policy should treat as transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChorusError::Timeout { .. } | ChorusError::MediaUpload(_))
    }
}

pub type Result<T> = std::result::Result<T, ChorusError>;
