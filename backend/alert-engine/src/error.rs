use thiserror::Error;

pub type Result<T> = std::result::Result<T, AlertError>;

#[derive(Debug, Error, Clone)]
pub enum AlertError {
    /// Malformed preference, rejected before persistence
    #[error("validation error: {0}")]
    Validation(String),

    /// Preference id not found for the user
    #[error("not found: {0}")]
    NotFound(String),

    /// Cache or store unavailable; recovered locally where possible
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// Unexpected failure inside the check battery; callers fail open
    #[error("filter evaluation error: {0}")]
    FilterEvaluation(String),

    /// Isolated per-channel delivery failure
    #[error("channel delivery error on {channel}: {reason}")]
    ChannelDelivery { channel: String, reason: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl AlertError {
    /// Whether retrying the operation could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AlertError::Infrastructure(_) | AlertError::ChannelDelivery { .. } => true,
            AlertError::Database(msg) => {
                msg.contains("PoolTimedOut") || msg.contains("PoolClosed") || msg.contains("Io")
            }
            _ => false,
        }
    }
}

impl From<sqlx::Error> for AlertError {
    fn from(e: sqlx::Error) -> Self {
        AlertError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for AlertError {
    fn from(e: serde_json::Error) -> Self {
        AlertError::Serialization(e.to_string())
    }
}

impl From<alert_cache::CacheError> for AlertError {
    fn from(e: alert_cache::CacheError) -> Self {
        AlertError::Infrastructure(e.to_string())
    }
}
