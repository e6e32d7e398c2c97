//! Error taxonomy for pushgate.
//!
//! Per-commit failures (oracle errors, bad rule patterns) never show up here:
//! they are folded into the result tree. A [`GateError`] means evaluation as a
//! whole could not run and the hook falls back to accepting the push.

/// Failures of the external query oracle. Always degraded to "no results".
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("query timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("query oracle unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Failed(String),
}

/// Top-level pushgate errors.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("settings parse error: {0}")]
    SettingsParse(#[from] toml::de::Error),

    #[error("change set lookup failed for {ref_id}: {reason}")]
    ChangeSets { ref_id: String, reason: String },

    #[error("user directory error: {0}")]
    Directory(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pushgate operations.
pub type Result<T> = std::result::Result<T, GateError>;
