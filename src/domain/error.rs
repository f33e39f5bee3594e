//! Domain error types.

/// Failure reported by a single source adapter.
///
/// These never reach callers of the orchestrator directly; they are
/// retried, recorded on the source state, and folded into
/// [`EtfDeskError::DataUnavailable`] once every source is exhausted.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("source returned no rows")]
    Empty,

    #[error("{0}")]
    Other(String),
}

/// Top-level error type for etfdesk.
#[derive(Debug, thiserror::Error)]
pub enum EtfDeskError {
    #[error("data unavailable for {request}: all sources exhausted ({})", attempts.join("; "))]
    DataUnavailable {
        request: String,
        attempts: Vec<String>,
    },

    #[error("validation error: {reason}")]
    Validation { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("calculation error: {reason}")]
    Calculation { reason: String },

    #[error("corrupted cache entry {key}: {reason}")]
    CacheCorruption { key: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EtfDeskError {
    pub fn validation(reason: impl Into<String>) -> Self {
        EtfDeskError::Validation {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        EtfDeskError::Configuration {
            reason: reason.into(),
        }
    }

    pub fn calculation(reason: impl Into<String>) -> Self {
        EtfDeskError::Calculation {
            reason: reason.into(),
        }
    }
}

impl From<&EtfDeskError> for std::process::ExitCode {
    fn from(err: &EtfDeskError) -> Self {
        let code: u8 = match err {
            EtfDeskError::Io(_) | EtfDeskError::Serialization(_) => 1,
            EtfDeskError::ConfigParse { .. }
            | EtfDeskError::ConfigInvalid { .. }
            | EtfDeskError::Configuration { .. } => 2,
            EtfDeskError::DataUnavailable { .. } => 3,
            EtfDeskError::Validation { .. } => 4,
            EtfDeskError::Calculation { .. } => 5,
            EtfDeskError::CacheCorruption { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
