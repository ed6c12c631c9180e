//! Domain error types.
//!
//! `InsufficientData` is the only variant callers are expected to branch on:
//! it means "no answer yet" and containers use it to leave a child out of the
//! current round. Everything else is a genuine failure.

#[derive(Debug, thiserror::Error)]
pub enum HorseError {
    #[error("insufficient data: {reason}")]
    InsufficientData { reason: String },

    #[error("temporal error: {reason}")]
    Temporal { reason: String },

    #[error("invalid coefficients: {reason}")]
    InvalidCoefficients { reason: String },

    #[error("invalid period: {reason}")]
    InvalidPeriod { reason: String },

    #[error("malformed indicator {indicator}: {reason}")]
    MalformedIndicator { indicator: String, reason: String },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("feed error: {reason}")]
    Feed { reason: String },

    #[error("snapshot error: {reason}")]
    Snapshot { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HorseError {
    pub fn insufficient(reason: impl Into<String>) -> Self {
        HorseError::InsufficientData {
            reason: reason.into(),
        }
    }

    pub fn temporal(reason: impl Into<String>) -> Self {
        HorseError::Temporal {
            reason: reason.into(),
        }
    }

    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, HorseError::InsufficientData { .. })
    }
}

impl From<&HorseError> for std::process::ExitCode {
    fn from(err: &HorseError) -> Self {
        let code: u8 = match err {
            HorseError::Io(_) => 1,
            HorseError::ConfigParse { .. }
            | HorseError::ConfigMissing { .. }
            | HorseError::ConfigInvalid { .. } => 2,
            HorseError::Database { .. } | HorseError::DatabaseQuery { .. } => 3,
            HorseError::InvalidCoefficients { .. }
            | HorseError::InvalidPeriod { .. }
            | HorseError::MalformedIndicator { .. }
            | HorseError::InvalidArgument { .. } => 4,
            HorseError::InsufficientData { .. } => 5,
            HorseError::Temporal { .. } => 6,
            HorseError::Feed { .. } | HorseError::Snapshot { .. } => 7,
        };
        std::process::ExitCode::from(code)
    }
}
