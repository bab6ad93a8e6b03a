use thiserror::Error;

/// Main error type for the BayesCV system
#[derive(Error, Debug)]
pub enum BcvError {
    #[error("Invalid dimension '{name}': {message}")]
    InvalidDimension { name: String, message: String },

    #[error("Invalid schedule: {message}")]
    InvalidSchedule { message: String },

    #[error("Invalid candidate: {message}")]
    InvalidCandidate { message: String },

    #[error("Evaluation failed for {candidate}: {message}")]
    EvaluationFailure { candidate: String, message: String },

    #[error("Estimator error: {message}")]
    Estimator { message: String },

    #[error("Search has not been fitted yet; call fit() first")]
    NotFitted,

    #[error("Surrogate model error: {message}")]
    Surrogate { message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BcvError {
    pub fn invalid_dimension(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDimension {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_schedule(message: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            message: message.into(),
        }
    }

    pub fn invalid_candidate(message: impl Into<String>) -> Self {
        Self::InvalidCandidate {
            message: message.into(),
        }
    }

    pub fn estimator(message: impl Into<String>) -> Self {
        Self::Estimator {
            message: message.into(),
        }
    }

    /// Configuration errors are raised before any evaluation and never retried.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDimension { .. } | Self::InvalidSchedule { .. } | Self::Config(_)
        )
    }
}

/// Result type alias for BayesCV operations
pub type BcvResult<T> = Result<T, BcvError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::BcvError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::BcvError::Config(format!($($arg)*))
    };
}
