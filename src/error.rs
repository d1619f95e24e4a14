//! Error taxonomy for query strategies.
//!
//! Every strategy validates its configuration and inputs at the top of `query` /
//! `update` and reports the first problem found. Nothing is validated at
//! construction time.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Broad class of a [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The parameter is of the wrong kind (e.g. an unknown distance function).
    Type,
    /// The parameter has the right kind but an invalid value.
    Value,
    /// The request asks for more items than are available.
    Capacity,
    /// The classifier or scorer collaborator failed.
    Classifier,
}

/// Errors raised by query strategies.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("invalid type for `{param}`: {reason}")]
    InvalidType { param: &'static str, reason: String },

    #[error("invalid value for `{param}`: {reason}")]
    InvalidValue { param: &'static str, reason: String },

    #[error("batch size {requested} exceeds the {available} available candidates")]
    CapacityExceeded { requested: usize, available: usize },

    #[error("classifier failure: {0}")]
    Classifier(String),
}

impl QueryError {
    pub(crate) fn invalid_type(param: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidType {
            param,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_value(param: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            param,
            reason: reason.into(),
        }
    }

    /// Which class of failure this is.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidType { .. } => ErrorKind::Type,
            Self::InvalidValue { .. } => ErrorKind::Value,
            Self::CapacityExceeded { .. } => ErrorKind::Capacity,
            Self::Classifier(_) => ErrorKind::Classifier,
        }
    }

    /// Name of the offending parameter, when the error is about one.
    pub fn param(&self) -> Option<&'static str> {
        match self {
            Self::InvalidType { param, .. } | Self::InvalidValue { param, .. } => Some(param),
            Self::CapacityExceeded { .. } => Some("batch_size"),
            Self::Classifier(_) => None,
        }
    }
}
