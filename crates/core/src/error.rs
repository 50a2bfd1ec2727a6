use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VigilError {
    #[error("invalid resource identifier '{id}': {reason}")]
    InvalidResourceId { id: String, reason: String },

    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("malformed rule '{rule_id}': {reason}")]
    MalformedRule { rule_id: String, reason: String },

    #[error("invalid cadence: '{0}'")]
    InvalidCadence(String),

    #[error("credential error: {0}")]
    Credential(String),
}

impl VigilError {
    pub(crate) fn invalid_id(id: &str, reason: impl Into<String>) -> Self {
        VigilError::InvalidResourceId {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}
