/// Rejection of malformed input at the relay boundary, before any credential
/// lookup or upstream call happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} must be a date formatted as YYYY-MM-DD, got '{value}'")]
    InvalidDate { field: &'static str, value: String },

    #[error("{field} is not a valid email address: '{value}'")]
    InvalidEmail { field: &'static str, value: String },

    #[error("contract.end_date ({end}) is before contract.start_date ({start})")]
    EndBeforeStart { start: String, end: String },

    #[error("invalid arguments: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
