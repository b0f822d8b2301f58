use thiserror::Error;

/// Reasons a report candidate is rejected before anything is stored.
///
/// These are user-correctable and never retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {value:?}")]
    InvalidEnum { field: &'static str, value: String },

    #[error("Not a number for {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Value out of range: {field}")]
    OutOfRange { field: &'static str },
}

impl ValidationError {
    /// Name of the offending field, for inline display next to the input.
    pub fn field(&self) -> &'static str {
        match self {
            Self::MissingField(field) => field,
            Self::InvalidEnum { field, .. } => field,
            Self::InvalidNumber { field, .. } => field,
            Self::OutOfRange { field } => field,
        }
    }
}
