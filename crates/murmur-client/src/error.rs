use validator::ValidationErrors;

use murmur_types::api::{FieldError, field_errors};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Rejected by the local schema check, or by the server's.
    #[error("validation failed: {}", describe(.0))]
    Validation(Vec<FieldError>),

    /// Any other non-2xx response, with the server's `message`.
    #[error("{status}: {message}")]
    Api { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("not signed in")]
    NotSignedIn,

    #[error("no user or channel selected")]
    NothingSelected,
}

impl From<ValidationErrors> for ClientError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(field_errors(&errors))
    }
}

fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.path, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}
