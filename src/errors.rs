use thiserror::Error;

/// Failure taxonomy for calls against the Lardi web API.
///
/// `AuthExpired` is only ever seen inside the client's retry strategy; by the
/// time an error reaches a caller it has either been recovered or promoted to
/// `AuthFailure`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session rejected by the Lardi API")]
    AuthExpired,
    #[error("session could not be recovered after a cookie refresh")]
    AuthFailure,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    MalformedResponse(String),
}

impl ApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::AuthExpired | ApiError::AuthFailure)
    }

    /// Short text shown to a user during interactive actions. Raw error
    /// detail stays in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            ApiError::AuthExpired | ApiError::AuthFailure => {
                "⚠️ Не вдалося авторизуватися на Lardi-Trans. Спробуйте пізніше."
            }
            ApiError::Network(_) | ApiError::Http { .. } => {
                "⚠️ Lardi-Trans не відповідає. Спробуйте ще раз."
            }
            ApiError::MalformedResponse(_) => {
                "⚠️ Отримано неочікувану відповідь від Lardi-Trans."
            }
        }
    }
}
