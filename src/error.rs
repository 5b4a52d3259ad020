#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The identity provider reported a failed or aborted login attempt.
    ///
    /// Terminal for the request: the caller must handle this before any
    /// further use of the session.
    #[error("login rejected by identity provider: {0}")]
    Login(String),

    /// `user()` was called on an anonymous session. Check `is_logged_in()` first.
    #[error("user is not logged in")]
    NotLoggedIn,

    /// A group operation was attempted before `set_service_account()`.
    #[error("service account credentials have not been configured")]
    ServiceAccountMissing,

    /// The authenticated identity carries no email claim to query the
    /// directory with.
    #[error("identity has no email claim")]
    MissingEmail,

    /// An upstream endpoint returned a non-success status.
    #[error("{operation} failed: {detail}")]
    Provider {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token error: {0}")]
    Token(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    Config(String),
}
