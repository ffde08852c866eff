//! Error handling for the SmaRta client

use std::fmt;
use thiserror::Error;

/// Unified error type for the SmaRta client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A backend endpoint answered with a non-success status
    #[error("Request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    /// Authentication errors, classified from the backend message
    #[error("Authentication error: {0}")]
    Auth(AuthFailure),

    /// Database query errors
    #[error("Database error: {0}")]
    Database(String),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Realtime subscription errors
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Upstream LLM errors
    #[error("{0}")]
    Assistant(String),

    /// Input rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation needs a signed-in user
    #[error("User not authenticated")]
    NotAuthenticated,

    /// The operation needs a loaded profile
    #[error("No profile loaded for the current user")]
    ProfileMissing,

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO errors (session persistence)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Create a new authentication error from a backend message
    pub fn auth<T: fmt::Display>(msg: T) -> Self {
        Error::Auth(AuthFailure::classify(msg.to_string()))
    }

    /// Create a new database error
    pub fn database<T: fmt::Display>(msg: T) -> Self {
        Error::Database(msg.to_string())
    }

    /// Create a new realtime error
    pub fn realtime<T: fmt::Display>(msg: T) -> Self {
        Error::Realtime(msg.to_string())
    }

    /// Create a new assistant error
    pub fn assistant<T: fmt::Display>(msg: T) -> Self {
        Error::Assistant(msg.to_string())
    }

    /// Create a new validation error
    pub fn validation<T: fmt::Display>(msg: T) -> Self {
        Error::Validation(msg.to_string())
    }

    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// The message a view should show for this error.
    pub fn user_message(&self) -> String {
        match self {
            Error::Auth(failure) => failure.user_message(),
            Error::Api { message, .. } => message.clone(),
            Error::Validation(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Re-tag a transport-level API error as an auth failure.
    pub(crate) fn into_auth(self) -> Self {
        match self {
            Error::Api { message, .. } => Error::auth(message),
            other => other,
        }
    }

    /// Re-tag a transport-level API error as a database error.
    pub(crate) fn into_database(self) -> Self {
        match self {
            Error::Api { message, .. } => Error::Database(message),
            other => other,
        }
    }

    /// Re-tag a transport-level API error as a storage error.
    pub(crate) fn into_storage(self) -> Self {
        match self {
            Error::Api { message, .. } => Error::Storage(message),
            other => other,
        }
    }
}

/// Known classes of authentication failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureKind {
    InvalidCredentials,
    EmailNotConfirmed,
    RateLimited,
    AlreadyRegistered,
    WeakPassword,
    InvalidEmail,
    UserNotFound,
    Other,
}

/// A backend authentication failure with its original message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub kind: AuthFailureKind,
    pub message: String,
}

impl AuthFailure {
    /// Classify a backend message by the substrings GoTrue is known to emit.
    pub fn classify(message: String) -> Self {
        let lower = message.to_lowercase();
        let kind = if lower.contains("invalid login credentials") {
            AuthFailureKind::InvalidCredentials
        } else if lower.contains("email not confirmed") {
            AuthFailureKind::EmailNotConfirmed
        } else if lower.contains("too many requests") || lower.contains("rate limit") {
            AuthFailureKind::RateLimited
        } else if lower.contains("already registered") || lower.contains("already been registered") {
            AuthFailureKind::AlreadyRegistered
        } else if lower.contains("password should be at least") {
            AuthFailureKind::WeakPassword
        } else if lower.contains("invalid email") || lower.contains("unable to validate email") {
            AuthFailureKind::InvalidEmail
        } else if lower.contains("user not found") {
            AuthFailureKind::UserNotFound
        } else {
            AuthFailureKind::Other
        };

        Self { kind, message }
    }

    /// Human-readable reason for the sign-in/sign-up forms
    pub fn user_message(&self) -> String {
        match self.kind {
            AuthFailureKind::InvalidCredentials => {
                "Invalid email or password. Please check your credentials and try again.".to_string()
            }
            AuthFailureKind::EmailNotConfirmed => {
                "Please check your email and confirm your account before signing in.".to_string()
            }
            AuthFailureKind::RateLimited => {
                "Too many failed attempts. Please wait a moment before trying again.".to_string()
            }
            AuthFailureKind::AlreadyRegistered => {
                "An account with this email already exists. Please sign in instead.".to_string()
            }
            AuthFailureKind::WeakPassword => {
                "Password must be at least 6 characters long.".to_string()
            }
            AuthFailureKind::InvalidEmail => "Please enter a valid email address.".to_string(),
            AuthFailureKind::UserNotFound => {
                "No account found with this email. Please sign up first.".to_string()
            }
            AuthFailureKind::Other => self.message.clone(),
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
