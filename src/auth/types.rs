//! Types for authentication and user management

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::auth::Session;
use crate::error::Error;

/// Result of a sign-up call.
///
/// GoTrue answers with a full session when the project auto-confirms new
/// accounts, and with the bare user object when an email confirmation is
/// still pending.
#[derive(Debug, Clone)]
pub struct AuthResponse {
    /// The user data, if an account was created
    pub user: Option<User>,

    /// The session data, if one was granted
    pub session: Option<Session>,
}

impl AuthResponse {
    /// Interpret a raw GoTrue sign-up response body
    pub fn from_value(value: serde_json::Value) -> Result<Self, Error> {
        if value.get("access_token").is_some() {
            let session = serde_json::from_value::<Session>(value)?.with_expiry();
            return Ok(Self {
                user: Some(session.user.clone()),
                session: Some(session),
            });
        }

        if let Some(user) = value.get("user").filter(|u| !u.is_null()) {
            let user = serde_json::from_value::<User>(user.clone())?;
            let session = match value.get("session").filter(|s| !s.is_null()) {
                Some(session) => Some(serde_json::from_value::<Session>(session.clone())?.with_expiry()),
                None => None,
            };
            return Ok(Self {
                user: Some(user),
                session,
            });
        }

        if value.get("id").is_some() {
            return Ok(Self {
                user: Some(serde_json::from_value::<User>(value)?),
                session: None,
            });
        }

        Ok(Self {
            user: None,
            session: None,
        })
    }
}

/// User data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// The user ID
    pub id: String,

    /// The user's email address
    #[serde(default)]
    pub email: Option<String>,

    /// The user's phone number
    #[serde(default)]
    pub phone: Option<String>,

    /// The app metadata
    #[serde(default)]
    pub app_metadata: HashMap<String, serde_json::Value>,

    /// The user metadata (`full_name`, `avatar_url`, ...)
    #[serde(default)]
    pub user_metadata: HashMap<String, serde_json::Value>,

    /// When the email was confirmed
    #[serde(default)]
    pub email_confirmed_at: Option<String>,

    /// The user's role
    #[serde(default)]
    pub role: Option<String>,

    /// The creation time
    #[serde(default)]
    pub created_at: Option<String>,

    /// The update time
    #[serde(default)]
    pub updated_at: Option<String>,
}

