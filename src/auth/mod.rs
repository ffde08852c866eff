//! Authentication against Supabase GoTrue

mod session;
mod types;

use log::{debug, info, warn};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::ClientOptions;
use crate::error::Error;
use crate::fetch::Fetch;

pub use session::*;
pub use types::*;

/// Client for Supabase Authentication
pub struct Auth {
    /// The base URL for the Supabase project
    url: String,

    /// The anonymous API key for the Supabase project
    key: String,

    /// HTTP client used for requests
    client: Client,

    /// The current session
    session: Arc<RwLock<Option<Session>>>,

    /// Client options
    options: ClientOptions,
}

impl Auth {
    /// Create a new Auth client
    pub(crate) fn new(url: &str, key: &str, client: Client, options: ClientOptions) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            client,
            session: Arc::new(RwLock::new(None)),
            options,
        }
    }

    fn get_auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.url, path)
    }

    /// Sign up a new user with email and password.
    ///
    /// `data` is stored as the user's metadata.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        data: serde_json::Value,
    ) -> Result<AuthResponse, Error> {
        let url = self.get_auth_url("/signup");

        let body = json!({
            "email": email,
            "password": password,
            "data": data,
        });

        let raw = Fetch::post(&self.client, &url)
            .header("apikey", &self.key)
            .json(&body)?
            .execute::<serde_json::Value>()
            .await
            .map_err(Error::into_auth)?;

        let result = AuthResponse::from_value(raw)?;

        // Store session if one was returned
        match result.session {
            Some(ref session) => self.store_session(Some(session.clone())).await,
            None => debug!("sign up for {} returned no session", email),
        }

        Ok(result)
    }

    /// Sign in a user with email and password
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, Error> {
        let url = self.get_auth_url("/token?grant_type=password");

        let body = json!({
            "email": email,
            "password": password,
        });

        let session = Fetch::post(&self.client, &url)
            .header("apikey", &self.key)
            .json(&body)?
            .execute::<Session>()
            .await
            .map_err(Error::into_auth)?
            .with_expiry();

        self.store_session(Some(session.clone())).await;
        Ok(session)
    }

    /// Sign out the current user.
    ///
    /// The local session is dropped even when the logout request fails.
    pub async fn sign_out(&self) -> Result<(), Error> {
        let url = self.get_auth_url("/logout");

        let token = self.access_token().await;
        self.store_session(None).await;

        let token = token.ok_or(Error::NotAuthenticated)?;
        Fetch::post(&self.client, &url)
            .api_auth(&self.key, &token)
            .execute_empty()
            .await
            .map_err(Error::into_auth)
    }

    /// Send a password reset email
    pub async fn reset_password_for_email(&self, email: &str) -> Result<(), Error> {
        let url = self.get_auth_url("/recover");

        Fetch::post(&self.client, &url)
            .header("apikey", &self.key)
            .json(&json!({ "email": email }))?
            .execute_empty()
            .await
            .map_err(Error::into_auth)
    }

    /// Get the user data for the currently authenticated user
    pub async fn get_user(&self) -> Result<User, Error> {
        self.fetch_user().await.map_err(Error::into_auth)
    }

    async fn fetch_user(&self) -> Result<User, Error> {
        let url = self.get_auth_url("/user");
        let token = self.access_token().await.ok_or(Error::NotAuthenticated)?;

        Fetch::get(&self.client, &url)
            .api_auth(&self.key, &token)
            .execute::<User>()
            .await
    }

    /// Exchange the refresh token for a new session
    pub async fn refresh_session(&self) -> Result<Session, Error> {
        self.exchange_refresh_token().await.map_err(Error::into_auth)
    }

    async fn exchange_refresh_token(&self) -> Result<Session, Error> {
        let url = self.get_auth_url("/token?grant_type=refresh_token");
        let refresh_token = self
            .get_session()
            .await
            .map(|s| s.refresh_token)
            .ok_or(Error::NotAuthenticated)?;

        let session = Fetch::post(&self.client, &url)
            .header("apikey", &self.key)
            .json(&json!({ "refresh_token": refresh_token }))?
            .execute::<Session>()
            .await?
            .with_expiry();

        self.store_session(Some(session.clone())).await;
        Ok(session)
    }

    /// Find a still-valid session: in memory first, then the session file.
    ///
    /// Expired sessions are refreshed when `auto_refresh_token` is set; a
    /// session the server no longer accepts is discarded. Outages and
    /// server errors keep the session and are returned as `Err`.
    pub async fn restore_session(&self) -> Result<Option<User>, Error> {
        let mut session = self.get_session().await;

        if session.is_none() {
            if let Some(path) = &self.options.session_file {
                session = load_session(path).await?;
                if let Some(ref restored) = session {
                    debug!("restored session for {} from {}", restored.user.id, path.display());
                    *self.session.write().await = Some(restored.clone());
                }
            }
        }

        let session = match session {
            Some(session) => session,
            None => return Ok(None),
        };

        if session.is_expired() {
            if !self.options.auto_refresh_token {
                info!("stored session expired, auto refresh disabled");
                self.store_session(None).await;
                return Ok(None);
            }
            match self.exchange_refresh_token().await {
                Ok(_) => {}
                Err(err) if rejects_session(&err, true) => {
                    info!("refresh token rejected: {}", err);
                    self.store_session(None).await;
                    return Ok(None);
                }
                Err(err) => {
                    warn!("failed to refresh expired session: {}", err);
                    return Err(err.into_auth());
                }
            }
        }

        match self.fetch_user().await {
            Ok(user) => Ok(Some(user)),
            Err(err) if rejects_session(&err, false) => {
                info!("stored session rejected: {}", err);
                self.store_session(None).await;
                Ok(None)
            }
            Err(err) => {
                warn!("could not validate stored session: {}", err);
                Err(err.into_auth())
            }
        }
    }

    /// Get the current session
    pub async fn get_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// The bearer token of the current session
    pub async fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    async fn store_session(&self, session: Option<Session>) {
        if let Some(path) = &self.options.session_file {
            let persisted = match &session {
                Some(session) => save_session(path, session).await,
                None => remove_session(path).await,
            };
            if let Err(err) = persisted {
                warn!("failed to persist session to {}: {}", path.display(), err);
            }
        }

        *self.session.write().await = session;
    }
}

/// Whether GoTrue refused the session itself rather than failing to answer.
///
/// The token endpoint answers a dead refresh token with 400 `invalid_grant`.
fn rejects_session(err: &Error, refreshing: bool) -> bool {
    match err {
        Error::Api { status: 401 | 403, .. } => true,
        Error::Api { status: 400, .. } => refreshing,
        _ => false,
    }
}
