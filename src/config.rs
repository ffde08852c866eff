//! Configuration options for the SmaRta client

use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// Connection settings for the Supabase project
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// The base URL for the Supabase project
    pub url: String,

    /// The anonymous (public) API key
    pub anon_key: String,
}

impl SupabaseConfig {
    pub fn new(url: &str, anon_key: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    /// Read `SUPABASE_URL` and `SUPABASE_ANON_KEY`, honouring a `.env` file.
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();

        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| Error::general("SUPABASE_URL must be set"))?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| Error::general("SUPABASE_ANON_KEY must be set"))?;

        Ok(Self::new(&url, &anon_key))
    }
}

/// Configuration options for the SmaRta client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Whether to refresh an expired session before using it
    pub auto_refresh_token: bool,

    /// Where to keep the auth session between runs, if anywhere
    pub session_file: Option<PathBuf>,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// The table holding notes
    pub notes_table: String,

    /// The table holding user profiles
    pub profiles_table: String,

    /// The storage bucket for user uploads
    pub storage_bucket: String,

    /// The database schema watched by realtime
    pub db_schema: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auto_refresh_token: true,
            session_file: None,
            request_timeout: Some(Duration::from_secs(30)),
            notes_table: "notes".to_string(),
            profiles_table: "profiles".to_string(),
            storage_bucket: "user-files".to_string(),
            db_schema: "public".to_string(),
        }
    }
}

impl ClientOptions {
    /// Defaults, with the session file taken from `SMARTA_SESSION_FILE` when set.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let options = Self::default();
        match std::env::var("SMARTA_SESSION_FILE") {
            Ok(path) if !path.is_empty() => options.with_session_file(path),
            _ => options,
        }
    }

    /// Set whether to automatically refresh the token
    pub fn with_auto_refresh_token(mut self, value: bool) -> Self {
        self.auto_refresh_token = value;
        self
    }

    /// Persist the session to the given file
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the notes table
    pub fn with_notes_table(mut self, value: &str) -> Self {
        self.notes_table = value.to_string();
        self
    }

    /// Set the profiles table
    pub fn with_profiles_table(mut self, value: &str) -> Self {
        self.profiles_table = value.to_string();
        self
    }

    /// Set the storage bucket
    pub fn with_storage_bucket(mut self, value: &str) -> Self {
        self.storage_bucket = value.to_string();
        self
    }

    /// Set the database schema
    pub fn with_db_schema(mut self, value: &str) -> Self {
        self.db_schema = value.to_string();
        self
    }

    /// Build the shared HTTP client for these options
    pub(crate) fn http_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}
