use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::json;

use crate::auth::{Auth, AuthResponse, User};
use crate::backend::Backend;
use crate::config::{ClientOptions, SupabaseConfig};
use crate::error::Error;
use crate::models::{Note, NoteRow, Profile, ProfileUpdate, UploadFile, UploadedFile};
use crate::postgrest::{Filterable, PostgrestClient};
use crate::realtime::{PostgresChanges, RealtimeClient, Subscription};
use crate::storage::{FileObject, FileOptions, ListOptions, StorageClient};

/// [`Backend`] backed by a Supabase project
pub struct SupabaseBackend {
    /// The base URL for the Supabase project
    url: String,
    /// The anonymous API key for the Supabase project
    key: String,
    /// HTTP client shared by every service client
    http_client: Client,
    /// Auth client, owner of the current session
    auth: Auth,
    options: ClientOptions,
}

impl SupabaseBackend {
    /// Create a backend for the given project
    ///
    /// # Example
    ///
    /// ```
    /// use smarta::backend::SupabaseBackend;
    /// use smarta::config::{ClientOptions, SupabaseConfig};
    ///
    /// let backend = SupabaseBackend::new(
    ///     SupabaseConfig::new("https://your-project-url.supabase.co", "your-anon-key"),
    ///     ClientOptions::default(),
    /// )
    /// .unwrap();
    /// ```
    pub fn new(config: SupabaseConfig, options: ClientOptions) -> Result<Self, Error> {
        let http_client = options.http_client()?;
        let auth = Auth::new(&config.url, &config.anon_key, http_client.clone(), options.clone());

        Ok(Self {
            url: config.url,
            key: config.anon_key,
            http_client,
            auth,
            options,
        })
    }

    /// Configure from `SUPABASE_URL`, `SUPABASE_ANON_KEY` and `SMARTA_SESSION_FILE`
    pub fn from_env() -> Result<Self, Error> {
        Self::new(SupabaseConfig::from_env()?, ClientOptions::from_env())
    }

    /// Get a reference to the auth client
    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    async fn bearer(&self) -> String {
        self.auth
            .access_token()
            .await
            .unwrap_or_else(|| self.key.clone())
    }

    /// Database client for `table`, authorized as the current user
    pub async fn from(&self, table: &str) -> PostgrestClient {
        let token = self.bearer().await;
        PostgrestClient::new(&self.url, &self.key, &token, table, self.http_client.clone())
    }

    /// Storage client, authorized as the current user
    pub async fn storage(&self) -> StorageClient {
        let token = self.bearer().await;
        StorageClient::new(&self.url, &self.key, &token, self.http_client.clone())
    }

    /// Realtime client for change subscriptions
    pub fn realtime(&self) -> RealtimeClient {
        RealtimeClient::new(&self.url, &self.key)
    }
}

#[async_trait]
impl Backend for SupabaseBackend {
    async fn current_user(&self) -> Result<Option<User>, Error> {
        self.auth.restore_session().await
    }

    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<AuthResponse, Error> {
        self.auth
            .sign_up(email, password, json!({ "full_name": full_name }))
            .await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, Error> {
        Ok(self.auth.sign_in(email, password).await?.user)
    }

    async fn sign_out(&self) -> Result<(), Error> {
        self.auth.sign_out().await
    }

    async fn reset_password(&self, email: &str) -> Result<(), Error> {
        self.auth.reset_password_for_email(email).await
    }

    async fn create_profile(&self, profile: &Profile) -> Result<(), Error> {
        self.from(&self.options.profiles_table)
            .await
            .insert(profile)
            .execute_no_return()
            .await
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, Error> {
        self.from(&self.options.profiles_table)
            .await
            .select("*")
            .eq("id", user_id)
            .execute_one::<Profile>()
            .await
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<(), Error> {
        self.from(&self.options.profiles_table)
            .await
            .update(update)
            .eq("id", user_id)
            .execute_no_return()
            .await
    }

    async fn upsert_notes(&self, user_id: &str, notes: &[Note]) -> Result<(), Error> {
        let rows: Vec<NoteRow<'_>> = notes.iter().map(|note| NoteRow { note, user_id }).collect();
        debug!("upserting {} note(s) for {}", rows.len(), user_id);

        self.from(&self.options.notes_table)
            .await
            .upsert(rows)
            .on_conflict("id")
            .execute_no_return()
            .await
    }

    async fn fetch_notes(&self, user_id: &str) -> Result<Vec<Note>, Error> {
        self.from(&self.options.notes_table)
            .await
            .select("*")
            .eq("user_id", user_id)
            .order("updated_at", false)
            .execute::<Note>()
            .await
    }

    async fn delete_notes(&self, user_id: &str, ids: &[String]) -> Result<(), Error> {
        let query = self.from(&self.options.notes_table).await.delete();
        let query = match ids {
            [id] => query.eq("id", id),
            _ => query.in_list("id", ids),
        };

        query.eq("user_id", user_id).execute_no_return().await
    }

    async fn upload_file(&self, path: &str, file: UploadFile) -> Result<UploadedFile, Error> {
        let storage = self.storage().await;
        let bucket = storage.from(&self.options.storage_bucket);

        let options = match file.content_type.as_deref() {
            Some(content_type) => FileOptions::default().with_content_type(content_type),
            None => FileOptions::default(),
        };
        bucket.upload(path, file.bytes, options).await?;

        Ok(UploadedFile {
            path: path.to_string(),
            public_url: bucket.get_public_url(path),
        })
    }

    async fn remove_files(&self, paths: &[String]) -> Result<(), Error> {
        let storage = self.storage().await;
        storage
            .from(&self.options.storage_bucket)
            .remove(paths)
            .await?;
        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<FileObject>, Error> {
        let storage = self.storage().await;
        storage
            .from(&self.options.storage_bucket)
            .list(prefix, ListOptions::default())
            .await
    }

    async fn subscribe_notes(&self, user_id: &str) -> Result<Subscription, Error> {
        let token = self.auth.access_token().await.ok_or(Error::NotAuthenticated)?;
        let changes = PostgresChanges::new(&self.options.db_schema, &self.options.notes_table)
            .eq("user_id", user_id);

        self.realtime()
            .subscribe("notes_changes", changes, &token)
            .await
    }

    async fn ping(&self) -> Result<(), Error> {
        self.from(&self.options.profiles_table)
            .await
            .select("count")
            .limit(1)
            .execute::<serde_json::Value>()
            .await?;
        Ok(())
    }
}
