//! The operations the session store needs from its backend

mod supabase;

use async_trait::async_trait;

use crate::auth::{AuthResponse, User};
use crate::error::Error;
use crate::models::{Note, Profile, ProfileUpdate, UploadFile, UploadedFile};
use crate::realtime::Subscription;
use crate::storage::FileObject;

pub use supabase::SupabaseBackend;

/// Authentication, tables, object storage and change notifications.
///
/// Every call that touches user data is scoped by `user_id`; the backend is
/// expected to enforce the same scoping on its side.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The user of a still-valid existing session, if any
    async fn current_user(&self) -> Result<Option<User>, Error>;

    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<AuthResponse, Error>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, Error>;

    async fn sign_out(&self) -> Result<(), Error>;

    async fn reset_password(&self, email: &str) -> Result<(), Error>;

    async fn create_profile(&self, profile: &Profile) -> Result<(), Error>;

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, Error>;

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<(), Error>;

    /// Insert-or-update keyed by note id
    async fn upsert_notes(&self, user_id: &str, notes: &[Note]) -> Result<(), Error>;

    /// All of the user's notes, most recently updated first
    async fn fetch_notes(&self, user_id: &str) -> Result<Vec<Note>, Error>;

    async fn delete_notes(&self, user_id: &str, ids: &[String]) -> Result<(), Error>;

    async fn upload_file(&self, path: &str, file: UploadFile) -> Result<UploadedFile, Error>;

    async fn remove_files(&self, paths: &[String]) -> Result<(), Error>;

    async fn list_files(&self, prefix: &str) -> Result<Vec<FileObject>, Error>;

    /// Change notifications for the user's notes
    async fn subscribe_notes(&self, user_id: &str) -> Result<Subscription, Error>;

    /// Cheap round trip to check the backend is reachable
    async fn ping(&self) -> Result<(), Error>;
}
