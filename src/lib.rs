//! SmaRta client core
//!
//! Session and note synchronization for the SmaRta notes app on top of
//! Supabase (auth, database, storage and realtime), plus the small proxy
//! that relays assistant chats to a hosted LLM.
//!
//! ```no_run
//! use std::sync::Arc;
//! use smarta::prelude::*;
//!
//! # async fn run() -> Result<(), Error> {
//! let backend = SupabaseBackend::from_env()?;
//! let store = SessionStore::new(Arc::new(backend));
//! store.initialize().await;
//!
//! if store.identity().is_none() {
//!     store.sign_in("a@b.com", "longenough1").await?;
//! }
//! store.save_note(Note::new("Groceries", "milk, eggs", NoteType::Text)).await?;
//! # Ok(())
//! # }
//! ```

pub mod assistant;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod postgrest;
pub mod realtime;
pub mod storage;
pub mod store;

/// A convenience module for common imports
pub mod prelude {
    pub use crate::backend::{Backend, SupabaseBackend};
    pub use crate::config::{ClientOptions, SupabaseConfig};
    pub use crate::error::Error;
    pub use crate::models::{Note, NoteType, Profile, ProfileUpdate, UploadFile, UploadedFile};
    pub use crate::store::{LifecycleState, SessionSnapshot, SessionStore, SignUpOutcome};
}
