//! Session and data store
//!
//! [`SessionStore`] owns who is signed in and the data they currently see.
//! Every mutation goes through the [`Backend`] first; the local mirror is only
//! updated once the backend has confirmed the call. Views observe the store
//! through [`SessionStore::subscribe`].

use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::Backend;
use crate::error::Error;
use crate::models::{self, Note, Profile, ProfileUpdate, UploadFile, UploadedFile};
use crate::storage::FileObject;

const DEFAULT_UPLOAD_FOLDER: &str = "uploads";

/// Where the store is in its initialization lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// `initialize` has not been called yet
    #[default]
    Uninitialized,
    /// Waiting for the backend to report an existing session
    Loading,
    /// A user is signed in
    Authenticated,
    /// Nobody is signed in
    Anonymous,
}

/// Everything a view can observe about the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub state: LifecycleState,
    /// Id of the signed-in user
    pub identity: Option<String>,
    pub profile: Option<Profile>,
    /// Most recently updated first
    pub notes: Vec<Note>,
}

impl SessionSnapshot {
    fn anonymous() -> Self {
        Self {
            state: LifecycleState::Anonymous,
            ..Default::default()
        }
    }
}

/// Successful outcomes of [`SessionStore::sign_up`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The backend granted a session; the user is signed in
    SignedIn,
    /// The account exists but the email address must be confirmed first
    ConfirmationPending,
}

/// The signed-in user's identity, profile and notes
pub struct SessionStore {
    backend: Arc<dyn Backend>,
    state: watch::Sender<SessionSnapshot>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self { backend, state }
    }

    /// Receive a new snapshot after every change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// A copy of the current state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.state.borrow().state
    }

    /// Id of the signed-in user, if any
    pub fn identity(&self) -> Option<String> {
        self.state.borrow().identity.clone()
    }

    /// Restore an existing session, if the backend still has a valid one.
    ///
    /// Never fails: any error is logged and the store ends up anonymous.
    pub async fn initialize(&self) {
        self.state.send_modify(|s| s.state = LifecycleState::Loading);

        match self.backend.current_user().await {
            Ok(Some(user)) => {
                info!("restored session for user {}", user.id);
                self.establish(&user.id).await;
            }
            Ok(None) => {
                debug!("no existing session");
                self.state.send_replace(SessionSnapshot::anonymous());
            }
            Err(err) => {
                warn!("failed to restore session: {}", err);
                self.state.send_replace(SessionSnapshot::anonymous());
            }
        }
    }

    /// Create an account and its profile row.
    pub async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<SignUpOutcome, Error> {
        require_fields(&[email, password, full_name])?;

        let response = self
            .backend
            .sign_up(email, password, full_name)
            .await
            .map_err(|err| logged("sign up", err))?;

        if let Some(user) = &response.user {
            let profile = Profile::new(&user.id, full_name, email);
            if let Err(err) = self.backend.create_profile(&profile).await {
                warn!("failed to create profile for {}: {}", user.id, err);
            }
        }

        match response.session {
            Some(session) => {
                self.establish(&session.user.id).await;
                Ok(SignUpOutcome::SignedIn)
            }
            None => {
                info!("sign up for {} awaits email confirmation", email);
                Ok(SignUpOutcome::ConfirmationPending)
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), Error> {
        require_fields(&[email, password])?;

        let user = self
            .backend
            .sign_in(email, password)
            .await
            .map_err(|err| logged("sign in", err))?;

        self.establish(&user.id).await;
        Ok(())
    }

    /// Sign out. Local state is cleared even when the backend call fails.
    pub async fn sign_out(&self) -> Result<(), Error> {
        let result = self.backend.sign_out().await;
        self.state.send_replace(SessionSnapshot::anonymous());

        match result {
            Ok(()) | Err(Error::NotAuthenticated) => Ok(()),
            Err(err) => Err(logged("sign out", err)),
        }
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), Error> {
        require_fields(&[email])?;
        self.backend
            .reset_password(email)
            .await
            .map_err(|err| logged("password reset", err))
    }

    /// Check that the backend is reachable.
    pub async fn test_connection(&self) -> Result<(), Error> {
        self.backend
            .ping()
            .await
            .map_err(|err| logged("connection test", err))
    }

    /// Upsert a note and mirror it locally.
    ///
    /// `updated_at` is stamped with the current time, never earlier than the
    /// copy already held. Returns the note as saved.
    pub async fn save_note(&self, note: Note) -> Result<Note, Error> {
        let user_id = self.require_identity()?;

        let mut note = note;
        let previous = self.held_updated_at(&note.id);
        note.touch(Utc::now(), previous);

        self.backend
            .upsert_notes(&user_id, std::slice::from_ref(&note))
            .await
            .map_err(|err| logged("save note", err))?;

        let saved = note.clone();
        self.apply_for(&user_id, |s| reconcile_notes(&mut s.notes, vec![saved]));
        Ok(note)
    }

    /// Batch form of [`SessionStore::save_note`]
    pub async fn save_notes(&self, notes: Vec<Note>) -> Result<Vec<Note>, Error> {
        let user_id = self.require_identity()?;
        if notes.is_empty() {
            return Ok(notes);
        }

        let now = Utc::now();
        let notes: Vec<Note> = notes
            .into_iter()
            .map(|mut note| {
                let previous = self.held_updated_at(&note.id);
                note.touch(now, previous);
                note
            })
            .collect();

        self.backend
            .upsert_notes(&user_id, &notes)
            .await
            .map_err(|err| logged("save notes", err))?;

        let saved = notes.clone();
        self.apply_for(&user_id, |s| reconcile_notes(&mut s.notes, saved));
        Ok(notes)
    }

    pub async fn delete_note(&self, id: &str) -> Result<(), Error> {
        self.delete_notes(&[id.to_string()]).await
    }

    pub async fn delete_notes(&self, ids: &[String]) -> Result<(), Error> {
        let user_id = self.require_identity()?;
        if ids.is_empty() {
            return Ok(());
        }

        self.backend
            .delete_notes(&user_id, ids)
            .await
            .map_err(|err| logged("delete notes", err))?;

        self.apply_for(&user_id, |s| s.notes.retain(|n| !ids.contains(&n.id)));
        Ok(())
    }

    /// Replace the local notes with the backend's full result set.
    pub async fn load_notes(&self) -> Result<Vec<Note>, Error> {
        let user_id = self.require_identity()?;

        let notes = self
            .backend
            .fetch_notes(&user_id)
            .await
            .map_err(|err| logged("load notes", err))?;

        let loaded = notes.clone();
        self.apply_for(&user_id, |s| s.notes = loaded);
        Ok(notes)
    }

    /// Send a partial profile update, then merge it into the local profile.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, Error> {
        let user_id = self.require_identity()?;
        let mut profile = self.state.borrow().profile.clone().ok_or(Error::ProfileMissing)?;
        if update.is_empty() {
            return Ok(profile);
        }

        self.backend
            .update_profile(&user_id, &update)
            .await
            .map_err(|err| logged("update profile", err))?;

        profile.apply(&update);
        let merged = profile.clone();
        self.apply_for(&user_id, |s| {
            if let Some(current) = s.profile.as_mut() {
                current.apply(&update);
            } else {
                s.profile = Some(merged);
            }
        });
        Ok(profile)
    }

    /// Upload into `<identity>/<folder>/`, `uploads` by default.
    pub async fn upload_file(&self, file: UploadFile, folder: Option<&str>) -> Result<UploadedFile, Error> {
        let user_id = self.require_identity()?;
        let folder = folder.filter(|f| !f.is_empty()).unwrap_or(DEFAULT_UPLOAD_FOLDER);
        let path = models::storage_path(&user_id, folder, &file.name, Utc::now().timestamp_millis());

        debug!("uploading {} ({} bytes) to {}", file.name, file.bytes.len(), path);
        self.backend
            .upload_file(&path, file)
            .await
            .map_err(|err| logged("upload file", err))
    }

    /// Remove one of the signed-in user's files.
    pub async fn delete_file(&self, path: &str) -> Result<(), Error> {
        let user_id = self.require_identity()?;
        if !models::owned_by(path, &user_id) {
            return Err(Error::validation(format!("{} does not belong to the current user", path)));
        }

        self.backend
            .remove_files(&[path.to_string()])
            .await
            .map_err(|err| logged("delete file", err))
    }

    /// List files under `<identity>/<folder>`, or `<identity>/` itself.
    pub async fn list_user_files(&self, folder: Option<&str>) -> Result<Vec<FileObject>, Error> {
        let user_id = self.require_identity()?;
        let prefix = match folder {
            Some(folder) if !folder.is_empty() => format!("{}/{}", user_id, folder),
            _ => format!("{}/", user_id),
        };

        self.backend
            .list_files(&prefix)
            .await
            .map_err(|err| logged("list files", err))
    }

    /// Reload notes whenever the backend reports a change to them.
    ///
    /// The watch ends when the returned handle is dropped or the user changes.
    pub async fn watch_notes(self: &Arc<Self>) -> Result<NotesWatch, Error> {
        let user_id = self.require_identity()?;
        let mut subscription = self
            .backend
            .subscribe_notes(&user_id)
            .await
            .map_err(|err| logged("subscribe to notes", err))?;

        let store = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(change) = subscription.next().await {
                if store.identity().as_deref() != Some(user_id.as_str()) {
                    break;
                }
                debug!("{:?} on {}, reloading notes", change.kind, change.table);
                if let Err(err) = store.load_notes().await {
                    warn!("failed to reload notes after change: {}", err);
                }
            }
            debug!("notes watch for {} ended", user_id);
        });

        Ok(NotesWatch { task })
    }

    fn require_identity(&self) -> Result<String, Error> {
        self.identity().ok_or(Error::NotAuthenticated)
    }

    fn held_updated_at(&self, id: &str) -> Option<chrono::DateTime<Utc>> {
        self.state
            .borrow()
            .notes
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.updated_at)
    }

    // Mutate the state only if `user_id` is still the signed-in user.
    fn apply_for(&self, user_id: &str, f: impl FnOnce(&mut SessionSnapshot)) -> bool {
        let applied = self.state.send_if_modified(|s| {
            if s.identity.as_deref() == Some(user_id) {
                f(s);
                true
            } else {
                false
            }
        });
        if !applied {
            debug!("discarding result for {}, user changed", user_id);
        }
        applied
    }

    async fn establish(&self, user_id: &str) {
        self.state.send_replace(SessionSnapshot {
            state: LifecycleState::Authenticated,
            identity: Some(user_id.to_string()),
            profile: None,
            notes: Vec::new(),
        });

        match self.backend.fetch_profile(user_id).await {
            Ok(profile) => {
                self.apply_for(user_id, |s| s.profile = profile);
            }
            Err(err) => error!("failed to load profile for {}: {}", user_id, err),
        }

        match self.backend.fetch_notes(user_id).await {
            Ok(notes) => {
                self.apply_for(user_id, |s| s.notes = notes);
            }
            Err(err) => error!("failed to load notes for {}: {}", user_id, err),
        }
    }
}

/// Handle for a running [`SessionStore::watch_notes`] task
pub struct NotesWatch {
    task: JoinHandle<()>,
}

impl NotesWatch {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for NotesWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Merge saved notes into `notes`: a known id is replaced where it stands,
/// new ids go to the front in the order given.
pub fn reconcile_notes(notes: &mut Vec<Note>, saved: Vec<Note>) {
    let mut fresh = Vec::new();
    for note in saved {
        match notes.iter_mut().find(|n| n.id == note.id) {
            Some(existing) => *existing = note,
            None => match fresh.iter_mut().find(|n: &&mut Note| n.id == note.id) {
                Some(existing) => *existing = note,
                None => fresh.push(note),
            },
        }
    }
    notes.splice(0..0, fresh);
}

fn require_fields(fields: &[&str]) -> Result<(), Error> {
    if fields.iter().any(|f| f.trim().is_empty()) {
        return Err(Error::validation("Please fill in all fields"));
    }
    Ok(())
}

fn logged(action: &str, err: Error) -> Error {
    warn!("{} failed: {}", action, err);
    err
}
