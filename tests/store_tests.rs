use async_trait::async_trait;
use serde_json::json;
use smarta::auth::{AuthResponse, Session, User};
use smarta::backend::Backend;
use smarta::error::{AuthFailureKind, Error};
use smarta::models::{Note, NoteType, Profile, ProfileUpdate, UploadFile, UploadedFile};
use smarta::realtime::{ChangeKind, PostgresChange, Subscription};
use smarta::storage::FileObject;
use smarta::store::{LifecycleState, SessionStore, SignUpOutcome};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

struct Account {
    id: String,
    password: String,
    confirmed: bool,
}

/// State behind the in-memory backend
#[derive(Default)]
struct World {
    accounts: HashMap<String, Account>,
    auto_confirm: bool,
    current: Option<String>,
    profiles: HashMap<String, Profile>,
    notes: Vec<(String, Note)>,
    files: Vec<String>,
    listed_prefixes: Vec<String>,
    calls: Vec<String>,
    fail_sign_out: bool,
    fail_writes: bool,
    fail_restore: bool,
    restore_delay: Option<Duration>,
    /// Upsert latency keyed by note content
    write_delays: HashMap<String, Duration>,
    changes: Option<mpsc::Sender<PostgresChange>>,
}

#[derive(Default)]
struct FakeBackend {
    world: Mutex<World>,
}

impl FakeBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with(setup: impl FnOnce(&mut World)) -> Arc<Self> {
        let backend = Self::default();
        setup(&mut backend.world());
        Arc::new(backend)
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap()
    }

    fn record(&self, call: &str) {
        self.world().calls.push(call.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.world().calls.clone()
    }

    fn add_account(&self, email: &str, password: &str, id: &str) {
        self.world().accounts.insert(
            email.to_string(),
            Account {
                id: id.to_string(),
                password: password.to_string(),
                confirmed: true,
            },
        );
    }

    fn confirm(&self, email: &str) {
        if let Some(account) = self.world().accounts.get_mut(email) {
            account.confirmed = true;
        }
    }

    fn stored_notes(&self, user_id: &str) -> Vec<Note> {
        self.world()
            .notes
            .iter()
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, note)| note.clone())
            .collect()
    }
}

fn user(id: &str, email: &str) -> User {
    serde_json::from_value(json!({ "id": id, "email": email })).unwrap()
}

fn session_for(user: &User) -> Session {
    serde_json::from_value(json!({
        "access_token": "access",
        "refresh_token": "refresh",
        "expires_in": 3600,
        "user": user
    }))
    .unwrap()
}

#[async_trait]
impl Backend for FakeBackend {
    async fn current_user(&self) -> Result<Option<User>, Error> {
        self.record("current_user");
        let delay = self.world().restore_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let world = self.world();
        if world.fail_restore {
            return Err(Error::general("network unreachable"));
        }
        Ok(world.current.as_deref().map(|id| user(id, "")))
    }

    async fn sign_up(&self, email: &str, password: &str, _full_name: &str) -> Result<AuthResponse, Error> {
        self.record("sign_up");
        let mut world = self.world();
        if world.accounts.contains_key(email) {
            return Err(Error::auth("User already registered"));
        }

        let id = format!("user-{}", world.accounts.len() + 1);
        let confirmed = world.auto_confirm;
        world.accounts.insert(
            email.to_string(),
            Account {
                id: id.clone(),
                password: password.to_string(),
                confirmed,
            },
        );

        let created = user(&id, email);
        if confirmed {
            world.current = Some(id);
            Ok(AuthResponse {
                session: Some(session_for(&created)),
                user: Some(created),
            })
        } else {
            Ok(AuthResponse {
                user: Some(created),
                session: None,
            })
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, Error> {
        self.record("sign_in");
        let mut world = self.world();
        let id = match world.accounts.get(email) {
            Some(account) if account.password != password => {
                return Err(Error::auth("Invalid login credentials"))
            }
            Some(account) if !account.confirmed => return Err(Error::auth("Email not confirmed")),
            Some(account) => account.id.clone(),
            None => return Err(Error::auth("Invalid login credentials")),
        };

        world.current = Some(id.clone());
        Ok(user(&id, email))
    }

    async fn sign_out(&self) -> Result<(), Error> {
        self.record("sign_out");
        let mut world = self.world();
        world.current = None;
        if world.fail_sign_out {
            return Err(Error::Api {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn reset_password(&self, _email: &str) -> Result<(), Error> {
        self.record("reset_password");
        Ok(())
    }

    async fn create_profile(&self, profile: &Profile) -> Result<(), Error> {
        self.record("create_profile");
        self.world().profiles.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, Error> {
        self.record("fetch_profile");
        Ok(self.world().profiles.get(user_id).cloned())
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<(), Error> {
        self.record("update_profile");
        if let Some(profile) = self.world().profiles.get_mut(user_id) {
            profile.apply(update);
        }
        Ok(())
    }

    async fn upsert_notes(&self, user_id: &str, notes: &[Note]) -> Result<(), Error> {
        self.record("upsert_notes");
        let delay = {
            let world = self.world();
            if world.fail_writes {
                return Err(Error::database("new row violates row-level security policy"));
            }
            notes
                .first()
                .and_then(|n| world.write_delays.get(&n.content))
                .copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut world = self.world();
        for note in notes {
            match world.notes.iter_mut().find(|(_, n)| n.id == note.id) {
                Some((_, existing)) => *existing = note.clone(),
                None => world.notes.push((user_id.to_string(), note.clone())),
            }
        }
        Ok(())
    }

    async fn fetch_notes(&self, user_id: &str) -> Result<Vec<Note>, Error> {
        self.record("fetch_notes");
        let mut notes = self.stored_notes(user_id);
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(notes)
    }

    async fn delete_notes(&self, user_id: &str, ids: &[String]) -> Result<(), Error> {
        self.record("delete_notes");
        let mut world = self.world();
        if world.fail_writes {
            return Err(Error::database("permission denied"));
        }
        world
            .notes
            .retain(|(owner, note)| owner != user_id || !ids.contains(&note.id));
        Ok(())
    }

    async fn upload_file(&self, path: &str, _file: UploadFile) -> Result<UploadedFile, Error> {
        self.record("upload_file");
        self.world().files.push(path.to_string());
        Ok(UploadedFile {
            path: path.to_string(),
            public_url: format!("https://cdn.test/user-files/{}", path),
        })
    }

    async fn remove_files(&self, paths: &[String]) -> Result<(), Error> {
        self.record("remove_files");
        self.world().files.retain(|f| !paths.contains(f));
        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<FileObject>, Error> {
        self.record("list_files");
        // Direct children only; nested paths show up as their folder
        let mut world = self.world();
        world.listed_prefixes.push(prefix.to_string());
        let dir = format!("{}/", prefix.trim_end_matches('/'));
        let mut names: Vec<String> = Vec::new();
        for file in world.files.iter() {
            if let Some(rest) = file.strip_prefix(&dir) {
                let name = rest.split('/').next().unwrap_or(rest).to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Ok(names
            .into_iter()
            .map(|name| serde_json::from_value(json!({ "name": name })).unwrap())
            .collect())
    }

    async fn subscribe_notes(&self, _user_id: &str) -> Result<Subscription, Error> {
        self.record("subscribe_notes");
        let (tx, rx) = mpsc::channel(8);
        self.world().changes = Some(tx);
        Ok(Subscription::from_receiver(rx))
    }

    async fn ping(&self) -> Result<(), Error> {
        self.record("ping");
        Ok(())
    }
}

async fn signed_in_store(backend: &Arc<FakeBackend>) -> SessionStore {
    backend.add_account("a@b.com", "longenough1", "u1");
    let store = SessionStore::new(backend.clone());
    store.sign_in("a@b.com", "longenough1").await.unwrap();
    store
}

fn note(id: &str, title: &str, content: &str) -> Note {
    let mut note = Note::new(title, content, NoteType::Text);
    note.id = id.to_string();
    note
}

#[tokio::test]
async fn test_initialize_without_session_is_anonymous() {
    let backend = FakeBackend::with(|w| w.restore_delay = Some(Duration::from_millis(50)));
    let store = Arc::new(SessionStore::new(backend.clone()));
    assert_eq!(store.lifecycle(), LifecycleState::Uninitialized);

    let init = tokio::spawn({
        let store = store.clone();
        async move { store.initialize().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.lifecycle(), LifecycleState::Loading);

    init.await.unwrap();
    let snapshot = store.snapshot();
    assert_eq!(snapshot.state, LifecycleState::Anonymous);
    assert!(snapshot.identity.is_none());
    assert!(snapshot.notes.is_empty());
}

#[tokio::test]
async fn test_initialize_restores_session_and_loads_data() {
    let backend = FakeBackend::with(|w| {
        w.current = Some("u1".to_string());
        w.profiles.insert("u1".to_string(), Profile::new("u1", "Ada", "a@b.com"));
        w.notes.push(("u1".to_string(), note("n1", "T", "")));
        w.notes.push(("u2".to_string(), note("n2", "other", "")));
    });
    let store = SessionStore::new(backend.clone());

    store.initialize().await;

    let snapshot = store.snapshot();
    assert_eq!(snapshot.state, LifecycleState::Authenticated);
    assert_eq!(snapshot.identity.as_deref(), Some("u1"));
    assert_eq!(snapshot.profile.map(|p| p.full_name), Some("Ada".to_string()));
    assert_eq!(snapshot.notes.len(), 1);
    assert_eq!(snapshot.notes[0].id, "n1");
}

#[tokio::test]
async fn test_initialize_failure_is_anonymous() {
    let backend = FakeBackend::with(|w| w.fail_restore = true);
    let store = SessionStore::new(backend);

    store.initialize().await;

    assert_eq!(store.lifecycle(), LifecycleState::Anonymous);
    assert!(store.identity().is_none());
}

#[tokio::test]
async fn test_sign_up_confirmation_then_sign_in_and_save() {
    let backend = FakeBackend::new();
    let store = SessionStore::new(backend.clone());
    store.initialize().await;

    let outcome = store.sign_up("a@b.com", "longenough1", "Ada").await.unwrap();
    assert_eq!(outcome, SignUpOutcome::ConfirmationPending);
    assert!(store.identity().is_none());
    assert!(backend.world().profiles.contains_key("user-1"));

    // Not confirmed yet
    let err = store.sign_in("a@b.com", "longenough1").await.unwrap_err();
    match err {
        Error::Auth(failure) => assert_eq!(failure.kind, AuthFailureKind::EmailNotConfirmed),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.identity().is_none());

    backend.confirm("a@b.com");
    store.sign_in("a@b.com", "longenough1").await.unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.state, LifecycleState::Authenticated);
    assert_eq!(snapshot.identity.as_deref(), Some("user-1"));
    assert!(snapshot.notes.is_empty());
    assert_eq!(snapshot.profile.map(|p| p.full_name), Some("Ada".to_string()));

    store.save_note(note("n1", "T", "first")).await.unwrap();
    let loaded = store.load_notes().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, "n1");
}

#[tokio::test]
async fn test_sign_up_with_session_signs_in() {
    let backend = FakeBackend::with(|w| w.auto_confirm = true);
    let store = SessionStore::new(backend.clone());

    let outcome = store.sign_up("a@b.com", "longenough1", "Ada").await.unwrap();

    assert_eq!(outcome, SignUpOutcome::SignedIn);
    assert_eq!(store.identity().as_deref(), Some("user-1"));
    assert_eq!(store.lifecycle(), LifecycleState::Authenticated);
    assert!(store.snapshot().profile.is_some());
}

#[tokio::test]
async fn test_duplicate_sign_up_is_classified() {
    let backend = FakeBackend::new();
    backend.add_account("a@b.com", "longenough1", "u1");
    let store = SessionStore::new(backend);

    let err = store.sign_up("a@b.com", "longenough1", "Ada").await.unwrap_err();

    match err {
        Error::Auth(failure) => {
            assert_eq!(failure.kind, AuthFailureKind::AlreadyRegistered);
            assert!(failure.user_message().contains("already exists"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_blank_credentials_make_no_backend_call() {
    let backend = FakeBackend::new();
    let store = SessionStore::new(backend.clone());

    assert!(matches!(store.sign_in("", "secret").await, Err(Error::Validation(_))));
    assert!(matches!(store.sign_in("a@b.com", " ").await, Err(Error::Validation(_))));
    assert!(matches!(
        store.sign_up("a@b.com", "longenough1", "").await,
        Err(Error::Validation(_))
    ));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_wrong_password_is_invalid_credentials() {
    let backend = FakeBackend::new();
    backend.add_account("a@b.com", "longenough1", "u1");
    let store = SessionStore::new(backend);

    let err = store.sign_in("a@b.com", "wrong").await.unwrap_err();

    assert_eq!(
        err.user_message(),
        "Invalid email or password. Please check your credentials and try again."
    );
    assert!(store.identity().is_none());
}

#[tokio::test]
async fn test_sign_out_clears_state_even_when_backend_fails() {
    let backend = FakeBackend::new();
    let store = signed_in_store(&backend).await;
    store.save_note(note("n1", "T", "")).await.unwrap();
    backend.world().fail_sign_out = true;

    let result = store.sign_out().await;

    assert!(result.is_err());
    let snapshot = store.snapshot();
    assert_eq!(snapshot.state, LifecycleState::Anonymous);
    assert!(snapshot.identity.is_none());
    assert!(snapshot.profile.is_none());
    assert!(snapshot.notes.is_empty());
}

#[tokio::test]
async fn test_save_note_is_idempotent() {
    let backend = FakeBackend::new();
    let store = signed_in_store(&backend).await;
    let draft = note("n1", "T", "body");

    let first = store.save_note(draft.clone()).await.unwrap();
    let second = store.save_note(draft).await.unwrap();

    let notes = store.snapshot().notes;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0], second);
    assert!(second.updated_at >= first.updated_at);
    assert_eq!(backend.stored_notes("u1"), vec![second]);
}

#[tokio::test]
async fn test_save_keeps_position_and_prepends_new_ids() {
    let backend = FakeBackend::new();
    let store = signed_in_store(&backend).await;
    store
        .save_notes(vec![note("a", "A", ""), note("b", "B", "")])
        .await
        .unwrap();

    store.save_note(note("b", "B2", "")).await.unwrap();
    store.save_note(note("c", "C", "")).await.unwrap();

    let notes = store.snapshot().notes;
    let ids: Vec<&str> = notes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, ["c", "a", "b"]);
    assert_eq!(notes[2].title, "B2");
}

#[tokio::test]
async fn test_failed_save_changes_nothing_locally() {
    let backend = FakeBackend::new();
    let store = signed_in_store(&backend).await;
    store.save_note(note("n1", "T", "")).await.unwrap();
    backend.world().fail_writes = true;

    let result = store.save_note(note("n1", "changed", "")).await;

    assert!(matches!(result, Err(Error::Database(_))));
    assert_eq!(store.snapshot().notes[0].title, "T");
}

#[tokio::test]
async fn test_deleted_note_does_not_come_back_on_load() {
    let backend = FakeBackend::new();
    let store = signed_in_store(&backend).await;
    store
        .save_notes(vec![note("n1", "one", ""), note("n2", "two", "")])
        .await
        .unwrap();

    store.delete_note("n1").await.unwrap();
    assert!(store.snapshot().notes.iter().all(|n| n.id != "n1"));

    let loaded = store.load_notes().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, "n2");
}

#[tokio::test]
async fn test_operations_without_identity_make_no_backend_call() {
    let backend = FakeBackend::new();
    let store = SessionStore::new(backend.clone());
    store.initialize().await;
    let before = backend.calls();

    let file = UploadFile {
        name: "scan.pdf".to_string(),
        bytes: vec![1, 2, 3],
        content_type: Some("application/pdf".to_string()),
    };
    assert!(matches!(store.upload_file(file, None).await, Err(Error::NotAuthenticated)));
    assert!(matches!(store.delete_file("u1/uploads/1.pdf").await, Err(Error::NotAuthenticated)));
    assert!(matches!(store.list_user_files(None).await, Err(Error::NotAuthenticated)));
    assert!(matches!(store.save_note(note("n1", "T", "")).await, Err(Error::NotAuthenticated)));
    assert!(matches!(store.delete_note("n1").await, Err(Error::NotAuthenticated)));
    assert!(matches!(store.load_notes().await, Err(Error::NotAuthenticated)));
    assert!(matches!(
        store.update_profile(ProfileUpdate::default()).await,
        Err(Error::NotAuthenticated)
    ));

    assert_eq!(backend.calls(), before);
}

#[tokio::test]
async fn test_update_profile_merges_locally() {
    let backend = FakeBackend::new();
    backend
        .world()
        .profiles
        .insert("u1".to_string(), Profile::new("u1", "Ada", "a@b.com"));
    let store = signed_in_store(&backend).await;

    let update = ProfileUpdate {
        bio: Some("Mathematician".to_string()),
        ..Default::default()
    };
    let profile = store.update_profile(update).await.unwrap();

    assert_eq!(profile.full_name, "Ada");
    assert_eq!(profile.bio.as_deref(), Some("Mathematician"));
    assert_eq!(store.snapshot().profile, Some(profile));
}

#[tokio::test]
async fn test_empty_profile_update_skips_backend() {
    let backend = FakeBackend::new();
    backend
        .world()
        .profiles
        .insert("u1".to_string(), Profile::new("u1", "Ada", "a@b.com"));
    let store = signed_in_store(&backend).await;

    let profile = store.update_profile(ProfileUpdate::default()).await.unwrap();

    assert_eq!(profile.full_name, "Ada");
    assert!(!backend.calls().contains(&"update_profile".to_string()));
}

#[tokio::test]
async fn test_update_profile_without_profile_fails() {
    let backend = FakeBackend::new();
    let store = signed_in_store(&backend).await;

    let result = store.update_profile(ProfileUpdate::default()).await;

    assert!(matches!(result, Err(Error::ProfileMissing)));
    assert!(!backend.calls().contains(&"update_profile".to_string()));
}

#[tokio::test]
async fn test_files_live_under_the_identity_prefix() {
    let backend = FakeBackend::new();
    let store = signed_in_store(&backend).await;

    let uploaded = store
        .upload_file(
            UploadFile {
                name: "memo.m4a".to_string(),
                bytes: vec![0; 16],
                content_type: Some("audio/mp4".to_string()),
            },
            Some("audio"),
        )
        .await
        .unwrap();
    assert!(uploaded.path.starts_with("u1/audio/"));
    assert!(uploaded.path.ends_with(".m4a"));

    let in_folder = store.list_user_files(Some("audio")).await.unwrap();
    assert_eq!(in_folder.len(), 1);
    let root: Vec<String> = store
        .list_user_files(None)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(root, ["audio"]);
    assert_eq!(backend.world().listed_prefixes, ["u1/audio", "u1/"]);

    store.delete_file(&uploaded.path).await.unwrap();
    assert!(store.list_user_files(Some("audio")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_file_rejects_foreign_paths() {
    let backend = FakeBackend::new();
    let store = signed_in_store(&backend).await;

    let result = store.delete_file("u2/uploads/1.pdf").await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(!backend.calls().contains(&"remove_files".to_string()));
}

#[tokio::test]
async fn test_concurrent_saves_follow_completion_order() {
    let backend = FakeBackend::with(|w| {
        w.write_delays.insert("slow".to_string(), Duration::from_millis(80));
        w.write_delays.insert("fast".to_string(), Duration::from_millis(5));
    });
    let store = signed_in_store(&backend).await;

    // Issued first, completes last
    let (slow, fast) = tokio::join!(
        store.save_note(note("n1", "T", "slow")),
        store.save_note(note("n1", "T", "fast")),
    );
    slow.unwrap();
    fast.unwrap();

    let persisted = backend.stored_notes("u1");
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].content, "slow");
    let local = store.snapshot().notes;
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].content, "slow");
}

#[tokio::test]
async fn test_save_completing_after_sign_out_is_discarded() {
    let backend = FakeBackend::with(|w| {
        w.write_delays.insert("late".to_string(), Duration::from_millis(50));
    });
    let store = Arc::new(signed_in_store(&backend).await);

    let save = tokio::spawn({
        let store = store.clone();
        async move { store.save_note(note("n1", "T", "late")).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    store.sign_out().await.unwrap();

    save.await.unwrap().unwrap();
    assert!(store.snapshot().notes.is_empty());
    assert!(store.identity().is_none());
}

#[tokio::test]
async fn test_watch_notes_reloads_on_change() {
    let backend = FakeBackend::new();
    let store = Arc::new(signed_in_store(&backend).await);
    let mut updates = store.subscribe();

    let _watch = store.watch_notes().await.unwrap();

    // Another device writes a note
    backend
        .world()
        .notes
        .push(("u1".to_string(), note("remote", "from phone", "")));
    let sender = backend.world().changes.clone().unwrap();
    sender
        .send(PostgresChange {
            schema: "public".to_string(),
            table: "notes".to_string(),
            commit_timestamp: None,
            kind: ChangeKind::Insert,
            record: Some(json!({ "id": "remote" })),
            old_record: None,
        })
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), updates.changed())
        .await
        .unwrap()
        .unwrap();
    let notes = store.snapshot().notes;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, "remote");
}

#[tokio::test]
async fn test_reset_password_and_connection_check() {
    let backend = FakeBackend::new();
    let store = SessionStore::new(backend.clone());

    store.reset_password("a@b.com").await.unwrap();
    store.test_connection().await.unwrap();
    assert!(matches!(store.reset_password("").await, Err(Error::Validation(_))));

    assert_eq!(backend.calls(), ["reset_password", "ping"]);
}
