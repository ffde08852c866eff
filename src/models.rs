//! Notes, profiles and uploaded files

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Kind of content a note holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    Text,
    Audio,
    Video,
    Image,
    Document,
}

/// A note, mapped one-to-one onto a row of the `notes` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Client-generated id, unique within the owner's notes
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(rename = "type")]
    pub note_type: NoteType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(rename = "is_starred", default)]
    pub starred: bool,
    #[serde(default)]
    pub audio_url: Option<String>,
    /// Length of an audio note in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub extracted_from: Option<String>,
}

impl Note {
    /// A fresh note with a generated id, stamped now
    pub fn new(title: &str, content: &str, note_type: NoteType) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: content.to_string(),
            note_type,
            tags: Vec::new(),
            category: String::new(),
            created_at: now,
            updated_at: now,
            summary: None,
            transcription: None,
            starred: false,
            audio_url: None,
            duration: None,
            file_url: None,
            source_file: None,
            extracted_from: None,
        }
    }

    /// Stamp `updated_at` for a save at `now`, never moving it backwards
    /// from `previous` (the last saved timestamp for this id).
    pub(crate) fn touch(&mut self, now: DateTime<Utc>, previous: Option<DateTime<Utc>>) {
        let floor = previous.map_or(self.created_at, |p| p.max(self.created_at));
        self.updated_at = now.max(floor);
    }
}

/// A note as written to the database, tagged with its owner
#[derive(Debug, Serialize)]
pub(crate) struct NoteRow<'a> {
    #[serde(flatten)]
    pub note: &'a Note,
    pub user_id: &'a str,
}

/// Per-user profile record (`profiles` table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Columns this client does not know about, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Profile {
    /// The row created for a new account
    pub fn new(id: &str, full_name: &str, email: &str) -> Self {
        Self {
            id: id.to_string(),
            full_name: full_name.to_string(),
            email: Some(email.to_string()),
            avatar_url: None,
            bio: None,
            created_at: Some(Utc::now().to_rfc3339()),
            updated_at: None,
            extra: Map::new(),
        }
    }

    /// Merge a partial update into this profile
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(full_name) = &update.full_name {
            self.full_name = full_name.clone();
        }
        if let Some(email) = &update.email {
            self.email = Some(email.clone());
        }
        if let Some(avatar_url) = &update.avatar_url {
            self.avatar_url = Some(avatar_url.clone());
        }
        if let Some(bio) = &update.bio {
            self.bio = Some(bio.clone());
        }
        if let Some(updated_at) = &update.updated_at {
            self.updated_at = Some(updated_at.clone());
        }
        for (key, value) in &update.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

/// Partial profile update; only the fields that are set are sent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.email.is_none()
            && self.avatar_url.is_none()
            && self.bio.is_none()
            && self.updated_at.is_none()
            && self.extra.is_empty()
    }
}

/// A file picked by the user for upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Original file name; its extension is kept in the storage path
    pub name: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// A stored upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Path inside the bucket, `<user>/<folder>/<millis>.<ext>`
    pub path: String,
    pub public_url: String,
}

// Nullable text columns read as their empty value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Storage path for an upload by `user_id` at `millis` since the epoch.
pub fn storage_path(user_id: &str, folder: &str, file_name: &str, millis: i64) -> String {
    let ext = file_name.rsplit('.').next().unwrap_or(file_name);
    format!("{}/{}/{}.{}", user_id, folder, millis, ext)
}

/// Whether `path` lies inside `user_id`'s storage prefix
pub fn owned_by(path: &str, user_id: &str) -> bool {
    path.strip_prefix(user_id)
        .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn note_row_uses_database_columns() {
        let mut note = Note::new("T", "body", NoteType::Audio);
        note.starred = true;
        note.duration = Some(12.5);

        let row = serde_json::to_value(NoteRow {
            note: &note,
            user_id: "u1",
        })
        .unwrap();

        assert_eq!(row["type"], "audio");
        assert_eq!(row["is_starred"], true);
        assert_eq!(row["user_id"], "u1");
        assert_eq!(row["duration"], 12.5);
        assert!(row["summary"].is_null());
    }

    #[test]
    fn note_reads_database_row() {
        let note: Note = serde_json::from_value(json!({
            "id": "n1",
            "title": "T",
            "content": "c",
            "type": "document",
            "tags": ["a"],
            "category": null,
            "created_at": "2026-01-01T10:00:00+00:00",
            "updated_at": "2026-01-02T10:00:00+00:00",
            "summary": null,
            "is_starred": false,
            "user_id": "u1"
        }))
        .unwrap();

        assert_eq!(note.note_type, NoteType::Document);
        assert_eq!(note.tags, vec!["a".to_string()]);
        assert_eq!(note.category, "");
        assert_eq!(note.updated_at, Utc.with_ymd_and_hms(2026, 1, 2, 10, 0, 0).unwrap());
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut note = Note::new("T", "", NoteType::Text);
        let later = note.created_at + chrono::Duration::seconds(60);
        let earlier = note.created_at + chrono::Duration::seconds(10);

        note.touch(earlier, Some(later));
        assert_eq!(note.updated_at, later);

        note.touch(later + chrono::Duration::seconds(1), Some(later));
        assert_eq!(note.updated_at, later + chrono::Duration::seconds(1));
    }

    #[test]
    fn profile_update_merges_fields() {
        let mut profile = Profile {
            id: "u1".to_string(),
            full_name: "Ada".to_string(),
            email: Some("a@b.com".to_string()),
            avatar_url: None,
            bio: None,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        };
        let mut update = ProfileUpdate {
            bio: Some("hi".to_string()),
            ..Default::default()
        };
        update.extra.insert("theme".to_string(), json!("dark"));

        profile.apply(&update);

        assert_eq!(profile.full_name, "Ada");
        assert_eq!(profile.bio.as_deref(), Some("hi"));
        assert_eq!(profile.extra["theme"], "dark");
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({ "bio": "hi", "theme": "dark" }));
    }

    #[test]
    fn storage_paths_follow_owner_prefix() {
        assert_eq!(storage_path("u1", "uploads", "scan.pdf", 1700), "u1/uploads/1700.pdf");
        assert_eq!(storage_path("u1", "audio", "memo.tar.gz", 5), "u1/audio/5.gz");
        assert_eq!(storage_path("u1", "uploads", ".env", 7), "u1/uploads/7.env");
        assert_eq!(storage_path("u1", "uploads", "README", 9), "u1/uploads/9.README");
        assert!(owned_by("u1/uploads/1700.pdf", "u1"));
        assert!(!owned_by("u12/uploads/1700.pdf", "u1"));
        assert!(!owned_by("other/u1/x.pdf", "u1"));
    }
}
