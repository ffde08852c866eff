//! Types for storage operations

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A file in a storage bucket, as returned by upload and list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileObject {
    /// The file name (relative to the listed prefix)
    pub name: String,

    /// The file ID; `None` for folder placeholders
    #[serde(default)]
    pub id: Option<String>,

    /// Creation timestamp
    #[serde(default)]
    pub created_at: Option<String>,

    /// Update timestamp
    #[serde(default)]
    pub updated_at: Option<String>,

    /// Last accessed timestamp
    #[serde(default)]
    pub last_accessed_at: Option<String>,

    /// File metadata (size, mimetype, cacheControl, ...)
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Response of an upload request
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    /// `<bucket>/<path>` of the stored object
    #[serde(rename = "Key")]
    pub key: String,
}

/// Options for uploading a file
#[derive(Debug, Clone)]
pub struct FileOptions {
    /// Cache control header
    pub cache_control: String,

    /// Content type of the uploaded bytes
    pub content_type: Option<String>,

    /// Whether to overwrite an existing object
    pub upsert: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            cache_control: "3600".to_string(),
            content_type: None,
            upsert: false,
        }
    }
}

impl FileOptions {
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }
}

/// Options for listing files
#[derive(Debug, Clone, Serialize)]
pub struct ListOptions {
    /// Maximum number of files to return
    pub limit: u32,

    /// Offset for pagination
    pub offset: u32,

    /// Field and direction to sort by
    #[serde(rename = "sortBy")]
    pub sort_by: SortBy,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            sort_by: SortBy::default(),
        }
    }
}

/// Sort specification for listing files
#[derive(Debug, Clone, Serialize)]
pub struct SortBy {
    pub column: String,
    pub order: SortOrder,
}

impl Default for SortBy {
    fn default() -> Self {
        Self {
            column: "name".to_string(),
            order: SortOrder::Asc,
        }
    }
}

/// Sort order for listing files
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}
