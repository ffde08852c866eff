//! Phoenix channel messages spoken by Supabase Realtime

use serde::{Deserialize, Serialize};

/// A full message received or sent over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub event: ChannelEvent,
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub message_ref: Option<String>,
}

/// Channel events the subscription cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEvent {
    PhxJoin,
    PhxReply,
    PhxError,
    PhxClose,
    Heartbeat,
    PostgresChanges,
    System,
    #[serde(other)]
    Other,
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row change delivered on a `postgres_changes` subscription
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostgresChange {
    pub schema: String,
    pub table: String,
    pub commit_timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub record: Option<serde_json::Value>,
    #[serde(default)]
    pub old_record: Option<serde_json::Value>,
}

/// Which row changes to subscribe to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostgresChanges {
    /// `*`, `INSERT`, `UPDATE` or `DELETE`
    pub event: String,
    pub schema: String,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl PostgresChanges {
    /// All changes on a table
    pub fn new(schema: &str, table: &str) -> Self {
        Self {
            event: "*".to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
            filter: None,
        }
    }

    /// Only rows whose `column` equals `value`
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.filter = Some(format!("{}=eq.{}", column, value));
        self
    }
}
