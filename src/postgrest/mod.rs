//! Database operations through the PostgREST API

mod filter;
mod query;
mod types;

use reqwest::Client;
use serde::Serialize;

use query::Endpoint;

pub use filter::*;
pub use query::{DeleteBuilder, InsertBuilder, QueryBuilder, SelectBuilder, UpdateBuilder};
pub use types::*;

/// Client for database operations on one table
pub struct PostgrestClient {
    endpoint: Endpoint,
}

impl PostgrestClient {
    /// Create a new PostgrestClient.
    ///
    /// `token` is the signed-in user's access token, or the anon key for
    /// anonymous access; row level security is evaluated against it.
    pub(crate) fn new(url: &str, key: &str, token: &str, table: &str, client: Client) -> Self {
        Self {
            endpoint: Endpoint {
                url: format!("{}/rest/v1/{}", url, table),
                key: key.to_string(),
                token: token.to_string(),
                client,
            },
        }
    }

    /// Select specific columns from the table
    pub fn select(&self, columns: &str) -> SelectBuilder {
        SelectBuilder::new(self.endpoint.clone(), columns)
    }

    /// Insert data into the table
    pub fn insert<T: Serialize>(&self, values: T) -> InsertBuilder<T> {
        InsertBuilder::new(self.endpoint.clone(), values)
    }

    /// Upsert data in the table (insert or update if it exists)
    pub fn upsert<T: Serialize>(&self, values: T) -> InsertBuilder<T> {
        InsertBuilder::upsert(self.endpoint.clone(), values)
    }

    /// Update data in the table
    pub fn update<T: Serialize>(&self, values: T) -> UpdateBuilder<T> {
        UpdateBuilder::new(self.endpoint.clone(), values)
    }

    /// Delete data from the table
    pub fn delete(&self) -> DeleteBuilder {
        DeleteBuilder::new(self.endpoint.clone())
    }
}
