//! Query builders for PostgrestClient

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Error;
use crate::fetch::{Fetch, FetchBuilder};
use crate::postgrest::{Filterable, ReturnOption};

/// Query string parameters, in insertion order
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    params: Vec<(String, String)>,
}

impl QueryBuilder {
    /// Create a new QueryBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter to the query
    pub fn add_param(&mut self, key: &str, value: &str) {
        self.params.push((key.to_string(), value.to_string()));
    }

    /// Replace every value of a parameter
    pub fn set_param(&mut self, key: &str, value: &str) {
        self.params.retain(|(k, _)| k != key);
        self.add_param(key, value);
    }

    /// Get the query parameters
    pub fn get_params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// Where a request goes and with which credentials
#[derive(Debug, Clone)]
pub(crate) struct Endpoint {
    pub url: String,
    pub key: String,
    pub token: String,
    pub client: Client,
}

impl Endpoint {
    fn prepare<'a>(&'a self, fetch: fn(&'a Client, &str) -> FetchBuilder<'a>, query: &QueryBuilder) -> FetchBuilder<'a> {
        fetch(&self.client, &self.url)
            .api_auth(&self.key, &self.token)
            .query(query.get_params().iter().cloned())
    }
}

/// Builder for SELECT queries
pub struct SelectBuilder {
    endpoint: Endpoint,
    query: QueryBuilder,
}

impl SelectBuilder {
    pub(crate) fn new(endpoint: Endpoint, columns: &str) -> Self {
        let mut query = QueryBuilder::new();
        query.add_param("select", columns);

        Self { endpoint, query }
    }

    /// Order the results by a column
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.query.set_param("order", &format!("{}.{}", column, direction));
        self
    }

    /// Limit the number of rows returned
    pub fn limit(mut self, count: usize) -> Self {
        self.query.set_param("limit", &count.to_string());
        self
    }

    /// Execute the query and return the results
    pub async fn execute<T: DeserializeOwned>(self) -> Result<Vec<T>, Error> {
        self.endpoint
            .prepare(Fetch::get, &self.query)
            .execute::<Vec<T>>()
            .await
            .map_err(Error::into_database)
    }

    /// Execute the query and return the first row
    pub async fn execute_one<T: DeserializeOwned>(self) -> Result<Option<T>, Error> {
        let results = self.limit(1).execute::<T>().await?;
        Ok(results.into_iter().next())
    }
}

impl Filterable for SelectBuilder {
    fn query_mut(&mut self) -> &mut QueryBuilder {
        &mut self.query
    }
}

/// Builder for INSERT and UPSERT queries
pub struct InsertBuilder<T: Serialize> {
    endpoint: Endpoint,
    values: T,
    query: QueryBuilder,
    merge_duplicates: bool,
}

impl<T: Serialize> InsertBuilder<T> {
    pub(crate) fn new(endpoint: Endpoint, values: T) -> Self {
        Self {
            endpoint,
            values,
            query: QueryBuilder::new(),
            merge_duplicates: false,
        }
    }

    pub(crate) fn upsert(endpoint: Endpoint, values: T) -> Self {
        Self {
            merge_duplicates: true,
            ..Self::new(endpoint, values)
        }
    }

    /// Specify the column(s) to check for conflicts when upserting
    pub fn on_conflict(mut self, columns: &str) -> Self {
        self.query.set_param("on_conflict", columns);
        self
    }

    fn prefer(&self, returning: ReturnOption) -> String {
        if self.merge_duplicates {
            format!("resolution=merge-duplicates,{}", returning.as_str())
        } else {
            returning.as_str().to_string()
        }
    }

    /// Execute the query and return the written rows
    pub async fn execute<R: DeserializeOwned>(self) -> Result<Vec<R>, Error> {
        let prefer = self.prefer(ReturnOption::Representation);
        self.endpoint
            .prepare(Fetch::post, &self.query)
            .header("Prefer", &prefer)
            .json(&self.values)?
            .execute::<Vec<R>>()
            .await
            .map_err(Error::into_database)
    }

    /// Execute the query without returning the written data
    pub async fn execute_no_return(self) -> Result<(), Error> {
        let prefer = self.prefer(ReturnOption::Minimal);
        self.endpoint
            .prepare(Fetch::post, &self.query)
            .header("Prefer", &prefer)
            .json(&self.values)?
            .execute_empty()
            .await
            .map_err(Error::into_database)
    }
}

/// Builder for UPDATE queries
pub struct UpdateBuilder<T: Serialize> {
    endpoint: Endpoint,
    values: T,
    query: QueryBuilder,
}

impl<T: Serialize> UpdateBuilder<T> {
    pub(crate) fn new(endpoint: Endpoint, values: T) -> Self {
        Self {
            endpoint,
            values,
            query: QueryBuilder::new(),
        }
    }

    /// Execute the query without returning the updated data
    pub async fn execute_no_return(self) -> Result<(), Error> {
        self.endpoint
            .prepare(Fetch::patch, &self.query)
            .header("Prefer", ReturnOption::Minimal.as_str())
            .json(&self.values)?
            .execute_empty()
            .await
            .map_err(Error::into_database)
    }
}

impl<T: Serialize> Filterable for UpdateBuilder<T> {
    fn query_mut(&mut self) -> &mut QueryBuilder {
        &mut self.query
    }
}

/// Builder for DELETE queries
pub struct DeleteBuilder {
    endpoint: Endpoint,
    query: QueryBuilder,
}

impl DeleteBuilder {
    pub(crate) fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            query: QueryBuilder::new(),
        }
    }

    /// Execute the query without returning the deleted data
    pub async fn execute_no_return(self) -> Result<(), Error> {
        self.endpoint
            .prepare(Fetch::delete, &self.query)
            .header("Prefer", ReturnOption::Minimal.as_str())
            .execute_empty()
            .await
            .map_err(Error::into_database)
    }
}

impl Filterable for DeleteBuilder {
    fn query_mut(&mut self) -> &mut QueryBuilder {
        &mut self.query
    }
}
