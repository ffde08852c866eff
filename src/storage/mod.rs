//! Storage operations for file uploads

mod types;

use log::debug;
use reqwest::{multipart, Client};
use serde_json::json;

use crate::error::Error;
use crate::fetch::{ensure_success, Fetch};

pub use types::*;

/// Client for Supabase Storage
pub struct StorageClient {
    /// The base URL for the Supabase project
    url: String,

    /// The anonymous API key for the Supabase project
    key: String,

    /// Bearer token: the user's access token or the anon key
    token: String,

    /// HTTP client used for requests
    client: Client,
}

/// Client for a specific storage bucket
pub struct BucketClient<'a> {
    storage: &'a StorageClient,
    bucket_id: String,
}

impl StorageClient {
    /// Create a new StorageClient
    pub(crate) fn new(url: &str, key: &str, token: &str, client: Client) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            token: token.to_string(),
            client,
        }
    }

    fn get_url(&self, path: &str) -> String {
        format!("{}/storage/v1{}", self.url, path)
    }

    /// Get a client for a specific bucket
    pub fn from(&self, bucket_id: &str) -> BucketClient<'_> {
        BucketClient {
            storage: self,
            bucket_id: bucket_id.to_string(),
        }
    }
}

impl<'a> BucketClient<'a> {
    /// Upload bytes to `path` inside the bucket
    pub async fn upload(&self, path: &str, file_data: Vec<u8>, options: FileOptions) -> Result<UploadResponse, Error> {
        let url = self
            .storage
            .get_url(&format!("/object/{}/{}", self.bucket_id, path));

        let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
        let mut part = multipart::Part::bytes(file_data).file_name(file_name);
        if let Some(content_type) = &options.content_type {
            part = part.mime_str(content_type)?;
        }
        let form = multipart::Form::new()
            .text("cacheControl", options.cache_control.clone())
            .part("file", part);

        debug!("uploading {} to bucket {}", path, self.bucket_id);
        let response = self
            .storage
            .client
            .post(&url)
            .header("apikey", &self.storage.key)
            .header("Authorization", format!("Bearer {}", self.storage.token))
            .header("Cache-Control", format!("max-age={}", options.cache_control))
            .header("x-upsert", options.upsert.to_string())
            .multipart(form)
            .send()
            .await?;

        let response = ensure_success(response).await.map_err(Error::into_storage)?;
        Ok(response.json::<UploadResponse>().await?)
    }

    /// Delete objects by their paths inside the bucket
    pub async fn remove(&self, paths: &[String]) -> Result<Vec<FileObject>, Error> {
        let url = self.storage.get_url(&format!("/object/{}", self.bucket_id));

        Fetch::delete(&self.storage.client, &url)
            .api_auth(&self.storage.key, &self.storage.token)
            .json(&json!({ "prefixes": paths }))?
            .execute::<Vec<FileObject>>()
            .await
            .map_err(Error::into_storage)
    }

    /// List objects under a prefix
    pub async fn list(&self, prefix: &str, options: ListOptions) -> Result<Vec<FileObject>, Error> {
        let url = self
            .storage
            .get_url(&format!("/object/list/{}", self.bucket_id));

        let mut body = serde_json::to_value(&options)?;
        body["prefix"] = json!(prefix);

        Fetch::post(&self.storage.client, &url)
            .api_auth(&self.storage.key, &self.storage.token)
            .json(&body)?
            .execute::<Vec<FileObject>>()
            .await
            .map_err(Error::into_storage)
    }

    /// Get the public URL for a file
    pub fn get_public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.storage.url, self.bucket_id, path
        )
    }
}
