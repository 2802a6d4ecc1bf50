//! Supabase (PostgREST) record store.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

use super::{AnalysisStore, StorageError};
use crate::assessment::AnalysisRecord;

/// Supabase connection settings.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Service or anon key
    pub key: String,
    pub table: String,
    pub timeout: Duration,
}

/// PostgREST-backed store.
pub struct SupabaseStore {
    config: SupabaseConfig,
    client: Client,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Self {
        let client =
            crate::http::build_client(Client::builder().timeout(config.timeout), "supabase");

        Self { config, client }
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.url.trim_end_matches('/'),
            self.config.table
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.key)
            .bearer_auth(&self.config.key)
    }
}

async fn check_status(response: Response) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StorageError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl AnalysisStore for SupabaseStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn insert(&self, record: &AnalysisRecord) -> Result<(), StorageError> {
        let response = self
            .authorized(self.client.post(self.table_url()))
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        check_status(response).await?;
        tracing::debug!(id = %record.id, table = %self.config.table, "Stored analysis record");
        Ok(())
    }

    async fn latest(&self, user_id: &str) -> Result<Option<AnalysisRecord>, StorageError> {
        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{}", user_id)),
                ("order", "created_at.desc".to_string()),
                ("limit", "1".to_string()),
            ])
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        let rows: Vec<AnalysisRecord> = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::Decode(e.to_string()))?;

        Ok(rows.into_iter().next())
    }
}
