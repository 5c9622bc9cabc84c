use crate::notion_types::QueryResponse;
use crate::query::QuerySpec;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

pub const API_BASE_URL: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

#[derive(Error, Debug)]
pub enum NotionError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Database not found or not shared with the integration: {0}")]
    DatabaseNotFound(String),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Where reminder items come from.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn query_database(
        &self,
        api_key: &str,
        table_id: &str,
        query: &QuerySpec,
    ) -> Result<QueryResponse, NotionError>;
}

pub struct NotionClient {
    client: Client,
    base_url: String,
}

impl NotionClient {
    pub fn new(base_url: &str) -> Result<Self, NotionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(NotionClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn query_url(&self, table_id: &str) -> String {
        format!("{}/databases/{}/query", self.base_url, table_id)
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        api_key: &str,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, NotionError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Notion-Version", NOTION_VERSION)
            .json(body)
            .send()
            .await?;

        let status = response.status();

        if status.is_success() {
            let result = response.json::<T>().await?;
            Ok(result)
        } else if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);

            Err(NotionError::RateLimitExceeded { retry_after })
        } else if status.as_u16() == 401 {
            Err(NotionError::AuthError(
                "Invalid integration API key".to_string(),
            ))
        } else if status.as_u16() == 404 {
            Err(NotionError::DatabaseNotFound(url.to_string()))
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(NotionError::ApiError {
                status: status.as_u16(),
                message: error_text,
            })
        }
    }
}

#[async_trait]
impl TaskSource for NotionClient {
    async fn query_database(
        &self,
        api_key: &str,
        table_id: &str,
        query: &QuerySpec,
    ) -> Result<QueryResponse, NotionError> {
        let body = serde_json::to_value(query)?;
        tracing::debug!(table_id, %body, "querying notion database");
        self.post(api_key, &self.query_url(table_id), &body).await
    }
}
