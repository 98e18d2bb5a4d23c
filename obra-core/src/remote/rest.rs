use async_trait::async_trait;
use reqwest::{Response, StatusCode};

use super::{realtime, ChangeMatcher, ChangeStream, Predicate, RemoteError, RemoteStore};
use crate::models::Row;

const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=representation";

/// HTTP client for a hosted remote store.
///
/// Tables live under `/rest/v1/{table}` and the change feed under
/// `/realtime/v1`. Every request authenticates with the API key both as
/// `apikey` header and as bearer token.
#[derive(Debug, Clone)]
pub struct RestClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl RestClient {
    /// Creates a client. A URL without scheme defaults to `http://`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        let base_url = base_url.into();
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(RemoteError::InvalidUrl(base_url));
        }

        let base_url = if trimmed.starts_with("ws://") {
            trimmed.replacen("ws://", "http://", 1)
        } else if trimmed.starts_with("wss://") {
            trimmed.replacen("wss://", "https://", 1)
        } else if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            format!("http://{}", trimmed)
        } else {
            trimmed.to_string()
        };

        Ok(Self {
            base_url,
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn feed_url(&self) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };

        format!(
            "{}/realtime/v1?apikey={}",
            base,
            urlencoding::encode(&self.api_key)
        )
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    /// Checks that the remote store answers its health endpoint.
    pub async fn health(&self) -> Result<(), RemoteError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(transport)?;

        check_status(response, "health").await.map(|_| ())
    }
}

fn transport(e: reqwest::Error) -> RemoteError {
    RemoteError::Transport(e.to_string())
}

async fn check_status(response: Response, table: &str) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(RemoteError::TableMissing(table.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode_rows(response: Response) -> Result<Vec<Row>, RemoteError> {
    response
        .json::<Vec<Row>>()
        .await
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

#[async_trait]
impl RemoteStore for RestClient {
    async fn upsert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, RemoteError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .authorized(self.http.post(self.table_url(table)))
            .header("Prefer", PREFER_UPSERT)
            .json(&rows)
            .send()
            .await
            .map_err(transport)?;

        decode_rows(check_status(response, table).await?).await
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Row>, RemoteError> {
        let response = self
            .authorized(
                self.http
                    .get(format!("{}?select=*", self.table_url(table))),
            )
            .send()
            .await
            .map_err(transport)?;

        decode_rows(check_status(response, table).await?).await
    }

    async fn delete_where(&self, table: &str, predicate: &Predicate) -> Result<(), RemoteError> {
        let url = format!("{}?{}", self.table_url(table), predicate.to_query());
        let response = self
            .authorized(self.http.delete(url))
            .send()
            .await
            .map_err(transport)?;

        check_status(response, table).await.map(|_| ())
    }

    async fn subscribe_changes(
        &self,
        matcher: &ChangeMatcher,
    ) -> Result<ChangeStream, RemoteError> {
        realtime::subscribe(&self.feed_url(), matcher).await
    }
}
