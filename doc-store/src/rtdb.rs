use std::env;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use crate::{DocumentDatabase, Snapshot, StoreError, StoreResult};

/// Realtime Database REST endpoint settings
#[derive(Debug, Clone)]
pub struct RealtimeDatabaseConfig {
    /// Database root, e.g. `https://my-app-default-rtdb.firebaseio.com`
    pub base_url: String,
    /// ID token or database secret sent as the `auth` query parameter
    pub auth_token: Option<String>,
}

impl RealtimeDatabaseConfig {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
        }
    }

    /// Load from `DOCSTORE_RTDB_URL` and the optional `DOCSTORE_RTDB_AUTH`
    pub fn from_env() -> StoreResult<Self> {
        let base_url = env::var("DOCSTORE_RTDB_URL")
            .map_err(|_| StoreError::invalid("DOCSTORE_RTDB_URL environment variable required"))?;
        Ok(Self {
            base_url,
            auth_token: env::var("DOCSTORE_RTDB_AUTH").ok(),
        })
    }

    pub fn with_auth_token<S: Into<String>>(mut self, token: S) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Document database speaking the Realtime Database REST protocol
#[derive(Clone)]
pub struct RealtimeDatabase {
    client: Client,
    config: RealtimeDatabaseConfig,
}

impl RealtimeDatabase {
    pub fn new(config: RealtimeDatabaseConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn from_env() -> StoreResult<Self> {
        Ok(Self::new(RealtimeDatabaseConfig::from_env()?))
    }

    pub fn with_client(client: Client, config: RealtimeDatabaseConfig) -> Self {
        Self { client, config }
    }

    /// REST URL for a database path: `<base>/<path>.json`
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}.json",
            self.config.base_url.trim_end_matches('/'),
            path.trim_matches('/')
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.query(&[("auth", token)]),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(StoreError::backend)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);

        Err(StoreError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl DocumentDatabase for RealtimeDatabase {
    async fn set(&self, path: &str, record: Value) -> StoreResult<()> {
        let request = self
            .client
            .put(self.url_for(path))
            .query(&[("print", "silent")])
            .json(&record);
        self.send(request).await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> StoreResult<Snapshot> {
        let response = self.send(self.client.get(self.url_for(path))).await?;
        let value = response.json::<Value>().await.map_err(StoreError::backend)?;
        Ok(Snapshot::at_path(path, value))
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.send(self.client.delete(self.url_for(path))).await?;
        Ok(())
    }
}
