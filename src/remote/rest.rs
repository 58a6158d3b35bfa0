//! Thin REST client over the directory API.
//!
//! Holds no state beyond a configured `reqwest::Client` and a base URL.
//! Failures are split by whether the request round-tripped: transport
//! failures map to `RemoteError::Unreachable` (the engine may park the
//! mutation locally), completed-but-failed responses map to
//! `RemoteError::Server` with the body preserved.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;

use crate::error::RemoteError;

use super::types::{FetchTarget, MutationRequest, RemoteResult, RemoteTransport, ResourceRoute};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RestTransport {
    client: Client,
    base_url: String,
}

impl RestTransport {
    pub fn new(base_url: impl Into<String>) -> RemoteResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> RemoteResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, route: &ResourceRoute, tail: &str) -> String {
        if tail.is_empty() {
            format!("{}/{}", self.base_url, route.path)
        } else {
            format!("{}/{}/{}", self.base_url, route.path, tail)
        }
    }

    /// Check status and parse the body, keeping the body text in the error
    /// on a non-success status so callers can see what the server said.
    async fn parse_body(response: Response) -> RemoteResult<Option<Value>> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RemoteError::server(status.as_u16(), body));
        }
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| RemoteError::Serialization(format!("{e}: {body}")))
    }
}

#[async_trait]
impl RemoteTransport for RestTransport {
    async fn fetch(
        &self,
        route: &ResourceRoute,
        target: &FetchTarget,
    ) -> RemoteResult<Vec<Value>> {
        let request = match target {
            FetchTarget::All => self.client.get(self.url(route, "")),
            FetchTarget::ById(id) => self.client.get(self.url(route, id)),
            FetchTarget::ByIndex { field, value } => self
                .client
                .get(self.url(route, ""))
                .query(&[(field.as_str(), value.as_str())]),
        };

        log::debug!("GET {}", route.path);
        let response = request.send().await?;

        match Self::parse_body(response).await? {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items),
            Some(single) => Ok(vec![single]),
        }
    }

    async fn submit(
        &self,
        route: &ResourceRoute,
        request: &MutationRequest,
    ) -> RemoteResult<Option<Value>> {
        let builder = match request {
            MutationRequest::Create { data, .. } => {
                log::debug!("POST {}", route.path);
                self.client.post(self.url(route, "")).json(data)
            }
            MutationRequest::Update { key, data } => {
                log::debug!("PUT {}/{key}", route.path);
                self.client.put(self.url(route, key)).json(data)
            }
            MutationRequest::UpdateQuery { key, field, value } => {
                // The server reads flag toggles out of the query string and
                // expects the literal strings "true"/"false".
                let flag = if *value { "true" } else { "false" };
                log::debug!("PUT {}/{key}?{field}={flag}", route.path);
                self.client
                    .put(self.url(route, key))
                    .query(&[(field.as_str(), flag)])
            }
            MutationRequest::Delete { key } => {
                log::debug!("DELETE {}/{key}", route.path);
                self.client.delete(self.url(route, key))
            }
        };

        let response = builder.send().await?;
        Self::parse_body(response).await
    }
}
