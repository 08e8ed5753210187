//! PostgREST-style HTTP adapter
//!
//! Tables are addressed as `{base}/rest/v1/{table}`; filters, ordering and
//! limits travel as query parameters (`name=eq.value`, `order=Sno.desc`,
//! `limit=1`) and mutations ask for the affected rows back with
//! `Prefer: return=representation`.

use super::RemoteService;
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::query::{Direction, Filter, Query};
use crate::storage::record::{Fields, Record};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;

/// Client for a hosted relational service with a PostgREST interface
#[derive(Debug, Clone)]
pub struct RestRemote {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestRemote {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| Error::Config {
                message: format!("cannot build HTTP client: {}", err),
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Send a request and decode the returned rows
    async fn rows(&self, request: RequestBuilder) -> Result<Vec<Record>> {
        let response = self.authorized(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(format!("HTTP {}: {}", status, body)));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&body)
            .map_err(|err| Error::remote(format!("malformed response: {}", err)))
    }
}

/// Quote a value for use inside a PostgREST filter expression
fn quote(raw: &str) -> String {
    let escaped = raw.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Make `%`, `_` and `*` match literally inside an `ilike` pattern
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_' | '*') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|filter| match filter {
            Filter::Eq { field, value } if value.is_null() => (field.clone(), "is.null".to_string()),
            Filter::Eq { field, value } => (field.clone(), format!("eq.{}", quote(&value.to_string()))),
            Filter::Search { fields, term } => {
                let pattern = quote(&format!("*{}*", escape_like(term)));
                let clauses: Vec<String> = fields
                    .iter()
                    .map(|field| format!("{}.ilike.{}", field, pattern))
                    .collect();
                ("or".to_string(), format!("({})", clauses.join(",")))
            }
        })
        .collect()
}

fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filter_params(&query.filters));

    if !query.order_by.is_empty() {
        let order: Vec<String> = query
            .order_by
            .iter()
            .map(|o| {
                let dir = match o.direction {
                    Direction::Asc => "asc.nullsfirst",
                    Direction::Desc => "desc.nullslast",
                };
                format!("{}.{}", o.field, dir)
            })
            .collect();
        params.push(("order".to_string(), order.join(",")));
    }

    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }

    params
}

#[async_trait]
impl RemoteService for RestRemote {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Record>> {
        let request = self.client.get(self.table_url(table)).query(&query_params(query));
        self.rows(request).await
    }

    async fn insert(&self, table: &str, records: &[Record]) -> Result<Vec<Record>> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(records);
        self.rows(request).await
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: &Fields) -> Result<Vec<Record>> {
        let request = self
            .client
            .patch(self.table_url(table))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .json(patch);
        self.rows(request).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Record>> {
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation");
        self.rows(request).await
    }
}
