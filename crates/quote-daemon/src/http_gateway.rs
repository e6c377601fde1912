//! HTTP implementation of the remote gateway.
//!
//! Talks to a plain JSON list resource: GET returns an array of items, POST
//! creates one and echoes it back with an assigned id. Which JSON fields hold
//! the id, text and category is configurable.

use async_trait::async_trait;
use quote_core::gateway::{NetworkError, RemoteGateway, Result};
use quote_core::quote::{normalize_category, RemoteItem};
use serde_json::{Map, Value};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};

/// Names of the endpoint's native fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub id: String,
    pub text: String,
    pub category: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            id: "id".into(),
            text: "title".into(),
            category: "body".into(),
        }
    }
}

/// Remote gateway over HTTP.
pub struct HttpGateway {
    client: reqwest::Client,
    url: RwLock<String>,
    fields: FieldMapping,
}

impl HttpGateway {
    pub fn new(url: impl Into<String>, fields: FieldMapping, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::Request(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: RwLock::new(url.into()),
            fields,
        })
    }

    /// Current endpoint URL.
    pub fn url(&self) -> String {
        self.url.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Point later requests at another endpoint. Requests in flight keep
    /// the URL they started with.
    pub fn set_url(&self, url: impl Into<String>) {
        let url = url.into();
        info!("Remote endpoint changed to {}", url);
        *self.url.write().unwrap_or_else(|e| e.into_inner()) = url;
    }

    /// Map one endpoint item onto a remote item.
    ///
    /// Returns `None` for items without an integer id or with blank text.
    fn map_item(&self, value: &Value) -> Option<RemoteItem> {
        let remote_id = value.get(&self.fields.id).and_then(integer_id)?;
        let text = value
            .get(&self.fields.text)
            .and_then(stringish)
            .filter(|t| !t.trim().is_empty())?;
        let category = value.get(&self.fields.category).and_then(stringish);

        Some(RemoteItem {
            remote_id,
            text,
            category: normalize_category(category.as_deref()),
        })
    }

    fn request_error(e: reqwest::Error, operation: &str, url: &str) -> NetworkError {
        let detail = if e.is_timeout() {
            "timed out".to_string()
        } else if e.is_connect() {
            format!("connection failed: {}", e)
        } else if e.is_decode() {
            return NetworkError::Decode(format!("{} {}: {}", operation, url, e));
        } else {
            e.to_string()
        };
        NetworkError::Request(format!("{} {}: {}", operation, url, detail))
    }

    async fn read_json(response: reqwest::Response, operation: &str, url: &str) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| Self::request_error(e, operation, url))
    }
}

/// Render a string-ish JSON value as text.
fn stringish(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read an integer id, accepting numeric strings.
fn integer_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn fetch_remote_list(&self) -> Result<Vec<RemoteItem>> {
        let url = self.url();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::request_error(e, "GET", &url))?;
        let body = Self::read_json(response, "GET", &url).await?;

        let Value::Array(items) = body else {
            return Err(NetworkError::Decode(format!(
                "expected a JSON array from {}",
                url
            )));
        };

        let total = items.len();
        let mapped: Vec<RemoteItem> = items.iter().filter_map(|i| self.map_item(i)).collect();
        if mapped.len() < total {
            debug!("Skipped {} remote item(s) without id or text", total - mapped.len());
        }
        Ok(mapped)
    }

    async fn create_remote(&self, text: &str, category: &str) -> Result<u64> {
        let mut body = Map::new();
        body.insert(self.fields.text.clone(), Value::from(text));
        body.insert(self.fields.category.clone(), Value::from(category));

        let url = self.url();
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::request_error(e, "POST", &url))?;
        let echoed = Self::read_json(response, "POST", &url).await?;

        echoed
            .get(&self.fields.id)
            .and_then(integer_id)
            .ok_or_else(|| {
                NetworkError::Decode(format!(
                    "POST {} returned no integer '{}' field",
                    url, self.fields.id
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gateway() -> HttpGateway {
        HttpGateway::new(
            "http://127.0.0.1:9/posts",
            FieldMapping::default(),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_map_item_default_fields() {
        let item = gateway()
            .map_item(&json!({"id": 3, "title": "Carpe diem", "body": "Latin", "userId": 1}))
            .unwrap();

        assert_eq!(item, RemoteItem::new(3, "Carpe diem", "Latin"));
    }

    #[test]
    fn test_map_item_stringifies_and_defaults() {
        let fields = FieldMapping {
            id: "id".into(),
            text: "title".into(),
            category: "userId".into(),
        };
        let gateway = HttpGateway::new("http://x", fields, Duration::from_secs(1)).unwrap();

        let numeric = gateway
            .map_item(&json!({"id": "12", "title": "t", "userId": 4}))
            .unwrap();
        assert_eq!(numeric.remote_id, 12);
        assert_eq!(numeric.category, "4");

        let missing = gateway.map_item(&json!({"id": 1, "title": "t"})).unwrap();
        assert_eq!(missing.category, "Uncategorized");
    }

    #[test]
    fn test_map_item_skips_unusable() {
        let gateway = gateway();
        assert!(gateway.map_item(&json!({"title": "no id"})).is_none());
        assert!(gateway.map_item(&json!({"id": -1, "title": "negative"})).is_none());
        assert!(gateway.map_item(&json!({"id": 2, "title": "  "})).is_none());
        assert!(gateway.map_item(&json!("not an object")).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_request_error() {
        let result = gateway().fetch_remote_list().await;
        assert!(matches!(result, Err(NetworkError::Request(_))));
    }

    #[test]
    fn test_set_url_redirects_later_requests() {
        let gateway = gateway();
        assert_eq!(gateway.url(), "http://127.0.0.1:9/posts");

        gateway.set_url("http://127.0.0.1:9/quotes");

        assert_eq!(gateway.url(), "http://127.0.0.1:9/quotes");
    }
}
