use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use url::Url;

use super::RemoteBackend;
use crate::config::{BackendConfig, Config};
use crate::outbox::QueueItem;

/// Header carrying the client-generated key of a queued mutation.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// JSON-over-HTTP backend: `GET <base>/<collection>` and `POST <base>/<collection>`.
#[derive(Clone)]
pub struct HttpBackend {
  client: reqwest::Client,
  base: Url,
}

impl HttpBackend {
  pub fn new(config: &BackendConfig) -> Result<Self> {
    let url = config
      .url
      .as_deref()
      .ok_or_else(|| eyre!("backend.url is not configured"))?;
    let base = parse_base_url(url)?;

    let mut headers = HeaderMap::new();
    if let Some(token) = Config::get_api_token() {
      let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| eyre!("Invalid API token: {}", e))?;
      headers.insert(AUTHORIZATION, value);
    }

    let client = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(config.timeout())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base })
  }

  /// Shared HTTP client (carries auth and timeout).
  pub fn client(&self) -> reqwest::Client {
    self.client.clone()
  }

  /// URL of the reachability probe, `path` relative to the base URL.
  pub fn probe_url(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path.trim_start_matches('/'))
      .map_err(|e| eyre!("Invalid probe path {}: {}", path, e))
  }

  fn endpoint(&self, collection: &str) -> Result<Url> {
    self
      .base
      .join(collection)
      .map_err(|e| eyre!("Invalid endpoint for {}: {}", collection, e))
  }
}

/// Parse the base URL so that relative joins append to its path.
fn parse_base_url(url: &str) -> Result<Url> {
  let normalized = if url.ends_with('/') {
    url.to_string()
  } else {
    format!("{}/", url)
  };
  Url::parse(&normalized).map_err(|e| eyre!("Invalid backend URL {}: {}", url, e))
}

#[async_trait]
impl RemoteBackend for HttpBackend {
  async fn fetch_collection(&self, collection: &str) -> Result<Vec<Value>> {
    let url = self.endpoint(collection)?;

    let response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", collection, e))?
      .error_for_status()
      .map_err(|e| eyre!("Failed to fetch {}: {}", collection, e))?;

    response
      .json::<Vec<Value>>()
      .await
      .map_err(|e| eyre!("Failed to parse {}: {}", collection, e))
  }

  async fn apply(&self, item: &QueueItem) -> Result<Value> {
    let url = self.endpoint(item.kind.collection())?;

    let response = self
      .client
      .post(url)
      .header(IDEMPOTENCY_HEADER, &item.id)
      .json(&item.payload)
      .send()
      .await
      .map_err(|e| eyre!("Failed to {} ({}): {}", item.kind, item.id, e))?
      .error_for_status()
      .map_err(|e| eyre!("Failed to {} ({}): {}", item.kind, item.id, e))?;

    response
      .json::<Value>()
      .await
      .map_err(|e| eyre!("Failed to parse {} response: {}", item.kind, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_base_url_joins_under_path() {
    let base = parse_base_url("https://api.example.com/v1").unwrap();
    assert_eq!(
      base.join("measures").unwrap().as_str(),
      "https://api.example.com/v1/measures"
    );
    let base = parse_base_url("https://api.example.com/v1/").unwrap();
    assert_eq!(
      base.join("chat_history").unwrap().as_str(),
      "https://api.example.com/v1/chat_history"
    );
  }

  #[test]
  fn test_probe_url_is_relative_to_base() {
    let backend = HttpBackend::new(&BackendConfig {
      url: Some("https://api.example.com/v1".into()),
      timeout_secs: 5,
    })
    .unwrap();
    assert_eq!(
      backend.probe_url("/health").unwrap().as_str(),
      "https://api.example.com/v1/health"
    );
  }

  #[test]
  fn test_invalid_url_rejected() {
    assert!(parse_base_url("not a url").is_err());
  }

  #[test]
  fn test_missing_url_rejected() {
    assert!(HttpBackend::new(&BackendConfig::default()).is_err());
  }
}
