use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::types::{Customer, DashboardSummary, Profile, Transaction};
use super::RemoteResourceClient;
use crate::config::Config;

/// HTTP client for the ledger API
#[derive(Clone)]
pub struct HttpRemoteClient {
  client: reqwest::Client,
  base: Url,
  token: String,
}

impl HttpRemoteClient {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;

    let base = base_url(&config.api.url)?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .gzip(true)
      .deflate(true)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      token,
    })
  }

  async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let url = endpoint(&self.base, path)?;

    tracing::debug!(%url, "GET");

    let response = self
      .client
      .get(url.clone())
      .bearer_auth(&self.token)
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", url, e))?
      .error_for_status()
      .map_err(|e| eyre!("Server rejected {}: {}", url, e))?;

    response
      .json::<T>()
      .await
      .map_err(|e| eyre!("Failed to parse response from {}: {}", url, e))
  }
}

fn base_url(raw: &str) -> Result<Url> {
  let mut base = Url::parse(raw).map_err(|e| eyre!("Invalid API url {}: {}", raw, e))?;
  // Url::join replaces the last segment unless the path ends with '/'
  if !base.path().ends_with('/') {
    base.set_path(&format!("{}/", base.path()));
  }
  Ok(base)
}

fn endpoint(base: &Url, path: &str) -> Result<Url> {
  base
    .join(path)
    .map_err(|e| eyre!("Invalid endpoint {}: {}", path, e))
}

#[async_trait]
impl RemoteResourceClient for HttpRemoteClient {
  async fn get_dashboard(&self) -> Result<DashboardSummary> {
    self.get_json("dashboard").await
  }

  async fn get_transactions(&self) -> Result<Vec<Transaction>> {
    self.get_json("transactions").await
  }

  async fn get_customers(&self) -> Result<Vec<Customer>> {
    self.get_json("customers").await
  }

  async fn get_profile(&self) -> Result<Profile> {
    self.get_json("profile").await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_endpoint_keeps_base_path() {
    let base = base_url("https://api.example.com/v1").unwrap();
    assert_eq!(
      endpoint(&base, "dashboard").unwrap().as_str(),
      "https://api.example.com/v1/dashboard"
    );

    let base = base_url("https://api.example.com/v1/").unwrap();
    assert_eq!(
      endpoint(&base, "customers").unwrap().as_str(),
      "https://api.example.com/v1/customers"
    );
  }

  #[test]
  fn test_bare_host_base() {
    let base = base_url("http://localhost:8080").unwrap();
    assert_eq!(
      endpoint(&base, "profile").unwrap().as_str(),
      "http://localhost:8080/profile"
    );
  }

  #[test]
  fn test_invalid_base_url() {
    assert!(base_url("not a url").is_err());
  }
}
