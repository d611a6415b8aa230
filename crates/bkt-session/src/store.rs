//! Remote strategy source storage.
//!
//! `GET /api/strategies` lists names (a JSON array of strings); `/api/strategies/{name}` reads, writes
//! (PUT) and deletes one source. Saving a name the server does not know yet
//! falls back to `POST /api/strategies`.

use std::fmt;

use anyhow::Result;
use bkt_config::ClientSettings;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http::{build_http_client, endpoint, parse_base_url};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategySource {
    pub name: String,
    pub code: String,
}

#[derive(Serialize)]
struct CodeBody<'a> {
    code: &'a str,
}

#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    /// Non-success status other than 404.
    Status { status: u16, context: String },
    Transport(String),
    Decode(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(name) => write!(f, "strategy not found: {name}"),
            StoreError::Status { status, context } => write!(f, "{context} (HTTP {status})"),
            StoreError::Transport(msg) => write!(f, "strategy store transport error: {msg}"),
            StoreError::Decode(msg) => write!(f, "strategy store decode error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Decode(e.to_string())
        } else {
            StoreError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyClient {
    http: reqwest::Client,
    base_url: Url,
}

impl StrategyClient {
    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        Ok(Self {
            http: build_http_client(settings)?,
            base_url: parse_base_url(&settings.server_url)?,
        })
    }

    fn collection(&self) -> Url {
        endpoint(&self.base_url, &["api", "strategies"])
    }

    fn item(&self, name: &str) -> Url {
        endpoint(&self.base_url, &["api", "strategies", name])
    }

    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        let resp = self.http.get(self.collection()).send().await?;
        let resp = check(resp, "Failed to list strategies")?;
        Ok(resp.json().await?)
    }

    pub async fn get(&self, name: &str) -> Result<StrategySource, StoreError> {
        let resp = self.http.get(self.item(name)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let resp = check(resp, "Failed to load strategy")?;
        Ok(resp.json().await?)
    }

    /// Overwrite `name`, creating it if the server rejects the update.
    pub async fn save(&self, name: &str, code: &str) -> Result<(), StoreError> {
        let resp = self
            .http
            .put(self.item(name))
            .json(&CodeBody { code })
            .send()
            .await?;
        if resp.status().is_success() {
            return Ok(());
        }
        debug!(name, status = resp.status().as_u16(), "update rejected; creating");

        let resp = self
            .http
            .post(self.collection())
            .json(&StrategySource {
                name: name.to_string(),
                code: code.to_string(),
            })
            .send()
            .await?;
        check(resp, "Failed to save strategy")?;
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let resp = self.http.delete(self.item(name)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(name.to_string()));
        }
        check(resp, "Failed to delete strategy")?;
        Ok(())
    }
}

fn check(resp: reqwest::Response, context: &str) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(StoreError::Status {
            status: status.as_u16(),
            context: context.to_string(),
        })
    }
}
