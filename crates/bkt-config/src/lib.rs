//! bkt-config
//!
//! Client settings for talking to the backtest server. Settings come from one
//! or more YAML layers (earlier = base, later = override), deep-merged, then
//! hashed over their canonical JSON so a run can be attributed to the exact
//! settings it used.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::time::Duration;

/// Overrides `server_url` when set.
pub const ENV_SERVER_URL: &str = "BKT_SERVER_URL";

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    /// Base URL of the backtest server (http or https).
    pub server_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClientSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn check(&self) -> Result<()> {
        let url = self.server_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!(
                "SETTINGS_INVALID server_url='{}': expected an http:// or https:// URL",
                self.server_url
            );
        }
        if self.connect_timeout_secs == 0 || self.request_timeout_secs == 0 {
            bail!("SETTINGS_INVALID timeouts must be > 0 seconds");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings_hash: String,
    pub canonical_json: String,
    pub settings: ClientSettings,
}

impl LoadedSettings {
    /// Apply `BKT_SERVER_URL` if present. The hash keeps describing the files.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var(ENV_SERVER_URL) {
            let url = url.trim();
            if !url.is_empty() {
                self.settings.server_url = url.to_string();
                self.settings
                    .check()
                    .with_context(|| format!("{ENV_SERVER_URL} override rejected"))?;
            }
        }
        Ok(self)
    }
}

/// Load settings layers from disk. No paths = built-in defaults.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedSettings> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedSettings> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        // An empty document is YAML null; treat it as "no overrides".
        if v_yaml.is_null() {
            continue;
        }
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    let settings: ClientSettings =
        serde_json::from_value(merged.clone()).context("SETTINGS_INVALID")?;
    settings.check()?;

    let canonical_json = canonicalize_json(&merged)?;
    let settings_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedSettings {
        settings_hash,
        canonical_json,
        settings,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// Keys sorted at every level, so the hash is stable under key reordering in
/// the YAML sources whatever map ordering serde_json was built with.
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(&sort_keys(v)).context("canonical json serialize failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), sort_keys(&map[k.as_str()]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
