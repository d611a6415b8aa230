//! Command handlers for bkt.
//!
//! Shared helpers used by several commands live here.

pub mod block;
pub mod run;
pub mod strategies;

use anyhow::{Context, Result};
use bkt_config::ClientSettings;
use bkt_schemas::SessionConfig;
use std::fs;
use tracing::debug;

/// Layered settings with env overrides applied. No paths means defaults.
pub fn load_settings(paths: &[String]) -> Result<ClientSettings> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = bkt_config::load_layered_yaml(&path_refs)?.with_env_overrides()?;
    debug!(
        settings_hash = %loaded.settings_hash,
        server_url = %loaded.settings.server_url,
        "client settings loaded"
    );
    Ok(loaded.settings)
}

/// Read a strategy source file (UTF-8, BOM tolerated).
pub fn read_source(path: &str) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("read strategy file failed: {}", path))?;
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
    String::from_utf8(bytes.to_vec()).with_context(|| format!("{} must be UTF-8 text", path))
}

/// Defaults with the file's embedded block applied over them.
pub fn effective_config(text: &str) -> (SessionConfig, bool) {
    let mut cfg = SessionConfig::default();
    match bkt_embed::parse(text) {
        Some(parsed) => {
            cfg.merge(parsed);
            (cfg, true)
        }
        None => (cfg, false),
    }
}
