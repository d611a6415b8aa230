//! `bkt strategies ...`: remote strategy storage.

use anyhow::{Context, Result};
use bkt_config::ClientSettings;
use bkt_session::StrategyClient;
use std::fs;

use super::read_source;

pub async fn list(settings: &ClientSettings) -> Result<()> {
    let names = StrategyClient::from_settings(settings)?.list().await?;
    for name in &names {
        println!("strategy={}", name);
    }
    println!("count={}", names.len());
    Ok(())
}

pub async fn get(settings: &ClientSettings, name: &str, out: Option<&str>) -> Result<()> {
    let source = StrategyClient::from_settings(settings)?.get(name).await?;
    match out {
        Some(path) => {
            fs::write(path, &source.code).with_context(|| format!("write failed: {}", path))?;
            println!("saved=true name={} path={}", source.name, path);
        }
        None => print!("{}", source.code),
    }
    Ok(())
}

pub async fn push(settings: &ClientSettings, name: &str, file: &str) -> Result<()> {
    let code = read_source(file)?;
    StrategyClient::from_settings(settings)?
        .save(name, &code)
        .await?;
    println!("pushed=true name={}", name);
    Ok(())
}

pub async fn delete(settings: &ClientSettings, name: &str) -> Result<()> {
    StrategyClient::from_settings(settings)?.delete(name).await?;
    println!("deleted=true name={}", name);
    Ok(())
}
