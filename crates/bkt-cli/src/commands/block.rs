//! `bkt block show` / `bkt block write`.

use anyhow::{Context, Result};
use bkt_schemas::{ExchangeConfig, SessionConfig};
use std::fs;
use tracing::info;

use super::{effective_config, read_source};

pub struct Overrides {
    pub start: Option<String>,
    pub end: Option<String>,
    pub period: Option<String>,
    pub base_period: Option<String>,
    pub exchanges_json: Option<String>,
    pub remove_exchange: Vec<usize>,
    pub add_exchange: Vec<String>,
}

pub fn show(file: &str) -> Result<()> {
    let text = read_source(file)?;
    let (cfg, found) = effective_config(&text);
    println!("block_found={}", found);
    print_config(&cfg);
    Ok(())
}

pub fn write(file: &str, o: Overrides) -> Result<()> {
    let text = read_source(file)?;
    let (mut cfg, _) = effective_config(&text);

    if let Some(v) = o.start {
        cfg.start = v;
    }
    if let Some(v) = o.end {
        cfg.end = v;
    }
    if let Some(v) = o.period {
        cfg.period = v;
    }
    if let Some(v) = o.base_period {
        cfg.base_period = v;
    }
    if let Some(raw) = o.exchanges_json {
        cfg.exchanges = parse_exchanges_arg(&raw)?;
    }
    for idx in o.remove_exchange {
        cfg.remove_exchange(idx)?;
    }
    for eid in o.add_exchange {
        cfg.add_exchange(ExchangeConfig {
            eid,
            ..ExchangeConfig::default()
        })?;
    }

    cfg.validate().context("refusing to write invalid config")?;

    let updated = bkt_embed::update(&text, &cfg);
    let changed = updated != text;
    if changed {
        fs::write(file, &updated).with_context(|| format!("write failed: {}", file))?;
        info!(file, "config block written");
    }
    println!("written=true path={} changed={}", file, changed);
    print_config(&cfg);
    Ok(())
}

/// Exchange list in the block's own JSON form (fees as percentages).
fn parse_exchanges_arg(raw: &str) -> Result<Vec<ExchangeConfig>> {
    bkt_embed::parse_body(&format!("exchanges: {}", raw.trim()))
        .exchanges
        .context("--exchanges-json must be a JSON array of 1..=5 exchange objects")
}

fn print_config(cfg: &SessionConfig) {
    println!("start={}", cfg.start);
    println!("end={}", cfg.end);
    println!("period={}", cfg.period);
    println!("base_period={}", cfg.base_period);
    println!("mode={}", cfg.mode.code());
    println!("exchange_count={}", cfg.exchanges.len());
    for (i, ex) in cfg.exchanges.iter().enumerate() {
        println!("exchange[{}].eid={}", i, ex.eid);
        println!("exchange[{}].currency={}", i, ex.currency);
        println!("exchange[{}].balance={}", i, ex.balance);
        println!("exchange[{}].stocks={}", i, ex.stocks);
        let [maker, taker] = ex.effective_fee();
        let source = if ex.fee.is_some() { "block" } else { "default" };
        println!("exchange[{}].fee_units={},{} fee_source={}", i, maker, taker, source);
    }
}
