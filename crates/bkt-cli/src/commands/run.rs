//! `bkt run`: start a backtest and follow it until it ends.
//!
//! Ctrl-C sends a stop request for the remote job before exiting.

use anyhow::{bail, Context, Result};
use bkt_config::ClientSettings;
use bkt_schemas::{BacktestResult, BacktestSession, SessionStatus, TickMode};
use bkt_session::{HttpTransport, SessionController};
use futures_util::StreamExt;
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};

use super::{effective_config, read_source};

pub async fn run(
    settings: &ClientSettings,
    file: &str,
    mode: Option<u8>,
    result_json: Option<&str>,
) -> Result<()> {
    let code = read_source(file)?;
    let (mut cfg, found) = effective_config(&code);
    if !found {
        info!(file, "no config block found; using defaults");
    }
    if let Some(m) = mode {
        cfg.mode = TickMode::from_code(i64::from(m))
            .with_context(|| format!("invalid --mode {}; expected 0 or 1", m))?;
    }

    let transport = HttpTransport::from_settings(settings)?;
    let controller = SessionController::new(Arc::new(transport));

    // Subscribe before starting so no snapshot is missed.
    let mut updates = Box::pin(controller.updates());

    let started = controller.start(&code, &cfg).await;
    if let Some(task_id) = &started.task_id {
        println!("task_id={}", task_id);
    }
    if started.status.is_terminal() {
        return finish(&started, result_json);
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut ctrl_c_done = false;
    let mut last_line = String::new();
    loop {
        tokio::select! {
            res = &mut ctrl_c, if !ctrl_c_done => {
                ctrl_c_done = true;
                if let Err(e) = res {
                    warn!(error = %e, "ctrl-c handler unavailable");
                    continue;
                }
                warn!("interrupted; stopping backtest");
                let s = controller.stop().await;
                println!("status={}", s.status);
                bail!("backtest interrupted");
            }
            next = updates.next() => {
                let Some(s) = next else {
                    bail!("session update channel closed");
                };
                match s.status {
                    SessionStatus::Running => {
                        let line = format!("status=running progress={} stage={}", s.progress, s.stage);
                        if line != last_line {
                            println!("{}", line);
                            last_line = line;
                        }
                    }
                    SessionStatus::Completed | SessionStatus::Error => {
                        return finish(&s, result_json);
                    }
                    SessionStatus::Idle | SessionStatus::Starting => {}
                }
            }
        }
    }
}

fn finish(s: &BacktestSession, result_json: Option<&str>) -> Result<()> {
    println!("status={}", s.status);
    match (&s.status, s.result.as_deref()) {
        (SessionStatus::Completed, Some(result)) => {
            print_summary(result);
            if let Some(path) = result_json {
                let json = serde_json::to_string_pretty(result)
                    .context("serialize result json failed")?;
                fs::write(path, json)
                    .with_context(|| format!("write result failed: {}", path))?;
                println!("result_path={}", path);
            }
            Ok(())
        }
        _ => {
            let msg = s.error.as_deref().unwrap_or("Unknown error");
            println!("error={}", msg);
            bail!("backtest failed: {}", msg)
        }
    }
}

fn print_summary(r: &BacktestResult) {
    let m = &r.summary;
    println!("initial_balance={}", m.initial_balance);
    println!("final_balance={}", m.final_balance);
    println!("pnl={}", m.pnl);
    println!("pnl_percent={}", m.pnl_percent);
    println!("max_drawdown_percent={}", m.max_drawdown_percent);
    println!("sharpe_ratio={}", m.sharpe_ratio);
    println!("annualized_return={}", m.annualized_return);
    println!("total_trades={}", m.total_trades);
    println!("trade_records={}", r.trades.len());
    println!("snapshots={}", r.snapshots.len());
    println!("logs_count={}", r.logs_count);
}
