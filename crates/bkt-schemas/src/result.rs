//! Result payload carried by a `complete` stream record.
//!
//! The figures are computed server-side; this crate only decodes them. Any
//! numeric field the server leaves out decodes to zero.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSummary {
    pub initial_balance: f64,
    pub final_balance: f64,
    pub final_stocks: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
    pub sharpe_ratio: f64,
    pub annualized_return: f64,
    pub total_trades: u64,
    pub elapsed_ms: f64,
    pub load_elapsed_ms: f64,

    // Account detail as reported by the engine.
    pub exchange_name: String,
    pub quote_currency: String,
    pub balance: f64,
    pub frozen_balance: f64,
    pub commission: f64,
    pub funding_fee: f64,
    pub closed_pnl: f64,
    pub position_pnl: f64,
    pub margin: f64,
    pub estimated_profit: f64,
    pub logs_count: u64,
}

/// One point of the equity / exposure curve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotPoint {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub pnl: f64,
    pub utilization: f64,
    pub long_amount: f64,
    pub short_amount: f64,
    pub margin: f64,
    pub closed_pnl: f64,
}

/// One line of the engine's trade / event log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeRecord {
    pub id: i64,
    pub timestamp: i64,
    /// 0=buy, 1=sell, 2=cancel, 3=error, 4=profit, 5=log
    pub r#type: i32,
    pub type_label: String,
    pub exchange_idx: i32,
    pub order_type: i32,
    pub price: f64,
    pub amount: f64,
    pub message: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestResult {
    pub summary: AccountSummary,
    pub snapshots: Vec<SnapshotPoint>,
    pub trades: Vec<TradeRecord>,
    /// Raw profit log rows, passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_logs: Option<Vec<Value>>,
    pub logs_count: u64,
}
