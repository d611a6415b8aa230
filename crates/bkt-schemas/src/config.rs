//! Backtest configuration values.
//!
//! Every default used when a field is missing lives in this module, so the
//! lenient readers elsewhere (the embedded-block codec in particular) never
//! invent their own.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Defaulting table
// ---------------------------------------------------------------------------

/// Upper bound on simulated exchange accounts per session.
pub const MAX_EXCHANGES: usize = 5;

/// Wall-clock format of `start` / `end`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const DEFAULT_EID: &str = "Binance";
pub const DEFAULT_CURRENCY: &str = "BTC_USDT";
pub const DEFAULT_BALANCE: f64 = 10_000.0;
pub const DEFAULT_STOCKS: f64 = 0.0;

/// Fee units per decimal percentage point: `0.03` (percent) is stored as `300`.
pub const FEE_UNITS_PER_PERCENT: f64 = 10_000.0;

const DEFAULT_START: &str = "2024-01-01 00:00:00";
const DEFAULT_END: &str = "2024-06-30 00:00:00";
const DEFAULT_PERIOD: &str = "1h";
const DEFAULT_BASE_PERIOD: &str = "1m";

/// Fee pair `[maker, taker]` the remote engine applies when an exchange
/// carries no explicit `fee`. Display only: an absent fee is never rewritten.
pub fn default_fee(eid: &str) -> [u32; 2] {
    match eid {
        "Binance" | "OKX" | "Huobi" => [150, 200],
        "Futures_Binance" => [300, 300],
        "Futures_OKX" | "Futures_HuobiDM" => [30, 30],
        "Futures_BitMEX" => [8, 10],
        "Futures_CTP" => [25, 25],
        "Futures_XTP" => [30, 130],
        _ => [2000, 2000],
    }
}

// ---------------------------------------------------------------------------
// ExchangeConfig
// ---------------------------------------------------------------------------

/// One simulated exchange account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub eid: String,
    pub currency: String,
    /// Initial quote balance.
    pub balance: f64,
    /// Initial base-asset holdings.
    pub stocks: f64,
    /// `[maker, taker]` in hundredths of a basis point. `None` = exchange default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<[u32; 2]>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            eid: DEFAULT_EID.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            balance: DEFAULT_BALANCE,
            stocks: DEFAULT_STOCKS,
            fee: None,
        }
    }
}

impl ExchangeConfig {
    /// Fee the engine will charge: the explicit pair, or the exchange default.
    pub fn effective_fee(&self) -> [u32; 2] {
        self.fee.unwrap_or_else(|| default_fee(&self.eid))
    }
}

// ---------------------------------------------------------------------------
// TickMode
// ---------------------------------------------------------------------------

/// Tick simulation fidelity. Serialized as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TickMode {
    /// `0`: ticks synthesized from candles.
    #[default]
    Simulated,
    /// `1`: recorded exchange ticks.
    Real,
}

impl TickMode {
    pub fn code(self) -> u8 {
        match self {
            TickMode::Simulated => 0,
            TickMode::Real => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TickMode::Simulated),
            1 => Some(TickMode::Real),
            _ => None,
        }
    }
}

impl From<TickMode> for u8 {
    fn from(m: TickMode) -> u8 {
        m.code()
    }
}

impl TryFrom<u8> for TickMode {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        TickMode::from_code(i64::from(v)).ok_or_else(|| format!("invalid tick mode {v}"))
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Reasons a [`SessionConfig`] is refused before it reaches the remote engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    NoExchanges,
    TooManyExchanges(usize),
    /// Removing the only remaining exchange.
    LastExchange,
    ExchangeIndex(usize),
    Timestamp { field: &'static str, value: String },
    EmptyRange { start: String, end: String },
    Period { field: &'static str, value: String },
    /// Value would corrupt the embedded config block (line break or quote marker).
    UnsafeText { field: &'static str },
    Amount { field: &'static str, index: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoExchanges => write!(f, "at least one exchange is required"),
            ConfigError::TooManyExchanges(n) => {
                write!(f, "at most {MAX_EXCHANGES} exchanges are supported (got {n})")
            }
            ConfigError::LastExchange => write!(f, "cannot remove the last exchange"),
            ConfigError::ExchangeIndex(i) => write!(f, "no exchange at index {i}"),
            ConfigError::Timestamp { field, value } => write!(
                f,
                "{field} '{value}' is not a timestamp in the form YYYY-MM-DD HH:MM:SS"
            ),
            ConfigError::EmptyRange { start, end } => {
                write!(f, "start '{start}' must be before end '{end}'")
            }
            ConfigError::Period { field, value } => write!(
                f,
                "{field} '{value}' is not a period token (e.g. 1m, 15m, 4h, 1d, 1w)"
            ),
            ConfigError::UnsafeText { field } => {
                write!(f, "{field} must not contain line breaks or block quote markers")
            }
            ConfigError::Amount { field, index } => write!(
                f,
                "exchange {index}: {field} must be a finite, non-negative number"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Full configuration for one backtest session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub start: String,
    pub end: String,
    /// Candle granularity token.
    pub period: String,
    /// Finer replay granularity; empty means "auto".
    #[serde(rename = "basePeriod")]
    pub base_period: String,
    pub mode: TickMode,
    pub exchanges: Vec<ExchangeConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start: DEFAULT_START.to_string(),
            end: DEFAULT_END.to_string(),
            period: DEFAULT_PERIOD.to_string(),
            base_period: DEFAULT_BASE_PERIOD.to_string(),
            mode: TickMode::default(),
            exchanges: vec![ExchangeConfig::default()],
        }
    }
}

impl SessionConfig {
    /// Overlay the fields present in `parsed`. Absent fields keep their value.
    pub fn merge(&mut self, parsed: ParsedConfig) {
        let ParsedConfig {
            start,
            end,
            period,
            base_period,
            mode,
            exchanges,
        } = parsed;

        if let Some(v) = start {
            self.start = v;
        }
        if let Some(v) = end {
            self.end = v;
        }
        if let Some(v) = period {
            self.period = v;
        }
        if let Some(v) = base_period {
            self.base_period = v;
        }
        if let Some(v) = mode {
            self.mode = v;
        }
        if let Some(v) = exchanges {
            self.exchanges = v;
        }
    }

    pub fn add_exchange(&mut self, exchange: ExchangeConfig) -> Result<(), ConfigError> {
        if self.exchanges.len() >= MAX_EXCHANGES {
            return Err(ConfigError::TooManyExchanges(self.exchanges.len() + 1));
        }
        self.exchanges.push(exchange);
        Ok(())
    }

    pub fn remove_exchange(&mut self, index: usize) -> Result<ExchangeConfig, ConfigError> {
        if index >= self.exchanges.len() {
            return Err(ConfigError::ExchangeIndex(index));
        }
        if self.exchanges.len() == 1 {
            return Err(ConfigError::LastExchange);
        }
        Ok(self.exchanges.remove(index))
    }

    /// Check every invariant the remote engine and the embedded block rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.exchanges.len() {
            0 => return Err(ConfigError::NoExchanges),
            n if n > MAX_EXCHANGES => return Err(ConfigError::TooManyExchanges(n)),
            _ => {}
        }

        for (field, value) in [
            ("start", &self.start),
            ("end", &self.end),
            ("period", &self.period),
            ("basePeriod", &self.base_period),
        ] {
            if !is_block_safe(value) {
                return Err(ConfigError::UnsafeText { field });
            }
        }

        let start = parse_timestamp("start", &self.start)?;
        let end = parse_timestamp("end", &self.end)?;
        if start >= end {
            return Err(ConfigError::EmptyRange {
                start: self.start.clone(),
                end: self.end.clone(),
            });
        }

        if !is_period_token(&self.period) {
            return Err(ConfigError::Period {
                field: "period",
                value: self.period.clone(),
            });
        }
        if !self.base_period.is_empty() && !is_period_token(&self.base_period) {
            return Err(ConfigError::Period {
                field: "basePeriod",
                value: self.base_period.clone(),
            });
        }

        for (index, ex) in self.exchanges.iter().enumerate() {
            if !is_block_safe(&ex.eid) {
                return Err(ConfigError::UnsafeText { field: "eid" });
            }
            if !is_block_safe(&ex.currency) {
                return Err(ConfigError::UnsafeText { field: "currency" });
            }
            if !(ex.balance.is_finite() && ex.balance >= 0.0) {
                return Err(ConfigError::Amount {
                    field: "balance",
                    index,
                });
            }
            if !(ex.stocks.is_finite() && ex.stocks >= 0.0) {
                return Err(ConfigError::Amount {
                    field: "stocks",
                    index,
                });
            }
        }

        Ok(())
    }
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<NaiveDateTime, ConfigError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|_| ConfigError::Timestamp {
        field,
        value: value.to_string(),
    })
}

/// `<digits><m|h|d|w>`, e.g. `15m`, `4h`.
fn is_period_token(s: &str) -> bool {
    let Some(unit) = s.chars().last() else {
        return false;
    };
    let digits = &s[..s.len() - unit.len_utf8()];
    matches!(unit, 'm' | 'h' | 'd' | 'w')
        && !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_block_safe(s: &str) -> bool {
    !s.contains(['\n', '\r']) && !s.contains("'''") && !s.contains("\"\"\"")
}

// ---------------------------------------------------------------------------
// ParsedConfig
// ---------------------------------------------------------------------------

/// The subset of a [`SessionConfig`] recovered from an embedded block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedConfig {
    pub start: Option<String>,
    pub end: Option<String>,
    pub period: Option<String>,
    pub base_period: Option<String>,
    pub mode: Option<TickMode>,
    pub exchanges: Option<Vec<ExchangeConfig>>,
}

impl ParsedConfig {
    pub fn is_empty(&self) -> bool {
        self.start.is_none()
            && self.end.is_none()
            && self.period.is_none()
            && self.base_period.is_none()
            && self.mode.is_none()
            && self.exchanges.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
