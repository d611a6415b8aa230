//! bkt-schemas
//!
//! Plain data shared by the codec, the session controller and the CLI.
//! Nothing in here performs I/O.

pub mod config;
pub mod result;
pub mod session;

pub use config::{
    default_fee, ConfigError, ExchangeConfig, ParsedConfig, SessionConfig, TickMode,
    DEFAULT_BALANCE, DEFAULT_CURRENCY, DEFAULT_EID, DEFAULT_STOCKS, FEE_UNITS_PER_PERCENT,
    MAX_EXCHANGES, TIMESTAMP_FORMAT,
};
pub use result::{AccountSummary, BacktestResult, SnapshotPoint, TradeRecord};
pub use session::{BacktestSession, SessionEvent, SessionStatus, TaskId};
