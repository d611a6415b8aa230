//! bkt-session
//!
//! Drives one remote backtest job at a time: issue the start request, follow
//! the job's push event stream, expose the current snapshot, stop or reset.
//!
//! - [`transport`]: the `JobTransport` boundary (start / stop / subscribe).
//! - [`http`]: the HTTP + WebSocket implementation of that boundary.
//! - [`controller`]: the session state machine.
//! - [`store`]: remote strategy source storage.

pub mod controller;
pub mod http;
pub mod store;
pub mod transport;

pub use controller::SessionController;
pub use http::HttpTransport;
pub use store::{StoreError, StrategyClient, StrategySource};
pub use transport::{EventStream, JobTransport, StartError, StreamError};
