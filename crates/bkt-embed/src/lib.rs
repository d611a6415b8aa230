//! bkt-embed
//!
//! Codec for the backtest config block embedded in a strategy's source text:
//!
//! ```text
//! '''backtest
//! start: 2024-01-01 00:00:00
//! end: 2024-06-30 00:00:00
//! period: 1h
//! basePeriod: 1m
//! exchanges: [{"eid":"Binance","currency":"BTC_USDT","balance":10000,"stocks":0}]
//! '''
//! ```
//!
//! The surrounding text is arbitrary user content, so reading never fails:
//! a malformed field is omitted and a missing block is `None`. `mode` is read
//! but not written back.

mod block;
mod parse;
mod render;

pub use block::{locate, BlockSpan, Marker, BLOCK_TAG};
pub use parse::{parse, parse_body};
pub use render::{render, serialize};

use bkt_schemas::SessionConfig;

/// Write `config` into `text`.
///
/// An existing block is replaced in place (keeping its quote style) and every
/// byte outside it is preserved. Without a block, the canonical block and a
/// blank line are prepended. Applying the same config twice is a no-op the
/// second time.
pub fn update(text: &str, config: &SessionConfig) -> String {
    match locate(text) {
        Some(span) => {
            let block = render(config, span.marker);
            let mut out = String::with_capacity(text.len() - span.len() + block.len());
            out.push_str(&text[..span.start]);
            out.push_str(&block);
            out.push_str(&text[span.end..]);
            out
        }
        None => format!("{}\n\n{}", serialize(config), text),
    }
}
