//! Writing the block.

use bkt_schemas::{ExchangeConfig, SessionConfig, FEE_UNITS_PER_PERCENT};
use serde_json::{Number, Value};

use crate::block::{Marker, BLOCK_TAG};

/// Largest integer an f64 holds exactly.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Canonical block text, `'''`-quoted. Does not end with a newline.
pub fn serialize(config: &SessionConfig) -> String {
    render(config, Marker::Single)
}

/// Block text using `marker` for both quote lines.
///
/// Field order is fixed: start, end, period, basePeriod, exchanges. `mode` is
/// not written.
pub fn render(config: &SessionConfig, marker: Marker) -> String {
    let exchanges: Vec<String> = config.exchanges.iter().map(exchange_literal).collect();

    [
        format!("{}{}", marker.as_str(), BLOCK_TAG),
        format!("start: {}", config.start),
        format!("end: {}", config.end),
        format!("period: {}", config.period),
        format!("basePeriod: {}", config.base_period),
        format!("exchanges: [{}]", exchanges.join(",")),
        marker.as_str().to_string(),
    ]
    .join("\n")
}

/// `{"eid","currency","balance","stocks","fee"?}` on one line, keys in that
/// order, fee units converted back to decimal percentages.
fn exchange_literal(ex: &ExchangeConfig) -> String {
    let fee = match ex.fee {
        Some([maker, taker]) => format!(
            ",\"fee\":[{},{}]",
            number(f64::from(maker) / FEE_UNITS_PER_PERCENT),
            number(f64::from(taker) / FEE_UNITS_PER_PERCENT),
        ),
        None => String::new(),
    };
    format!(
        "{{\"eid\":{},\"currency\":{},\"balance\":{},\"stocks\":{}{}}}",
        Value::from(ex.eid.as_str()),
        Value::from(ex.currency.as_str()),
        number(ex.balance),
        number(ex.stocks),
        fee,
    )
}

/// Integral values render without a fractional part (`10000`, not `10000.0`).
/// Non-finite values have no JSON form and render as `null`.
fn number(x: f64) -> Value {
    if x.fract() == 0.0 && x.abs() < MAX_EXACT_INT {
        Value::from(x as i64)
    } else {
        Number::from_f64(x).map_or(Value::Null, Value::Number)
    }
}
