//! Reading the block body.
//!
//! Nothing here returns an error. A field that cannot be read is left out of
//! the [`ParsedConfig`] and the caller keeps whatever value it had.

use bkt_schemas::{
    ExchangeConfig, ParsedConfig, TickMode, FEE_UNITS_PER_PERCENT, MAX_EXCHANGES,
};
use serde_json::{Map, Value};
use tracing::debug;

use crate::block::locate;

/// Parse the first config block in `text`.
///
/// `None` when there is no block, or when the block yields no recognized field.
pub fn parse(text: &str) -> Option<ParsedConfig> {
    let span = locate(text)?;
    let parsed = parse_body(span.body(text));
    if parsed.is_empty() {
        None
    } else {
        Some(parsed)
    }
}

/// Parse `key: value` lines. Unknown keys are ignored; later lines win.
pub fn parse_body(body: &str) -> ParsedConfig {
    let mut out = ParsedConfig::default();

    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "start" => out.start = Some(value.to_string()),
            "end" => out.end = Some(value.to_string()),
            "period" => out.period = Some(value.to_string()),
            "basePeriod" => out.base_period = Some(value.to_string()),
            "mode" => match leading_int(value).and_then(TickMode::from_code) {
                Some(mode) => out.mode = Some(mode),
                None => debug!(value, "config block: unreadable mode ignored"),
            },
            "exchanges" => match parse_exchanges(value) {
                Some(list) => out.exchanges = Some(list),
                None => debug!("config block: malformed exchanges literal ignored"),
            },
            _ => {}
        }
    }

    out
}

/// Leading integer of `s`: optional sign then digits, trailing text ignored.
fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }
    rest[..digits_len].parse::<i64>().ok().map(|n| sign * n)
}

/// A JSON array of 1..=MAX_EXCHANGES objects. Anything else is malformed.
fn parse_exchanges(value: &str) -> Option<Vec<ExchangeConfig>> {
    let parsed: Value = serde_json::from_str(value).ok()?;
    let items = parsed.as_array()?;
    if items.is_empty() || items.len() > MAX_EXCHANGES {
        return None;
    }
    items
        .iter()
        .map(|item| item.as_object().map(exchange_from_object))
        .collect()
}

/// Missing or mistyped fields keep the [`ExchangeConfig`] default.
fn exchange_from_object(obj: &Map<String, Value>) -> ExchangeConfig {
    let mut ex = ExchangeConfig::default();

    if let Some(v) = obj.get("eid").and_then(Value::as_str) {
        ex.eid = v.to_string();
    }
    if let Some(v) = obj.get("currency").and_then(Value::as_str) {
        ex.currency = v.to_string();
    }
    if let Some(v) = obj.get("balance").and_then(Value::as_f64) {
        ex.balance = v;
    }
    if let Some(v) = obj.get("stocks").and_then(Value::as_f64) {
        ex.stocks = v;
    }
    ex.fee = obj.get("fee").and_then(fee_units);

    ex
}

/// `[maker%, taker%]` decimal percentages -> integer fee units.
fn fee_units(v: &Value) -> Option<[u32; 2]> {
    match v.as_array()?.as_slice() {
        [maker, taker] => Some([percent_to_units(maker)?, percent_to_units(taker)?]),
        _ => None,
    }
}

fn percent_to_units(v: &Value) -> Option<u32> {
    let pct = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    let units = (pct * FEE_UNITS_PER_PERCENT).round();
    if units.is_finite() && (0.0..=f64::from(u32::MAX)).contains(&units) {
        Some(units as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_scalar_fields() {
        let p = parse_body(
            "start: 2024-01-01 00:00:00\nend: 2024-06-30 00:00:00\nperiod: 1h\nbasePeriod: 15m\nmode: 1\n",
        );
        assert_eq!(p.start.as_deref(), Some("2024-01-01 00:00:00"));
        assert_eq!(p.end.as_deref(), Some("2024-06-30 00:00:00"));
        assert_eq!(p.period.as_deref(), Some("1h"));
        assert_eq!(p.base_period.as_deref(), Some("15m"));
        assert_eq!(p.mode, Some(TickMode::Real));
        assert_eq!(p.exchanges, None);
    }

    #[test]
    fn empty_base_period_is_kept_as_empty() {
        let p = parse_body("basePeriod:\n");
        assert_eq!(p.base_period.as_deref(), Some(""));
    }

    #[test]
    fn unknown_keys_and_colonless_lines_are_ignored() {
        let p = parse_body("futureKey: 3\njust words\n\n   \nperiod: 4h");
        assert_eq!(p.period.as_deref(), Some("4h"));
        assert_eq!(
            p,
            ParsedConfig {
                period: Some("4h".to_string()),
                ..ParsedConfig::default()
            }
        );
    }

    #[test]
    fn mode_is_read_leniently() {
        assert_eq!(parse_body("mode: 0").mode, Some(TickMode::Simulated));
        assert_eq!(parse_body("mode: 1 # exact ticks").mode, Some(TickMode::Real));
        assert_eq!(parse_body("mode: fast").mode, None);
        assert_eq!(parse_body("mode: 7").mode, None);
        assert_eq!(parse_body("mode:").mode, None);
    }

    #[test]
    fn leading_int_behaves_like_a_lenient_reader() {
        assert_eq!(leading_int("12abc"), Some(12));
        assert_eq!(leading_int("  -3"), Some(-3));
        assert_eq!(leading_int("+1"), Some(1));
        assert_eq!(leading_int("-"), None);
        assert_eq!(leading_int("x1"), None);
    }

    #[test]
    fn exchange_fields_default_when_missing_or_mistyped() {
        let p = parse_body(r#"exchanges: [{"eid":7,"balance":"lots","currency":"ETH_USDT"}]"#);
        let ex = &p.exchanges.unwrap()[0];
        assert_eq!(ex.eid, "Binance");
        assert_eq!(ex.currency, "ETH_USDT");
        assert_eq!(ex.balance, 10_000.0);
        assert_eq!(ex.stocks, 0.0);
        assert_eq!(ex.fee, None);
    }

    #[test]
    fn fee_percentages_become_units() {
        let p = parse_body(r#"exchanges: [{"fee":[0.015,"0.02"]}]"#);
        assert_eq!(p.exchanges.unwrap()[0].fee, Some([150, 200]));
    }

    #[test]
    fn bad_fee_pairs_are_absent_not_zero() {
        for lit in [
            r#"[{"fee":[0.03]}]"#,
            r#"[{"fee":[0.03,0.05,0.07]}]"#,
            r#"[{"fee":[-0.01,0.05]}]"#,
            r#"[{"fee":[null,0.05]}]"#,
            r#"[{"fee":"0.03"}]"#,
        ] {
            let p = parse_body(&format!("exchanges: {lit}"));
            assert_eq!(p.exchanges.unwrap()[0].fee, None, "{lit}");
        }
    }

    #[test]
    fn malformed_exchange_literals_are_omitted() {
        for lit in [
            "{not valid}",
            "[]",
            r#"{"eid":"OKX"}"#,
            r#"[{"eid":"OKX"}, 5]"#,
            r#"[{},{},{},{},{},{}]"#,
        ] {
            let p = parse_body(&format!("period: 1h\nexchanges: {lit}"));
            assert_eq!(p.exchanges, None, "{lit}");
            assert_eq!(p.period.as_deref(), Some("1h"));
        }
    }

    #[test]
    fn block_with_no_recognized_field_is_absent() {
        assert_eq!(parse("'''backtest\nfoo: bar\nmode: x\n'''"), None);
        assert_eq!(parse("'''backtest\n'''"), None);
        assert_eq!(parse("print('hi')"), None);
    }
}
