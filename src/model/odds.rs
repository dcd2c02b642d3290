//! Shape-tolerant odds extraction.
//!
//! Sources ship odds as nested array-of-array blobs whose index semantics
//! drift by sport. The extractor works on raw `serde_json::Value`s with
//! explicit kind checks and never fails: anything it cannot read becomes
//! `None`.

use serde_json::Value;

use super::record::{OtherOdds, PrimaryOdds};

/// Order in which market groups are tried as the primary market.
/// Groups past the end of this list are tried afterwards in order.
const GROUP_PREFERENCE: [usize; 3] = [1, 0, 2];

/// Extracts the primary match-winner prices from a raw match payload.
///
/// 1. An `odds` object on the payload wins outright.
/// 2. Otherwise `ext.odds.oddItems[*].odd` market groups are tried in
///    preference order; the first whose home and away prices are both valid
///    is used.
pub fn extract_primary(raw: &Value) -> PrimaryOdds {
    if let Some(odds) = raw.get("odds").filter(|v| v.is_object()) {
        let direct = from_object(odds);
        if !direct.is_empty() {
            return direct;
        }
    }

    match odd_items(raw) {
        Some(items) => select_group(items).map(|(_, odds)| odds).unwrap_or_default(),
        None => PrimaryOdds::default(),
    }
}

/// Index of the group `extract_primary` would choose, if any.
pub fn primary_group_index(raw: &Value) -> Option<usize> {
    if raw.get("odds").filter(|v| v.is_object()).map(from_object).is_some_and(|o| !o.is_empty()) {
        return None;
    }
    odd_items(raw).and_then(select_group).map(|(idx, _)| idx)
}

/// Every market group except the primary one, keyed `<tag>:<market name>`.
pub fn extract_other(raw: &Value, tag: &str) -> OtherOdds {
    let mut other = OtherOdds::new();
    let Some(items) = odd_items(raw) else {
        return other;
    };
    let primary = primary_group_index(raw);

    for (idx, item) in items.iter().enumerate() {
        if Some(idx) == primary {
            continue;
        }
        let Some(values) = item.get("odd").and_then(Value::as_array) else {
            continue;
        };
        let selections: std::collections::BTreeMap<String, String> = values
            .iter()
            .enumerate()
            .filter_map(|(pos, v)| valid_price(v).map(|p| (pos.to_string(), p)))
            .collect();
        if selections.is_empty() {
            continue;
        }
        let name = market_name(item).unwrap_or_else(|| format!("group_{}", idx));
        other.insert(format!("{}:{}", tag, name), selections);
    }
    other
}

/// Reads a price cell. Strings and numbers are accepted; empty, `"0"`,
/// zero and non-numeric values are not.
pub fn valid_price(v: &Value) -> Option<String> {
    let text = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() || text == "0" || text == "-" {
        return None;
    }
    match text.parse::<f64>() {
        Ok(n) if n.is_finite() && n != 0.0 => Some(text),
        _ => None,
    }
}

fn odd_items(raw: &Value) -> Option<&Vec<Value>> {
    raw.get("ext")?.get("odds")?.get("oddItems")?.as_array()
}

fn market_name(item: &Value) -> Option<String> {
    ["name", "title", "marketName", "type"]
        .iter()
        .find_map(|key| item.get(*key))
        .and_then(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn select_group(items: &Vec<Value>) -> Option<(usize, PrimaryOdds)> {
    let order = GROUP_PREFERENCE
        .iter()
        .copied()
        .chain(GROUP_PREFERENCE.len()..items.len())
        .filter(|idx| *idx < items.len());

    for idx in order {
        if let Some(odds) = group_odds(&items[idx]) {
            return Some((idx, odds));
        }
    }
    None
}

/// Maps one group's `odd` array onto home/draw/away.
fn group_odds(item: &Value) -> Option<PrimaryOdds> {
    let values = item.get("odd")?.as_array()?;
    if values.len() < 2 {
        return None;
    }
    if values.iter().filter(|v| valid_price(v).is_some()).count() < 2 {
        return None;
    }

    let odds = if values.len() >= 3 {
        PrimaryOdds {
            home: valid_price(&values[0]),
            draw: valid_price(&values[1]),
            away: valid_price(&values[2]),
        }
    } else {
        PrimaryOdds {
            home: valid_price(&values[0]),
            away: valid_price(&values[1]),
            draw: None,
        }
    };

    if odds.home.is_some() && odds.away.is_some() {
        Some(odds)
    } else {
        None
    }
}

/// Home and away must both be valid; a lone draw price is meaningless.
fn from_object(odds: &Value) -> PrimaryOdds {
    let pick = |keys: &[&str]| keys.iter().find_map(|k| odds.get(*k).and_then(valid_price));
    match (pick(&["home", "home_odds", "1"]), pick(&["away", "away_odds", "2"])) {
        (Some(home), Some(away)) => PrimaryOdds {
            home: Some(home),
            away: Some(away),
            draw: pick(&["draw", "draw_odds", "X", "x"]),
        },
        _ => PrimaryOdds::default(),
    }
}

/// Converts a fractional price such as `"5/2"` to a decimal string (`"3.50"`).
pub fn fractional_to_decimal(fraction: &str) -> Option<String> {
    let (num, den) = fraction.trim().split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den <= 0.0 || num < 0.0 {
        return None;
    }
    Some(format!("{:.2}", num / den + 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(items: Value) -> Value {
        json!({ "ext": { "odds": { "oddItems": items } } })
    }

    #[test]
    fn prefers_second_group_and_nulls_zero_draw() {
        let raw = payload(json!([
            {"odd": ["1.44", "-1.5", "2.62", "0"]},
            {"odd": ["2.1", "0", "1.66", "0"]},
            {"odd": ["1.9", "78.5", "1.8", "0"]}
        ]));
        let odds = extract_primary(&raw);
        assert_eq!(odds.home.as_deref(), Some("2.1"));
        assert_eq!(odds.draw, None);
        assert_eq!(odds.away.as_deref(), Some("1.66"));
    }

    #[test]
    fn falls_through_when_preferred_group_is_empty() {
        let raw = payload(json!([
            {"odd": ["1.44", "3.9", "2.62"]},
            {"odd": ["0", "0", "0", "0"]}
        ]));
        let odds = extract_primary(&raw);
        assert_eq!(odds.home.as_deref(), Some("1.44"));
        assert_eq!(odds.draw.as_deref(), Some("3.9"));
        assert_eq!(odds.away.as_deref(), Some("2.62"));
    }

    #[test]
    fn two_value_group_is_home_away() {
        let raw = payload(json!([{"odd": ["1.5", "2.5"]}]));
        let odds = extract_primary(&raw);
        assert_eq!(odds.home.as_deref(), Some("1.5"));
        assert_eq!(odds.away.as_deref(), Some("2.5"));
        assert_eq!(odds.draw, None);
    }

    #[test]
    fn odds_object_wins() {
        let raw = json!({
            "odds": {"home": 1.8, "away": "2.05"},
            "ext": {"odds": {"oddItems": [{"odd": ["9", "9"]}]}}
        });
        let odds = extract_primary(&raw);
        assert_eq!(odds.home.as_deref(), Some("1.8"));
        assert_eq!(odds.away.as_deref(), Some("2.05"));
    }

    #[test]
    fn no_odds_anywhere_is_all_null() {
        assert!(extract_primary(&json!({"a": "^2"})).is_empty());
        assert!(extract_other(&json!({"a": "^2"}), "sf").is_empty());
    }

    #[test]
    fn garbage_shapes_never_panic() {
        let shapes = [
            json!(null),
            json!(42),
            json!("odds"),
            json!([1, 2, 3]),
            json!({"ext": null}),
            json!({"ext": {"odds": "x"}}),
            json!({"ext": {"odds": {"oddItems": {"odd": 1}}}}),
            json!({"ext": {"odds": {"oddItems": [null, 1, "x", {"odd": null}, {"odd": [[1], {}]}]}}}),
            json!({"odds": []}),
            json!({"odds": {"home": {"v": 1}}}),
        ];
        for raw in shapes {
            assert!(extract_primary(&raw).is_empty(), "{}", raw);
            let _ = extract_other(&raw, "sf");
        }
    }

    #[test]
    fn other_markets_skip_primary_group() {
        let raw = payload(json!([
            {"odd": ["1.44", "-1.5", "2.62", "0"]},
            {"odd": ["2.1", "0", "1.66", "0"]},
            {"name": "Total", "odd": ["1.9", "78.5", "1.8", "0"]}
        ]));
        let other = extract_other(&raw, "sf");
        assert_eq!(other.len(), 2);
        assert!(other.contains_key("sf:group_0"));
        let total = &other["sf:Total"];
        assert_eq!(total.get("1").map(String::as_str), Some("78.5"));
        assert!(!total.contains_key("3"));
    }

    #[test]
    fn fractional_prices_convert() {
        assert_eq!(fractional_to_decimal("5/2").as_deref(), Some("3.50"));
        assert_eq!(fractional_to_decimal("1/4").as_deref(), Some("1.25"));
        assert_eq!(fractional_to_decimal("1/0"), None);
        assert_eq!(fractional_to_decimal("evens"), None);
    }
}
