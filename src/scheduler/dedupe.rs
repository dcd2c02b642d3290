use std::collections::HashSet;

use crate::adapters::AdapterResult;
use crate::model::MatchRecord;

/// Merges adapter results given in priority order. The first copy of each
/// `match_id` wins; later copies are dropped. Returns the merged list and
/// the number of records discarded.
pub fn merge(results: Vec<AdapterResult>) -> (Vec<MatchRecord>, usize) {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    let mut dropped = 0;

    for result in results {
        for record in result.records {
            if seen.insert(record.match_id.clone()) {
                merged.push(record);
            } else {
                dropped += 1;
            }
        }
    }
    (merged, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FetchOutcome;
    use crate::model::{PrimaryOdds, Sport};
    use serde_json::json;

    fn result(source: &str, ids: &[(&str, &str)]) -> AdapterResult {
        let records: Vec<MatchRecord> = ids
            .iter()
            .map(|(id, home_odds)| {
                MatchRecord::new(Sport::Cricket, *id, json!({})).with_odds(PrimaryOdds {
                    home: Some(home_odds.to_string()),
                    away: Some("2.0".to_string()),
                    draw: None,
                })
            })
            .collect();
        AdapterResult {
            source: source.to_string(),
            outcome: FetchOutcome::Ok(records.len()),
            records,
        }
    }

    #[test]
    fn earlier_adapter_wins() {
        let (merged, dropped) = merge(vec![
            result("a", &[("sf_42", "1.8"), ("sf_1", "1.1")]),
            result("b", &[("sf_42", "2.0"), ("s24_7", "3.0")]),
        ]);
        assert_eq!(dropped, 1);
        let ids: Vec<&str> = merged.iter().map(|r| r.match_id.as_str()).collect();
        assert_eq!(ids, vec!["sf_42", "sf_1", "s24_7"]);
        assert_eq!(merged[0].home_odds.as_deref(), Some("1.8"));
    }

    #[test]
    fn repeats_within_one_adapter_collapse() {
        let (merged, dropped) = merge(vec![result("a", &[("sf_1", "1.5"), ("sf_1", "1.6")])]);
        assert_eq!(merged.len(), 1);
        assert_eq!(dropped, 1);
        assert_eq!(merged[0].home_odds.as_deref(), Some("1.5"));
    }
}
