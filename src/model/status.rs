//! Status normalization.
//!
//! Every adapter owns a `StatusTable` mapping its source tokens onto
//! `StatusCode`. Unknown tokens map to `Unknown`. Free-text heuristics then
//! override the token: result phrases force `Finished`, and a score on a
//! match that is not finished marks it live.

use super::record::StatusCode;

/// Phrases in result/status text that mean the match is over.
const FINISHED_PHRASES: &[&str] = &[
    "won by",
    "tied",
    "abandoned",
    "no result",
    "match drawn",
    "ended",
    "retired",
    "walkover",
];

#[derive(Debug, Clone, Default)]
pub struct StatusTable {
    entries: Vec<(&'static str, StatusCode)>,
}

impl StatusTable {
    pub fn new(entries: &[(&'static str, StatusCode)]) -> Self {
        Self {
            entries: entries.to_vec(),
        }
    }

    /// Token family used by the SSR-blob source (`^1`, `^2`, `^3`).
    pub fn caret_tokens() -> Self {
        Self::new(&[
            ("^1", StatusCode::Upcoming),
            ("^2", StatusCode::Live),
            ("^3", StatusCode::Finished),
            ("^4", StatusCode::Break),
        ])
    }

    pub fn lookup(&self, token: &str) -> StatusCode {
        let token = token.trim();
        self.entries
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(token))
            .map(|(_, code)| *code)
            .unwrap_or(StatusCode::Unknown)
    }
}

/// Result of status normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedStatus {
    pub code: StatusCode,
    pub is_live: bool,
}

/// True when a finished phrase occurs as whole words, so "suspended" or
/// "extended" never read as "ended".
pub fn looks_finished(text: &str) -> bool {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    FINISHED_PHRASES.iter().any(|phrase| {
        let needle: Vec<&str> = phrase.split_whitespace().collect();
        words.windows(needle.len()).any(|w| w == needle.as_slice())
    })
}

/// Combines the token lookup with the free-text heuristics.
///
/// `texts` are all free-text fields the source provides (status detail,
/// result line). `has_score` is whether any score is present.
pub fn normalize(table: &StatusTable, token: &str, texts: &[&str], has_score: bool) -> NormalizedStatus {
    let code = table.lookup(token);
    classify(code, texts, has_score)
}

/// Heuristics applied on top of an already-mapped status code.
pub fn classify(code: StatusCode, texts: &[&str], has_score: bool) -> NormalizedStatus {
    if code == StatusCode::Finished || texts.iter().any(|t| looks_finished(t)) {
        return NormalizedStatus {
            code: StatusCode::Finished,
            is_live: false,
        };
    }

    if code.is_in_play() {
        return NormalizedStatus { code, is_live: true };
    }

    if has_score {
        return NormalizedStatus {
            code: StatusCode::Live,
            is_live: true,
        };
    }

    NormalizedStatus {
        code,
        is_live: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_tokens_map() {
        let table = StatusTable::caret_tokens();
        assert_eq!(table.lookup("^1"), StatusCode::Upcoming);
        assert_eq!(table.lookup("^2"), StatusCode::Live);
        assert_eq!(table.lookup("^3"), StatusCode::Finished);
        assert_eq!(table.lookup("^9"), StatusCode::Unknown);
        assert_eq!(table.lookup(""), StatusCode::Unknown);
    }

    #[test]
    fn result_text_forces_finished() {
        let table = StatusTable::caret_tokens();
        let status = normalize(&table, "^2", &["", "India won by 7 wickets"], true);
        assert_eq!(status.code, StatusCode::Finished);
        assert!(!status.is_live);

        let status = normalize(&table, "^2", &["Match abandoned due to rain"], false);
        assert_eq!(status.code, StatusCode::Finished);
    }

    #[test]
    fn finished_phrases_match_whole_words_only() {
        let table = StatusTable::caret_tokens();
        let status = normalize(&table, "^2", &["Play suspended due to rain"], true);
        assert_eq!(status.code, StatusCode::Live);
        assert!(status.is_live);

        let status = classify(StatusCode::Live, &["Extended time"], true);
        assert_eq!(status.code, StatusCode::Live);

        assert!(looks_finished("Match ended, 2-1"));
        assert!(looks_finished("Player RETIRED"));
        assert!(!looks_finished("Untied laces"));
    }

    #[test]
    fn score_without_finish_is_live() {
        let table = StatusTable::caret_tokens();
        let status = normalize(&table, "", &["1st Innings"], true);
        assert_eq!(status.code, StatusCode::Live);
        assert!(status.is_live);
    }

    #[test]
    fn upcoming_without_score_stays_upcoming() {
        let table = StatusTable::caret_tokens();
        let status = normalize(&table, "^1", &["Starts 14:30"], false);
        assert_eq!(status.code, StatusCode::Upcoming);
        assert!(!status.is_live);
    }

    #[test]
    fn live_implies_in_play_code() {
        let table = StatusTable::caret_tokens();
        for token in ["^1", "^2", "^3", "^4", "x"] {
            for has_score in [true, false] {
                let s = normalize(&table, token, &["Set 2"], has_score);
                if s.is_live {
                    assert!(s.code.is_in_play(), "{} {}", token, has_score);
                }
            }
        }
    }
}
