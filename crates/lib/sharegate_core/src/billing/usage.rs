//! `responseData` usage extraction.
//!
//! The workflow engine reports usage in one of three shapes. Precedence:
//! an array always parses as per-step usage; an object with a nested
//! `usage` object parses as that; otherwise the object's flat fields are
//! used. A JSON-encoded string is decoded once and parsed the same way.

use serde_json::{Map, Value};

/// Token and point totals for one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    pub tokens: i64,
    pub points: f64,
}

impl Usage {
    /// Token counts saturate at `i64::MAX`; points may still sum to infinity.
    fn add(self, other: Usage) -> Usage {
        Usage {
            tokens: self.tokens.saturating_add(other.tokens),
            points: self.points + other.points,
        }
    }

    /// False when the point total overflowed to infinity.
    pub fn is_finite(&self) -> bool {
        self.points.is_finite()
    }
}

/// Parsed `responseData`, tagged by the shape it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub enum UsageReport {
    /// `[{inputTokens, outputTokens, tokens, totalPoints}, ...]`
    Steps(Vec<Usage>),
    /// `{usage: {totalTokens, totalPoints}, ...}`
    Nested(Usage),
    /// `{totalTokens | tokens, totalPoints | points}`
    Flat(Usage),
    /// Anything else reports zero usage.
    Empty,
}

impl UsageReport {
    pub fn parse(data: &Value) -> UsageReport {
        match data {
            Value::Array(steps) => UsageReport::Steps(steps.iter().map(step_usage).collect()),
            Value::Object(obj) => match obj.get("usage") {
                Some(Value::Object(usage)) => UsageReport::Nested(nested_usage(usage)),
                _ => UsageReport::Flat(flat_usage(obj)),
            },
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(decoded @ (Value::Array(_) | Value::Object(_))) => UsageReport::parse(&decoded),
                _ => UsageReport::Empty,
            },
            _ => UsageReport::Empty,
        }
    }

    pub fn totals(&self) -> Usage {
        match self {
            UsageReport::Steps(steps) => steps.iter().fold(Usage::default(), |acc, s| acc.add(*s)),
            UsageReport::Nested(u) | UsageReport::Flat(u) => *u,
            UsageReport::Empty => Usage::default(),
        }
    }
}

fn step_usage(step: &Value) -> Usage {
    let Value::Object(obj) = step else {
        return Usage::default();
    };
    let tokens = ["inputTokens", "outputTokens", "tokens"]
        .iter()
        .map(|k| number(obj, k))
        .sum::<f64>();
    Usage {
        tokens: tokens.round() as i64,
        points: number(obj, "totalPoints"),
    }
}

fn nested_usage(usage: &Map<String, Value>) -> Usage {
    Usage {
        tokens: number(usage, "totalTokens").round() as i64,
        points: number(usage, "totalPoints"),
    }
}

fn flat_usage(obj: &Map<String, Value>) -> Usage {
    let tokens = first_number(obj, &["totalTokens", "tokens"]);
    let points = first_number(obj, &["totalPoints", "points"]);
    Usage {
        tokens: tokens.round() as i64,
        points,
    }
}

fn first_number(obj: &Map<String, Value>, keys: &[&str]) -> f64 {
    keys.iter()
        .find(|k| obj.contains_key(**k))
        .map(|k| number(obj, k))
        .unwrap_or(0.0)
}

/// Non-negative finite number at `key`; numeric strings are accepted.
/// Missing, malformed or negative values count as zero.
fn number(obj: &Map<String, Value>, key: &str) -> f64 {
    let value = match obj.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn array_sums_every_step() {
        let data = json!([
            {"moduleName": "llm", "inputTokens": 100, "outputTokens": 50, "totalPoints": 0.5},
            {"moduleName": "search", "tokens": 30, "totalPoints": 1.25},
            {"moduleName": "noop"}
        ]);
        let report = UsageReport::parse(&data);
        assert!(matches!(report, UsageReport::Steps(ref s) if s.len() == 3));
        assert_eq!(
            report.totals(),
            Usage {
                tokens: 180,
                points: 1.75
            }
        );
    }

    #[test]
    fn nested_usage_wins_over_flat_fields() {
        let data = json!({
            "usage": {"totalTokens": 2000, "totalPoints": 0},
            "totalTokens": 99,
            "points": 42
        });
        let report = UsageReport::parse(&data);
        assert_eq!(
            report,
            UsageReport::Nested(Usage {
                tokens: 2000,
                points: 0.0
            })
        );
    }

    #[test]
    fn flat_prefers_total_fields_then_short_names() {
        let long = UsageReport::parse(&json!({"totalTokens": 10, "tokens": 99, "totalPoints": 2}));
        assert_eq!(long.totals(), Usage { tokens: 10, points: 2.0 });

        let short = UsageReport::parse(&json!({"tokens": 7, "points": "1.5"}));
        assert_eq!(short.totals(), Usage { tokens: 7, points: 1.5 });
    }

    #[test]
    fn json_string_is_decoded_once() {
        let data = Value::String(r#"{"usage":{"totalTokens":300,"totalPoints":2}}"#.into());
        assert_eq!(
            UsageReport::parse(&data).totals(),
            Usage {
                tokens: 300,
                points: 2.0
            }
        );
        assert_eq!(UsageReport::parse(&json!("not json")), UsageReport::Empty);
    }

    #[test]
    fn negative_and_garbage_values_count_as_zero() {
        let data = json!({"totalTokens": -500, "totalPoints": "abc"});
        assert_eq!(UsageReport::parse(&data).totals(), Usage::default());
    }

    #[test]
    fn huge_step_tokens_saturate() {
        let data = json!([{"tokens": 1e19}, {"tokens": 1e19}, {"inputTokens": 5}]);
        let totals = UsageReport::parse(&data).totals();
        assert_eq!(totals.tokens, i64::MAX);
        assert!(totals.is_finite());
    }

    #[test]
    fn point_total_can_overflow_to_infinity() {
        let data = json!([{"totalPoints": 1e308}, {"totalPoints": 1e308}]);
        let totals = UsageReport::parse(&data).totals();
        assert!(!totals.is_finite());
        assert!(UsageReport::parse(&json!([{"totalPoints": 1e308}])).totals().is_finite());
    }

    #[test]
    fn scalars_report_nothing() {
        assert_eq!(UsageReport::parse(&json!(null)), UsageReport::Empty);
        assert_eq!(UsageReport::parse(&json!(12)).totals(), Usage::default());
    }
}
