use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

/// Ordered set of object keys that may carry the numeric payload of a
/// measurement, depending on which endpoint family produced it.
const VALUE_KEYS: [&str; 4] = ["sum_value", "conversion_value", "count", "value"];

/// Result of normalizing one upstream numeric payload.
///
/// `degraded` is set when no recognizable numeric shape was found and the
/// value fell back to zero. Degradation is silent for callers that only want
/// the number, but countable via [`ParseStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalized {
    pub value: f64,
    pub degraded: bool,
}

impl Normalized {
    const fn measured(value: f64) -> Self {
        Self {
            value,
            degraded: false,
        }
    }

    const fn fallback() -> Self {
        Self {
            value: 0.0,
            degraded: true,
        }
    }
}

/// Converts one of the heterogeneous upstream numeric encodings into a float.
///
/// Never panics and never errors: missing or unrecognizable input degrades to
/// `0.0`. The accepted shapes are a bare number, a numeric string, a list
/// whose first element is numeric, and an object keyed by one of the known
/// measurement names (applied recursively, so `{"sum_value": [12.5]}`
/// normalizes to `12.5`).
pub fn normalize(raw: Option<&Value>) -> Normalized {
    match raw {
        None | Some(Value::Null) => Normalized::fallback(),
        Some(Value::Number(number)) => number
            .as_f64()
            .filter(|value| value.is_finite())
            .map_or_else(Normalized::fallback, Normalized::measured),
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map_or_else(Normalized::fallback, Normalized::measured),
        Some(Value::Array(items)) => match items.first() {
            Some(first @ (Value::Number(_) | Value::String(_))) => normalize(Some(first)),
            _ => Normalized::fallback(),
        },
        Some(Value::Object(map)) => {
            for key in VALUE_KEYS {
                if let Some(inner) = map.get(key) {
                    return normalize(Some(inner));
                }
            }
            Normalized::fallback()
        }
        Some(Value::Bool(_)) => Normalized::fallback(),
    }
}

/// Shared degradation counter for diagnostics.
#[derive(Debug, Default)]
pub struct ParseStats {
    degraded: AtomicU64,
}

impl ParseStats {
    /// Records a normalization outcome and returns the numeric value.
    pub fn record(&self, normalized: Normalized) -> f64 {
        if normalized.degraded {
            self.degraded.fetch_add(1, Ordering::Relaxed);
        }
        normalized.value
    }

    pub fn degraded(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }
}

/// Sums every numeric element of a measurement series, recording degraded
/// entries. Aggregate endpoints return per-interval series; the reconciler
/// only ever needs their sum over the window.
pub fn sum_series(raw: Option<&Value>, stats: &ParseStats) -> f64 {
    match raw {
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|item| stats.record(normalize(Some(item))))
            .sum(),
        other => stats.record(normalize(other)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn three_shapes_of_the_same_value_agree() {
        let scalar = json!(1234.5);
        let listed = json!([1234.5, 9.0]);
        let keyed = json!({ "sum_value": 1234.5 });

        let expected = normalize(Some(&scalar));
        assert_eq!(expected.value, 1234.5);
        assert!(!expected.degraded);
        assert_eq!(normalize(Some(&listed)), expected);
        assert_eq!(normalize(Some(&keyed)), expected);
    }

    #[test]
    fn nested_series_under_a_known_key_normalizes() {
        let value = json!({ "sum_value": ["88.25"] });
        assert_eq!(normalize(Some(&value)).value, 88.25);
    }

    #[test]
    fn missing_and_malformed_inputs_degrade_to_zero() {
        for value in [
            json!(null),
            json!(true),
            json!([]),
            json!([{ "nested": 1 }]),
            json!({ "unrelated": 7 }),
            json!("not a number"),
        ] {
            let normalized = normalize(Some(&value));
            assert_eq!(normalized.value, 0.0);
            assert!(normalized.degraded, "expected degradation for {value}");
        }

        let absent = normalize(None);
        assert_eq!(absent.value, 0.0);
        assert!(absent.degraded);
    }

    #[test]
    fn value_keys_are_probed_in_order() {
        let value = json!({ "count": 3, "sum_value": 950.0 });
        assert_eq!(normalize(Some(&value)).value, 950.0);
    }

    #[test]
    fn stats_count_only_degraded_outcomes() {
        let stats = ParseStats::default();

        assert_eq!(stats.record(normalize(Some(&json!(5)))), 5.0);
        assert_eq!(stats.record(normalize(None)), 0.0);
        assert_eq!(stats.record(normalize(Some(&json!("oops")))), 0.0);
        assert_eq!(stats.degraded(), 2);
    }

    #[test]
    fn series_sum_skips_nothing_but_counts_degradation() {
        let stats = ParseStats::default();
        let series = json!([100.0, "50.5", null]);

        assert_eq!(sum_series(Some(&series), &stats), 150.5);
        assert_eq!(stats.degraded(), 1);
    }
}
