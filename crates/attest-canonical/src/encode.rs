//! The deterministic encoder.
//!
//! `encode` lowers a [`CanonicalValue`] into a stable `serde_json::Value`
//! tree (sorted keys, normalized strings, tagged markers for the special
//! kinds) and renders it. Two structurally equal inputs always produce the
//! same text, which is what makes the output safe to sign.

use std::sync::RwLock;

use serde_json::json;
use unicode_normalization::UnicodeNormalization;

use crate::error::{EncodeError, EncodeResult};
use crate::value::CanonicalValue;

/// Unicode normalization form applied to strings and mapping keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnicodeForm {
    /// Canonical composition (the default).
    #[default]
    Nfc,
    /// Canonical decomposition.
    Nfd,
    /// Compatibility composition.
    Nfkc,
    /// Compatibility decomposition.
    Nfkd,
}

/// What to do when a reference cycle is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePolicy {
    /// Encode the repeated reference as `["__cycle__"]` (the default).
    #[default]
    Marker,
    /// Fail the encoding with [`EncodeError::CycleDetected`].
    Error,
}

/// How timestamps are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateMode {
    /// `["__date__", "<ISO-8601 UTC, millisecond precision>"]` (the default).
    #[default]
    Iso,
    /// `["__date_unixms__", "<milliseconds since epoch>"]`.
    UnixMs,
}

/// Encoder configuration. Fixed per encoding call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalOptions {
    /// Normalization form for strings and mapping keys.
    pub unicode_form: UnicodeForm,
    /// Cycle handling policy.
    pub on_cycle: CyclePolicy,
    /// Timestamp representation.
    pub date_mode: DateMode,
}

/// Canonically encode a value to text.
///
/// The output is always syntactically valid JSON, including for non-finite
/// numbers, absent values and cycles (under the default marker policy).
///
/// # Errors
///
/// Returns [`EncodeError::CycleDetected`] when a cycle is found and
/// `options.on_cycle` is [`CyclePolicy::Error`].
pub fn encode(value: &CanonicalValue, options: &CanonicalOptions) -> EncodeResult<String> {
    let stable = to_stable(value, options, &mut Vec::new())?;
    Ok(serde_json::to_string(&stable)?)
}

fn normalize(s: &str, form: UnicodeForm) -> String {
    match form {
        UnicodeForm::Nfc => s.nfc().collect(),
        UnicodeForm::Nfd => s.nfd().collect(),
        UnicodeForm::Nfkc => s.nfkc().collect(),
        UnicodeForm::Nfkd => s.nfkd().collect(),
    }
}

/// Largest integer magnitude exactly representable in an f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

#[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
fn finite_number(n: f64) -> serde_json::Value {
    // -0 normalizes to 0, and integral doubles emit as integers so that a
    // reparsed line renders identically.
    if n == 0.0 {
        return json!(0);
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return json!(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

/// Lower a value into its stable JSON tree.
///
/// `visiting` holds the shared nodes currently on the encoding path, by
/// pointer identity. A node is pushed when its subtree is entered and popped
/// when it finishes, so two structurally equal but distinct subtrees never
/// falsely trigger cycle detection.
pub(crate) fn to_stable(
    value: &CanonicalValue,
    options: &CanonicalOptions,
    visiting: &mut Vec<*const RwLock<CanonicalValue>>,
) -> EncodeResult<serde_json::Value> {
    match value {
        CanonicalValue::Absent => Ok(json!(["__undefined__"])),
        CanonicalValue::Null => Ok(serde_json::Value::Null),
        CanonicalValue::Bool(b) => Ok(json!(b)),
        CanonicalValue::Number(n) => {
            if n.is_nan() {
                return Ok(json!(["__nonfinite__", "NaN"]));
            }
            if n.is_infinite() {
                let name = if *n > 0.0 { "Infinity" } else { "-Infinity" };
                return Ok(json!(["__nonfinite__", name]));
            }
            Ok(finite_number(*n))
        },
        CanonicalValue::BigInt(decimal) => Ok(json!(["__bigint__", decimal])),
        CanonicalValue::String(s) => Ok(json!(normalize(s, options.unicode_form))),
        CanonicalValue::Bytes(data) => {
            use base64::Engine as _;
            let b64 = base64::engine::general_purpose::STANDARD.encode(data);
            Ok(json!(["__bytes_b64__", b64]))
        },
        CanonicalValue::Timestamp(ts) => match options.date_mode {
            DateMode::Iso => {
                let iso = ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
                Ok(json!(["__date__", iso]))
            },
            DateMode::UnixMs => {
                Ok(json!(["__date_unixms__", ts.timestamp_millis().to_string()]))
            },
        },
        CanonicalValue::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                // Absent slots are kept as explicit markers, never dropped.
                out.push(to_stable(item, options, visiting)?);
            }
            Ok(serde_json::Value::Array(out))
        },
        CanonicalValue::Mapping(entries) => {
            let mut encoded: Vec<(String, serde_json::Value)> = Vec::with_capacity(entries.len());
            for (key, val) in entries {
                let key = normalize(key, options.unicode_form);
                encoded.push((key, to_stable(val, options, visiting)?));
            }
            // Code-point order over the normalized key text.
            encoded.sort_by(|a, b| a.0.cmp(&b.0));
            let mut object = serde_json::Map::new();
            for (key, val) in encoded {
                object.insert(key, val);
            }
            Ok(serde_json::Value::Object(object))
        },
        CanonicalValue::Map(entries) => {
            let mut encoded = Vec::with_capacity(entries.len());
            for (key, val) in entries {
                let key = to_stable(key, options, visiting)?;
                let val = to_stable(val, options, visiting)?;
                let sort_key = serde_json::to_string(&key)?;
                encoded.push((sort_key, key, val));
            }
            encoded.sort_by(|a, b| a.0.cmp(&b.0));
            let pairs: Vec<serde_json::Value> = encoded
                .into_iter()
                .map(|(_, key, val)| serde_json::Value::Array(vec![key, val]))
                .collect();
            Ok(json!(["__map__", pairs]))
        },
        CanonicalValue::Set(members) => {
            let mut encoded = Vec::with_capacity(members.len());
            for member in members {
                let member = to_stable(member, options, visiting)?;
                let sort_key = serde_json::to_string(&member)?;
                encoded.push((sort_key, member));
            }
            encoded.sort_by(|a, b| a.0.cmp(&b.0));
            let members: Vec<serde_json::Value> =
                encoded.into_iter().map(|(_, member)| member).collect();
            Ok(json!(["__set__", members]))
        },
        CanonicalValue::Unserializable(type_name) => {
            Ok(json!(["__unserializable__", type_name]))
        },
        CanonicalValue::Shared(cell) => {
            let ptr = std::sync::Arc::as_ptr(cell);
            if visiting.iter().any(|seen| std::ptr::eq(*seen, ptr)) {
                return match options.on_cycle {
                    CyclePolicy::Marker => Ok(json!(["__cycle__"])),
                    CyclePolicy::Error => Err(EncodeError::CycleDetected),
                };
            }
            visiting.push(ptr);
            let inner = cell.read().unwrap_or_else(std::sync::PoisonError::into_inner);
            let stable = to_stable(&inner, options, visiting);
            visiting.pop();
            stable
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn enc(value: &CanonicalValue) -> String {
        encode(value, &CanonicalOptions::default()).unwrap()
    }

    fn mapping(entries: Vec<(&str, CanonicalValue)>) -> CanonicalValue {
        CanonicalValue::Mapping(
            entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        )
    }

    #[test]
    fn sorts_keys_and_normalizes_unicode() {
        // "e\u{301}" is the decomposed form of "é".
        let nfd = mapping(vec![
            ("e\u{301}", CanonicalValue::from("cafe\u{301}")),
            ("b", CanonicalValue::from(1)),
            ("a", CanonicalValue::from(2)),
        ]);
        let nfc = mapping(vec![
            ("a", CanonicalValue::from(2)),
            ("b", CanonicalValue::from(1)),
            ("é", CanonicalValue::from("café")),
        ]);

        let s1 = enc(&nfd);
        let s2 = enc(&nfc);
        assert_eq!(s1, s2);

        let a = s1.find("\"a\"").unwrap();
        let b = s1.find("\"b\"").unwrap();
        let e = s1.find("\"\u{e9}\"").unwrap();
        assert!(a < b && b < e);
    }

    #[test]
    fn nonfinite_numbers_stay_parseable() {
        let v = mapping(vec![
            ("n", CanonicalValue::Number(f64::NAN)),
            ("p", CanonicalValue::Number(f64::INFINITY)),
            ("m", CanonicalValue::Number(f64::NEG_INFINITY)),
        ]);
        let s = enc(&v);
        assert!(s.contains(r#""__nonfinite__","NaN""#));
        assert!(s.contains(r#""__nonfinite__","Infinity""#));
        assert!(s.contains(r#""__nonfinite__","-Infinity""#));
        serde_json::from_str::<serde_json::Value>(&s).unwrap();
    }

    #[test]
    fn bigint_marker() {
        let s = enc(&mapping(vec![("big", CanonicalValue::bigint("123"))]));
        assert!(s.contains(r#""__bigint__","123""#));
        serde_json::from_str::<serde_json::Value>(&s).unwrap();
    }

    #[test]
    fn negative_zero_normalizes_to_zero() {
        let neg = enc(&mapping(vec![("x", CanonicalValue::Number(-0.0))]));
        let pos = enc(&mapping(vec![("x", CanonicalValue::Number(0.0))]));
        assert_eq!(neg, pos);
        assert!(pos.contains(r#""x":0"#));
    }

    #[test]
    fn absent_is_explicit_in_mappings_and_sequences() {
        let v = mapping(vec![
            ("x", CanonicalValue::Absent),
            ("y", CanonicalValue::Sequence(vec![CanonicalValue::Absent])),
        ]);
        let s = enc(&v);
        assert_eq!(s.matches("__undefined__").count(), 2);
        serde_json::from_str::<serde_json::Value>(&s).unwrap();
    }

    #[test]
    fn date_iso_and_unix_ms_modes() {
        let ts = chrono::Utc.with_ymd_and_hms(2025, 10, 2, 12, 34, 56).unwrap();
        let v = mapping(vec![("d", CanonicalValue::Timestamp(ts))]);

        let iso = enc(&v);
        assert!(iso.contains(r#""__date__","2025-10-02T12:34:56.000Z""#));

        let opts = CanonicalOptions {
            date_mode: DateMode::UnixMs,
            ..CanonicalOptions::default()
        };
        let ms = encode(&v, &opts).unwrap();
        assert!(ms.contains(r#""__date_unixms__","1759408496000""#));
    }

    #[test]
    fn map_encoding_is_insertion_order_independent() {
        let m1 = CanonicalValue::Map(vec![
            (CanonicalValue::from("b"), CanonicalValue::from(2)),
            (CanonicalValue::from("a"), CanonicalValue::from(1)),
        ]);
        let m2 = CanonicalValue::Map(vec![
            (CanonicalValue::from("a"), CanonicalValue::from(1)),
            (CanonicalValue::from("b"), CanonicalValue::from(2)),
        ]);

        let s1 = enc(&m1);
        assert_eq!(s1, enc(&m2));
        assert!(s1.contains("__map__"));
    }

    #[test]
    fn set_encoding_is_sorted() {
        let s1 = CanonicalValue::Set(vec![
            CanonicalValue::from(3),
            CanonicalValue::from(1),
            CanonicalValue::from(2),
        ]);
        let s2 = CanonicalValue::Set(vec![
            CanonicalValue::from(2),
            CanonicalValue::from(3),
            CanonicalValue::from(1),
        ]);

        let j1 = enc(&s1);
        assert_eq!(j1, enc(&s2));
        assert!(j1.contains("__set__"));
    }

    #[test]
    fn bytes_encode_to_stable_base64() {
        let payload: Vec<u8> = vec![0, 1, 2, 3, 254, 255];
        let s = enc(&mapping(vec![("buf", CanonicalValue::bytes(payload.clone()))]));
        assert!(s.contains(r#""__bytes_b64__","AAECA/7/""#));

        // Any binary-like input normalizes to the same marker form.
        let slice: &[u8] = &payload;
        let s2 = enc(&mapping(vec![("buf", CanonicalValue::bytes(slice))]));
        assert_eq!(s, s2);
    }

    #[test]
    fn cycles_marked_by_default_and_error_on_request() {
        let (node, handle) = CanonicalValue::shared(CanonicalValue::Null);
        *handle.write().unwrap() = mapping(vec![
            ("x", CanonicalValue::from(1)),
            ("self", node.clone()),
        ]);

        let s = enc(&node);
        assert!(s.contains("__cycle__"));

        let opts = CanonicalOptions {
            on_cycle: CyclePolicy::Error,
            ..CanonicalOptions::default()
        };
        assert!(matches!(
            encode(&node, &opts),
            Err(EncodeError::CycleDetected)
        ));
    }

    #[test]
    fn equal_subtrees_do_not_trigger_cycle_detection() {
        // The same shared node used twice as a sibling is not a cycle.
        let (leaf, _handle) = CanonicalValue::shared(CanonicalValue::from("x"));
        let v = mapping(vec![("a", leaf.clone()), ("b", leaf)]);

        let opts = CanonicalOptions {
            on_cycle: CyclePolicy::Error,
            ..CanonicalOptions::default()
        };
        let s = encode(&v, &opts).unwrap();
        assert_eq!(s, r#"{"a":"x","b":"x"}"#);
    }

    #[test]
    fn insertion_order_never_changes_output() {
        let orders: [[&str; 5]; 3] = [
            ["k1", "k2", "k3", "k4", "k5"],
            ["k5", "k4", "k3", "k2", "k1"],
            ["k2", "k4", "k1", "k5", "k3"],
        ];

        let rendered: Vec<String> = orders
            .iter()
            .map(|order| {
                let entries = order
                    .iter()
                    .map(|k| ((*k).to_string(), CanonicalValue::from(format!("v{}", &k[1..]))))
                    .collect();
                enc(&CanonicalValue::Mapping(entries))
            })
            .collect();

        assert!(rendered.iter().all(|s| s == &rendered[0]));
    }

    #[test]
    fn unicode_forms_agree_inside_sequences() {
        let nfd = CanonicalValue::Sequence(vec![
            CanonicalValue::from("cafe\u{301}"),
            CanonicalValue::from("re\u{301}sume\u{301}"),
        ]);
        let nfc = CanonicalValue::Sequence(vec![
            CanonicalValue::from("café"),
            CanonicalValue::from("résumé"),
        ]);
        assert_eq!(enc(&nfd), enc(&nfc));
    }

    #[test]
    fn unserializable_values_never_fail() {
        let s = enc(&mapping(vec![("f", CanonicalValue::unserializable("function"))]));
        assert!(s.contains(r#""__unserializable__","function""#));
    }
}
