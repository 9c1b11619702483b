//! Value Marshaller: recursive conversion between [`Value`] and [`ForeignValue`].
//!
//! Both directions are pure and total. `from_foreign` never fails: objects of
//! unknown shape go through an ordered probe chain that always lands on some
//! value.
//!
//! ## Probe chain for opaque objects
//!
//! 1. **Array-like**: exposes `length` or `0`. Elements `0..length` are read
//!    by index. A `length` that reads as undefined (or is not a valid array
//!    length) falls through.
//! 2. **Date-like**: `valueOf` returns a number usable as epoch milliseconds.
//!    Runtime errors raised by `valueOf` mean "not a date".
//! 3. **Enumerable**: has own member names; converted to a map.
//! 4. **Opaque**: stringifies as `[object Object]` → empty generic object,
//!    anything else → empty list.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use relay_core::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::foreign::{ForeignObject, ForeignValue, GENERIC_OBJECT_MARKER};
use crate::value::Value;

/// Maximum container nesting converted by [`from_foreign`].
///
/// Foreign object graphs may be cyclic; deeper subtrees become `Null`.
pub const MAX_DEPTH: usize = 128;

/// Largest epoch offset a runtime date can hold (±100 000 000 days).
const MAX_DATE_MILLIS: f64 = 8.64e15;

/// Largest length an array-like may report.
const MAX_ARRAY_LIKE_LEN: f64 = 4_294_967_295.0;

/// Array-likes claiming more elements than this are not read by index;
/// they fall through to the remaining probes.
pub const MAX_ARRAY_LIKE_ELEMENTS: usize = 1 << 20;

/// Convert a host value to the worker's native representation.
pub fn to_foreign(value: &Value) -> ForeignValue {
    match value {
        Value::Null => ForeignValue::Null,
        Value::Bool(b) => ForeignValue::Bool(*b),
        Value::Int(i) => ForeignValue::Int(*i),
        Value::Float(f) => ForeignValue::Float(*f),
        Value::String(s) => ForeignValue::String(s.clone()),
        Value::Timestamp(ts) => ForeignValue::date_from_millis(ts.timestamp_millis()),
        Value::List(items) => ForeignValue::Array(items.iter().map(to_foreign).collect()),
        Value::Map(map) => {
            let mut object = IndexMap::with_capacity(map.len());
            for (key, item) in map {
                let _ = object.insert(key.clone(), to_foreign(item));
            }
            ForeignValue::Object(object)
        }
        Value::Object => ForeignValue::Object(IndexMap::new()),
        Value::Foreign(f) => f.clone(),
    }
}

/// Convert any serializable host type by way of its JSON form.
///
/// Fallback for structured host types the marshaller has no case for.
pub fn to_foreign_serialized<T: Serialize + ?Sized>(value: &T) -> Result<ForeignValue> {
    let json = serde_json::to_value(value)?;
    let value: Value = serde_json::from_value(json)?;
    Ok(to_foreign(&value))
}

/// Convert a worker-native value back to the host model.
pub fn from_foreign(value: &ForeignValue) -> Value {
    convert(value, 0)
}

fn convert(value: &ForeignValue, depth: usize) -> Value {
    match value {
        ForeignValue::Undefined | ForeignValue::Null => Value::Null,
        ForeignValue::Bool(b) => Value::Bool(*b),
        ForeignValue::Int(i) => Value::Int(*i),
        ForeignValue::Float(f) => Value::Float(*f),
        ForeignValue::String(s) => Value::String(s.clone()),
        ForeignValue::Date(ms) => date_value(*ms),
        ForeignValue::Boxed(inner) => match inner.as_ref() {
            ForeignValue::Date(ms) => date_value(*ms),
            other => convert(other, depth),
        },
        ForeignValue::Array(items) => {
            let Some(depth) = descend(depth) else {
                return Value::Null;
            };
            Value::List(items.iter().map(|item| convert(item, depth)).collect())
        }
        ForeignValue::Object(map) if map.is_empty() => Value::Object,
        ForeignValue::Object(map) => {
            let Some(depth) = descend(depth) else {
                return Value::Null;
            };
            Value::Map(
                map.iter()
                    .map(|(key, item)| (key.clone(), convert(item, depth)))
                    .collect(),
            )
        }
        ForeignValue::Opaque(obj) => {
            let Some(depth) = descend(depth) else {
                return Value::Null;
            };
            probe(obj.as_ref(), depth)
        }
    }
}

fn descend(depth: usize) -> Option<usize> {
    if depth >= MAX_DEPTH {
        warn!(max_depth = MAX_DEPTH, "foreign value nested too deeply, truncating to null");
        return None;
    }
    Some(depth + 1)
}

fn probe(obj: &dyn ForeignObject, depth: usize) -> Value {
    if let Some(items) = probe_array_like(obj, depth) {
        return Value::List(items);
    }
    if let Some(ts) = probe_date(obj) {
        return Value::Timestamp(ts);
    }

    let keys = obj.own_keys();
    if !keys.is_empty() {
        return Value::Map(
            keys.into_iter()
                .map(|key| {
                    let item = convert(&obj.get(&key), depth);
                    (key, item)
                })
                .collect(),
        );
    }

    if obj.to_display_string() == GENERIC_OBJECT_MARKER {
        Value::Object
    } else {
        Value::List(Vec::new())
    }
}

fn probe_array_like(obj: &dyn ForeignObject, depth: usize) -> Option<Vec<Value>> {
    if !obj.has_member("length") && !obj.has_member("0") {
        return None;
    }
    let len = obj.get("length").as_f64()?;
    if !(0.0..=MAX_ARRAY_LIKE_LEN).contains(&len) || len.fract() != 0.0 {
        debug!(len, "array-like length out of range, not treating as array");
        return None;
    }
    let len = len as usize;
    if len > MAX_ARRAY_LIKE_ELEMENTS {
        warn!(
            len,
            max = MAX_ARRAY_LIKE_ELEMENTS,
            "array-like too long to read by index, converting its members instead"
        );
        return None;
    }
    Some(
        (0..len)
            .map(|i| convert(&obj.get(&i.to_string()), depth))
            .collect(),
    )
}

fn probe_date(obj: &dyn ForeignObject) -> Option<DateTime<Utc>> {
    match obj.value_of() {
        Ok(Some(ForeignValue::Date(ms))) => timestamp_from_millis(ms),
        Ok(Some(primitive)) => timestamp_from_millis(primitive.as_f64()?),
        Ok(None) => None,
        Err(e) => {
            debug!(error = %e, "valueOf raised, not a date");
            None
        }
    }
}

fn date_value(ms: f64) -> Value {
    timestamp_from_millis(ms).map_or(Value::Null, Value::Timestamp)
}

/// Epoch milliseconds to a UTC timestamp, `None` for invalid dates.
fn timestamp_from_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() || ms.abs() > MAX_DATE_MILLIS {
        return None;
    }
    let ms = ms.trunc() as i64;
    DateTime::from_timestamp_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign::ScriptObject;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn jan_first_2020() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
    }

    // ── to_foreign ──────────────────────────────────────────────────

    #[test]
    fn timestamp_becomes_epoch_millis_date() {
        let foreign = to_foreign(&Value::Timestamp(jan_first_2020()));
        assert_eq!(foreign, ForeignValue::Date(1_577_836_800_000.0));
    }

    #[test]
    fn primitives_pass_through_uncoerced() {
        assert_eq!(to_foreign(&Value::Int(1)), ForeignValue::Int(1));
        assert_eq!(to_foreign(&Value::Float(1.0)), ForeignValue::Float(1.0));
        assert_eq!(to_foreign(&Value::from("1")), ForeignValue::String("1".into()));
        assert_eq!(to_foreign(&Value::Null), ForeignValue::Null);
    }

    #[test]
    fn map_keeps_key_order() {
        let foreign = to_foreign(&Value::map([("z", Value::Int(1)), ("a", Value::Int(2))]));
        assert_matches!(
            foreign,
            ForeignValue::Object(obj) if obj.keys().collect::<Vec<_>>() == ["z", "a"]
        );
    }

    #[test]
    fn foreign_passes_through() {
        let opaque = ScriptObject::plain().into_foreign();
        assert_eq!(to_foreign(&Value::Foreign(opaque.clone())), opaque);
    }

    #[test]
    fn serialized_fallback_goes_through_json() {
        #[derive(Serialize)]
        struct Request {
            name: &'static str,
            tags: Vec<u8>,
        }
        let foreign = to_foreign_serialized(&Request {
            name: "x",
            tags: vec![1, 2],
        })
        .unwrap();
        assert_matches!(
            foreign,
            ForeignValue::Object(obj)
                if obj["name"] == ForeignValue::String("x".into())
                    && obj["tags"] == ForeignValue::Array(vec![ForeignValue::Int(1), ForeignValue::Int(2)])
        );
    }

    // ── from_foreign ────────────────────────────────────────────────

    #[test]
    fn undefined_and_null_become_null() {
        assert_eq!(from_foreign(&ForeignValue::Undefined), Value::Null);
        assert_eq!(from_foreign(&ForeignValue::Null), Value::Null);
    }

    #[test]
    fn nested_value_round_trips_exactly() {
        let v = Value::map([(
            "a",
            Value::List(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::from("x"),
                Value::Timestamp(jan_first_2020()),
            ]),
        )]);
        assert_eq!(from_foreign(&to_foreign(&v)), v);
    }

    #[test]
    fn empty_foreign_object_is_generic_object() {
        assert_eq!(from_foreign(&ForeignValue::Object(IndexMap::new())), Value::Object);
    }

    #[test]
    fn opaque_without_members_and_generic_marker_is_object() {
        let v = from_foreign(&ScriptObject::plain().into_foreign());
        assert_eq!(v, Value::Object);
    }

    #[test]
    fn opaque_without_members_and_other_marker_is_empty_list() {
        let v = from_foreign(&ScriptObject::new("Symbol").into_foreign());
        assert_eq!(v, Value::List(Vec::new()));
    }

    #[test]
    fn boxed_date_unwraps_to_timestamp() {
        let boxed = ForeignValue::Boxed(Box::new(ForeignValue::Date(1_577_836_800_000.0)));
        assert_eq!(from_foreign(&boxed), Value::Timestamp(jan_first_2020()));
    }

    #[test]
    fn boxed_primitive_unwraps() {
        let boxed = ForeignValue::Boxed(Box::new(ForeignValue::Float(3.5)));
        assert_eq!(from_foreign(&boxed), Value::Float(3.5));
        let boxed = ForeignValue::Boxed(Box::new(ForeignValue::String("s".into())));
        assert_eq!(from_foreign(&boxed), Value::from("s"));
    }

    #[test]
    fn invalid_date_is_null() {
        assert_eq!(from_foreign(&ForeignValue::Date(f64::NAN)), Value::Null);
        assert_eq!(from_foreign(&ForeignValue::Date(9e15)), Value::Null);
    }

    #[test]
    fn array_like_opaque_is_read_by_index() {
        let obj = ScriptObject::new("Arguments")
            .with_member("0", ForeignValue::String("a".into()))
            .with_member("1", ForeignValue::Int(2))
            .with_member("length", ForeignValue::Int(3));
        let v = from_foreign(&obj.into_foreign());
        assert_eq!(
            v,
            Value::List(vec![Value::from("a"), Value::Int(2), Value::Null])
        );
    }

    #[test]
    fn oversized_array_like_is_converted_by_members() {
        let obj = ScriptObject::new("Buffer")
            .with_member("0", ForeignValue::Int(7))
            .with_member("length", ForeignValue::Int(4_294_967_295));
        let v = from_foreign(&obj.into_foreign());
        assert_eq!(
            v,
            Value::map([("0", Value::Int(7)), ("length", Value::Int(4_294_967_295))])
        );
    }

    #[test]
    fn zero_member_without_length_falls_through_to_members() {
        let obj = ScriptObject::plain().with_member("0", ForeignValue::Bool(true));
        let v = from_foreign(&obj.into_foreign());
        assert_eq!(v, Value::map([("0", Value::Bool(true))]));
    }

    #[test]
    fn date_like_opaque_becomes_timestamp() {
        let v = from_foreign(&ScriptObject::date(1_577_836_800_000.0).into_foreign());
        assert_eq!(v, Value::Timestamp(jan_first_2020()));
    }

    #[test]
    fn throwing_value_of_is_not_a_date() {
        let obj = ScriptObject::plain()
            .with_member("k", ForeignValue::Int(1))
            .with_throwing_value_of("TypeError: cannot convert");
        let v = from_foreign(&obj.into_foreign());
        assert_eq!(v, Value::map([("k", Value::Int(1))]));
    }

    #[test]
    fn non_numeric_value_of_is_not_a_date() {
        let obj = ScriptObject::new("Wrapper")
            .with_value_of(ForeignValue::String("nope".into()));
        assert_eq!(from_foreign(&obj.into_foreign()), Value::List(Vec::new()));
    }

    #[test]
    fn opaque_members_convert_recursively() {
        let inner = ScriptObject::date(0.0).into_foreign();
        let obj = ScriptObject::new("Point")
            .with_member("x", ForeignValue::Int(1))
            .with_member("at", inner);
        let v = from_foreign(&obj.into_foreign());
        assert_eq!(
            v,
            Value::map([
                ("x", Value::Int(1)),
                ("at", Value::Timestamp(DateTime::UNIX_EPOCH)),
            ])
        );
    }

    #[test]
    fn over_deep_nesting_truncates_to_null() {
        let mut v = ForeignValue::Int(1);
        for _ in 0..(MAX_DEPTH + 5) {
            v = ForeignValue::Array(vec![v]);
        }
        let mut out = from_foreign(&v);
        let mut levels = 0;
        while let Value::List(items) = &out {
            let next = items[0].clone();
            out = next;
            levels += 1;
        }
        assert_eq!(levels, MAX_DEPTH);
        assert_eq!(out, Value::Null);
    }

    #[test]
    fn empty_map_comes_back_as_generic_object() {
        assert_eq!(from_foreign(&to_foreign(&Value::Map(IndexMap::new()))), Value::Object);
    }

    // ── round-trip law ──────────────────────────────────────────────

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            (-1e12f64..1e12f64).prop_map(Value::Float),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
            (-8_640_000_000_000i64..8_640_000_000_000i64).prop_map(|ms| {
                Value::Timestamp(DateTime::from_timestamp_millis(ms).unwrap())
            }),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
                prop::collection::vec(("[a-z]{1,6}", inner), 1..6)
                    .prop_map(|entries| Value::Map(entries.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn from_foreign_inverts_to_foreign(v in arb_value()) {
            prop_assert_eq!(from_foreign(&to_foreign(&v)), v);
        }
    }
}
