//! JSON wire encoding of [`ForeignValue`].
//!
//! Plain JSON covers most of the foreign model. The two values JSON cannot
//! express travel as single-key tagged objects:
//!
//! - date: `{"$date": <epoch ms>}` (`null` for an invalid date)
//! - undefined: `{"$undefined": true}`
//!
//! Boxed primitives travel as their inner value. Opaque objects are
//! materialised through the marshaller first, so the peer only ever sees
//! plain data. Non-finite numbers encode as `null`, as `JSON.stringify` does.

use serde_json::{Map, Number, Value as Json};

use crate::foreign::ForeignValue;
use crate::marshal::{from_foreign, to_foreign};

/// Tag key for dates.
pub const DATE_TAG: &str = "$date";
/// Tag key for `undefined`.
pub const UNDEFINED_TAG: &str = "$undefined";

/// Encode a foreign value as JSON.
pub fn encode(value: &ForeignValue) -> Json {
    match value {
        ForeignValue::Undefined => tagged(UNDEFINED_TAG, Json::Bool(true)),
        ForeignValue::Null => Json::Null,
        ForeignValue::Bool(b) => Json::Bool(*b),
        ForeignValue::Int(i) => Json::Number((*i).into()),
        ForeignValue::Float(f) => float(*f),
        ForeignValue::String(s) => Json::String(s.clone()),
        ForeignValue::Date(ms) => tagged(DATE_TAG, float(*ms)),
        ForeignValue::Array(items) => Json::Array(items.iter().map(encode).collect()),
        ForeignValue::Object(map) => Json::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), encode(item)))
                .collect(),
        ),
        ForeignValue::Boxed(inner) => encode(inner),
        ForeignValue::Opaque(_) => encode(&to_foreign(&from_foreign(value))),
    }
}

/// Decode JSON into a foreign value. Total over all JSON input.
pub fn decode(json: &Json) -> ForeignValue {
    match json {
        Json::Null => ForeignValue::Null,
        Json::Bool(b) => ForeignValue::Bool(*b),
        Json::Number(n) => n
            .as_i64()
            .map_or_else(|| ForeignValue::Float(n.as_f64().unwrap_or(f64::NAN)), ForeignValue::Int),
        Json::String(s) => ForeignValue::String(s.clone()),
        Json::Array(items) => ForeignValue::Array(items.iter().map(decode).collect()),
        Json::Object(map) => decode_tagged(map).unwrap_or_else(|| {
            ForeignValue::Object(
                map.iter()
                    .map(|(key, item)| (key.clone(), decode(item)))
                    .collect(),
            )
        }),
    }
}

fn decode_tagged(map: &Map<String, Json>) -> Option<ForeignValue> {
    if map.len() != 1 {
        return None;
    }
    let (key, tagged) = map.iter().next()?;
    match (key.as_str(), tagged) {
        (DATE_TAG, Json::Number(ms)) => Some(ForeignValue::Date(ms.as_f64()?)),
        (DATE_TAG, Json::Null) => Some(ForeignValue::Date(f64::NAN)),
        (UNDEFINED_TAG, Json::Bool(true)) => Some(ForeignValue::Undefined),
        _ => None,
    }
}

fn tagged(tag: &str, value: Json) -> Json {
    let mut map = Map::with_capacity(1);
    let _ = map.insert(tag.to_string(), value);
    Json::Object(map)
}

fn float(f: f64) -> Json {
    Number::from_f64(f).map_or(Json::Null, Json::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign::ScriptObject;
    use crate::value::Value;
    use serde_json::json;

    #[test]
    fn plain_values_are_plain_json() {
        let v = ForeignValue::Array(vec![
            ForeignValue::Int(1),
            ForeignValue::Float(2.5),
            ForeignValue::String("x".into()),
            ForeignValue::Null,
        ]);
        assert_eq!(encode(&v), json!([1, 2.5, "x", null]));
        assert_eq!(decode(&json!([1, 2.5, "x", null])), v);
    }

    #[test]
    fn date_is_tagged() {
        let v = ForeignValue::Date(1_577_836_800_000.0);
        let encoded = encode(&v);
        assert_eq!(encoded, json!({"$date": 1_577_836_800_000.0}));
        assert_eq!(decode(&encoded), v);
    }

    #[test]
    fn undefined_is_tagged_and_distinct_from_null() {
        let encoded = encode(&ForeignValue::Undefined);
        assert_eq!(encoded, json!({"$undefined": true}));
        assert!(decode(&encoded).is_undefined());
    }

    #[test]
    fn non_finite_float_encodes_as_null() {
        assert_eq!(encode(&ForeignValue::Float(f64::INFINITY)), Json::Null);
    }

    #[test]
    fn boxed_encodes_as_inner() {
        let v = ForeignValue::Boxed(Box::new(ForeignValue::Bool(true)));
        assert_eq!(encode(&v), json!(true));
    }

    #[test]
    fn opaque_is_materialised() {
        let obj = ScriptObject::new("Point")
            .with_member("x", ForeignValue::Int(1))
            .with_member("at", ScriptObject::date(0.0).into_foreign());
        assert_eq!(encode(&obj.into_foreign()), json!({"x": 1, "at": {"$date": 0.0}}));
    }

    #[test]
    fn object_key_order_survives() {
        let decoded = decode(&serde_json::from_str::<Json>(r#"{"z":1,"a":2}"#).unwrap());
        let ForeignValue::Object(map) = &decoded else {
            panic!("expected object");
        };
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["z", "a"]);
        assert_eq!(serde_json::to_string(&encode(&decoded)).unwrap(), r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn lookalike_objects_stay_objects() {
        let json = json!({"$date": "yesterday"});
        let expected = [("$date".to_string(), ForeignValue::String("yesterday".into()))];
        assert_eq!(decode(&json), ForeignValue::Object(expected.into_iter().collect()));
        let json = json!({"$date": 1, "other": 2});
        assert!(matches!(decode(&json), ForeignValue::Object(_)));
    }

    #[test]
    fn large_unsigned_decodes_as_float() {
        let v = decode(&json!(u64::MAX));
        assert!(matches!(v, ForeignValue::Float(_)));
    }

    #[test]
    fn wire_then_marshal_recovers_host_value() {
        let ts = chrono::DateTime::from_timestamp_millis(1_577_836_800_123).unwrap();
        let host = Value::map([("when", Value::Timestamp(ts)), ("n", Value::Int(7))]);
        let back = from_foreign(&decode(&encode(&to_foreign(&host))));
        assert_eq!(back, host);
    }
}
