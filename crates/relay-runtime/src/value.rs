//! Host-side dynamic value model.
//!
//! A closed tagged union, so every branch of the marshaller is checked
//! exhaustively at compile time. Timestamps always carry a timezone: naive
//! date-times are normalised to UTC on the way in (see the `From` impls).

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::foreign::ForeignValue;

/// Host-side dynamic value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer (within i64 range).
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Point in time, millisecond precision once it has crossed the bridge.
    Timestamp(DateTime<Utc>),
    /// Ordered list.
    List(Vec<Value>),
    /// Ordered string-keyed map (insertion order preserved).
    Map(IndexMap<String, Value>),
    /// A plain empty generic object. Distinct from an empty `Map`: the
    /// worker produced an object with no members rather than a keyed map.
    Object,
    /// Worker-native value passed through untouched.
    Foreign(ForeignValue),
}

impl Value {
    /// Build a `Map` from key/value pairs, preserving order.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short type name for logs and diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object => "object",
            Self::Foreign(_) => "foreign",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(ts: DateTime<FixedOffset>) -> Self {
        Self::Timestamp(ts.with_timezone(&Utc))
    }
}

/// A timestamp without a timezone is taken to be UTC.
impl From<NaiveDateTime> for Value {
    fn from(ts: NaiveDateTime) -> Self {
        Self::Timestamp(ts.and_utc())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::String(s) => serializer.serialize_str(s),
            Self::Timestamp(ts) => {
                serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Self::List(items) => items.serialize(serializer),
            Self::Map(map) => map.serialize(serializer),
            Self::Object => serializer.serialize_map(Some(0))?.end(),
            Self::Foreign(f) => crate::marshal::from_foreign(f).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a JSON value")
            }

            fn visit_bool<E>(self, value: bool) -> Result<Value, E> {
                Ok(Value::Bool(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Value, E> {
                Ok(Value::Int(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Value, E> {
                Ok(i64::try_from(value).map_or(Value::Float(value as f64), Value::Int))
            }

            fn visit_f64<E>(self, value: f64) -> Result<Value, E> {
                Ok(Value::Float(value))
            }

            fn visit_str<E>(self, value: &str) -> Result<Value, E> {
                Ok(Value::String(value.to_owned()))
            }

            fn visit_string<E>(self, value: String) -> Result<Value, E> {
                Ok(Value::String(value))
            }

            fn visit_none<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_unit<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Value, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                Value::deserialize(deserializer)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(elem) = seq.next_element()? {
                    items.push(elem);
                }
                Ok(Value::List(items))
            }

            fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut entries = IndexMap::new();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    let _ = entries.insert(key, value);
                }
                Ok(Value::Map(entries))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use serde_json::json;

    #[test]
    fn naive_timestamp_normalised_to_utc() {
        let naive = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let v = Value::from(naive);
        assert_eq!(
            v,
            Value::Timestamp(Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn offset_timestamp_converted_to_utc() {
        let ts = DateTime::parse_from_rfc3339("2020-01-01T02:00:00+02:00").unwrap();
        let v = Value::from(ts);
        assert_eq!(
            v,
            Value::Timestamp(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn deserialize_preserves_order_and_types() {
        let v: Value = serde_json::from_str(r#"{"b": 1, "a": [2.5, "x", null, true]}"#).unwrap();
        let Value::Map(map) = &v else {
            panic!("expected map, got {}", v.type_name());
        };
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(map["b"], Value::Int(1));
        assert_eq!(
            map["a"],
            Value::List(vec![
                Value::Float(2.5),
                Value::from("x"),
                Value::Null,
                Value::Bool(true)
            ])
        );
    }

    #[test]
    fn large_u64_becomes_float() {
        let v: Value = serde_json::from_str("18446744073709551615").unwrap();
        assert!(matches!(v, Value::Float(_)));
    }

    #[test]
    fn serialize_timestamp_as_rfc3339_millis() {
        let ts = Utc.timestamp_millis_opt(1_577_836_800_123).unwrap();
        let json = serde_json::to_value(Value::Timestamp(ts)).unwrap();
        assert_eq!(json, json!("2020-01-01T00:00:00.123Z"));
    }

    #[test]
    fn serialize_object_as_empty_json_object() {
        let json = serde_json::to_value(Value::Object).unwrap();
        assert_eq!(json, json!({}));
    }

    #[test]
    fn serialize_foreign_via_marshaller() {
        let v = Value::Foreign(ForeignValue::Array(vec![
            ForeignValue::Int(1),
            ForeignValue::Undefined,
        ]));
        let json = serde_json::to_value(v).unwrap();
        assert_eq!(json, json!([1, null]));
    }

    #[test]
    fn map_helper_keeps_order() {
        let v = Value::map([("z", Value::Int(1)), ("a", Value::Int(2))]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"z":1,"a":2}"#);
    }
}
