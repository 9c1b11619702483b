//! Worker-runtime native value model.
//!
//! [`ForeignValue`] mirrors what the script runtime can hand back: primitives,
//! arrays, plain objects, dates, boxed primitives, and objects from the
//! runtime's own object model whose shape is unknown. The latter are reached
//! only through the [`ForeignObject`] capability trait, which the marshaller
//! probes in a fixed order instead of reflecting over them.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

/// The runtime's stringification of a plain object.
pub const GENERIC_OBJECT_MARKER: &str = "[object Object]";

/// Error raised by the runtime while probing an object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("runtime error while probing object: {0}")]
pub struct ProbeError(pub String);

/// Capability interface over a runtime object of unknown shape.
pub trait ForeignObject: fmt::Debug + Send + Sync {
    /// Whether the object exposes an own member named `name`.
    fn has_member(&self, name: &str) -> bool;

    /// Read a member. Absent members read as [`ForeignValue::Undefined`].
    fn get(&self, name: &str) -> ForeignValue;

    /// Own enumerable member names, in enumeration order.
    fn own_keys(&self) -> Vec<String>;

    /// The runtime's numeric-value accessor (`valueOf`).
    ///
    /// `Ok(None)` means the accessor returned the object itself rather than
    /// a primitive.
    fn value_of(&self) -> Result<Option<ForeignValue>, ProbeError>;

    /// The runtime's stringification (`toString`).
    fn to_display_string(&self) -> String;
}

/// A value in the worker runtime's native representation.
#[derive(Clone, Debug)]
pub enum ForeignValue {
    /// Runtime `undefined`, distinct from `null`.
    Undefined,
    /// Runtime `null`.
    Null,
    /// Boolean primitive.
    Bool(bool),
    /// Integer primitive.
    Int(i64),
    /// Floating point primitive.
    Float(f64),
    /// String primitive.
    String(String),
    /// Native date, as milliseconds since the Unix epoch (UTC).
    Date(f64),
    /// Array-like container.
    Array(Vec<ForeignValue>),
    /// Plain associative object.
    Object(IndexMap<String, ForeignValue>),
    /// Primitive wrapped in a runtime object (`new Number(1)`, `new Date(..)`).
    Boxed(Box<ForeignValue>),
    /// Runtime object whose shape must be probed.
    Opaque(Arc<dyn ForeignObject>),
}

impl ForeignValue {
    /// Construct a native date from an epoch-millisecond offset.
    pub fn date_from_millis(ms: i64) -> Self {
        Self::Date(ms as f64)
    }

    /// Wrap any [`ForeignObject`] implementation.
    pub fn opaque(obj: impl ForeignObject + 'static) -> Self {
        Self::Opaque(Arc::new(obj))
    }

    /// Whether this is `undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Numeric view of a number primitive.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl PartialEq for ForeignValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) | (Self::Date(a), Self::Date(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Boxed(a), Self::Boxed(b)) => a == b,
            // Runtime objects compare by identity.
            (Self::Opaque(a), Self::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// What a [`ScriptObject`]'s `valueOf` does.
#[derive(Clone, Debug)]
enum ValueOf {
    /// Returns the object itself.
    Identity,
    /// Returns a primitive.
    Returns(ForeignValue),
    /// Raises a runtime error.
    Throws(String),
}

/// In-memory object from the runtime's object model.
///
/// Used where the runtime hands over objects that are neither plain arrays
/// nor plain objects: class instances, array-likes, host wrappers.
#[derive(Clone, Debug)]
pub struct ScriptObject {
    class_name: String,
    members: IndexMap<String, ForeignValue>,
    value_of: ValueOf,
}

impl ScriptObject {
    /// Empty object whose stringification is `[object <class_name>]`.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            members: IndexMap::new(),
            value_of: ValueOf::Identity,
        }
    }

    /// Empty plain object (`{}`).
    pub fn plain() -> Self {
        Self::new("Object")
    }

    /// Date object whose `valueOf` yields `ms`.
    pub fn date(ms: f64) -> Self {
        Self::new("Date").with_value_of(ForeignValue::Float(ms))
    }

    /// Add an own enumerable member.
    #[must_use]
    pub fn with_member(mut self, name: impl Into<String>, value: ForeignValue) -> Self {
        let _ = self.members.insert(name.into(), value);
        self
    }

    /// Make `valueOf` return a primitive.
    #[must_use]
    pub fn with_value_of(mut self, value: ForeignValue) -> Self {
        self.value_of = ValueOf::Returns(value);
        self
    }

    /// Make `valueOf` raise a runtime error.
    #[must_use]
    pub fn with_throwing_value_of(mut self, message: impl Into<String>) -> Self {
        self.value_of = ValueOf::Throws(message.into());
        self
    }

    /// Wrap as an opaque foreign value.
    pub fn into_foreign(self) -> ForeignValue {
        ForeignValue::opaque(self)
    }
}

impl ForeignObject for ScriptObject {
    fn has_member(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    fn get(&self, name: &str) -> ForeignValue {
        self.members
            .get(name)
            .cloned()
            .unwrap_or(ForeignValue::Undefined)
    }

    fn own_keys(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    fn value_of(&self) -> Result<Option<ForeignValue>, ProbeError> {
        match &self.value_of {
            ValueOf::Identity => Ok(None),
            ValueOf::Returns(v) => Ok(Some(v.clone())),
            ValueOf::Throws(msg) => Err(ProbeError(msg.clone())),
        }
    }

    fn to_display_string(&self) -> String {
        format!("[object {}]", self.class_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_object_members() {
        let obj = ScriptObject::plain()
            .with_member("b", ForeignValue::Int(1))
            .with_member("a", ForeignValue::Int(2));
        assert!(obj.has_member("a"));
        assert!(!obj.has_member("c"));
        assert_eq!(obj.get("c"), ForeignValue::Undefined);
        assert_eq!(obj.own_keys(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn plain_object_display_is_generic_marker() {
        assert_eq!(ScriptObject::plain().to_display_string(), GENERIC_OBJECT_MARKER);
        assert_eq!(ScriptObject::new("Map").to_display_string(), "[object Map]");
    }

    #[test]
    fn value_of_variants() {
        assert_eq!(ScriptObject::plain().value_of(), Ok(None));
        assert_eq!(
            ScriptObject::date(5.0).value_of(),
            Ok(Some(ForeignValue::Float(5.0)))
        );
        assert!(
            ScriptObject::plain()
                .with_throwing_value_of("boom")
                .value_of()
                .is_err()
        );
    }

    #[test]
    fn opaque_equality_is_identity() {
        let a = ScriptObject::plain().into_foreign();
        let b = ScriptObject::plain().into_foreign();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn undefined_is_not_null() {
        assert_ne!(ForeignValue::Undefined, ForeignValue::Null);
        assert!(ForeignValue::Undefined.is_undefined());
    }

    #[test]
    fn as_f64_on_numbers_only() {
        assert_eq!(ForeignValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(ForeignValue::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(ForeignValue::String("1".into()).as_f64(), None);
    }
}
