//! Native values bound to descriptors.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::descriptor::DescriptorId;
use crate::fault::Fault;
use crate::markup::Element;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Present but valueless; written as a nil marker.
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime<FixedOffset>),
    Uuid(uuid::Uuid),
    Bytes(Vec<u8>),
    /// Enum member name.
    Enum(String),
    Sequence(Vec<Value>),
    Lazy(LazySequence),
    /// Marks a field whose items are fed to the encoder one at a time.
    Push(PushSource),
    Object(Object),
    Foreign(ForeignObject),
    Dict(serde_json::Value),
    Xml(Element),
    Fault(Box<Fault>),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::DateTime(_) => "dateTime",
            Value::Uuid(_) => "uuid",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Sequence(_) => "sequence",
            Value::Lazy(_) => "lazy sequence",
            Value::Push(_) => "push source",
            Value::Object(_) => "object",
            Value::Foreign(_) => "foreign object",
            Value::Dict(_) => "dict",
            Value::Xml(_) => "xml",
            Value::Fault(_) => "fault",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Runtime type of a structured value, used for polymorphic encoding.
    pub fn type_hint(&self) -> Option<DescriptorId> {
        match self {
            Value::Object(o) => Some(o.ty),
            Value::Foreign(f) => f.source().type_hint(),
            Value::Fault(f) => f.ty,
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Fault> for Value {
    fn from(f: Fault) -> Self {
        Value::Fault(Box::new(f))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

/// An instance of a complex type.
///
/// A key missing from `fields` is absent; a key mapped to [`Value::Null`] is
/// present but nil.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub ty: DescriptorId,
    pub fields: BTreeMap<String, Value>,
}

impl Object {
    pub fn new(ty: DescriptorId) -> Self {
        Self {
            ty,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Appends to a sequence-valued field, creating it on first use.
    pub fn push(&mut self, key: &str, value: Value) {
        match self.fields.get_mut(key) {
            Some(Value::Sequence(items)) => items.push(value),
            _ => {
                self.fields.insert(key.to_string(), Value::Sequence(vec![value]));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Failure reading a field off a foreign object.
#[derive(Error, Debug, Clone)]
#[error("reading field '{key}' failed: {message}")]
pub struct FieldReadError {
    pub key: String,
    pub message: String,
}

impl FieldReadError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Field access on objects owned by another object model, such as rows
/// whose columns load lazily and may fail.
pub trait FieldSource: fmt::Debug + Send + Sync {
    /// `Ok(None)` means the field is absent.
    fn read_field(&self, key: &str) -> Result<Option<Value>, FieldReadError>;

    fn type_hint(&self) -> Option<DescriptorId> {
        None
    }
}

/// Shared handle to a [`FieldSource`]; compares by identity.
#[derive(Debug, Clone)]
pub struct ForeignObject(Arc<dyn FieldSource>);

impl ForeignObject {
    pub fn new(source: impl FieldSource + 'static) -> Self {
        Self(Arc::new(source))
    }

    pub fn source(&self) -> &dyn FieldSource {
        self.0.as_ref()
    }
}

impl PartialEq for ForeignObject {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Placeholder for a push-style unbounded source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PushSource {
    pub label: Option<String>,
}

impl PushSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }
}

type LazyItems = Box<dyn Iterator<Item = Result<Value, Fault>> + Send>;

/// A forward-only sequence that can be consumed once. Clones share the
/// underlying iterator; equality is identity.
#[derive(Clone)]
pub struct LazySequence(Arc<Mutex<Option<LazyItems>>>);

impl LazySequence {
    pub fn new<I>(items: I) -> Self
    where
        I: Iterator<Item = Result<Value, Fault>> + Send + 'static,
    {
        Self(Arc::new(Mutex::new(Some(Box::new(items)))))
    }

    /// Takes the iterator; `None` once it has been taken.
    pub fn take(&self) -> Option<LazyItems> {
        self.0.lock().take()
    }

    pub fn is_consumed(&self) -> bool {
        self.0.lock().is_none()
    }

    /// Drains the sequence, stopping at the first error.
    pub fn collect_values(&self) -> Result<Vec<Value>, Fault> {
        match self.take() {
            Some(items) => items.collect(),
            None => Ok(Vec::new()),
        }
    }
}

impl fmt::Debug for LazySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySequence")
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

impl PartialEq for LazySequence {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_push_creates_sequence() {
        let mut obj = Object::new(DescriptorId(0));
        obj.push("tag", Value::from("a"));
        obj.push("tag", Value::from("b"));
        assert_eq!(
            obj.get("tag"),
            Some(&Value::Sequence(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn test_lazy_sequence_is_consumed_once() {
        let lazy = LazySequence::new(vec![Ok(Value::Integer(1)), Ok(Value::Integer(2))].into_iter());
        let shared = lazy.clone();
        assert_eq!(lazy, shared);
        assert_eq!(
            shared.collect_values().unwrap(),
            vec![Value::Integer(1), Value::Integer(2)]
        );
        assert!(lazy.is_consumed());
        assert!(lazy.take().is_none());
    }
}
