//! The wire shape of a reported failure.

use std::collections::BTreeMap;
use std::fmt;

use crate::descriptor::DescriptorId;
use crate::markup::Element;
use crate::value::{FieldReadError, FieldSource, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum FaultDetail {
    Text(String),
    /// Structured mapping, rendered as generic child elements.
    Mapping(serde_json::Value),
    Markup(Element),
}

/// A SOAP-style fault.
///
/// `code` is dotted (`Client.ValidationError`); the envelope prefix is added
/// on the wire. Fault subtypes may declare extra fields, carried in `extra`
/// and typed by `ty`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fault {
    pub code: String,
    pub message: String,
    pub actor: Option<String>,
    pub detail: Option<FaultDetail>,
    pub extra: BTreeMap<String, Value>,
    pub ty: Option<DescriptorId>,
}

impl Fault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_detail(mut self, detail: FaultDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_type(mut self, ty: DescriptorId) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// `Client` for caller-caused faults, `Server` otherwise.
    pub fn family(&self) -> &str {
        self.code.split('.').next().unwrap_or_default()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Fault {}

impl FieldSource for Fault {
    fn read_field(&self, key: &str) -> Result<Option<Value>, FieldReadError> {
        Ok(self.extra.get(key).cloned())
    }

    fn type_hint(&self) -> Option<DescriptorId> {
        self.ty
    }
}
