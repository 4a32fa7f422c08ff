//! Per-call state.

use std::fmt;
use std::io::Write;

use helios_rpc_model::{BinaryEncoding, DescriptorId, Element, Fault, Value};

use crate::config::ValidatorMode;
use crate::ingest::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyStyle {
    /// The message type wraps the positional arguments or results.
    Wrapped,
    /// The single argument or result is the message itself.
    Bare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    Request,
    Response,
}

/// The method being served: its message types and body style.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub in_message: DescriptorId,
    pub out_message: DescriptorId,
    pub body_style: BodyStyle,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, in_message: DescriptorId, out_message: DescriptorId) -> Self {
        Self {
            name: name.into(),
            in_message,
            out_message,
            body_style: BodyStyle::Wrapped,
        }
    }

    pub fn bare(mut self) -> Self {
        self.body_style = BodyStyle::Bare;
        self
    }

    pub fn message(&self, direction: MessageDirection) -> DescriptorId {
        match direction {
            MessageDirection::Request => self.in_message,
            MessageDirection::Response => self.out_message,
        }
    }
}

/// State of one in-flight call. Owned by that call alone.
pub struct CallContext {
    pub in_fragments: Vec<Vec<u8>>,
    pub in_document: Option<Document>,
    pub in_body: Option<Element>,
    /// Clark key of the body root, used to pick the method.
    pub method_request_key: Option<String>,
    pub method: Option<MethodDescriptor>,
    pub validator: ValidatorMode,
    pub binary_encoding: BinaryEncoding,
    pub in_object: Option<Value>,
    pub in_error: Option<Fault>,
    /// Positional results of the method.
    pub out_object: Vec<Value>,
    pub out_error: Option<Fault>,
    pub out_document: Option<Element>,
    pub out_string: Vec<Vec<u8>>,
    /// When set, the response is written here incrementally.
    pub out_stream: Option<Box<dyn Write + Send>>,
}

impl CallContext {
    pub fn new(validator: ValidatorMode, binary_encoding: BinaryEncoding) -> Self {
        Self {
            in_fragments: Vec::new(),
            in_document: None,
            in_body: None,
            method_request_key: None,
            method: None,
            validator,
            binary_encoding,
            in_object: None,
            in_error: None,
            out_object: Vec::new(),
            out_error: None,
            out_document: None,
            out_string: Vec::new(),
            out_stream: None,
        }
    }

    pub fn with_request(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.in_fragments.push(bytes.into());
        self
    }

    pub fn with_method(mut self, method: MethodDescriptor) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_out_stream(mut self, stream: impl Write + Send + 'static) -> Self {
        self.out_stream = Some(Box::new(stream));
        self
    }

    /// The serialized response as one buffer.
    pub fn response_bytes(&self) -> Vec<u8> {
        self.out_string.concat()
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("in_fragments", &self.in_fragments.len())
            .field("method_request_key", &self.method_request_key)
            .field("method", &self.method.as_ref().map(|m| m.name.as_str()))
            .field("validator", &self.validator)
            .field("binary_encoding", &self.binary_encoding)
            .field("in_object", &self.in_object)
            .field("in_error", &self.in_error)
            .field("out_object", &self.out_object)
            .field("out_error", &self.out_error)
            .field("out_document", &self.out_document.is_some())
            .field("out_stream", &self.out_stream.is_some())
            .finish()
    }
}
