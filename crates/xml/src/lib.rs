//! # helios-rpc-xml
//!
//! Converts between schema-typed native values and an XML/SOAP wire form.
//!
//! The crate is organised leaf-first:
//!
//! - [`registry`]: category → handler tables with lineage lookup
//! - [`encode`]: values to elements, as a resumable [`Producer`] that can
//!   suspend on push sources and be cancelled without leaving open elements
//! - [`decode`]: elements to values, with `xsi:type` polymorphism, soft
//!   validation and attribute rebinding
//! - [`ingest`] / [`egress`]: the locked-down parser and the document writer;
//!   [`stream`] writes elements as they are produced
//! - [`protocol`]: [`XmlDocument`], which runs a [`CallContext`] through
//!   ingest, decode, encode and egress
//!
//! ```
//! use std::sync::Arc;
//!
//! use helios_rpc_model::{InterfaceBuilder, Object, PrimitiveKind, QName, TypeDescriptor, Value};
//! use helios_rpc_xml::XmlDocument;
//!
//! let mut builder = InterfaceBuilder::new("urn:example");
//! let name = builder.primitive(PrimitiveKind::String);
//! let person = builder
//!     .register(TypeDescriptor::complex(QName::new("urn:example", "Person")).with_field("name", name))
//!     .unwrap();
//! let protocol = XmlDocument::new(Arc::new(builder.build().unwrap()));
//!
//! let value = Value::Object(Object::new(person).with("name", "Ada"));
//! let element = protocol
//!     .to_element(person, value.clone(), QName::new("urn:example", "Person"))
//!     .unwrap();
//! assert_eq!(protocol.from_element(person, &element).unwrap(), value);
//! ```

pub mod config;
pub mod context;
pub mod decode;
pub mod dict;
pub mod egress;
pub mod encode;
pub mod error;
pub mod events;
pub mod ingest;
pub mod namespaces;
pub mod protocol;
pub mod registry;
pub mod sink;
pub mod stream;
pub mod write;

pub use config::{OutputConfig, ParserConfig, ValidatorMode};
pub use context::{BodyStyle, CallContext, MessageDirection, MethodDescriptor};
pub use decode::Decoder;
pub use encode::{EncodeOutcome, Feed, Producer, Step};
pub use error::{Result, XmlError};
pub use events::{EventManager, Listener, ProtocolEvent};
pub use ingest::{Doctype, Document, parse_document, parse_fragment, parse_fragments};
pub use protocol::{
    MIME_TYPE, ResponseStream, SchemaValidator, Serialized, SubProtocol, XmlDocument,
    XmlDocumentBuilder,
};
pub use registry::{DeserializeFn, HandlerRegistry, SerializeFn};
pub use sink::{TreeSink, WireSink};
pub use stream::StreamSink;
