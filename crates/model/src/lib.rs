//! # helios-rpc-model
//!
//! The type descriptor view and native value model read by the XML protocol
//! in `helios-rpc-xml`.
//!
//! - [`Interface`] / [`InterfaceBuilder`]: an arena of [`TypeDescriptor`]s
//!   with flattened field tables and a class registry for polymorphic lookup
//! - [`Value`], [`Object`], [`FieldSource`]: native instances, including
//!   objects owned by another object model whose field reads may fail
//! - [`Fault`]: the reported-failure value
//! - [`Element`] / [`QName`]: the parsed markup tree
//! - [`PrimitiveKind`], [`BinaryEncoding`]: scalar and binary text forms
//! - [`validate`]: soft-validation predicates
//!
//! ```
//! use helios_rpc_model::{InterfaceBuilder, PrimitiveKind, QName, TypeDescriptor};
//!
//! let mut builder = InterfaceBuilder::new("urn:example");
//! let name = builder.primitive(PrimitiveKind::String);
//! let person = builder
//!     .register(TypeDescriptor::complex(QName::new("urn:example", "Person")).with_field("name", name))
//!     .unwrap();
//! let interface = builder.build().unwrap();
//! assert_eq!(interface.members(person).len(), 1);
//! ```

pub mod descriptor;
pub mod error;
pub mod fault;
pub mod interface;
pub mod markup;
pub mod primitive;
pub mod qname;
pub mod validate;
pub mod value;

pub use descriptor::{
    Category, DescriptorId, Field, MaxOccurs, Member, ProtocolHandle, Restrictions,
    TypeDescriptor, TypeKind,
};
pub use error::{ModelError, Result};
pub use fault::{Fault, FaultDetail};
pub use interface::{Interface, InterfaceBuilder};
pub use markup::{Element, NamespaceMap};
pub use primitive::{BinaryEncoding, PrimitiveKind};
pub use qname::{QName, SOAP_ENV_NS, XML_NS, XS_NS, XSI_NS, xsi_nil, xsi_type};
pub use value::{
    FieldReadError, FieldSource, ForeignObject, LazySequence, Object, PushSource, Value,
};
