//! Category → handler tables.
//!
//! Lookup walks the category lineage from the most specific kind upward, so
//! a handler registered for a parent category serves every descendant that
//! has none of its own.

use std::collections::HashMap;
use std::fmt;

use helios_rpc_model::{Category, DescriptorId, Element, QName, Value};

use crate::decode::{self, Decoder};
use crate::encode::{self, Producer};
use crate::error::{Result, XmlError};
use crate::sink::WireSink;

/// Writes `value` of type `ty` under `tag` into the sink.
pub type SerializeFn =
    fn(&mut Producer<'_>, &mut dyn WireSink, DescriptorId, Value, &QName) -> Result<()>;

/// Reads a value of type `ty` from a wire element.
pub type DeserializeFn = fn(&Decoder<'_>, DescriptorId, &Element) -> Result<Value>;

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    serializers: HashMap<Category, SerializeFn>,
    deserializers: HashMap<Category, DeserializeFn>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard XML handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register_serializer(Category::AnyXml, encode::xml_to_parent);
        registry.register_serializer(Category::Fault, encode::fault_to_parent);
        registry.register_serializer(Category::AnyDict, encode::dict_to_parent);
        registry.register_serializer(Category::AnyHtml, encode::html_to_parent);
        registry.register_serializer(Category::Enum, encode::enum_to_parent);
        registry.register_serializer(Category::XmlData, encode::xmldata_to_parent);
        registry.register_serializer(Category::ModelBase, encode::modelbase_to_parent);
        registry.register_serializer(Category::ByteArray, encode::byte_array_to_parent);
        registry.register_serializer(Category::Attachment, encode::attachment_to_parent);
        registry.register_serializer(Category::XmlAttribute, encode::xmlattribute_to_parent);
        registry.register_serializer(Category::Complex, encode::complex_to_parent);

        registry.register_deserializer(Category::AnyHtml, decode::html_from_element);
        registry.register_deserializer(Category::AnyXml, decode::xml_from_element);
        registry.register_deserializer(Category::Array, decode::array_from_element);
        registry.register_deserializer(Category::Fault, decode::fault_from_element);
        registry.register_deserializer(Category::AnyDict, decode::dict_from_element);
        registry.register_deserializer(Category::Enum, decode::enum_from_element);
        registry.register_deserializer(Category::ModelBase, decode::base_from_element);
        registry.register_deserializer(Category::Unicode, decode::unicode_from_element);
        registry.register_deserializer(Category::Iterable, decode::iterable_from_element);
        registry.register_deserializer(Category::ByteArray, decode::byte_array_from_element);
        registry.register_deserializer(Category::Attachment, decode::attachment_from_element);
        registry.register_deserializer(Category::Complex, decode::complex_from_element);

        registry
    }

    /// Registers either or both directions for a category, replacing any
    /// earlier handler.
    pub fn register(
        &mut self,
        category: Category,
        serializer: Option<SerializeFn>,
        deserializer: Option<DeserializeFn>,
    ) {
        if let Some(serializer) = serializer {
            self.register_serializer(category, serializer);
        }
        if let Some(deserializer) = deserializer {
            self.register_deserializer(category, deserializer);
        }
    }

    pub fn register_serializer(&mut self, category: Category, handler: SerializeFn) {
        self.serializers.insert(category, handler);
    }

    pub fn register_deserializer(&mut self, category: Category, handler: DeserializeFn) {
        self.deserializers.insert(category, handler);
    }

    pub fn lookup_serializer(&self, category: Category) -> Result<SerializeFn> {
        category
            .lineage()
            .find_map(|c| self.serializers.get(&c).copied())
            .ok_or(XmlError::UnregisteredType { category })
    }

    pub fn lookup_deserializer(&self, category: Category) -> Result<DeserializeFn> {
        category
            .lineage()
            .find_map(|c| self.deserializers.get(&c).copied())
            .ok_or(XmlError::UnregisteredType { category })
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("serializers", &self.serializers.keys().collect::<Vec<_>>())
            .field("deserializers", &self.deserializers.keys().collect::<Vec<_>>())
            .finish()
    }
}
