//! Read-only type descriptors.
//!
//! Descriptors live in the arena owned by an [`Interface`](crate::Interface)
//! and refer to each other by [`DescriptorId`]. A field's descriptor is a
//! customized copy of its type, so per-field facets (occurrence bounds,
//! nillability, element-name overrides) live on the descriptor itself.

use std::fmt;

use regex::Regex;
use rust_decimal::Decimal;

use crate::error::{ModelError, Result};
use crate::primitive::PrimitiveKind;
use crate::qname::QName;
use crate::value::Value;

/// Index of a descriptor inside its interface arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId(pub(crate) u32);

impl DescriptorId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of an alternate protocol a field delegates its wire form to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

impl MaxOccurs {
    pub fn is_repeating(self) -> bool {
        match self {
            MaxOccurs::Bounded(n) => n > 1,
            MaxOccurs::Unbounded => true,
        }
    }

    pub fn admits(self, count: u32) -> bool {
        match self {
            MaxOccurs::Bounded(n) => count <= n,
            MaxOccurs::Unbounded => true,
        }
    }
}

impl Default for MaxOccurs {
    fn default() -> Self {
        MaxOccurs::Bounded(1)
    }
}

impl fmt::Display for MaxOccurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxOccurs::Bounded(n) => write!(f, "{}", n),
            MaxOccurs::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// The structural kind of a descriptor.
#[derive(Debug, Clone)]
pub enum TypeKind {
    Primitive(PrimitiveKind),
    Enum { members: Vec<String> },
    ByteArray,
    /// File-like payload; always base64 on the wire.
    Attachment,
    Complex,
    /// Eagerly decoded container of a single item type.
    Array { item: DescriptorId },
    /// Lazily decoded container of a single item type.
    Iterable { item: DescriptorId },
    Fault,
    AnyXml,
    AnyHtml,
    AnyDict,
    /// Written as an XML attribute; `attribute_of` names the sibling element
    /// field the attribute is folded onto.
    Attribute {
        value: DescriptorId,
        attribute_of: Option<String>,
    },
    /// Maps the whole text content of the parent element.
    XmlBody { value: DescriptorId },
}

/// Position in the handler lineage. Lookup walks from a category up through
/// its parents until a registered handler is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    ModelBase,
    Primitive,
    Unicode,
    Enum,
    ByteArray,
    Attachment,
    Complex,
    Array,
    Iterable,
    Fault,
    AnyXml,
    AnyHtml,
    AnyDict,
    XmlAttribute,
    XmlData,
}

impl Category {
    pub fn parent(self) -> Option<Category> {
        match self {
            Category::ModelBase => None,
            Category::Unicode | Category::Enum => Some(Category::Primitive),
            Category::Array | Category::Fault => Some(Category::Complex),
            Category::Iterable => Some(Category::Array),
            _ => Some(Category::ModelBase),
        }
    }

    /// The category followed by each of its ancestors, most specific first.
    pub fn lineage(self) -> impl Iterator<Item = Category> {
        std::iter::successors(Some(self), |c| c.parent())
    }
}

impl TypeKind {
    pub fn category(&self) -> Category {
        match self {
            TypeKind::Primitive(PrimitiveKind::String) => Category::Unicode,
            TypeKind::Primitive(_) => Category::Primitive,
            TypeKind::Enum { .. } => Category::Enum,
            TypeKind::ByteArray => Category::ByteArray,
            TypeKind::Attachment => Category::Attachment,
            TypeKind::Complex => Category::Complex,
            TypeKind::Array { .. } => Category::Array,
            TypeKind::Iterable { .. } => Category::Iterable,
            TypeKind::Fault => Category::Fault,
            TypeKind::AnyXml => Category::AnyXml,
            TypeKind::AnyHtml => Category::AnyHtml,
            TypeKind::AnyDict => Category::AnyDict,
            TypeKind::Attribute { .. } => Category::XmlAttribute,
            TypeKind::XmlBody { .. } => Category::XmlData,
        }
    }

    /// Kinds that carry a field table.
    pub fn has_fields(&self) -> bool {
        matches!(
            self,
            TypeKind::Complex | TypeKind::Fault | TypeKind::Array { .. } | TypeKind::Iterable { .. }
        )
    }
}

/// Value facets checked by soft validation.
#[derive(Debug, Clone, Default)]
pub struct Restrictions {
    /// Anchored at both ends.
    pub pattern: Option<Regex>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_value: Option<Decimal>,
    pub max_value: Option<Decimal>,
}

/// A field of a complex type.
#[derive(Debug, Clone)]
pub struct Field {
    pub key: String,
    pub ty: DescriptorId,
}

#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub name: QName,
    pub kind: TypeKind,
    pub nillable: bool,
    pub default: Option<Value>,
    pub min_occurs: u32,
    pub max_occurs: MaxOccurs,
    pub sub_name: Option<String>,
    pub sub_namespace: Option<String>,
    pub extends: Option<DescriptorId>,
    /// Own fields only; see [`Interface::members`](crate::Interface::members)
    /// for the flattened table.
    pub fields: Vec<Field>,
    pub sub_protocol: Option<ProtocolHandle>,
    pub restrictions: Restrictions,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<QName>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nillable: true,
            default: None,
            min_occurs: 0,
            max_occurs: MaxOccurs::default(),
            sub_name: None,
            sub_namespace: None,
            extends: None,
            fields: Vec::new(),
            sub_protocol: None,
            restrictions: Restrictions::default(),
        }
    }

    pub fn complex(name: impl Into<QName>) -> Self {
        Self::new(name, TypeKind::Complex)
    }

    pub fn enumeration<I, S>(name: impl Into<QName>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            TypeKind::Enum {
                members: members.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn with_field(mut self, key: impl Into<String>, ty: DescriptorId) -> Self {
        self.fields.push(Field {
            key: key.into(),
            ty,
        });
        self
    }

    pub fn extending(mut self, parent: DescriptorId) -> Self {
        self.extends = Some(parent);
        self
    }

    pub fn with_occurs(mut self, min: u32, max: MaxOccurs) -> Self {
        self.min_occurs = min;
        self.max_occurs = max;
        self
    }

    pub fn with_nillable(mut self, nillable: bool) -> Self {
        self.nillable = nillable;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_sub_name(mut self, sub_name: impl Into<String>) -> Self {
        self.sub_name = Some(sub_name.into());
        self
    }

    pub fn with_sub_namespace(mut self, sub_namespace: impl Into<String>) -> Self {
        self.sub_namespace = Some(sub_namespace.into());
        self
    }

    pub fn with_sub_protocol(mut self, handle: ProtocolHandle) -> Self {
        self.sub_protocol = Some(handle);
        self
    }

    /// Restricts the text form; the pattern must match the whole text.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        let anchored = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
            ModelError::InvalidPattern {
                type_name: self.name.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.restrictions.pattern = Some(anchored);
        Ok(self)
    }

    pub fn with_length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.restrictions.min_length = min;
        self.restrictions.max_length = max;
        self
    }

    pub fn with_range(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.restrictions.min_value = min;
        self.restrictions.max_value = max;
        self
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.name.namespace()
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self.kind, TypeKind::Attribute { .. })
    }

    pub fn attribute_of(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Attribute { attribute_of, .. } => attribute_of.as_deref(),
            _ => None,
        }
    }

    pub fn is_repeating(&self) -> bool {
        self.max_occurs.is_repeating()
    }
}

/// A flattened member: a field together with the type that declared it.
#[derive(Debug, Clone)]
pub struct Member {
    pub key: String,
    pub ty: DescriptorId,
    pub owner: DescriptorId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lineage_walks_to_model_base() {
        let lineage: Vec<_> = Category::Iterable.lineage().collect();
        assert_eq!(
            lineage,
            vec![
                Category::Iterable,
                Category::Array,
                Category::Complex,
                Category::ModelBase
            ]
        );
        assert_eq!(
            Category::ByteArray.lineage().collect::<Vec<_>>(),
            vec![Category::ByteArray, Category::ModelBase]
        );
    }

    #[test]
    fn test_max_occurs() {
        assert!(!MaxOccurs::Bounded(1).is_repeating());
        assert!(MaxOccurs::Bounded(3).is_repeating());
        assert!(MaxOccurs::Bounded(3).admits(3));
        assert!(!MaxOccurs::Bounded(3).admits(4));
        assert!(MaxOccurs::Unbounded.admits(u32::MAX));
    }
}
