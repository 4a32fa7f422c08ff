//! Wire elements to native values.

use std::collections::HashMap;

use helios_rpc_model::{
    BinaryEncoding, DescriptorId, Element, Fault, FaultDetail, Interface, LazySequence, Member,
    ModelError, Object, QName, TypeKind, Value, XSI_NS, validate, xsi_nil, xsi_type,
};
use tracing::{debug, trace};

use crate::dict;
use crate::error::{Result, XmlError};
use crate::protocol::XmlDocument;
use crate::write::resolve_qname_value;

const FAULT_FIELDS: [&str; 4] = ["faultcode", "faultstring", "faultactor", "detail"];

/// Decoding state shared by every handler of one call.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    protocol: &'a XmlDocument,
    soft: bool,
    binary_encoding: BinaryEncoding,
}

impl<'a> Decoder<'a> {
    pub fn new(protocol: &'a XmlDocument, soft: bool, binary_encoding: BinaryEncoding) -> Self {
        Self {
            protocol,
            soft,
            binary_encoding,
        }
    }

    pub fn interface(&self) -> &'a Interface {
        self.protocol.interface()
    }

    /// Whether per-field soft validation is on.
    pub fn is_soft(&self) -> bool {
        self.soft
    }

    pub fn binary_encoding(&self) -> BinaryEncoding {
        self.binary_encoding
    }

    /// Decodes `element` as a value of type `ty`.
    pub fn decode(&self, ty: DescriptorId, element: &Element) -> Result<Value> {
        let desc = self.interface().get(ty);
        if let Some(handle) = desc.sub_protocol {
            let sub = self.protocol.sub_protocol(handle)?;
            trace!(tag = %element.name, protocol = handle.0, "delegating to sub-protocol");
            return sub.subdeserialize(self.interface(), ty, element);
        }
        self.dispatch(ty, element)
    }

    /// Decodes with this protocol's own handlers, ignoring any sub-protocol
    /// the type names.
    pub fn dispatch(&self, ty: DescriptorId, element: &Element) -> Result<Value> {
        let desc = self.interface().get(ty);
        if is_nil(element) {
            if self.soft && !desc.nillable {
                return Err(XmlError::validation(
                    format!("'{}'", element.name.local),
                    "is not nillable.",
                ));
            }
            return Ok(desc.default.clone().unwrap_or_default());
        }

        let handler = self.protocol.registry().lookup_deserializer(desc.category())?;
        handler(self, ty, element)
    }

    /// Parses scalar wire text, applying the string and native checks under
    /// soft validation. Missing text decodes to [`Value::Null`].
    pub fn scalar(&self, ty: DescriptorId, text: Option<&str>) -> Result<Value> {
        let desc = self.interface().get(ty);
        if let TypeKind::Attribute { value, .. } | TypeKind::XmlBody { value } = desc.kind {
            return self.scalar(value, text);
        }

        if self.soft {
            validate::validate_string(desc, text).map_err(|reason| {
                XmlError::validation(
                    format!("{:?}", text.unwrap_or_default()),
                    format!("failed validation: {}", reason),
                )
            })?;
        }
        let value = match text {
            None => Value::Null,
            Some(text) => self.parse_text(ty, text)?,
        };
        if self.soft {
            validate::validate_native(desc, &value).map_err(|reason| {
                XmlError::validation(
                    format!("{:?}", text.unwrap_or_default()),
                    format!("failed validation: {}", reason),
                )
            })?;
        }
        Ok(value)
    }

    fn parse_text(&self, ty: DescriptorId, text: &str) -> Result<Value> {
        let desc = self.interface().get(ty);
        let parsed = match &desc.kind {
            TypeKind::Primitive(kind) => kind.from_text(text),
            TypeKind::Enum { .. } => Ok(Value::Enum(text.to_string())),
            TypeKind::ByteArray => self.binary_encoding.decode(text).map(Value::Bytes),
            TypeKind::Attachment => BinaryEncoding::Base64.decode(text).map(Value::Bytes),
            _ => {
                return Err(XmlError::Type(format!(
                    "{} cannot be read from text",
                    desc.name
                )));
            }
        };
        parsed.map_err(|err| match err {
            ModelError::PrimitiveParse { .. } | ModelError::Binary { .. } => {
                XmlError::validation(format!("{:?}", text), format!("failed validation: {}", err))
            }
            other => XmlError::Model(other),
        })
    }

    /// The registered subtype named by `xsi:type`, or the declared type when
    /// the override is missing or does not resolve.
    fn resolve_type(&self, declared: DescriptorId, element: &Element) -> DescriptorId {
        let Some(raw) = element.attribute(&xsi_type()) else {
            return declared;
        };
        let interface = self.interface();
        let resolved = resolve_qname_value(element, raw)
            .and_then(|name| interface.lookup_class(&name))
            .filter(|actual| interface.is_subtype(*actual, declared));
        match resolved {
            Some(actual) => {
                trace!(declared = %interface.get(declared).name, actual = %interface.get(actual).name, "xsi:type override");
                actual
            }
            None => {
                debug!(value = raw, declared = %interface.get(declared).name, "unresolved xsi:type; using declared type");
                declared
            }
        }
    }
}

fn is_nil(element: &Element) -> bool {
    matches!(element.attribute(&xsi_nil()), Some("true" | "1"))
}

fn attribute_member<'i>(
    interface: &'i Interface,
    ty: DescriptorId,
    owner: Option<&str>,
    name: &QName,
) -> Option<&'i Member> {
    interface.members(ty).iter().find(|member| {
        let field = interface.get(member.ty);
        if !field.is_attribute() || field.attribute_of() != owner {
            return false;
        }
        let expected = QName::qualified(
            field.sub_namespace.as_deref(),
            field.sub_name.clone().unwrap_or_else(|| member.key.clone()),
        );
        expected == *name || (name.namespace().is_none() && member.key == name.local)
    })
}

fn store(object: &mut Object, key: &str, value: Value, repeating: bool) {
    if repeating {
        object.push(key, value);
    } else {
        object.set(key, value);
    }
}

pub fn base_from_element(decoder: &Decoder<'_>, ty: DescriptorId, element: &Element) -> Result<Value> {
    let text = element.text.as_deref().filter(|t| !t.is_empty());
    decoder.scalar(ty, text)
}

pub fn unicode_from_element(
    decoder: &Decoder<'_>,
    ty: DescriptorId,
    element: &Element,
) -> Result<Value> {
    decoder.scalar(ty, Some(element.text.as_deref().unwrap_or_default()))
}

pub fn enum_from_element(decoder: &Decoder<'_>, ty: DescriptorId, element: &Element) -> Result<Value> {
    let text = element.text.as_deref().map(str::trim).filter(|t| !t.is_empty());
    decoder.scalar(ty, text)
}

pub fn byte_array_from_element(
    decoder: &Decoder<'_>,
    ty: DescriptorId,
    element: &Element,
) -> Result<Value> {
    base_from_element(decoder, ty, element)
}

pub fn attachment_from_element(
    decoder: &Decoder<'_>,
    ty: DescriptorId,
    element: &Element,
) -> Result<Value> {
    base_from_element(decoder, ty, element)
}

pub fn complex_from_element(
    decoder: &Decoder<'_>,
    ty: DescriptorId,
    element: &Element,
) -> Result<Value> {
    let interface = decoder.interface();
    let ty = decoder.resolve_type(ty, element);
    let mut object = Object::new(ty);
    let mut frequencies: HashMap<&str, u32> = HashMap::new();

    if let Some(body) = interface.xml_body_member(ty) {
        let value = decoder.scalar(body.ty, element.text.as_deref())?;
        object.set(body.key.clone(), value);
    }

    for child in &element.children {
        let Some(member) = interface.resolve_child(ty, &child.name) else {
            trace!(tag = %child.name, "unmatched child ignored");
            continue;
        };
        let field = interface.get(member.ty);
        if field.is_attribute() {
            continue;
        }
        *frequencies.entry(member.key.as_str()).or_default() += 1;
        let value = decoder.decode(member.ty, child)?;
        store(&mut object, &member.key, value, field.is_repeating());

        for (name, text) in &child.attributes {
            if name.is_in(XSI_NS) {
                continue;
            }
            if let Some(attr) = attribute_member(interface, ty, Some(&member.key), name) {
                let value = decoder.scalar(attr.ty, Some(text))?;
                store(&mut object, &attr.key, value, field.is_repeating());
            }
        }
    }

    for (name, text) in &element.attributes {
        if name.is_in(XSI_NS) {
            continue;
        }
        if let Some(attr) = attribute_member(interface, ty, None, name) {
            *frequencies.entry(attr.key.as_str()).or_default() += 1;
            let value = decoder.scalar(attr.ty, Some(text))?;
            object.set(attr.key.clone(), value);
        }
    }

    if decoder.is_soft() {
        for member in interface.members(ty) {
            let field = interface.get(member.ty);
            if field.attribute_of().is_some() || matches!(field.kind, TypeKind::XmlBody { .. }) {
                continue;
            }
            let count = frequencies.get(member.key.as_str()).copied().unwrap_or(0);
            if count < field.min_occurs || !field.max_occurs.admits(count) {
                debug!(field = %member.key, count, min = field.min_occurs, max = %field.max_occurs, "frequency check failed");
                return Err(XmlError::validation(
                    format!("'{}' member", member.key),
                    "does not respect frequency constraints.",
                ));
            }
        }
    }

    Ok(Value::Object(object))
}

fn container_item(decoder: &Decoder<'_>, ty: DescriptorId) -> Result<DescriptorId> {
    match decoder.interface().get(ty).kind {
        TypeKind::Array { item } | TypeKind::Iterable { item } => Ok(item),
        _ => Err(XmlError::Type(format!(
            "{} is not a container",
            decoder.interface().get(ty).name
        ))),
    }
}

pub fn array_from_element(decoder: &Decoder<'_>, ty: DescriptorId, element: &Element) -> Result<Value> {
    let item = container_item(decoder, ty)?;
    let items = element
        .children
        .iter()
        .map(|child| decoder.decode(item, child))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Sequence(items))
}

/// Items are decoded as the sequence is consumed.
pub fn iterable_from_element(
    decoder: &Decoder<'_>,
    ty: DescriptorId,
    element: &Element,
) -> Result<Value> {
    let item = container_item(decoder, ty)?;
    let protocol = decoder.protocol.clone();
    let (soft, binary_encoding) = (decoder.soft, decoder.binary_encoding);
    let children = element.children.clone();
    Ok(Value::Lazy(LazySequence::new(children.into_iter().map(
        move |child| {
            Decoder::new(&protocol, soft, binary_encoding)
                .decode(item, &child)
                .map_err(Fault::from)
        },
    ))))
}

pub fn fault_from_element(decoder: &Decoder<'_>, ty: DescriptorId, element: &Element) -> Result<Value> {
    let interface = decoder.interface();
    let ty = decoder.resolve_type(ty, element);
    let text_of = |local: &str| {
        element
            .find_local(local)
            .and_then(|child| child.text.clone())
            .unwrap_or_default()
    };

    let raw_code = text_of("faultcode");
    let code = raw_code
        .split_once(':')
        .map_or(raw_code.as_str(), |(_, code)| code);
    let mut fault = Fault::new(code, text_of("faultstring"));
    fault.actor = Some(text_of("faultactor")).filter(|a| !a.is_empty());
    fault.detail = element.find_local("detail").cloned().map(FaultDetail::Markup);

    for child in &element.children {
        if child.name.namespace().is_none() && FAULT_FIELDS.contains(&child.name.local.as_str()) {
            continue;
        }
        let Some(member) = interface.resolve_child(ty, &child.name) else {
            continue;
        };
        let value = decoder.decode(member.ty, child)?;
        if interface.get(member.ty).is_repeating() {
            match fault.extra.entry(member.key.clone()).or_insert_with(|| Value::Sequence(Vec::new())) {
                Value::Sequence(items) => items.push(value),
                slot => *slot = Value::Sequence(vec![std::mem::take(slot), value]),
            }
        } else {
            fault.extra.insert(member.key.clone(), value);
        }
    }

    if ty != interface.fault_type() {
        fault.ty = Some(ty);
    }
    Ok(Value::Fault(Box::new(fault)))
}

pub fn xml_from_element(_decoder: &Decoder<'_>, _ty: DescriptorId, element: &Element) -> Result<Value> {
    Ok(element
        .children
        .first()
        .cloned()
        .map_or(Value::Null, Value::Xml))
}

/// One child is the value itself; several are wrapped in `p`; otherwise the
/// text is returned.
pub fn html_from_element(_decoder: &Decoder<'_>, _ty: DescriptorId, element: &Element) -> Result<Value> {
    let value = match element.children.as_slice() {
        [only] => {
            let mut only = only.clone();
            only.tail = None;
            Value::Xml(only)
        }
        [] => element
            .text
            .clone()
            .filter(|t| !t.is_empty())
            .map_or(Value::Null, Value::String),
        _ => {
            let mut wrapper = element.clone();
            wrapper.name = QName::unqualified("p");
            wrapper.attributes.clear();
            wrapper.tail = None;
            Value::Xml(wrapper)
        }
    };
    Ok(value)
}

pub fn dict_from_element(_decoder: &Decoder<'_>, _ty: DescriptorId, element: &Element) -> Result<Value> {
    if element.children.is_empty() {
        return Ok(Value::Null);
    }
    Ok(Value::Dict(serde_json::Value::Object(dict::children_to_dict(element))))
}

#[cfg(test)]
mod tests {
    use helios_rpc_model::{InterfaceBuilder, PrimitiveKind, TypeDescriptor};

    use super::*;

    #[test]
    fn test_nil_marker_values() {
        let el = Element::new("a").with_attribute(xsi_nil(), "1");
        assert!(is_nil(&el));
        let el = Element::new("a").with_attribute(xsi_nil(), "false");
        assert!(!is_nil(&el));
    }

    #[test]
    fn test_attribute_member_matches_owner_and_name() -> Result<()> {
        let mut b = InterfaceBuilder::new("urn:t");
        let s = b.primitive(PrimitiveKind::String);
        let plain = b.attribute(s, None)?;
        let folded = b.attribute(s, Some("item"))?;
        let ty = b.register(
            TypeDescriptor::complex(QName::new("urn:t", "T"))
                .with_field("id", plain)
                .with_field("item", s)
                .with_field("lang", folded),
        )?;
        let iface = b.build()?;

        let id = attribute_member(&iface, ty, None, &QName::unqualified("id"));
        assert_eq!(id.map(|m| m.key.as_str()), Some("id"));
        assert!(attribute_member(&iface, ty, None, &QName::unqualified("lang")).is_none());
        let lang = attribute_member(&iface, ty, Some("item"), &QName::unqualified("lang"));
        assert_eq!(lang.map(|m| m.key.as_str()), Some("lang"));
        Ok(())
    }
}
