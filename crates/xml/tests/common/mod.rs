//! Shared fixture interface for the XML protocol integration tests.

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::Arc;

use helios_rpc_model::{
    DescriptorId, Element, Interface, InterfaceBuilder, MaxOccurs, PrimitiveKind, QName,
    TypeDescriptor, TypeKind, Value, XS_NS,
};
use helios_rpc_xml::{OutputConfig, ValidatorMode, XmlDocument};
use parking_lot::Mutex;
use rust_decimal_macros::dec;

pub const TNS: &str = "urn:helios:test";

/// Descriptor ids of every fixture type.
pub struct Fixture {
    pub interface: Arc<Interface>,
    pub string: DescriptorId,
    pub integer: DescriptorId,
    pub color: DescriptorId,
    pub address: DescriptorId,
    pub person: DescriptorId,
    pub employee: DescriptorId,
    pub bounded: DescriptorId,
    pub catalog: DescriptorId,
    pub feed: DescriptorId,
    pub wrapper: DescriptorId,
    pub measure: DescriptorId,
    pub blob: DescriptorId,
    pub strict: DescriptorId,
    pub restricted: DescriptorId,
    pub envelope: DescriptorId,
    pub detailed_fault: DescriptorId,
    pub echo_request: DescriptorId,
    pub echo_response: DescriptorId,
    pub stream_response: DescriptorId,
    pub stamp: DescriptorId,
}

pub fn tag(local: &str) -> QName {
    QName::new(TNS, local)
}

pub fn fixture() -> Fixture {
    let mut b = InterfaceBuilder::new(TNS);
    let string = b.primitive(PrimitiveKind::String);
    let integer = b.primitive(PrimitiveKind::Integer);
    let decimal = b.primitive(PrimitiveKind::Decimal);

    let required = b
        .customize(string, |d| d.with_occurs(1, MaxOccurs::Bounded(1)))
        .unwrap();
    let repeated = b
        .customize(string, |d| d.with_occurs(0, MaxOccurs::Unbounded))
        .unwrap();

    let color = b
        .register(TypeDescriptor::enumeration(tag("Color"), ["red", "green", "blue"]))
        .unwrap();

    let address = b
        .register(
            TypeDescriptor::complex(tag("Address"))
                .with_field("street", required)
                .with_field("city", string),
        )
        .unwrap();

    let person = b
        .register(
            TypeDescriptor::complex(tag("Person"))
                .with_field("name", required)
                .with_field("age", integer)
                .with_field("favorite", color)
                .with_field("tags", repeated)
                .with_field("address", address),
        )
        .unwrap();

    let employee = b
        .register(
            TypeDescriptor::complex(tag("Employee"))
                .extending(person)
                .with_field("employee_id", integer),
        )
        .unwrap();

    let one_to_three = b
        .customize(string, |d| d.with_occurs(1, MaxOccurs::Bounded(3)))
        .unwrap();
    let bounded = b
        .register(TypeDescriptor::complex(tag("Bounded")).with_field("item", one_to_three))
        .unwrap();

    let id_attr = b.attribute(string, None).unwrap();
    let title_lang = b.attribute(string, Some("title")).unwrap();
    let item_lang = b.attribute(string, Some("item")).unwrap();
    let catalog = b
        .register(
            TypeDescriptor::complex(tag("Catalog"))
                .with_field("id", id_attr)
                .with_field("title", string)
                .with_field("title_lang", title_lang)
                .with_field("item", repeated)
                .with_field("lang", item_lang),
        )
        .unwrap();

    let feed = b
        .register(
            TypeDescriptor::complex(tag("Feed"))
                .with_field("title", string)
                .with_field("entries", repeated),
        )
        .unwrap();
    let wrapper = b
        .register(
            TypeDescriptor::complex(tag("Wrapper"))
                .with_field("feed", feed)
                .with_field("footer", string),
        )
        .unwrap();

    let unit = b.attribute(string, None).unwrap();
    let amount = b.xml_body(decimal).unwrap();
    let measure = b
        .register(
            TypeDescriptor::complex(tag("Measure"))
                .with_field("unit", unit)
                .with_field("value", amount),
        )
        .unwrap();

    let bytes = b.add(TypeDescriptor::new(
        QName::new(XS_NS, "base64Binary"),
        TypeKind::ByteArray,
    ));
    let file = b.add(TypeDescriptor::new(QName::new(TNS, "file"), TypeKind::Attachment));
    let blob = b
        .register(
            TypeDescriptor::complex(tag("Blob"))
                .with_field("data", bytes)
                .with_field("file", file),
        )
        .unwrap();

    let not_nillable = b.customize(string, |d| d.with_nillable(false)).unwrap();
    let defaulted = b
        .customize(string, |d| d.with_default(Value::from("n/a")))
        .unwrap();
    let strict = b
        .register(
            TypeDescriptor::complex(tag("Strict"))
                .with_field("code", not_nillable)
                .with_field("note", defaulted),
        )
        .unwrap();

    let pattern = b
        .get(string)
        .cloned()
        .unwrap()
        .with_pattern("[A-Z]{3}")
        .unwrap();
    let code = b.add(pattern);
    let level = b
        .customize(integer, |d| d.with_range(Some(dec!(1)), Some(dec!(5))))
        .unwrap();
    let restricted = b
        .register(
            TypeDescriptor::complex(tag("Restricted"))
                .with_field("code", code)
                .with_field("level", level)
                .with_field("color", color),
        )
        .unwrap();

    let dict = b.add(TypeDescriptor::new(tag("anyDict"), TypeKind::AnyDict));
    let xml = b.add(TypeDescriptor::new(tag("anyXml"), TypeKind::AnyXml));
    let html = b.add(TypeDescriptor::new(tag("anyHtml"), TypeKind::AnyHtml));
    let envelope = b
        .register(
            TypeDescriptor::complex(tag("Envelope"))
                .with_field("meta", dict)
                .with_field("doc", xml)
                .with_field("page", html),
        )
        .unwrap();

    let fault = b.fault_type();
    let detailed_fault = b
        .register(
            TypeDescriptor::new(tag("DetailedFault"), TypeKind::Fault)
                .extending(fault)
                .with_field("retry_after", integer),
        )
        .unwrap();

    let echo_request = b
        .register(
            TypeDescriptor::complex(tag("EchoRequest"))
                .with_field("name", string)
                .with_field("times", integer),
        )
        .unwrap();
    let echo_response = b
        .register(
            TypeDescriptor::complex(tag("EchoResponse"))
                .with_field("greeting", string)
                .with_field("count", integer),
        )
        .unwrap();
    let stream_response = b
        .register(TypeDescriptor::complex(tag("StreamResponse")).with_field("entries", repeated))
        .unwrap();

    let date = b.primitive(PrimitiveKind::Date);
    let time = b.primitive(PrimitiveKind::Time);
    let date_time = b.primitive(PrimitiveKind::DateTime);
    let uuid = b.primitive(PrimitiveKind::Uuid);
    let stamp = b
        .register(
            TypeDescriptor::complex(tag("Stamp"))
                .with_field("day", date)
                .with_field("at", time)
                .with_field("when", date_time)
                .with_field("id", uuid),
        )
        .unwrap();

    Fixture {
        interface: Arc::new(b.build().unwrap()),
        string,
        integer,
        color,
        address,
        person,
        employee,
        bounded,
        catalog,
        feed,
        wrapper,
        measure,
        blob,
        strict,
        restricted,
        envelope,
        detailed_fault,
        echo_request,
        echo_response,
        stream_response,
        stamp,
    }
}

/// A protocol with no validation and default settings.
pub fn protocol(fixture: &Fixture) -> XmlDocument {
    XmlDocument::new(fixture.interface.clone())
}

pub fn soft_protocol(fixture: &Fixture) -> XmlDocument {
    XmlDocument::builder(fixture.interface.clone())
        .validator(ValidatorMode::SOFT)
        .build()
        .unwrap()
}

/// Output without a declaration, for comparing markup.
pub fn bare_output() -> OutputConfig {
    OutputConfig {
        emit_document_declaration: false,
        ..Default::default()
    }
}

pub fn child<'a>(element: &'a Element, local: &str) -> &'a Element {
    element
        .find_local(local)
        .unwrap_or_else(|| panic!("no <{}> under {}", local, element.name))
}

pub fn texts(element: &Element, local: &str) -> Vec<String> {
    element
        .children
        .iter()
        .filter(|c| c.name.local == local)
        .map(|c| c.text.clone().unwrap_or_default())
        .collect()
}

/// A cloneable in-memory writer whose contents stay readable after the
/// writer has been handed off.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.contents()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
