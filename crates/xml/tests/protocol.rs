//! A call driven through the whole protocol: ingest, decode, encode, egress.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{TNS, child, fixture, protocol, tag, texts};
use helios_rpc_model::{
    BinaryEncoding, DescriptorId, Element, Fault, FieldReadError, FieldSource, ForeignObject,
    Interface, InterfaceBuilder, Object, PrimitiveKind, ProtocolHandle, QName, SOAP_ENV_NS,
    TypeDescriptor, Value,
};
use helios_rpc_xml::{
    CallContext, MessageDirection, MethodDescriptor, ProtocolEvent, Result, Serialized,
    SubProtocol, ValidatorMode, WireSink, XmlDocument, XmlError,
};

const ECHO_REQUEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tns:EchoRequest xmlns:tns="urn:helios:test">
  <tns:name>Ada</tns:name>
  <tns:times>2</tns:times>
</tns:EchoRequest>"#;

fn echo(f: &common::Fixture) -> MethodDescriptor {
    MethodDescriptor::new("echo", f.echo_request, f.echo_response)
}

fn respond(protocol: &XmlDocument, ctx: &mut CallContext) -> Result<Element> {
    let serialized = protocol.serialize(ctx, MessageDirection::Response)?;
    assert!(matches!(serialized, Serialized::Complete));
    protocol.create_out_string(ctx, None)?;
    Ok(protocol.parse(&ctx.response_bytes())?.root)
}

#[test]
fn test_request_response_round_trip() -> Result<()> {
    let f = fixture();
    let protocol = protocol(&f);
    let mut ctx = protocol
        .new_context()
        .with_request(ECHO_REQUEST)
        .with_method(echo(&f));

    protocol.create_in_document(&mut ctx)?;
    protocol.decompose_incoming_envelope(&mut ctx)?;
    assert_eq!(
        ctx.method_request_key.as_deref(),
        Some("{urn:helios:test}EchoRequest")
    );

    protocol.deserialize(&mut ctx, MessageDirection::Request)?;
    let request = ctx.in_object.as_ref().and_then(Value::as_object).unwrap();
    assert_eq!(request.ty, f.echo_request);
    assert_eq!(request.get("name"), Some(&Value::from("Ada")));
    assert_eq!(request.get("times"), Some(&Value::Integer(2)));

    ctx.out_object = vec![Value::from("Hello, Ada"), Value::Integer(2)];
    let root = respond(&protocol, &mut ctx)?;
    assert_eq!(root.name, tag("EchoResponse"));
    assert_eq!(child(&root, "greeting").text.as_deref(), Some("Hello, Ada"));
    assert_eq!(child(&root, "count").text.as_deref(), Some("2"));
    Ok(())
}

#[test]
fn test_request_in_several_fragments() -> Result<()> {
    let f = fixture();
    let protocol = protocol(&f);
    let (head, tail) = ECHO_REQUEST.split_at(60);
    let mut ctx = protocol
        .new_context()
        .with_request(head)
        .with_request(tail)
        .with_method(echo(&f));

    protocol.create_in_document(&mut ctx)?;
    protocol.decompose_incoming_envelope(&mut ctx)?;
    protocol.deserialize(&mut ctx, MessageDirection::Request)?;
    assert!(ctx.in_object.is_some());
    Ok(())
}

#[test]
fn test_bare_response() -> Result<()> {
    let f = fixture();
    let protocol = protocol(&f);
    let mut ctx = protocol.new_context().with_method(echo(&f).bare());
    ctx.out_object = vec![Value::Object(
        Object::new(f.echo_response).with("greeting", "hi"),
    )];

    let root = respond(&protocol, &mut ctx)?;
    assert_eq!(root.name, tag("EchoResponse"));
    assert_eq!(texts(&root, "greeting"), vec!["hi"]);
    assert!(root.find_local("count").is_none());
    Ok(())
}

#[test]
fn test_missing_method() {
    let f = fixture();
    let protocol = protocol(&f);
    let mut ctx = protocol.new_context().with_request(ECHO_REQUEST);
    protocol.create_in_document(&mut ctx).unwrap();
    protocol.decompose_incoming_envelope(&mut ctx).unwrap();

    let err = protocol
        .deserialize(&mut ctx, MessageDirection::Request)
        .unwrap_err();
    assert!(matches!(err, XmlError::MethodNotFound(ref key) if key == "{urn:helios:test}EchoRequest"));
    assert_eq!(err.code(), "Client.MethodNotFound");
}

#[test]
fn test_recorded_in_error_is_reported() {
    let f = fixture();
    let protocol = protocol(&f);
    let mut ctx = protocol.new_context();
    ctx.in_error = Some(Fault::new("Client.Routing", "no route"));

    let err = protocol
        .deserialize(&mut ctx, MessageDirection::Request)
        .unwrap_err();
    assert_eq!(err.code(), "Client.Routing");
}

#[test]
fn test_absent_body_yields_nulls() -> Result<()> {
    let f = fixture();
    let protocol = protocol(&f);
    let mut ctx = protocol.new_context().with_method(echo(&f));

    protocol.deserialize(&mut ctx, MessageDirection::Request)?;
    assert_eq!(
        ctx.in_object,
        Some(Value::Sequence(vec![Value::Null, Value::Null]))
    );
    Ok(())
}

#[test]
fn test_syntax_errors() {
    let f = fixture();
    let protocol = protocol(&f);
    for bad in [
        "<a><b></a>",
        r#"<!DOCTYPE a [<!ENTITY x "y">]><a>&x;</a>"#,
        r#"<!DOCTYPE a [<!ENTITY x SYSTEM "file:///etc/passwd">]><a>&x;</a>"#,
    ] {
        let mut ctx = protocol.new_context().with_request(bad);
        let err = protocol.create_in_document(&mut ctx).unwrap_err();
        assert_eq!(err.code(), "Client.XmlSyntaxError", "{bad}");
        assert!(ctx.in_document.is_none());
    }
}

#[test]
fn test_schema_validation() -> Result<()> {
    let f = fixture();
    let protocol = XmlDocument::builder(f.interface.clone())
        .validator(ValidatorMode::SCHEMA)
        .schema_validator(|root: &Element| -> std::result::Result<(), String> {
            match root.find_local("name") {
                Some(_) => Ok(()),
                None => Err("element 'name' is required".to_string()),
            }
        })
        .build()
        .unwrap();

    let mut ctx = protocol.new_context().with_request(ECHO_REQUEST);
    protocol.create_in_document(&mut ctx)?;
    protocol.decompose_incoming_envelope(&mut ctx)?;

    let mut ctx = protocol
        .new_context()
        .with_request(r#"<tns:EchoRequest xmlns:tns="urn:helios:test"/>"#);
    protocol.create_in_document(&mut ctx)?;
    let err = protocol.decompose_incoming_envelope(&mut ctx).unwrap_err();
    assert_eq!(err.code(), "Client.SchemaValidationError");
    assert!(err.to_string().contains("element 'name' is required"));
    Ok(())
}

#[test]
fn test_events_fire_in_order() -> Result<()> {
    let f = fixture();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut builder = XmlDocument::builder(f.interface.clone());
    for event in [
        ProtocolEvent::BeforeDeserialize,
        ProtocolEvent::AfterDeserialize,
        ProtocolEvent::BeforeSerialize,
        ProtocolEvent::AfterSerialize,
    ] {
        let seen = seen.clone();
        builder = builder.listener(event, Arc::new(move |event: ProtocolEvent, _ctx: &CallContext| {
            seen.lock().push(event)
        }));
    }
    let protocol = builder.build().unwrap();

    let mut ctx = protocol
        .new_context()
        .with_request(ECHO_REQUEST)
        .with_method(echo(&f));
    protocol.create_in_document(&mut ctx)?;
    protocol.decompose_incoming_envelope(&mut ctx)?;
    protocol.deserialize(&mut ctx, MessageDirection::Request)?;
    ctx.out_object = vec![Value::from("hi")];
    protocol.serialize(&mut ctx, MessageDirection::Response)?;

    assert_eq!(
        *seen.lock(),
        vec![
            ProtocolEvent::BeforeDeserialize,
            ProtocolEvent::AfterDeserialize,
            ProtocolEvent::BeforeSerialize,
            ProtocolEvent::AfterSerialize,
        ]
    );
    Ok(())
}

#[derive(Debug)]
struct FlakyRow;

impl FieldSource for FlakyRow {
    fn read_field(&self, key: &str) -> std::result::Result<Option<Value>, FieldReadError> {
        match key {
            "name" => Ok(Some(Value::from("Ada"))),
            "age" => Err(FieldReadError::new(key, "column failed to load")),
            _ => Ok(None),
        }
    }
}

#[test]
fn test_failed_field_reads_count_as_absent() -> Result<()> {
    let f = fixture();
    let protocol = protocol(&f);
    let value = Value::Foreign(ForeignObject::new(FlakyRow));

    let element = protocol.to_element(f.person, value, tag("Person"))?;
    let locals: Vec<_> = element.children.iter().map(|c| c.name.local.as_str()).collect();
    assert_eq!(locals, vec!["name"]);
    Ok(())
}

#[test]
fn test_fault_response_shape() -> Result<()> {
    let f = fixture();
    let protocol = protocol(&f);
    let mut ctx = protocol.new_context().with_method(echo(&f));
    ctx.out_error = Some(Fault::new("Client.Foo", "bad"));

    protocol.serialize(&mut ctx, MessageDirection::Response)?;
    let root = ctx.out_document.clone().unwrap();
    assert_eq!(root.name, QName::new(SOAP_ENV_NS, "Fault"));
    let locals: Vec<_> = root.children.iter().map(|c| c.name.local.as_str()).collect();
    assert_eq!(locals, vec!["faultcode", "faultstring", "faultactor"]);
    assert_eq!(child(&root, "faultcode").text.as_deref(), Some("soap11env:Client.Foo"));
    assert_eq!(child(&root, "faultstring").text.as_deref(), Some("bad"));

    protocol.create_out_string(&mut ctx, None)?;
    let text = String::from_utf8(ctx.response_bytes()).unwrap();
    assert!(text.contains("<soap11env:Fault xmlns:soap11env="));
    assert!(text.contains("<faultcode>soap11env:Client.Foo</faultcode>"));
    assert!(text.contains("<faultactor/>"));
    assert!(!text.contains("detail"));
    Ok(())
}

#[test]
fn test_fault_detail_mapping() -> Result<()> {
    let f = fixture();
    let protocol = protocol(&f);
    let fault = Fault::new("Server", "quota")
        .with_actor("billing")
        .with_detail(helios_rpc_model::FaultDetail::Mapping(
            serde_json::json!({"limit": "10"}),
        ));

    let root = protocol.to_element(f.interface.fault_type(), Value::from(fault), tag("ignored"))?;
    assert_eq!(child(&root, "faultactor").text.as_deref(), Some("billing"));
    let detail = child(&root, "detail");
    assert_eq!(child(detail, "limit").text.as_deref(), Some("10"));

    let decoded = protocol.from_element(f.interface.fault_type(), &root)?;
    let Value::Fault(decoded) = decoded else {
        panic!("expected a fault");
    };
    assert_eq!(decoded.code, "Server");
    assert_eq!(decoded.actor.as_deref(), Some("billing"));
    assert!(decoded.ty.is_none());
    Ok(())
}

#[test]
fn test_fault_subtype_round_trip() -> Result<()> {
    let f = fixture();
    let protocol = protocol(&f);
    let fault = Fault::new("Server.Busy", "try later")
        .with_type(f.detailed_fault)
        .with_extra("retry_after", 30i64);
    let mut ctx = protocol.new_context();
    ctx.out_error = Some(fault.clone());

    let root = respond(&protocol, &mut ctx)?;
    assert_eq!(
        child(&root, "retry_after").name,
        QName::new(TNS, "retry_after")
    );

    let decoded = protocol.from_element(f.detailed_fault, &root)?;
    assert_eq!(decoded, Value::Fault(Box::new(fault)));
    Ok(())
}

#[test]
fn test_response_charset_override() -> Result<()> {
    let f = fixture();
    let protocol = protocol(&f);
    let mut ctx = protocol.new_context().with_method(echo(&f));
    ctx.out_object = vec![Value::from("café ☕")];

    protocol.serialize(&mut ctx, MessageDirection::Response)?;
    protocol.create_out_string(&mut ctx, Some("latin-1"))?;
    let bytes = ctx.response_bytes();
    assert!(bytes.starts_with(b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>"));
    assert!(bytes.windows(12).any(|w| w == b"caf\xE9 &#9749;"));
    Ok(())
}

/// Writes strings upper-cased and reads them back lower-cased.
struct Shouting;

impl SubProtocol for Shouting {
    fn subserialize(
        &self,
        _interface: &Interface,
        _ty: DescriptorId,
        value: Option<Value>,
        sink: &mut dyn WireSink,
        tag: &QName,
    ) -> Result<()> {
        let text = value
            .as_ref()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_uppercase();
        sink.append(Element::new(tag.clone()).with_text(text))
    }

    fn subdeserialize(
        &self,
        _interface: &Interface,
        _ty: DescriptorId,
        element: &Element,
    ) -> Result<Value> {
        Ok(Value::from(element.text.clone().unwrap_or_default().to_lowercase()))
    }
}

struct Delegated {
    interface: Arc<Interface>,
    message: DescriptorId,
}

const SHOUT: ProtocolHandle = ProtocolHandle(1);
const HEX: ProtocolHandle = ProtocolHandle(2);
const MISSING: ProtocolHandle = ProtocolHandle(3);

fn delegated() -> Delegated {
    let mut b = InterfaceBuilder::new(TNS);
    let string = b.primitive(PrimitiveKind::String);
    let shout = b
        .customize(string, |d| d.with_sub_protocol(SHOUT))
        .unwrap();
    let bytes = b.add(TypeDescriptor::new(
        QName::new(helios_rpc_model::XS_NS, "base64Binary"),
        helios_rpc_model::TypeKind::ByteArray,
    ));
    let hex = b.customize(bytes, |d| d.with_sub_protocol(HEX)).unwrap();
    let missing = b.customize(string, |d| d.with_sub_protocol(MISSING)).unwrap();
    let message = b
        .register(
            TypeDescriptor::complex(tag("Delegated"))
                .with_field("word", shout)
                .with_field("raw", bytes)
                .with_field("hex", hex)
                .with_field("lost", missing),
        )
        .unwrap();
    Delegated {
        interface: Arc::new(b.build().unwrap()),
        message,
    }
}

fn delegating_protocol(d: &Delegated) -> XmlDocument {
    let hex = XmlDocument::builder(d.interface.clone())
        .binary_encoding(BinaryEncoding::Hex)
        .build()
        .unwrap();
    XmlDocument::builder(d.interface.clone())
        .sub_protocol(SHOUT, Arc::new(Shouting))
        .sub_protocol(HEX, Arc::new(hex))
        .build()
        .unwrap()
}

#[test]
fn test_fields_delegate_to_sub_protocols() -> Result<()> {
    let d = delegated();
    let protocol = delegating_protocol(&d);
    let value = Value::Object(
        Object::new(d.message)
            .with("word", "hello")
            .with("raw", Value::Bytes(vec![0xAB, 0xCD]))
            .with("hex", Value::Bytes(vec![0xAB, 0xCD])),
    );

    let element = protocol.to_element(d.message, value.clone(), tag("Delegated"))?;
    assert_eq!(child(&element, "word").text.as_deref(), Some("HELLO"));
    assert_eq!(child(&element, "raw").text.as_deref(), Some("q80="));
    assert_eq!(child(&element, "hex").text.as_deref(), Some("abcd"));

    assert_eq!(protocol.from_element(d.message, &element)?, value);
    Ok(())
}

#[test]
fn test_unregistered_sub_protocol() {
    let d = delegated();
    let protocol = delegating_protocol(&d);
    let value = Value::Object(Object::new(d.message).with("lost", "x"));

    let err = protocol
        .to_element(d.message, value, tag("Delegated"))
        .unwrap_err();
    assert!(matches!(err, XmlError::UnregisteredProtocol(3)));
    assert_eq!(err.code(), "Server.UnregisteredType");

    let element = Element::new(tag("Delegated"))
        .with_child(Element::new(tag("lost")).with_text("x"));
    let err = protocol.from_element(d.message, &element).unwrap_err();
    assert!(matches!(err, XmlError::UnregisteredProtocol(3)));
}

#[test]
fn test_hit_counter_listener() -> Result<()> {
    let f = fixture();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let protocol = XmlDocument::builder(f.interface.clone())
        .listener(
            ProtocolEvent::AfterSerialize,
            Arc::new(move |_: ProtocolEvent, ctx: &CallContext| {
                assert!(ctx.out_document.is_some());
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .build()
        .unwrap();

    for _ in 0..3 {
        let mut ctx = protocol.new_context().with_method(echo(&f));
        ctx.out_object = vec![Value::from("hi")];
        protocol.serialize(&mut ctx, MessageDirection::Response)?;
    }
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    Ok(())
}
