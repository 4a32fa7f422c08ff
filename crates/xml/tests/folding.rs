//! Attributes that live on a sibling element rather than on their owner.

mod common;

use common::{SharedBuffer, bare_output, child, fixture, protocol, tag};
use helios_rpc_model::{Element, Object, QName, Value};
use helios_rpc_xml::{EncodeOutcome, Result, StreamSink};

fn catalog_value(f: &common::Fixture, langs: Vec<Value>) -> Value {
    Value::Object(
        Object::new(f.catalog)
            .with("id", "c1")
            .with("title", "Tools")
            .with("title_lang", "en")
            .with("item", vec![Value::from("saw"), Value::from("drill"), Value::from("file")])
            .with("lang", langs),
    )
}

fn attr<'a>(element: &'a Element, name: &str) -> Option<&'a str> {
    element.attribute(&QName::unqualified(name))
}

#[test]
fn test_positional_folding_onto_repeated_sibling() -> Result<()> {
    let f = fixture();
    let protocol = protocol(&f);
    let value = catalog_value(&f, vec!["de".into(), Value::Null, "fr".into()]);

    let element = protocol.to_element(f.catalog, value, tag("Catalog"))?;
    assert_eq!(attr(&element, "id"), Some("c1"));
    assert_eq!(attr(&element, "lang"), None);
    assert_eq!(attr(&element, "title_lang"), None);

    let items: Vec<_> = element.find_all(&tag("item")).collect();
    assert_eq!(items.len(), 3);
    assert_eq!(attr(items[0], "lang"), Some("de"));
    assert_eq!(attr(items[1], "lang"), None);
    assert_eq!(attr(items[2], "lang"), Some("fr"));
    Ok(())
}

#[test]
fn test_single_value_folds_onto_single_sibling() -> Result<()> {
    let f = fixture();
    let protocol = protocol(&f);
    let value = catalog_value(&f, vec![]);

    let element = protocol.to_element(f.catalog, value, tag("Catalog"))?;
    let title = child(&element, "title");
    assert_eq!(title.text.as_deref(), Some("Tools"));
    assert_eq!(attr(title, "title_lang"), Some("en"));
    Ok(())
}

#[test]
fn test_folded_attributes_are_rebound_on_decode() -> Result<()> {
    let f = fixture();
    let protocol = protocol(&f);
    let value = catalog_value(&f, vec!["de".into(), "it".into(), "fr".into()]);

    let element = protocol.to_element(f.catalog, value.clone(), tag("Catalog"))?;
    let decoded = protocol.from_element(f.catalog, &element)?;
    assert_eq!(decoded, value);

    let object = decoded.as_object().unwrap();
    assert_eq!(object.get("title_lang"), Some(&Value::from("en")));
    assert_eq!(
        object.get("lang"),
        Some(&Value::Sequence(vec!["de".into(), "it".into(), "fr".into()]))
    );
    Ok(())
}

#[test]
fn test_streaming_output_skips_folding() -> Result<()> {
    let f = fixture();
    let protocol = protocol(&f);
    let ctx = protocol.new_context();
    let value = catalog_value(&f, vec!["de".into(), "it".into(), "fr".into()]);

    let buffer = SharedBuffer::default();
    let mut sink = StreamSink::new(buffer.clone(), &bare_output(), protocol.hints())?;
    let outcome = protocol.encode(&ctx, f.catalog, Some(value), &mut sink, tag("Catalog"))?;
    assert!(matches!(outcome, EncodeOutcome::Done));
    sink.finish()?;

    let text = buffer.text();
    assert!(text.contains("id=\"c1\""));
    assert!(text.contains("<tns:title>Tools</tns:title>"));
    assert!(!text.contains("lang="));
    Ok(())
}
