//! Generic mappings as child elements.
//!
//! Each key becomes a child element; arrays repeat the key; nested objects
//! nest. Reading back collects repeated children into arrays and leaves
//! element text as strings.

use helios_rpc_model::Element;
use serde_json::{Map, Value as Json};

/// Appends the entries of `mapping` as children of `parent`.
pub fn dict_to_children(mapping: &Map<String, Json>, parent: &mut Element) {
    for (key, value) in mapping {
        match value {
            Json::Array(items) => {
                for item in items {
                    parent.children.push(entry(key, item));
                }
            }
            other => parent.children.push(entry(key, other)),
        }
    }
}

fn entry(key: &str, value: &Json) -> Element {
    let mut element = Element::new(key);
    match value {
        Json::Null => {}
        Json::String(s) => element.text = Some(s.clone()),
        Json::Bool(_) | Json::Number(_) => element.text = Some(value.to_string()),
        Json::Object(mapping) => dict_to_children(mapping, &mut element),
        Json::Array(items) => {
            for item in items {
                element.children.push(entry("item", item));
            }
        }
    }
    element
}

/// The mapping held by the children of `element`.
pub fn children_to_dict(element: &Element) -> Map<String, Json> {
    let mut mapping = Map::new();
    for child in &element.children {
        let value = if child.children.is_empty() {
            child.text.clone().map(Json::String).unwrap_or(Json::Null)
        } else {
            Json::Object(children_to_dict(child))
        };
        let key = child.name.local.clone();
        match mapping.get_mut(&key) {
            Some(Json::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Json::Array(vec![first, value]);
            }
            None => {
                mapping.insert(key, value);
            }
        }
    }
    mapping
}
