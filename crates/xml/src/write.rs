//! Start tags, text and whole subtrees on a quick-xml [`Writer`].
//!
//! Shared by document egress and the streaming sink. Namespace prefixes are
//! resolved against a [`NamespaceScope`]; an element may name bindings to
//! declare on itself, and any namespace still unbound when its tag is written
//! gets a prefix from the hints (or a generated one) declared on the spot.

use std::io::Write;

use helios_rpc_model::{Element, NamespaceMap, QName, xsi_type};
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};

use crate::error::Result;
use crate::namespaces::NamespaceScope;

/// Opens a scope frame and builds the start tag of `element`. Returns the
/// tag and the qualified name for the matching end tag. The caller pops the
/// frame once the element is closed.
pub fn open_tag(
    scope: &mut NamespaceScope,
    element: &Element,
    declare: &NamespaceMap,
) -> (BytesStart<'static>, String) {
    scope.push();
    let mut declarations: Vec<(String, String)> = Vec::new();

    for (prefix, uri) in declare {
        let bound = scope.resolve(prefix).unwrap_or_default();
        if bound != uri.as_str() {
            scope.declare(prefix, uri);
            declarations.push((prefix.clone(), uri.clone()));
        }
    }

    let qualified = match element.name.namespace() {
        Some(uri) => {
            let (prefix, added) = scope.ensure(uri, true);
            if added {
                declarations.push((prefix.clone(), uri.to_string()));
            }
            join(&prefix, &element.name.local)
        }
        None => {
            if scope.resolve("").is_some() {
                scope.declare("", "");
                declarations.push((String::new(), String::new()));
            }
            element.name.local.clone()
        }
    };

    let xsi_type = xsi_type();
    let mut attributes: Vec<(String, &str)> = Vec::with_capacity(element.attributes.len());
    for (name, value) in &element.attributes {
        let key = match name.namespace() {
            Some(uri) => {
                let (prefix, added) = scope.ensure(uri, false);
                if added {
                    declarations.push((prefix.clone(), uri.to_string()));
                }
                join(&prefix, &name.local)
            }
            None => name.local.clone(),
        };
        if *name == xsi_type {
            if let Some((prefix, _)) = value.split_once(':') {
                if let Some(uri) = element.resolve_prefix(prefix) {
                    if scope.resolve(prefix) != Some(uri) {
                        scope.declare(prefix, uri);
                        declarations.push((prefix.to_string(), uri.to_string()));
                    }
                }
            }
        }
        attributes.push((key, value.as_str()));
    }

    let mut start = BytesStart::new(qualified.clone());
    for (prefix, uri) in &declarations {
        if prefix.is_empty() {
            start.push_attribute(("xmlns", uri.as_str()));
        } else {
            start.push_attribute((format!("xmlns:{}", prefix).as_str(), uri.as_str()));
        }
    }
    for (key, value) in &attributes {
        start.push_attribute((key.as_str(), *value));
    }
    (start, qualified)
}

fn join(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

/// Writes character data, as a CDATA section when the element asked for one
/// and the text can be represented that way.
pub fn write_text<W: Write>(writer: &mut Writer<W>, text: &str, cdata: bool) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    if cdata && !text.contains("]]>") {
        writer.write_event(Event::CData(BytesCData::new(text)))?;
    } else {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    Ok(())
}

/// Writes `element` and everything beneath it. With `honor_nsmap`, each
/// descendant declares whatever of its own bindings differ from the scope;
/// otherwise only `declare` (applied to `element`) is used and the rest is
/// resolved on demand.
pub fn write_tree<W: Write>(
    writer: &mut Writer<W>,
    scope: &mut NamespaceScope,
    element: &Element,
    declare: &NamespaceMap,
    honor_nsmap: bool,
) -> Result<()> {
    let (start, qualified) = open_tag(scope, element, declare);
    if element.is_empty() {
        writer.write_event(Event::Empty(start))?;
    } else {
        writer.write_event(Event::Start(start))?;
        if let Some(text) = &element.text {
            write_text(writer, text, element.cdata)?;
        }
        let none = NamespaceMap::new();
        for child in &element.children {
            let child_declare = if honor_nsmap { child.nsmap.as_ref() } else { &none };
            write_tree(writer, scope, child, child_declare, honor_nsmap)?;
            if let Some(tail) = &child.tail {
                write_text(writer, tail, false)?;
            }
        }
        writer.write_event(Event::End(BytesEnd::new(qualified)))?;
    }
    scope.pop();
    Ok(())
}

/// Every namespace used by the tree, bound once for declaration on the root.
///
/// Prefixes that an `xsi:type` value spells out are kept as written. Other
/// namespaces take the first prefix they were bound to in the tree, then the
/// hinted prefix, then a generated one.
pub fn hoist_namespaces(root: &Element, scope: &NamespaceScope) -> NamespaceMap {
    let mut used: Vec<String> = Vec::new();
    let mut forced: NamespaceMap = NamespaceMap::new();
    let mut seen_bindings: Vec<(String, String)> = Vec::new();
    collect_namespaces(root, &mut used, &mut forced, &mut seen_bindings);

    let mut hoisted = forced;
    let mut generated = 0usize;
    for uri in used {
        if hoisted.values().any(|bound| *bound == uri) {
            continue;
        }
        let taken = |prefix: &str, hoisted: &NamespaceMap| hoisted.contains_key(prefix);
        let from_tree = seen_bindings
            .iter()
            .find(|(prefix, bound)| *bound == uri && !prefix.is_empty() && !taken(prefix.as_str(), &hoisted))
            .map(|(prefix, _)| prefix.clone());
        let prefix = from_tree
            .or_else(|| {
                scope
                    .hints()
                    .get(&uri)
                    .filter(|hint| !hint.is_empty() && !taken(hint.as_str(), &hoisted))
                    .cloned()
            })
            .unwrap_or_else(|| loop {
                let candidate = format!("ns{}", generated);
                generated += 1;
                if !taken(&candidate, &hoisted) {
                    break candidate;
                }
            });
        hoisted.insert(prefix, uri);
    }
    hoisted
}

fn collect_namespaces(
    element: &Element,
    used: &mut Vec<String>,
    forced: &mut NamespaceMap,
    seen_bindings: &mut Vec<(String, String)>,
) {
    for binding in element.nsmap.iter() {
        if !seen_bindings.iter().any(|(p, u)| p == binding.0 && u == binding.1) {
            seen_bindings.push((binding.0.clone(), binding.1.clone()));
        }
    }
    let mut note = |uri: &str| {
        if !used.iter().any(|u| u == uri) {
            used.push(uri.to_string());
        }
    };
    if let Some(uri) = element.name.namespace() {
        note(uri);
    }
    let xsi_type = xsi_type();
    for (name, value) in &element.attributes {
        if let Some(uri) = name.namespace() {
            note(uri);
        }
        if *name == xsi_type {
            if let Some((prefix, _)) = value.split_once(':') {
                if let Some(uri) = element.resolve_prefix(prefix) {
                    forced
                        .entry(prefix.to_string())
                        .or_insert_with(|| uri.to_string());
                }
            }
        }
    }
    for child in &element.children {
        collect_namespaces(child, used, forced, seen_bindings);
    }
}

/// Resolves a `prefix:local` attribute value (such as `xsi:type`) against
/// the bindings in scope on `element`.
pub fn resolve_qname_value(element: &Element, value: &str) -> Option<QName> {
    match value.split_once(':') {
        Some((prefix, local)) => element
            .resolve_prefix(prefix)
            .map(|uri| QName::new(uri, local)),
        None => Some(QName::qualified(
            element.resolve_prefix("").filter(|uri| !uri.is_empty()),
            value,
        )),
    }
}
