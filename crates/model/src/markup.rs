//! An owned, parsed XML element tree.
//!
//! Text follows the element/tail split: `text` is the character data before
//! the first child, and each child's `tail` is the character data after it.
//! Every element carries the namespace bindings in scope at that point, so a
//! QName-valued attribute (such as `xsi:type`) can be resolved without walking
//! back up the tree.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::qname::{QName, XML_NS};

/// Prefix → namespace bindings. The default namespace uses the empty prefix.
pub type NamespaceMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<(QName, String)>,
    pub children: Vec<Element>,
    pub text: Option<String>,
    pub tail: Option<String>,
    /// Text came from a CDATA section and was not normalized.
    pub cdata: bool,
    pub nsmap: Arc<NamespaceMap>,
}

impl Element {
    pub fn new(name: impl Into<QName>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<QName>, value: impl Into<String>) -> Self {
        self.set_attribute(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Adds a namespace binding to this element's scope.
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.nsmap).insert(prefix.into(), uri.into());
        self
    }

    pub fn attribute(&self, name: &QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, replacing an existing value in place.
    pub fn set_attribute(&mut self, name: QName, value: String) {
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn find(&self, name: &QName) -> Option<&Element> {
        self.children.iter().find(|c| c.name == *name)
    }

    /// First child with the given local name, in any namespace.
    pub fn find_local(&self, local: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name.local == local)
    }

    pub fn find_all<'a, 'n>(&'a self, name: &'n QName) -> impl Iterator<Item = &'a Element> + 'n
    where
        'a: 'n,
    {
        self.children.iter().filter(move |c| c.name == *name)
    }

    /// Resolves a prefix against the bindings in scope on this element.
    pub fn resolve_prefix(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        self.nsmap.get(prefix).map(String::as_str)
    }

    /// Concatenated character data of this element and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
            if let Some(tail) = &child.tail {
                out.push_str(tail);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.text.as_deref().is_none_or(str::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_attribute_replaces() {
        let mut el = Element::new("a").with_attribute("x", "1");
        el.set_attribute(QName::unqualified("x"), "2".into());
        assert_eq!(el.attributes.len(), 1);
        assert_eq!(el.attribute(&QName::unqualified("x")), Some("2"));
    }

    #[test]
    fn test_text_content_includes_tails() {
        let mut b = Element::new("b").with_text("bold");
        b.tail = Some(" tail".into());
        let p = Element::new("p").with_text("lead ").with_child(b);
        assert_eq!(p.text_content(), "lead bold tail");
    }

    #[test]
    fn test_resolve_prefix() {
        let el = Element::new("a").with_namespace("t", "urn:t");
        assert_eq!(el.resolve_prefix("t"), Some("urn:t"));
        assert_eq!(el.resolve_prefix("xml"), Some(XML_NS));
        assert_eq!(el.resolve_prefix("u"), None);
    }
}
