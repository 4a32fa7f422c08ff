//! Output sinks the encoder writes into.
//!
//! Tree and streaming output share one interface. Calls always nest: every
//! [`WireSink::open`] is matched by exactly one [`WireSink::close`], and
//! attribute/text calls apply to the innermost open element.

use helios_rpc_model::{Element, QName};

use crate::error::Result;

pub trait WireSink {
    /// Opens `element` as a child of the current element. Its attributes and
    /// text may still be amended until content is written beneath it.
    fn open(&mut self, element: Element) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Writes a complete subtree as a child of the current element.
    fn append(&mut self, element: Element) -> Result<()>;

    fn set_attribute(&mut self, name: QName, value: String) -> Result<()>;

    fn set_text(&mut self, text: String) -> Result<()>;

    /// Sets an attribute on already-written children of the current element
    /// named `owner`: the `position`-th match, or every match when `None`.
    fn fold_attribute(
        &mut self,
        owner: &QName,
        position: Option<usize>,
        name: &QName,
        value: String,
    ) -> Result<()>;

    fn is_streaming(&self) -> bool {
        false
    }
}

/// Builds an in-memory tree under a placeholder root.
#[derive(Debug, Clone)]
pub struct TreeSink {
    root: Element,
    path: Vec<usize>,
}

impl Default for TreeSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeSink {
    pub fn new() -> Self {
        Self::with_parent(Element::new("punk"))
    }

    /// Writes beneath an existing element.
    pub fn with_parent(parent: Element) -> Self {
        Self {
            root: parent,
            path: Vec::new(),
        }
    }

    fn current(&mut self) -> &mut Element {
        let mut element = &mut self.root;
        for index in &self.path {
            element = &mut element.children[*index];
        }
        element
    }

    /// Depth of currently open elements below the root.
    pub fn open_depth(&self) -> usize {
        self.path.len()
    }

    pub fn into_root(self) -> Element {
        self.root
    }

    pub fn into_children(self) -> Vec<Element> {
        self.root.children
    }

    /// The first element written, which is the document body.
    pub fn into_first(self) -> Option<Element> {
        self.root.children.into_iter().next()
    }
}

impl WireSink for TreeSink {
    fn open(&mut self, element: Element) -> Result<()> {
        let current = self.current();
        current.children.push(element);
        let index = current.children.len() - 1;
        self.path.push(index);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.path.pop();
        Ok(())
    }

    fn append(&mut self, element: Element) -> Result<()> {
        self.current().children.push(element);
        Ok(())
    }

    fn set_attribute(&mut self, name: QName, value: String) -> Result<()> {
        self.current().set_attribute(name, value);
        Ok(())
    }

    fn set_text(&mut self, text: String) -> Result<()> {
        let current = self.current();
        match current.children.last_mut() {
            Some(last) => last.tail = Some(text),
            None => current.text = Some(text),
        }
        Ok(())
    }

    fn fold_attribute(
        &mut self,
        owner: &QName,
        position: Option<usize>,
        name: &QName,
        value: String,
    ) -> Result<()> {
        let mut owners = self
            .current()
            .children
            .iter_mut()
            .filter(|child| child.name == *owner);
        match position {
            Some(index) => {
                if let Some(target) = owners.nth(index) {
                    target.set_attribute(name.clone(), value);
                }
            }
            None => {
                for target in owners {
                    target.set_attribute(name.clone(), value.clone());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_open_close() {
        let mut sink = TreeSink::new();
        sink.open(Element::new("a")).unwrap();
        sink.set_attribute(QName::unqualified("x"), "1".into()).unwrap();
        sink.append(Element::new("b").with_text("t")).unwrap();
        sink.open(Element::new("c")).unwrap();
        sink.set_text("inner".into()).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
        assert_eq!(sink.open_depth(), 0);

        let a = sink.into_first().unwrap();
        assert_eq!(a.attribute(&QName::unqualified("x")), Some("1"));
        assert_eq!(a.children.len(), 2);
        assert_eq!(a.children[1].text.as_deref(), Some("inner"));
    }

    #[test]
    fn test_fold_attribute_by_position_and_broadcast() {
        let mut sink = TreeSink::new();
        sink.open(Element::new("list")).unwrap();
        for _ in 0..3 {
            sink.append(Element::new("item")).unwrap();
        }
        sink.append(Element::new("other")).unwrap();
        let item = QName::unqualified("item");
        let id = QName::unqualified("id");
        let lang = QName::unqualified("lang");
        sink.fold_attribute(&item, Some(1), &id, "b".into()).unwrap();
        sink.fold_attribute(&item, None, &lang, "en".into()).unwrap();
        sink.close().unwrap();

        let list = sink.into_first().unwrap();
        assert_eq!(list.children[0].attribute(&id), None);
        assert_eq!(list.children[1].attribute(&id), Some("b"));
        assert!(list.children[..3].iter().all(|c| c.attribute(&lang) == Some("en")));
        assert_eq!(list.children[3].attribute(&lang), None);
    }
}
