//! Prefix bookkeeping for the writers.

use std::collections::BTreeMap;

use helios_rpc_model::{NamespaceMap, SOAP_ENV_NS, XML_NS, XS_NS, XSI_NS};

/// Prefix conventionally bound to the SOAP 1.1 envelope namespace.
pub const SOAP_ENV_PREFIX: &str = "soap11env";

/// Namespace → preferred prefix, with the fixed bindings filled in.
pub fn default_hints(interface_hints: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut hints = interface_hints.clone();
    hints
        .entry(XSI_NS.to_string())
        .or_insert_with(|| "xsi".to_string());
    hints
        .entry(XS_NS.to_string())
        .or_insert_with(|| "xs".to_string());
    hints
        .entry(SOAP_ENV_NS.to_string())
        .or_insert_with(|| SOAP_ENV_PREFIX.to_string());
    hints
}

/// Nested namespace declarations of the elements currently open in a writer.
///
/// An empty URI undeclares the default namespace (`xmlns=""`).
#[derive(Debug)]
pub struct NamespaceScope {
    frames: Vec<Vec<(String, String)>>,
    hints: BTreeMap<String, String>,
    generated: usize,
}

impl NamespaceScope {
    pub fn new(interface_hints: &BTreeMap<String, String>) -> Self {
        Self {
            frames: Vec::new(),
            hints: default_hints(interface_hints),
            generated: 0,
        }
    }

    pub fn hints(&self) -> &BTreeMap<String, String> {
        &self.hints
    }

    /// Every hinted binding, as declarations for a root element.
    pub fn hint_bindings(&self) -> NamespaceMap {
        self.hints
            .iter()
            .map(|(uri, prefix)| (prefix.clone(), uri.clone()))
            .collect()
    }

    pub fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Declares a binding on the innermost open element.
    pub fn declare(&mut self, prefix: &str, uri: &str) {
        if self.frames.is_empty() {
            self.frames.push(Vec::new());
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.push((prefix.to_string(), uri.to_string()));
        }
    }

    /// The URI a prefix is bound to, innermost declaration first.
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    /// A prefix currently bound to `uri`. The default namespace only
    /// qualifies when `allow_default` is set (attributes never use it).
    pub fn prefix_for(&self, uri: &str, allow_default: bool) -> Option<String> {
        if uri == XML_NS {
            return Some("xml".to_string());
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .filter(|(p, u)| u == uri && (allow_default || !p.is_empty()))
            .find(|(p, _)| self.resolve(p) == Some(uri))
            .map(|(p, _)| p.clone())
    }

    /// A prefix bound to `uri`, declaring a fresh one when none is in
    /// scope. The second value reports whether a declaration was added.
    pub fn ensure(&mut self, uri: &str, allow_default: bool) -> (String, bool) {
        if let Some(prefix) = self.prefix_for(uri, allow_default) {
            return (prefix, false);
        }
        let prefix = self.fresh_prefix(uri);
        self.declare(&prefix, uri);
        (prefix, true)
    }

    fn fresh_prefix(&mut self, uri: &str) -> String {
        if let Some(hint) = self.hints.get(uri) {
            if !hint.is_empty() && self.resolve(hint).is_none() {
                return hint.clone();
            }
        }
        loop {
            let candidate = format!("ns{}", self.generated);
            self.generated += 1;
            if self.resolve(&candidate).is_none() {
                return candidate;
            }
        }
    }
}
