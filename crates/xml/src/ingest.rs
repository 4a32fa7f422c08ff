//! Parsing untrusted bytes into a [`Document`].
//!
//! The reader is driven by a [`ParserConfig`]. With the defaults nothing
//! outside the document is ever read: only predefined and character
//! references are expanded, DTDs are not loaded, comments are dropped and
//! depth and text size are bounded. Every failure is an
//! [`XmlError::Syntax`].

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};

use helios_rpc_model::{Element, NamespaceMap, QName};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use tracing::{trace, warn};

use crate::config::{MAX_TEXT_LENGTH, ParserConfig, canonical_encoding};
use crate::error::{Result, XmlError};

/// Nested custom entity expansion stops here.
const MAX_ENTITY_NESTING: usize = 8;

static ENTITY_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<!ENTITY\s+([A-Za-z_][\w.\-]*)\s+(?:"([^"]*)"|'([^']*)'|(SYSTEM|PUBLIC)\b[^>]*)\s*>"#,
    )
    .expect("entity declaration pattern is valid")
});

static ELEMENT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!ELEMENT\s+([^\s>]+)")
        .expect("element declaration pattern is valid")
});

static ENCODING_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^<\?xml[^>]*?\bencoding\s*=\s*["']([A-Za-z0-9._\-]+)["']"#)
        .expect("encoding declaration pattern is valid")
});

/// A parsed document: the root element plus what sits around it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub root: Element,
    /// Top-level processing instructions (`target data`), when kept.
    pub processing_instructions: Vec<String>,
    pub doctype: Option<Doctype>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Doctype {
    pub root_name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    /// Internal general entities, name to replacement text.
    pub entities: BTreeMap<String, String>,
    /// Entities declared with an external identifier. Never fetched.
    pub external_entities: BTreeSet<String>,
    pub elements: BTreeSet<String>,
}

impl Doctype {
    fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let name_end = raw
            .find(|c: char| c.is_whitespace() || c == '[')
            .unwrap_or(raw.len());
        let root_name = raw[..name_end].to_string();
        if root_name.is_empty() {
            return Err(XmlError::Syntax("DOCTYPE without a root name".to_string()));
        }
        let mut doctype = Doctype {
            root_name,
            ..Default::default()
        };

        let mut rest = raw[name_end..].trim_start();
        if let Some(after) = rest.strip_prefix("SYSTEM") {
            let (system, remaining) = quoted(after)?;
            doctype.system_id = Some(system);
            rest = remaining;
        } else if let Some(after) = rest.strip_prefix("PUBLIC") {
            let (public, remaining) = quoted(after)?;
            let (system, remaining) = quoted(remaining)?;
            doctype.public_id = Some(public);
            doctype.system_id = Some(system);
            rest = remaining;
        }

        if let (Some(open), Some(close)) = (rest.find('['), rest.rfind(']')) {
            if open < close {
                doctype.add_declarations(&rest[open + 1..close]);
            }
        }
        Ok(doctype)
    }

    fn add_declarations(&mut self, subset: &str) {
        for caps in ENTITY_DECL.captures_iter(subset) {
            let name = caps[1].to_string();
            if caps.get(4).is_some() {
                self.external_entities.insert(name);
                continue;
            }
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            self.entities.entry(name).or_insert(value);
        }
        for caps in ELEMENT_DECL.captures_iter(subset) {
            self.elements.insert(caps[1].to_string());
        }
    }

    fn is_remote(&self) -> bool {
        self.system_id
            .as_deref()
            .is_some_and(|id| id.contains("://") && !id.starts_with("file://"))
    }
}

fn quoted(input: &str) -> Result<(String, &str)> {
    let input = input.trim_start();
    let quote = input
        .chars()
        .next()
        .filter(|c| *c == '"' || *c == '\'')
        .ok_or_else(|| XmlError::Syntax("expected a quoted DOCTYPE identifier".to_string()))?;
    let body = &input[1..];
    let end = body
        .find(quote)
        .ok_or_else(|| XmlError::Syntax("unterminated DOCTYPE identifier".to_string()))?;
    Ok((body[..end].to_string(), body[end + 1..].trim_start()))
}

/// Which references may be expanded.
struct EntityPolicy<'d> {
    resolve_custom: bool,
    doctype: Option<&'d Doctype>,
}

impl EntityPolicy<'_> {
    fn resolve(&self, name: &str, nesting: usize) -> Result<Cow<'static, str>> {
        if let Some(number) = name.strip_prefix('#') {
            let code = match number.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16),
                None => number.parse::<u32>(),
            }
            .map_err(|_| XmlError::Syntax(format!("invalid character reference '&{};'", name)))?;
            return char::from_u32(code)
                .filter(|c| *c != '\0')
                .map(|c| Cow::Owned(c.to_string()))
                .ok_or_else(|| {
                    XmlError::Syntax(format!("character reference '&{};' is not a character", name))
                });
        }
        match name {
            "lt" => return Ok(Cow::Borrowed("<")),
            "gt" => return Ok(Cow::Borrowed(">")),
            "amp" => return Ok(Cow::Borrowed("&")),
            "apos" => return Ok(Cow::Borrowed("'")),
            "quot" => return Ok(Cow::Borrowed("\"")),
            _ => {}
        }
        let Some(doctype) = self.doctype else {
            return Err(XmlError::Syntax(format!("undefined entity '&{};'", name)));
        };
        if doctype.external_entities.contains(name) {
            return Err(XmlError::Syntax(format!(
                "external entity '&{};' is never resolved",
                name
            )));
        }
        let Some(value) = doctype.entities.get(name) else {
            return Err(XmlError::Syntax(format!("undefined entity '&{};'", name)));
        };
        if !self.resolve_custom {
            return Err(XmlError::Syntax(format!(
                "entity '&{};' is not expanded by this parser",
                name
            )));
        }
        if nesting >= MAX_ENTITY_NESTING {
            return Err(XmlError::Syntax(format!(
                "entity '&{};' nests too deeply",
                name
            )));
        }
        Ok(Cow::Owned(self.unescape(value, nesting + 1)?))
    }

    fn unescape(&self, raw: &str, nesting: usize) -> Result<String> {
        if !raw.contains('&') {
            return Ok(raw.to_string());
        }
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(pos) = rest.find('&') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let end = after
                .find(';')
                .ok_or_else(|| XmlError::Syntax("unterminated entity reference".to_string()))?;
            out.push_str(&self.resolve(&after[..end], nesting)?);
            if out.len() > MAX_TEXT_LENGTH {
                return Err(syntax("entity expansion exceeds the text size limit"));
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Attribute values: whitespace characters are normalized to spaces
    /// before references are expanded.
    fn attribute_value(&self, raw: &str) -> Result<String> {
        let normalized: String = raw
            .chars()
            .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
            .collect();
        self.unescape(&normalized, 0)
    }
}

fn syntax(message: impl Into<String>) -> XmlError {
    XmlError::Syntax(message.into())
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| syntax(e.to_string()))
}

/// Decodes the input bytes according to the byte-order mark or the
/// encoding named in the XML declaration.
fn decode_input(bytes: &[u8]) -> Result<Cow<'_, str>> {
    if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
        return Err(syntax("UTF-16 documents are not supported"));
    }
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let declared = ENCODING_DECL
        .captures(&head)
        .map(|caps| caps[1].to_string());

    match declared.as_deref().map(|label| (label, canonical_encoding(label))) {
        None | Some((_, Some("UTF-8"))) => Ok(Cow::Borrowed(utf8(bytes)?)),
        Some((_, Some("US-ASCII"))) => {
            if bytes.is_ascii() {
                Ok(Cow::Borrowed(utf8(bytes)?))
            } else {
                Err(syntax("non-ASCII byte in a US-ASCII document"))
            }
        }
        Some((_, Some(_))) => Ok(Cow::Owned(bytes.iter().map(|b| char::from(*b)).collect())),
        Some((label, None)) => Err(syntax(format!("unsupported document encoding '{}'", label))),
    }
}

/// Parses a document from the concatenation of `fragments`.
pub fn parse_fragments<I, B>(fragments: I, config: &ParserConfig) -> Result<Document>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut bytes = Vec::new();
    for fragment in fragments {
        bytes.extend_from_slice(fragment.as_ref());
    }
    parse_document(&bytes, config)
}

pub fn parse_document(bytes: &[u8], config: &ParserConfig) -> Result<Document> {
    let text = decode_input(bytes)?;
    TreeBuilder::new(config).run(&text)
}

/// Parses markup that may have several top-level nodes. Returns a synthetic
/// `fragment` element holding them.
pub fn parse_fragment(markup: &str) -> Result<Element> {
    let wrapped = format!("<fragment>{}</fragment>", markup);
    let config = ParserConfig {
        strip_blank_text: false,
        ..Default::default()
    };
    Ok(TreeBuilder::new(&config).run(&wrapped)?.root)
}

struct TreeBuilder<'c> {
    config: &'c ParserConfig,
    stack: Vec<Element>,
    root: Option<Element>,
    processing_instructions: Vec<String>,
    doctype: Option<Doctype>,
}

impl<'c> TreeBuilder<'c> {
    fn new(config: &'c ParserConfig) -> Self {
        Self {
            config,
            stack: Vec::new(),
            root: None,
            processing_instructions: Vec::new(),
            doctype: None,
        }
    }

    fn policy(&self) -> EntityPolicy<'_> {
        EntityPolicy {
            resolve_custom: self.config.resolve_entities,
            doctype: self.doctype.as_ref(),
        }
    }

    fn run(mut self, text: &str) -> Result<Document> {
        let mut reader = Reader::from_str(text);
        {
            let reader_config = reader.config_mut();
            reader_config.trim_text(false);
            reader_config.expand_empty_elements = true;
            reader_config.check_end_names = !self.config.recover_from_errors;
            reader_config.allow_unmatched_ends = self.config.recover_from_errors;
        }

        loop {
            let event = reader.read_event().map_err(|e| {
                syntax(format!("{} at byte {}", e, reader.error_position()))
            })?;
            match event {
                Event::Decl(_) => {}
                Event::DocType(raw) => self.read_doctype(utf8(&raw)?)?,
                Event::Start(start) => self.start(&start)?,
                Event::Empty(start) => {
                    self.start(&start)?;
                    self.end()?;
                }
                Event::End(_) => self.end()?,
                Event::Text(raw) => {
                    let text = self.policy().unescape(utf8(&raw)?, 0)?;
                    self.text(&text, false)?;
                }
                Event::GeneralRef(reference) => {
                    let resolved = self.policy().resolve(utf8(&reference)?, 0)?;
                    self.text(&resolved, false)?;
                }
                Event::CData(raw) => {
                    let text = utf8(&raw)?.to_string();
                    self.text(&text, !self.config.normalize_cdata)?;
                }
                Event::Comment(_) => {}
                Event::PI(raw) => {
                    if self.stack.is_empty() && !self.config.strip_processing_instructions {
                        self.processing_instructions.push(utf8(&raw)?.to_string());
                    }
                }
                Event::Eof => break,
            }
        }

        if !self.stack.is_empty() {
            if !self.config.recover_from_errors {
                return Err(syntax("document ended inside an element"));
            }
            warn!(open = self.stack.len(), "closing unterminated elements");
            while !self.stack.is_empty() {
                self.end()?;
            }
        }

        let root = self
            .root
            .take()
            .ok_or_else(|| syntax("document has no root element"))?;
        if self.config.validate_dtd {
            self.check_dtd(&root)?;
        }
        Ok(Document {
            root,
            processing_instructions: self.processing_instructions,
            doctype: self.doctype,
        })
    }

    fn read_doctype(&mut self, raw: &str) -> Result<()> {
        let mut doctype = Doctype::parse(raw)?;
        if let Some(system_id) = doctype.system_id.clone() {
            if !self.config.load_external_dtd {
                trace!(system_id = %system_id, "external DTD not loaded");
            } else if doctype.is_remote() {
                if !self.config.allow_network_access {
                    return Err(syntax(format!("remote DTD '{}' refused", system_id)));
                }
                warn!(system_id = %system_id, "remote DTD is never fetched");
            } else {
                let path = system_id.strip_prefix("file://").unwrap_or(&system_id);
                let subset = std::fs::read_to_string(path)
                    .map_err(|e| syntax(format!("cannot load DTD '{}': {}", system_id, e)))?;
                doctype.add_declarations(&subset);
            }
        }
        self.doctype = Some(doctype);
        Ok(())
    }

    fn start(&mut self, start: &BytesStart<'_>) -> Result<()> {
        if self.root.is_some() {
            return Err(syntax("content after the document element"));
        }
        if let Some(limit) = self.config.max_depth() {
            if self.stack.len() >= limit {
                return Err(syntax(format!("elements nest deeper than {}", limit)));
            }
        }
        let parent_nsmap = self
            .stack
            .last()
            .map(|parent| parent.nsmap.clone())
            .unwrap_or_default();

        let policy = self.policy();
        let mut declarations: Vec<(String, String)> = Vec::new();
        let mut raw_attributes: Vec<(String, String)> = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| syntax(e.to_string()))?;
            let key = utf8(attribute.key.as_ref())?;
            let value = policy.attribute_value(utf8(&attribute.value)?)?;
            if key == "xmlns" {
                declarations.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                if value.is_empty() {
                    return Err(syntax(format!("prefix '{}' cannot be undeclared", prefix)));
                }
                declarations.push((prefix.to_string(), value));
            } else {
                raw_attributes.push((key.to_string(), value));
            }
        }

        let nsmap = if declarations.is_empty() {
            parent_nsmap
        } else {
            let mut scope: NamespaceMap = parent_nsmap.as_ref().clone();
            for (prefix, uri) in declarations {
                if prefix.is_empty() && uri.is_empty() {
                    scope.remove("");
                } else {
                    scope.insert(prefix, uri);
                }
            }
            Arc::new(scope)
        };

        let name = resolve_name(utf8(start.name().as_ref())?, &nsmap, true)?;
        let mut attributes: Vec<(QName, String)> = Vec::with_capacity(raw_attributes.len());
        for (key, value) in raw_attributes {
            let name = resolve_name(&key, &nsmap, false)?;
            if attributes.iter().any(|(existing, _)| *existing == name) {
                return Err(syntax(format!("duplicate attribute '{}'", name)));
            }
            attributes.push((name, value));
        }

        self.stack.push(Element {
            name,
            attributes,
            nsmap,
            ..Default::default()
        });
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        let Some(mut element) = self.stack.pop() else {
            // Only reachable when unmatched end tags are allowed.
            return Ok(());
        };
        if self.config.strip_blank_text && !element.children.is_empty() {
            if element.text.as_deref().is_some_and(is_blank) {
                element.text = None;
            }
            for child in &mut element.children {
                if child.tail.as_deref().is_some_and(is_blank) {
                    child.tail = None;
                }
            }
        }
        if self.config.compact_text_storage {
            if let Some(text) = element.text.as_mut() {
                text.shrink_to_fit();
            }
            element.children.shrink_to_fit();
            element.attributes.shrink_to_fit();
        }
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None => self.root = Some(element),
        }
        Ok(())
    }

    fn text(&mut self, text: &str, cdata: bool) -> Result<()> {
        let Some(current) = self.stack.last_mut() else {
            if is_blank(text) {
                return Ok(());
            }
            return Err(syntax("text outside the document element"));
        };
        let slot = match current.children.last_mut() {
            Some(child) => &mut child.tail,
            None => {
                current.cdata |= cdata;
                &mut current.text
            }
        };
        let buffer = slot.get_or_insert_with(String::new);
        buffer.push_str(text);
        if let Some(limit) = self.config.max_text_length() {
            if buffer.len() > limit {
                return Err(syntax(format!("text node larger than {} bytes", limit)));
            }
        }
        Ok(())
    }

    fn check_dtd(&self, root: &Element) -> Result<()> {
        let doctype = self
            .doctype
            .as_ref()
            .ok_or_else(|| syntax("no DTD to validate against"))?;
        let qualified = match root.name.namespace() {
            Some(uri) => root
                .nsmap
                .iter()
                .find(|(prefix, bound)| *bound == uri && !prefix.is_empty())
                .map(|(prefix, _)| format!("{}:{}", prefix, root.name.local))
                .unwrap_or_else(|| root.name.local.clone()),
            None => root.name.local.clone(),
        };
        if doctype.root_name != qualified && doctype.root_name != root.name.local {
            return Err(syntax(format!(
                "root element '{}' does not match DOCTYPE '{}'",
                qualified, doctype.root_name
            )));
        }
        if !doctype.elements.is_empty() {
            check_declared(root, &doctype.elements)?;
        }
        Ok(())
    }
}

fn check_declared(element: &Element, declared: &BTreeSet<String>) -> Result<()> {
    if !declared.contains(&element.name.local)
        && !declared
            .iter()
            .any(|name| name.rsplit(':').next() == Some(element.name.local.as_str()))
    {
        return Err(syntax(format!(
            "element '{}' is not declared in the DTD",
            element.name.local
        )));
    }
    for child in &element.children {
        check_declared(child, declared)?;
    }
    Ok(())
}

fn is_blank(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

fn resolve_name(raw: &str, nsmap: &NamespaceMap, use_default: bool) -> Result<QName> {
    match raw.split_once(':') {
        Some((prefix, local)) => {
            let uri = if prefix == "xml" {
                Some(helios_rpc_model::XML_NS)
            } else {
                nsmap.get(prefix).map(String::as_str)
            };
            uri.map(|uri| QName::new(uri, local))
                .ok_or_else(|| syntax(format!("undeclared namespace prefix '{}'", prefix)))
        }
        None if use_default => Ok(QName::qualified(
            nsmap.get("").map(String::as_str),
            raw,
        )),
        None => Ok(QName::unqualified(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Result<Document> {
        parse_document(xml.as_bytes(), &ParserConfig::default())
    }

    #[test]
    fn test_namespaces_and_attributes() {
        let doc = parse(
            r#"<?xml version="1.0"?>
            <t:root xmlns:t="urn:t" xmlns="urn:d" a="1" t:b="2">
                <child>x &amp; y &#x41;</child>
            </t:root>"#,
        )
        .unwrap();
        assert_eq!(doc.root.name, QName::new("urn:t", "root"));
        assert_eq!(doc.root.attribute(&QName::unqualified("a")), Some("1"));
        assert_eq!(doc.root.attribute(&QName::new("urn:t", "b")), Some("2"));
        assert_eq!(doc.root.text, None);
        let child = &doc.root.children[0];
        assert_eq!(child.name, QName::new("urn:d", "child"));
        assert_eq!(child.text.as_deref(), Some("x & y A"));
        assert_eq!(child.resolve_prefix("t"), Some("urn:t"));
    }

    #[test]
    fn test_malformed_input_is_a_syntax_error() {
        for bad in ["<a><b></a>", "<a>", "", "<a/><b/>", "<p:a/>", "text<a/>"] {
            let err = parse(bad).unwrap_err();
            assert!(matches!(err, XmlError::Syntax(_)), "{bad}: {err:?}");
        }
    }

    #[test]
    fn test_comments_and_pis_are_stripped_by_default() {
        let doc = parse("<?pi data?><!-- c --><a><!-- c -->t</a>").unwrap();
        assert!(doc.processing_instructions.is_empty());
        assert_eq!(doc.root.text.as_deref(), Some("t"));

        let keep = ParserConfig {
            strip_processing_instructions: false,
            ..Default::default()
        };
        let doc = parse_document(b"<?pi data?><a/>", &keep).unwrap();
        assert_eq!(doc.processing_instructions, vec!["pi data".to_string()]);
    }

    #[test]
    fn test_custom_entities_need_opt_in() {
        let xml = r#"<!DOCTYPE a [<!ENTITY who "world">]><a>hello &who;</a>"#;
        assert!(matches!(parse(xml), Err(XmlError::Syntax(_))));

        let open = ParserConfig {
            resolve_entities: true,
            ..Default::default()
        };
        let doc = parse_document(xml.as_bytes(), &open).unwrap();
        assert_eq!(doc.root.text.as_deref(), Some("hello world"));
    }

    #[test]
    fn test_external_entities_are_never_resolved() {
        let xml = r#"<!DOCTYPE a [<!ENTITY x SYSTEM "file:///etc/passwd">]><a>&x;</a>"#;
        let open = ParserConfig {
            resolve_entities: true,
            ..Default::default()
        };
        assert!(matches!(
            parse_document(xml.as_bytes(), &open),
            Err(XmlError::Syntax(_))
        ));
    }

    #[test]
    fn test_remote_dtd_policy() {
        let xml = r#"<!DOCTYPE a SYSTEM "http://example.com/a.dtd"><a/>"#;
        assert!(parse(xml).is_ok());
        let load = ParserConfig {
            load_external_dtd: true,
            ..Default::default()
        };
        assert!(parse_document(xml.as_bytes(), &load).is_err());
        let network = ParserConfig {
            load_external_dtd: true,
            allow_network_access: true,
            ..Default::default()
        };
        assert!(parse_document(xml.as_bytes(), &network).is_ok());
    }

    #[test]
    fn test_depth_limit() {
        let deep = "<a>".repeat(300) + &"</a>".repeat(300);
        assert!(parse(&deep).is_err());
        let huge = ParserConfig {
            allow_huge_documents: true,
            ..Default::default()
        };
        assert!(parse_document(deep.as_bytes(), &huge).is_ok());
    }

    #[test]
    fn test_cdata_normalization() {
        let doc = parse("<a><![CDATA[<b>]]></a>").unwrap();
        assert_eq!(doc.root.text.as_deref(), Some("<b>"));
        assert!(!doc.root.cdata);
        let keep = ParserConfig {
            normalize_cdata: false,
            ..Default::default()
        };
        let doc = parse_document(b"<a><![CDATA[<b>]]></a>", &keep).unwrap();
        assert!(doc.root.cdata);
    }

    #[test]
    fn test_recover_closes_open_elements() {
        let recover = ParserConfig {
            recover_from_errors: true,
            ..Default::default()
        };
        let doc = parse_document(b"<a><b>text", &recover).unwrap();
        assert_eq!(doc.root.children[0].text.as_deref(), Some("text"));
    }

    #[test]
    fn test_blank_text_between_elements_is_stripped() {
        let doc = parse("<a>\n  <b> </b>\n</a>").unwrap();
        assert_eq!(doc.root.text, None);
        assert_eq!(doc.root.children[0].tail, None);
        assert_eq!(doc.root.children[0].text.as_deref(), Some(" "));
    }

    #[test]
    fn test_latin1_declaration() {
        let mut bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"</a>");
        let doc = parse_document(&bytes, &ParserConfig::default()).unwrap();
        assert_eq!(doc.root.text.as_deref(), Some("café"));
    }

    #[test]
    fn test_validate_dtd_checks_root() {
        let strict = ParserConfig {
            validate_dtd: true,
            ..Default::default()
        };
        assert!(parse_document(b"<!DOCTYPE a><a/>", &strict).is_ok());
        assert!(parse_document(b"<!DOCTYPE a><b/>", &strict).is_err());
        assert!(parse_document(b"<a/>", &strict).is_err());
    }

    #[test]
    fn test_parse_fragment() {
        let fragment = parse_fragment("lead <b>bold</b> tail").unwrap();
        assert_eq!(fragment.text.as_deref(), Some("lead "));
        assert_eq!(fragment.children[0].tail.as_deref(), Some(" tail"));
        assert!(parse_fragment("<b>").is_err());
    }
}
