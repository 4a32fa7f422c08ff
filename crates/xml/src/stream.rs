//! Incremental output: elements are written as soon as their content starts.
//!
//! A start tag stays pending until the first child or the close, so
//! attributes set right after [`WireSink::open`] still land on it. Anything
//! that needs already-written output to change (late attributes, attribute
//! folding) is dropped with a warning.

use std::collections::BTreeMap;
use std::io::Write;

use helios_rpc_model::{Element, NamespaceMap, QName};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, Event};
use tracing::warn;

use crate::config::OutputConfig;
use crate::egress::{Transcoder, declaration};
use crate::error::{Result, XmlError};
use crate::namespaces::NamespaceScope;
use crate::sink::WireSink;
use crate::write::{open_tag, write_text, write_tree};

pub struct StreamSink<W: Write> {
    writer: Writer<Transcoder<W>>,
    scope: NamespaceScope,
    pending: Option<Element>,
    open: Vec<String>,
    root_bindings: Option<NamespaceMap>,
}

impl<W: Write> StreamSink<W> {
    pub fn new(inner: W, output: &OutputConfig, hints: &BTreeMap<String, String>) -> Result<Self> {
        let encoding = output
            .canonical_encoding()
            .ok_or_else(|| XmlError::UnsupportedEncoding(output.output_encoding.clone()))?;
        let mut transcoder = Transcoder::new(inner, encoding);
        if output.emit_document_declaration {
            transcoder.write_all(declaration(encoding).as_bytes())?;
        }
        let writer = if output.pretty_print {
            Writer::new_with_indent(transcoder, b' ', 2)
        } else {
            Writer::new(transcoder)
        };
        let scope = NamespaceScope::new(hints);
        let root_bindings = output
            .cleanup_redundant_namespaces
            .then(|| scope.hint_bindings());
        Ok(Self {
            writer,
            scope,
            pending: None,
            open: Vec::new(),
            root_bindings,
        })
    }

    /// Number of elements opened and not yet closed.
    pub fn depth(&self) -> usize {
        self.open.len() + usize::from(self.pending.is_some())
    }

    fn declarations_for(&mut self, element: &Element) -> NamespaceMap {
        let mut declare = self.root_bindings.take().unwrap_or_default();
        declare.extend(
            element
                .nsmap
                .iter()
                .map(|(prefix, uri)| (prefix.clone(), uri.clone())),
        );
        declare
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some(element) = self.pending.take() {
            let declare = self.declarations_for(&element);
            let (start, qualified) = open_tag(&mut self.scope, &element, &declare);
            self.writer.write_event(Event::Start(start))?;
            if let Some(text) = &element.text {
                write_text(&mut self.writer, text, element.cdata)?;
            }
            self.open.push(qualified);
        }
        Ok(())
    }

    /// Closes whatever is still open and hands back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        while self.depth() > 0 {
            self.close()?;
        }
        let mut transcoder = self.writer.into_inner();
        transcoder.flush()?;
        Ok(transcoder.into_inner()?)
    }
}

impl<W: Write> WireSink for StreamSink<W> {
    fn open(&mut self, element: Element) -> Result<()> {
        self.flush_pending()?;
        self.pending = Some(element);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(element) = self.pending.take() {
            let declare = self.declarations_for(&element);
            let (start, qualified) = open_tag(&mut self.scope, &element, &declare);
            match element.text.as_deref().filter(|t| !t.is_empty()) {
                None => self.writer.write_event(Event::Empty(start))?,
                Some(text) => {
                    self.writer.write_event(Event::Start(start))?;
                    write_text(&mut self.writer, text, element.cdata)?;
                    self.writer
                        .write_event(Event::End(BytesEnd::new(qualified)))?;
                }
            }
            self.scope.pop();
            return Ok(());
        }
        match self.open.pop() {
            Some(qualified) => {
                self.writer
                    .write_event(Event::End(BytesEnd::new(qualified)))?;
                self.scope.pop();
                Ok(())
            }
            None => Err(XmlError::Type("close without an open element".to_string())),
        }
    }

    fn append(&mut self, element: Element) -> Result<()> {
        self.flush_pending()?;
        let declare = self.declarations_for(&element);
        write_tree(&mut self.writer, &mut self.scope, &element, &declare, true)?;
        if let Some(tail) = &element.tail {
            write_text(&mut self.writer, tail, false)?;
        }
        Ok(())
    }

    fn set_attribute(&mut self, name: QName, value: String) -> Result<()> {
        match &mut self.pending {
            Some(element) => element.set_attribute(name, value),
            None => warn!(attribute = %name, "start tag already written; attribute dropped"),
        }
        Ok(())
    }

    fn set_text(&mut self, text: String) -> Result<()> {
        match &mut self.pending {
            Some(element) => element.text = Some(text),
            None => write_text(&mut self.writer, &text, false)?,
        }
        Ok(())
    }

    fn fold_attribute(
        &mut self,
        owner: &QName,
        _position: Option<usize>,
        name: &QName,
        _value: String,
    ) -> Result<()> {
        warn!(
            owner = %owner,
            attribute = %name,
            "attribute folding is not available on streaming output"
        );
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        true
    }
}
