//! Serializing element trees to bytes.

use std::collections::BTreeMap;
use std::io::{self, Write};

use helios_rpc_model::{Element, NamespaceMap};
use quick_xml::Writer;
use tracing::trace;

use crate::config::OutputConfig;
use crate::error::{Result, XmlError};
use crate::namespaces::NamespaceScope;
use crate::write::{hoist_namespaces, write_tree};

/// The `<?xml ...?>` line for an output encoding.
pub fn declaration(encoding: &str) -> String {
    format!("<?xml version=\"1.0\" encoding=\"{}\"?>\n", encoding)
}

/// Re-encodes the UTF-8 produced by the writer into the output encoding.
/// Characters the target cannot represent become numeric references.
/// Multi-byte sequences split across writes are held back until complete.
pub struct Transcoder<W: Write> {
    inner: W,
    encoding: &'static str,
    partial: Vec<u8>,
}

impl<W: Write> Transcoder<W> {
    pub fn new(inner: W, encoding: &'static str) -> Self {
        Self {
            inner,
            encoding,
            partial: Vec::new(),
        }
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Returns the inner writer; an incomplete trailing sequence is an error.
    pub fn into_inner(mut self) -> io::Result<W> {
        if !self.partial.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "output ended inside a multi-byte character",
            ));
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for Transcoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.encoding == "UTF-8" {
            self.inner.write_all(buf)?;
            return Ok(buf.len());
        }
        self.partial.extend_from_slice(buf);
        let complete = match std::str::from_utf8(&self.partial) {
            Ok(text) => text.len(),
            Err(err) if err.error_len().is_some() => {
                return Err(io::Error::new(io::ErrorKind::InvalidData, err));
            }
            Err(err) => err.valid_up_to(),
        };
        let text = String::from_utf8_lossy(&self.partial[..complete]);
        let bytes = encode_chars(&text, self.encoding);
        self.inner.write_all(&bytes)?;
        self.partial.drain(..complete);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Encodes text in a single-byte encoding, escaping what does not fit.
pub fn encode_chars(text: &str, encoding: &str) -> Vec<u8> {
    let limit = match encoding {
        "ISO-8859-1" => 0xFF,
        "US-ASCII" => 0x7F,
        _ => return text.as_bytes().to_vec(),
    };
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        let code = c as u32;
        if code <= limit {
            out.push(code as u8);
        } else {
            out.extend_from_slice(format!("&#{};", code).as_bytes());
        }
    }
    out
}

/// Writes `root` as a complete document.
///
/// With namespace cleanup every namespace is declared once on the root;
/// otherwise each element declares the bindings it carries that differ from
/// its parent's.
pub fn write_document(
    root: &Element,
    processing_instructions: &[String],
    output: &OutputConfig,
    hints: &BTreeMap<String, String>,
) -> Result<Vec<u8>> {
    let encoding = output
        .canonical_encoding()
        .ok_or_else(|| XmlError::UnsupportedEncoding(output.output_encoding.clone()))?;

    let mut transcoder = Transcoder::new(Vec::new(), encoding);
    if output.emit_document_declaration {
        transcoder.write_all(declaration(encoding).as_bytes())?;
    }
    for pi in processing_instructions {
        transcoder.write_all(format!("<?{}?>\n", pi).as_bytes())?;
    }

    let mut scope = NamespaceScope::new(hints);
    let declare: NamespaceMap = if output.cleanup_redundant_namespaces {
        hoist_namespaces(root, &scope)
    } else {
        root.nsmap.as_ref().clone()
    };
    trace!(bindings = declare.len(), encoding, "writing document");

    let transcoder = if output.pretty_print {
        let mut writer = Writer::new_with_indent(transcoder, b' ', 2);
        write_tree(&mut writer, &mut scope, root, &declare, !output.cleanup_redundant_namespaces)?;
        writer.into_inner()
    } else {
        let mut writer = Writer::new(transcoder);
        write_tree(&mut writer, &mut scope, root, &declare, !output.cleanup_redundant_namespaces)?;
        writer.into_inner()
    };
    Ok(transcoder.into_inner()?)
}
