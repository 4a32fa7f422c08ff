//! Parser, output and validation settings.
//!
//! Both configuration structs can be built programmatically, flattened into
//! a clap command line, or read from the environment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RPC_XML_LOAD_EXTERNAL_DTD` | false | Load a local external DTD named by the doctype |
//! | `RPC_XML_VALIDATE_DTD` | false | Check the root element against the doctype |
//! | `RPC_XML_ALLOW_NETWORK_ACCESS` | false | Accept remote DTD references |
//! | `RPC_XML_RECOVER_FROM_ERRORS` | false | Close unterminated elements instead of failing |
//! | `RPC_XML_STRIP_BLANK_TEXT` | true | Drop whitespace-only text between elements |
//! | `RPC_XML_STRIP_PROCESSING_INSTRUCTIONS` | true | Drop processing instructions |
//! | `RPC_XML_NORMALIZE_CDATA` | true | Merge CDATA sections into plain text |
//! | `RPC_XML_RESOLVE_ENTITIES` | false | Expand entities declared in the DTD |
//! | `RPC_XML_ALLOW_HUGE_DOCUMENTS` | false | Lift the depth and text-size limits |
//! | `RPC_XML_COMPACT_TEXT_STORAGE` | true | Shrink text buffers after parsing |
//! | `RPC_XML_EMIT_DOCUMENT_DECLARATION` | true | Write `<?xml ...?>` |
//! | `RPC_XML_CLEANUP_NAMESPACES` | true | Hoist and deduplicate namespace declarations |
//! | `RPC_XML_OUTPUT_ENCODING` | UTF-8 | Output byte encoding |
//! | `RPC_XML_PRETTY_PRINT` | false | Indent output |

use std::ops::BitOr;

use clap::{ArgAction, Args, Parser};
use serde::{Deserialize, Serialize};

/// Element nesting limit unless huge documents are allowed.
pub const MAX_DEPTH: usize = 256;

/// Largest single text node unless huge documents are allowed.
pub const MAX_TEXT_LENGTH: usize = 10 * 1024 * 1024;

/// Output encodings the writer can produce.
pub const SUPPORTED_ENCODINGS: [&str; 3] = ["UTF-8", "ISO-8859-1", "US-ASCII"];

/// Parser policy for untrusted input. Every option defaults to the safer
/// setting. Comments are always stripped.
#[derive(Debug, Clone, PartialEq, Eq, Args, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Load an external DTD from the local filesystem.
    #[arg(long, env = "RPC_XML_LOAD_EXTERNAL_DTD", default_value = "false", action = ArgAction::Set)]
    pub load_external_dtd: bool,

    /// Check the document element against the doctype declaration.
    #[arg(long, env = "RPC_XML_VALIDATE_DTD", default_value = "false", action = ArgAction::Set)]
    pub validate_dtd: bool,

    /// Accept DTD references to remote locations. They are never fetched.
    #[arg(long, env = "RPC_XML_ALLOW_NETWORK_ACCESS", default_value = "false", action = ArgAction::Set)]
    pub allow_network_access: bool,

    /// Close unterminated elements at end of input instead of failing.
    #[arg(long, env = "RPC_XML_RECOVER_FROM_ERRORS", default_value = "false", action = ArgAction::Set)]
    pub recover_from_errors: bool,

    /// Drop whitespace-only text nodes.
    #[arg(long, env = "RPC_XML_STRIP_BLANK_TEXT", default_value = "true", action = ArgAction::Set)]
    pub strip_blank_text: bool,

    /// Drop processing instructions.
    #[arg(long, env = "RPC_XML_STRIP_PROCESSING_INSTRUCTIONS", default_value = "true", action = ArgAction::Set)]
    pub strip_processing_instructions: bool,

    /// Merge CDATA sections into ordinary text.
    #[arg(long, env = "RPC_XML_NORMALIZE_CDATA", default_value = "true", action = ArgAction::Set)]
    pub normalize_cdata: bool,

    /// Expand entities declared in the document type definition.
    #[arg(long, env = "RPC_XML_RESOLVE_ENTITIES", default_value = "false", action = ArgAction::Set)]
    pub resolve_entities: bool,

    /// Lift the nesting and text-size limits.
    #[arg(long, env = "RPC_XML_ALLOW_HUGE_DOCUMENTS", default_value = "false", action = ArgAction::Set)]
    pub allow_huge_documents: bool,

    /// Shrink text buffers to their contents after parsing.
    #[arg(long, env = "RPC_XML_COMPACT_TEXT_STORAGE", default_value = "true", action = ArgAction::Set)]
    pub compact_text_storage: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            load_external_dtd: false,
            validate_dtd: false,
            allow_network_access: false,
            recover_from_errors: false,
            strip_blank_text: true,
            strip_processing_instructions: true,
            normalize_cdata: true,
            resolve_entities: false,
            allow_huge_documents: false,
            compact_text_storage: true,
        }
    }
}

impl ParserConfig {
    /// Reads overrides from `RPC_XML_*` variables, falling back to defaults.
    pub fn from_env() -> Self {
        EnvOnly::<Self>::try_parse_from(["rpc-xml"])
            .map(|env| env.config)
            .unwrap_or_default()
    }

    pub fn strip_comments(&self) -> bool {
        true
    }

    pub fn max_depth(&self) -> Option<usize> {
        (!self.allow_huge_documents).then_some(MAX_DEPTH)
    }

    pub fn max_text_length(&self) -> Option<usize> {
        (!self.allow_huge_documents).then_some(MAX_TEXT_LENGTH)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.allow_network_access && !self.load_external_dtd {
            errors.push("allow_network_access requires load_external_dtd".to_string());
        }

        if self.resolve_entities && self.allow_huge_documents {
            errors.push(
                "resolve_entities cannot be combined with allow_huge_documents".to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// How documents are written back out.
#[derive(Debug, Clone, PartialEq, Eq, Args, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write an `<?xml version="1.0" encoding="..."?>` declaration.
    #[arg(long, env = "RPC_XML_EMIT_DOCUMENT_DECLARATION", default_value = "true", action = ArgAction::Set)]
    pub emit_document_declaration: bool,

    /// Declare each namespace once on the root instead of per element.
    #[arg(long = "cleanup-namespaces", env = "RPC_XML_CLEANUP_NAMESPACES", default_value = "true", action = ArgAction::Set)]
    pub cleanup_redundant_namespaces: bool,

    /// Output byte encoding (UTF-8, ISO-8859-1, US-ASCII).
    #[arg(long, env = "RPC_XML_OUTPUT_ENCODING", default_value = "UTF-8")]
    pub output_encoding: String,

    /// Indent nested elements.
    #[arg(long, env = "RPC_XML_PRETTY_PRINT", default_value = "false", action = ArgAction::Set)]
    pub pretty_print: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            emit_document_declaration: true,
            cleanup_redundant_namespaces: true,
            output_encoding: "UTF-8".to_string(),
            pretty_print: false,
        }
    }
}

impl OutputConfig {
    pub fn from_env() -> Self {
        EnvOnly::<Self>::try_parse_from(["rpc-xml"])
            .map(|env| env.config)
            .unwrap_or_default()
    }

    /// The canonical spelling of the output encoding, if supported.
    pub fn canonical_encoding(&self) -> Option<&'static str> {
        canonical_encoding(&self.output_encoding)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.canonical_encoding().is_none() {
            errors.push(format!(
                "Unsupported output encoding '{}' (expected one of {})",
                self.output_encoding,
                SUPPORTED_ENCODINGS.join(", ")
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Maps an encoding label to one of [`SUPPORTED_ENCODINGS`].
pub fn canonical_encoding(label: &str) -> Option<&'static str> {
    match label.trim().to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => Some("UTF-8"),
        "iso-8859-1" | "latin-1" | "latin1" | "iso8859-1" => Some("ISO-8859-1"),
        "us-ascii" | "ascii" => Some("US-ASCII"),
        _ => None,
    }
}

#[derive(Parser)]
struct EnvOnly<T: Args> {
    #[command(flatten)]
    config: T,
}

/// Which validation passes run: per-field soft checks during decode,
/// whole-document schema checks at ingest, both, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidatorMode {
    pub soft: bool,
    pub schema: bool,
}

impl ValidatorMode {
    pub const NONE: Self = Self {
        soft: false,
        schema: false,
    };
    pub const SOFT: Self = Self {
        soft: true,
        schema: false,
    };
    pub const SCHEMA: Self = Self {
        soft: false,
        schema: true,
    };
}

impl BitOr for ValidatorMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            soft: self.soft || rhs.soft,
            schema: self.schema || rhs.schema,
        }
    }
}
