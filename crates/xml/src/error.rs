//! Error taxonomy for the XML protocol.
//!
//! Every error maps onto a [`Fault`] through [`XmlError::to_fault`]: caller
//! mistakes land in the `Client.*` family, everything else in `Server.*`.

use helios_rpc_model::{Category, Fault, ModelError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmlError {
    /// The document is not well-formed, or breaks the parser policy.
    #[error("XML syntax error: {0}")]
    Syntax(String),

    /// The schema validator rejected the document.
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    /// A soft-validation check failed on one field.
    #[error("{subject} {reason}")]
    Validation { subject: String, reason: String },

    /// No handler is registered anywhere along the category lineage.
    #[error("no handler registered for {category:?}")]
    UnregisteredType { category: Category },

    /// A field names a sub-protocol that the protocol does not know.
    #[error("sub-protocol {0} is not registered")]
    UnregisteredProtocol(u32),

    /// The encoder was handed a value it cannot put on the wire.
    #[error("type error: {0}")]
    Type(String),

    #[error("Method {0:?} not found.")]
    MethodNotFound(String),

    #[error("unsupported encoding {0:?}")]
    UnsupportedEncoding(String),

    /// A fault recorded earlier in the call.
    #[error(transparent)]
    Fault(#[from] Fault),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML writer error: {0}")]
    Writer(#[from] quick_xml::Error),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl XmlError {
    pub fn validation(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        XmlError::Validation {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// The fault code reported for this error.
    pub fn code(&self) -> &str {
        match self {
            XmlError::Syntax(_) => "Client.XmlSyntaxError",
            XmlError::SchemaValidation(_) => "Client.SchemaValidationError",
            XmlError::Validation { .. } => "Client.ValidationError",
            XmlError::MethodNotFound(_) => "Client.MethodNotFound",
            XmlError::Model(ModelError::PrimitiveParse { .. } | ModelError::Binary { .. }) => {
                "Client.ValidationError"
            }
            XmlError::UnregisteredType { .. } | XmlError::UnregisteredProtocol(_) => {
                "Server.UnregisteredType"
            }
            XmlError::UnsupportedEncoding(_) => "Server.UnsupportedEncoding",
            XmlError::Io(_) | XmlError::Writer(_) => "Server.Io",
            XmlError::Type(_) | XmlError::Model(_) => "Server.TypeError",
            XmlError::Fault(fault) => &fault.code,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.code().starts_with("Client")
    }

    pub fn to_fault(&self) -> Fault {
        match self {
            XmlError::Fault(fault) => fault.clone(),
            other => Fault::new(other.code(), other.to_string()),
        }
    }
}

impl From<XmlError> for Fault {
    fn from(err: XmlError) -> Self {
        match err {
            XmlError::Fault(fault) => fault,
            other => other.to_fault(),
        }
    }
}

impl From<std::string::FromUtf8Error> for XmlError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        XmlError::Syntax(err.to_string())
    }
}

/// Result alias for XML protocol operations.
pub type Result<T> = std::result::Result<T, XmlError>;
