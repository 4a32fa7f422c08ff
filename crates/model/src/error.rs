//! Error types for descriptor construction and primitive value conversion.

use thiserror::Error;

use crate::descriptor::DescriptorId;

/// Errors raised while building an [`Interface`](crate::Interface) or while
/// converting primitive values to and from their wire text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Primitive text could not be parsed into the requested kind.
    #[error("cannot parse {text:?} as {kind}: {reason}")]
    PrimitiveParse {
        kind: &'static str,
        text: String,
        reason: String,
    },

    /// A native value of the wrong shape was handed to a primitive encoder.
    #[error("expected a {expected} value, found {found}")]
    PrimitiveType {
        expected: &'static str,
        found: &'static str,
    },

    /// Binary transfer decoding failed.
    #[error("invalid {encoding} payload: {reason}")]
    Binary {
        encoding: &'static str,
        reason: String,
    },

    /// A descriptor referenced an id that does not exist in the arena.
    #[error("descriptor {0:?} is not part of this interface")]
    UnknownDescriptor(DescriptorId),

    /// `min_occurs` is larger than `max_occurs`.
    #[error("{type_name}: min_occurs {min} exceeds max_occurs {max}")]
    InvalidOccurs {
        type_name: String,
        min: u32,
        max: u32,
    },

    /// The `extends` chain loops back on itself.
    #[error("{type_name}: extension chain is cyclic")]
    CyclicExtension { type_name: String },

    /// A text pattern facet failed to compile.
    #[error("{type_name}: invalid pattern: {reason}")]
    InvalidPattern { type_name: String, reason: String },

    /// Two named types share one qualified key.
    #[error("type {0} is registered twice")]
    DuplicateType(String),
}

/// Result alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
