//! Qualified names and the namespaces with fixed meaning on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// XML Schema instance namespace; carries `nil` and `type`.
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XML Schema namespace; home of the built-in primitive type names.
pub const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// SOAP 1.1 envelope namespace; home of `Fault`.
pub const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// The namespace bound to the reserved `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// A namespace-qualified name.
///
/// Displayed in Clark notation (`{namespace}local`), which is also the form
/// used as a registry key for polymorphic type lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    /// Creates a name inside `namespace`.
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local: local.into(),
        }
    }

    /// Creates a name without a namespace.
    pub fn unqualified(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }

    /// Creates a name whose namespace may be absent.
    pub fn qualified(namespace: Option<&str>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            local: local.into(),
        }
    }

    /// Returns the Clark-notation key, `{ns}local` or `local`.
    pub fn clark(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{{{}}}{}", ns, self.local),
            None => self.local.clone(),
        }
    }

    /// Parses Clark notation back into a name.
    pub fn parse_clark(key: &str) -> Self {
        if let Some(rest) = key.strip_prefix('{') {
            if let Some((ns, local)) = rest.split_once('}') {
                return Self::new(ns, local);
            }
        }
        Self::unqualified(key)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn is_in(&self, namespace: &str) -> bool {
        self.namespace.as_deref() == Some(namespace)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

impl From<&str> for QName {
    fn from(key: &str) -> Self {
        QName::parse_clark(key)
    }
}

impl From<String> for QName {
    fn from(key: String) -> Self {
        QName::parse_clark(&key)
    }
}

/// `xsi:nil`
pub fn xsi_nil() -> QName {
    QName::new(XSI_NS, "nil")
}

/// `xsi:type`
pub fn xsi_type() -> QName {
    QName::new(XSI_NS, "type")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clark_round_trip() {
        let name = QName::new("urn:test", "Person");
        assert_eq!(name.clark(), "{urn:test}Person");
        assert_eq!(QName::parse_clark(&name.clark()), name);
        assert_eq!(QName::parse_clark("plain"), QName::unqualified("plain"));
    }

    #[test]
    fn test_display_matches_clark() {
        let name = QName::new(XSI_NS, "nil");
        assert_eq!(name.to_string(), name.clark());
        assert_eq!(QName::unqualified("x").to_string(), "x");
    }
}
