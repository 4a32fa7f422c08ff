//! The `to_string` / `from_string` contract for primitive scalars and the
//! binary transfer encodings used for byte arrays.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ModelError, Result};
use crate::qname::{QName, XS_NS};
use crate::value::Value;

/// Scalar kinds with a fixed textual wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    String,
    Integer,
    Decimal,
    Double,
    Boolean,
    Date,
    Time,
    DateTime,
    Uuid,
}

impl PrimitiveKind {
    /// The XML Schema local name for this kind.
    pub fn type_name(self) -> &'static str {
        match self {
            PrimitiveKind::String => "string",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::Decimal => "decimal",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Date => "date",
            PrimitiveKind::Time => "time",
            PrimitiveKind::DateTime => "dateTime",
            PrimitiveKind::Uuid => "uuid",
        }
    }

    /// The qualified schema name, `{xs}string` and friends.
    pub fn qname(self) -> QName {
        QName::new(XS_NS, self.type_name())
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Integer | PrimitiveKind::Decimal | PrimitiveKind::Double
        )
    }

    /// Renders a native value as wire text.
    pub fn to_text(self, value: &Value) -> Result<String> {
        let text = match (self, value) {
            (PrimitiveKind::String, Value::String(s)) => s.clone(),
            (PrimitiveKind::String, Value::Enum(s)) => s.clone(),
            (PrimitiveKind::Integer, Value::Integer(i)) => i.to_string(),
            (PrimitiveKind::Decimal, Value::Decimal(d)) => d.normalize().to_string(),
            (PrimitiveKind::Decimal, Value::Integer(i)) => i.to_string(),
            (PrimitiveKind::Double, Value::Double(f)) => format_double(*f),
            (PrimitiveKind::Double, Value::Integer(i)) => format_double(*i as f64),
            (PrimitiveKind::Boolean, Value::Bool(b)) => b.to_string(),
            (PrimitiveKind::Date, Value::Date(d)) => d.format("%Y-%m-%d").to_string(),
            (PrimitiveKind::Time, Value::Time(t)) => t.format("%H:%M:%S%.f").to_string(),
            (PrimitiveKind::DateTime, Value::DateTime(dt)) => dt.to_rfc3339(),
            (PrimitiveKind::Uuid, Value::Uuid(u)) => u.hyphenated().to_string(),
            (kind, other) => {
                return Err(ModelError::PrimitiveType {
                    expected: kind.type_name(),
                    found: other.kind_name(),
                });
            }
        };
        Ok(text)
    }

    /// Parses wire text into a native value.
    pub fn from_text(self, text: &str) -> Result<Value> {
        let fail = |reason: String| ModelError::PrimitiveParse {
            kind: self.type_name(),
            text: text.to_string(),
            reason,
        };
        let trimmed = text.trim();
        let value = match self {
            PrimitiveKind::String => Value::String(text.to_string()),
            PrimitiveKind::Integer => {
                Value::Integer(trimmed.parse::<i64>().map_err(|e| fail(e.to_string()))?)
            }
            PrimitiveKind::Decimal => {
                Value::Decimal(Decimal::from_str(trimmed).map_err(|e| fail(e.to_string()))?)
            }
            PrimitiveKind::Double => Value::Double(parse_double(trimmed).map_err(fail)?),
            PrimitiveKind::Boolean => match trimmed {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => return Err(fail("expected true, false, 1 or 0".to_string())),
            },
            PrimitiveKind::Date => Value::Date(
                NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|e| fail(e.to_string()))?,
            ),
            PrimitiveKind::Time => Value::Time(
                NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
                    .map_err(|e| fail(e.to_string()))?,
            ),
            PrimitiveKind::DateTime => Value::DateTime(parse_date_time(trimmed).map_err(fail)?),
            PrimitiveKind::Uuid => {
                Value::Uuid(uuid::Uuid::parse_str(trimmed).map_err(|e| fail(e.to_string()))?)
            }
        };
        Ok(value)
    }
}

fn format_double(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "INF" } else { "-INF" }.to_string()
    } else {
        value.to_string()
    }
}

fn parse_double(text: &str) -> std::result::Result<f64, String> {
    match text {
        "INF" => Ok(f64::INFINITY),
        "-INF" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        _ => text.parse::<f64>().map_err(|e| e.to_string()),
    }
}

// Timestamps without an offset are taken as UTC.
fn parse_date_time(text: &str) -> std::result::Result<DateTime<FixedOffset>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt);
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| e.to_string())?;
    Ok(naive.and_utc().fixed_offset())
}

/// Transfer encoding for byte arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryEncoding {
    #[default]
    Base64,
    UrlSafeBase64,
    Hex,
}

impl BinaryEncoding {
    pub fn name(self) -> &'static str {
        match self {
            BinaryEncoding::Base64 => "base64",
            BinaryEncoding::UrlSafeBase64 => "urlsafe_base64",
            BinaryEncoding::Hex => "hex",
        }
    }

    pub fn encode(self, bytes: &[u8]) -> String {
        match self {
            BinaryEncoding::Base64 => STANDARD.encode(bytes),
            BinaryEncoding::UrlSafeBase64 => URL_SAFE.encode(bytes),
            BinaryEncoding::Hex => hex::encode(bytes),
        }
    }

    /// Decodes wire text; whitespace (line folding) is ignored.
    pub fn decode(self, text: &str) -> Result<Vec<u8>> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = match self {
            BinaryEncoding::Base64 => STANDARD.decode(compact.as_bytes()).map_err(|e| e.to_string()),
            BinaryEncoding::UrlSafeBase64 => {
                URL_SAFE.decode(compact.as_bytes()).map_err(|e| e.to_string())
            }
            BinaryEncoding::Hex => hex::decode(compact.as_bytes()).map_err(|e| e.to_string()),
        };
        decoded.map_err(|reason| ModelError::Binary {
            encoding: self.name(),
            reason,
        })
    }
}

impl FromStr for BinaryEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base64" => Ok(BinaryEncoding::Base64),
            "urlsafe_base64" | "urlsafe-base64" | "base64url" => Ok(BinaryEncoding::UrlSafeBase64),
            "hex" => Ok(BinaryEncoding::Hex),
            other => Err(format!("unknown binary encoding '{}'", other)),
        }
    }
}
