//! Soft-validation predicates.
//!
//! `validate_string` checks the raw wire text before it is parsed;
//! `validate_native` checks the parsed value. Both return the reason for a
//! rejection so the caller can build its own error.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::descriptor::{TypeDescriptor, TypeKind};
use crate::primitive::PrimitiveKind;
use crate::value::Value;

pub fn validate_string(desc: &TypeDescriptor, text: Option<&str>) -> Result<(), String> {
    let Some(text) = text else {
        return Ok(());
    };
    let facets = &desc.restrictions;

    if matches!(desc.kind, TypeKind::Primitive(PrimitiveKind::String)) {
        let len = text.chars().count();
        if let Some(min) = facets.min_length {
            if len < min {
                return Err(format!("length {} is shorter than {}", len, min));
            }
        }
        if let Some(max) = facets.max_length {
            if len > max {
                return Err(format!("length {} is longer than {}", len, max));
            }
        }
    }

    if let Some(pattern) = &facets.pattern {
        if !pattern.is_match(text) {
            return Err(format!("{:?} does not match {}", text, pattern.as_str()));
        }
    }
    Ok(())
}

pub fn validate_native(desc: &TypeDescriptor, value: &Value) -> Result<(), String> {
    if value.is_null() {
        return Ok(());
    }
    match &desc.kind {
        TypeKind::Enum { members } => {
            let name = value.as_str().unwrap_or_default();
            if !members.iter().any(|m| m == name) {
                return Err(format!("{:?} is not one of {:?}", name, members));
            }
        }
        TypeKind::Primitive(kind) if kind.is_numeric() => {
            let facets = &desc.restrictions;
            if facets.min_value.is_none() && facets.max_value.is_none() {
                return Ok(());
            }
            let Some(number) = as_decimal(value) else {
                return Err(format!("{:?} is not comparable", value));
            };
            if let Some(min) = facets.min_value {
                if number < min {
                    return Err(format!("{} is less than {}", number, min));
                }
            }
            if let Some(max) = facets.max_value {
                if number > max {
                    return Err(format!("{} is greater than {}", number, max));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Integer(i) => Some(Decimal::from(*i)),
        Value::Decimal(d) => Some(*d),
        Value::Double(f) => Decimal::from_f64(*f),
        _ => None,
    }
}
