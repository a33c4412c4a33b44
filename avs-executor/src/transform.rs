//! Reshapes already resolved values.
//!
//! Two forms are understood:
//! - `[]byte(...)` concatenates the fields of a composite value into big-endian bytes,
//!   optionally restricted to the listed fields.
//! - `struct(New:source,...)` projects fields of a record into a new record under new names.

use crate::error::TransformError;
use crate::value::{Record, Value};

const BYTES_TRANSFORM: &str = "[]byte";
const STRUCT_TRANSFORM: &str = "struct";

pub fn transform(value: Value, expression: &str) -> Result<Value, TransformError> {
    let expression = expression.trim();
    let (name, args) = split_call(expression)?;
    match name {
        BYTES_TRANSFORM => flatten_bytes(&value, expression, &args),
        STRUCT_TRANSFORM => project(&value, expression, &args),
        _ => Err(TransformError::UnknownTransform(name.to_string())),
    }
}

fn split_call(expression: &str) -> Result<(&str, Vec<&str>), TransformError> {
    let open = expression.find('(').ok_or_else(|| TransformError::Malformed(expression.to_string()))?;
    let inner = expression[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| TransformError::Malformed(expression.to_string()))?;
    let args = inner.split(',').map(str::trim).filter(|arg| !arg.is_empty()).collect();
    Ok((expression[..open].trim(), args))
}

fn flatten_bytes(value: &Value, expression: &str, fields: &[&str]) -> Result<Value, TransformError> {
    let record = value.as_record().ok_or_else(|| TransformError::NotARecord {
        transform: expression.to_string(),
        value: value.to_string(),
    })?;

    let mut out = Vec::new();
    if fields.is_empty() {
        for (_, field) in record.iter() {
            append_be_bytes(field, &mut out);
        }
    } else {
        for name in fields {
            let field = record.get(name).ok_or_else(|| TransformError::MissingField {
                transform: expression.to_string(),
                field: name.to_string(),
            })?;
            append_be_bytes(field, &mut out);
        }
    }
    Ok(Value::Bytes(out))
}

/// Numbers and booleans occupy a full 32-byte word, addresses 20 bytes, byte strings their raw length.
fn append_be_bytes(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Bool(b) => {
            let mut word = [0u8; 32];
            word[31] = u8::from(*b);
            out.extend_from_slice(&word);
        }
        Value::Uint(u) => out.extend_from_slice(&u.to_be_bytes::<32>()),
        Value::Int(i) => out.extend_from_slice(&i.to_be_bytes::<32>()),
        Value::Address(address) => out.extend_from_slice(address.as_slice()),
        Value::Bytes(bytes) => out.extend_from_slice(bytes),
        Value::String(s) => out.extend_from_slice(s.as_bytes()),
        Value::Array(items) => items.iter().for_each(|item| append_be_bytes(item, out)),
        composite => {
            if let Some(record) = composite.as_record() {
                record.iter().for_each(|(_, field)| append_be_bytes(field, out));
            }
        }
    }
}

fn project(value: &Value, expression: &str, mappings: &[&str]) -> Result<Value, TransformError> {
    let source = value.as_record().ok_or_else(|| TransformError::NotARecord {
        transform: expression.to_string(),
        value: value.to_string(),
    })?;

    let mut projected = Record::new();
    for mapping in mappings {
        let (target, field) = mapping.split_once(':').ok_or_else(|| TransformError::Malformed(mapping.to_string()))?;
        let (target, field) = (target.trim(), field.trim());
        if target.is_empty() || field.is_empty() {
            return Err(TransformError::Malformed(mapping.to_string()));
        }
        let selected = source.get(field).ok_or_else(|| TransformError::MissingField {
            transform: expression.to_string(),
            field: field.to_string(),
        })?;
        projected.insert(target, selected.clone());
    }
    Ok(Value::Record(projected))
}
