//! The tagged value type flowing through the resolution cache.
//!
//! Everything a key expression can resolve to is a [`Value`]. Contract results
//! are decoded into it and method arguments are encoded out of it, so the type
//! converter and transform engine only ever pattern-match on this enum.

use std::fmt;

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::hex;
use alloy::json_abi::Param;
use alloy::primitives::{Address, B256, I256, U256};

use crate::converter::{self, Kind};
use crate::error::ConversionError;

/// A point on the G1 curve in affine coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct G1Point {
    pub x: U256,
    pub y: U256,
}

/// A point on the G2 curve, each coordinate split in two field elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct G2Point {
    pub x: [U256; 2],
    pub y: [U256; 2],
}

impl G1Point {
    pub const ZERO: G1Point = G1Point { x: U256::ZERO, y: U256::ZERO };

    pub fn new(x: U256, y: U256) -> Self {
        Self { x, y }
    }

    pub fn to_record(self) -> Record {
        Record::from_fields(vec![("X".to_string(), Value::Uint(self.x)), ("Y".to_string(), Value::Uint(self.y))])
    }
}

impl G2Point {
    pub const ZERO: G2Point = G2Point { x: [U256::ZERO; 2], y: [U256::ZERO; 2] };

    pub fn new(x: [U256; 2], y: [U256; 2]) -> Self {
        Self { x, y }
    }

    pub fn to_record(self) -> Record {
        let pair = |p: [U256; 2]| Value::Array(p.into_iter().map(Value::Uint).collect());
        Record::from_fields(vec![("X".to_string(), pair(self.x)), ("Y".to_string(), pair(self.y))])
    }
}

/// An ordered set of named fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Vec<(String, Value)>) -> Self {
        Self { fields }
    }

    /// Sets `name`, replacing an existing field in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(field, _)| field == name).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(I256),
    Uint(U256),
    String(String),
    Bytes(Vec<u8>),
    Address(Address),
    Array(Vec<Value>),
    Record(Record),
    G1(G1Point),
    G2(G2Point),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Address(_) => "address",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
            Value::G1(_) => "g1 point",
            Value::G2(_) => "g2 point",
        }
    }

    /// Emptiness as seen by `required` checks. Addresses and points are never empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Record(record) => record.is_empty(),
            _ => false,
        }
    }

    /// Views composite values as named fields; curve points expose `X` and `Y`.
    pub fn as_record(&self) -> Option<Record> {
        match self {
            Value::Record(record) => Some(record.clone()),
            Value::G1(point) => Some(point.to_record()),
            Value::G2(point) => Some(point.to_record()),
            _ => None,
        }
    }

    /// Raw bytes of a value used as key material or hash input.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConversionError> {
        match self {
            Value::Bytes(bytes) => Ok(bytes.clone()),
            Value::String(s) => match s.strip_prefix("0x") {
                Some(stripped) => hex::decode(stripped).map_err(|e| ConversionError::Parse {
                    value: s.clone(),
                    kind: "bytes".to_string(),
                    reason: e.to_string(),
                }),
                None => Ok(s.as_bytes().to_vec()),
            },
            Value::Address(address) => Ok(address.to_vec()),
            Value::Uint(u) => Ok(u.to_be_bytes::<32>().to_vec()),
            Value::Int(i) => Ok(i.to_be_bytes::<32>().to_vec()),
            other => Err(ConversionError::Coercion { value: other.to_string(), expected: "bytes".to_string() }),
        }
    }

    /// Interprets a 32-byte value as a digest.
    pub fn to_b256(&self) -> Result<B256, ConversionError> {
        let bytes = self.to_bytes()?;
        if bytes.len() != 32 {
            return Err(ConversionError::Coercion { value: self.to_string(), expected: "bytes32".to_string() });
        }
        Ok(B256::from_slice(&bytes))
    }

    pub fn from_json(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::String(String::new()),
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Value::Uint(U256::from(u))
                } else if let Some(i) = n.as_i64() {
                    Value::Int(I256::try_from(i).unwrap_or_default())
                } else {
                    Value::String(n.to_string())
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Record(Record::from_fields(
                map.into_iter().map(|(name, value)| (name, Value::from_json(value))).collect(),
            )),
        }
    }

    /// Decodes a contract return value. Tuple components take their names from `components`.
    pub fn from_sol(value: DynSolValue, components: &[Param]) -> Value {
        match value {
            DynSolValue::Bool(b) => Value::Bool(b),
            DynSolValue::Int(i, _) => Value::Int(i),
            DynSolValue::Uint(u, _) => Value::Uint(u),
            DynSolValue::FixedBytes(word, size) => Value::Bytes(word[..size].to_vec()),
            DynSolValue::Address(address) => Value::Address(address),
            DynSolValue::Function(function) => Value::Bytes(function.to_vec()),
            DynSolValue::Bytes(bytes) => Value::Bytes(bytes),
            DynSolValue::String(s) => Value::String(s),
            DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
                Value::Array(items.into_iter().map(|item| Value::from_sol(item, components)).collect())
            }
            DynSolValue::Tuple(items) => {
                let fields = items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let (name, nested) = match components.get(index) {
                            Some(param) if !param.name.is_empty() => (param.name.clone(), param.components.as_slice()),
                            Some(param) => (index.to_string(), param.components.as_slice()),
                            None => (index.to_string(), &[][..]),
                        };
                        (name, Value::from_sol(item, nested))
                    })
                    .collect();
                Value::Record(Record::from_fields(fields))
            }
        }
    }

    /// Encodes the value as an argument of type `ty`. `components` names the
    /// fields of `ty` when it is (or contains) a tuple.
    pub fn to_sol(&self, ty: &DynSolType, components: &[Param]) -> Result<DynSolValue, ConversionError> {
        if let Some(kind) = Kind::for_sol_type(ty) {
            let converted = converter::convert(self.clone(), kind)?;
            return primitive_to_sol(&converted, ty);
        }
        match ty {
            DynSolType::FixedBytes(size) => {
                let bytes = self.to_bytes()?;
                if bytes.len() != *size {
                    return Err(self.coercion_error(ty));
                }
                let mut word = B256::ZERO;
                word[..*size].copy_from_slice(&bytes);
                Ok(DynSolValue::FixedBytes(word, *size))
            }
            DynSolType::Bytes => Ok(DynSolValue::Bytes(self.to_bytes()?)),
            DynSolType::Array(inner) => match self {
                Value::Array(items) => Ok(DynSolValue::Array(
                    items.iter().map(|item| item.to_sol(inner, components)).collect::<Result<_, _>>()?,
                )),
                _ => Err(self.coercion_error(ty)),
            },
            DynSolType::FixedArray(inner, len) => match self {
                Value::Array(items) if items.len() == *len => Ok(DynSolValue::FixedArray(
                    items.iter().map(|item| item.to_sol(inner, components)).collect::<Result<_, _>>()?,
                )),
                _ => Err(self.coercion_error(ty)),
            },
            DynSolType::Tuple(types) => {
                let record = self.as_record().ok_or_else(|| self.coercion_error(ty))?;
                record_to_tuple(&record, types, components)
            }
            _ => Err(self.coercion_error(ty)),
        }
    }

    fn coercion_error(&self, ty: &DynSolType) -> ConversionError {
        ConversionError::Coercion { value: self.to_string(), expected: ty.sol_type_name().into_owned() }
    }
}

fn primitive_to_sol(value: &Value, ty: &DynSolType) -> Result<DynSolValue, ConversionError> {
    let coercion_error =
        || ConversionError::Coercion { value: value.to_string(), expected: ty.sol_type_name().into_owned() };
    match (ty, value) {
        (DynSolType::Bool, Value::Bool(b)) => Ok(DynSolValue::Bool(*b)),
        (DynSolType::Uint(bits), Value::Uint(u)) => Ok(DynSolValue::Uint(*u, *bits)),
        (DynSolType::Uint(bits), Value::Bytes(bytes)) => {
            U256::try_from_be_slice(bytes).map(|u| DynSolValue::Uint(u, *bits)).ok_or_else(coercion_error)
        }
        (DynSolType::Int(bits), Value::Int(i)) => Ok(DynSolValue::Int(*i, *bits)),
        (DynSolType::Address, Value::Address(address)) => Ok(DynSolValue::Address(*address)),
        (DynSolType::String, Value::String(s)) => Ok(DynSolValue::String(s.clone())),
        _ => Err(coercion_error()),
    }
}

/// Matches record fields to tuple components by name, or by position when the
/// components are unnamed.
fn record_to_tuple(record: &Record, types: &[DynSolType], components: &[Param]) -> Result<DynSolValue, ConversionError> {
    let named = components.len() == types.len() && components.iter().all(|param| !param.name.is_empty());
    if !named && record.len() != types.len() {
        return Err(ConversionError::Coercion {
            value: Value::Record(record.clone()).to_string(),
            expected: format!("tuple of {} fields", types.len()),
        });
    }

    let fields: Vec<(&str, &Value)> = record.iter().collect();
    let mut encoded = Vec::with_capacity(types.len());
    for (index, ty) in types.iter().enumerate() {
        let (value, nested) = if named {
            let param = &components[index];
            let value = record.get(&param.name).ok_or_else(|| ConversionError::MissingField(param.name.clone()))?;
            (value, param.components.as_slice())
        } else {
            let nested = components.get(index).map(|param| param.components.as_slice()).unwrap_or_default();
            (fields[index].1, nested)
        };
        encoded.push(value.to_sol(ty, nested)?);
    }
    Ok(DynSolValue::Tuple(encoded))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Uint(u) => write!(f, "{u}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Bytes(bytes) => write!(f, "{}", hex::encode_prefixed(bytes)),
            Value::Address(address) => write!(f, "{address}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Record(record) => {
                write!(f, "{{")?;
                for (index, (name, value)) in record.iter().enumerate() {
                    if index > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{name}:{value}")?;
                }
                write!(f, "}}")
            }
            Value::G1(point) => write!(f, "{}", Value::Record(point.to_record())),
            Value::G2(point) => write!(f, "{}", Value::Record(point.to_record())),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Address> for Value {
    fn from(address: Address) -> Self {
        Value::Address(address)
    }
}

impl From<U256> for Value {
    fn from(u: U256) -> Self {
        Value::Uint(u)
    }
}
