//! Coerces loosely typed values into fixed-width contract parameter types.

use std::fmt;
use std::str::FromStr;

use alloy::dyn_abi::DynSolType;
use alloy::primitives::{Address, I256, U256};

use crate::error::ConversionError;
use crate::value::Value;

/// Width of the unsized `int` / `uint` kind names.
const DEFAULT_INTEGER_BITS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Bool,
    Int(usize),
    Uint(usize),
    String,
    Address,
}

impl Kind {
    /// The kind driving conversion for a primitive ABI type; `None` for composite types.
    pub fn for_sol_type(ty: &DynSolType) -> Option<Kind> {
        match ty {
            DynSolType::Bool => Some(Kind::Bool),
            DynSolType::Int(bits) => Some(Kind::Int(*bits)),
            DynSolType::Uint(bits) => Some(Kind::Uint(*bits)),
            DynSolType::String => Some(Kind::String),
            DynSolType::Address => Some(Kind::Address),
            _ => None,
        }
    }
}

impl FromStr for Kind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_bits = |digits: &str| -> Result<usize, ConversionError> {
            if digits.is_empty() {
                return Ok(DEFAULT_INTEGER_BITS);
            }
            match digits.parse::<usize>() {
                Ok(bits) if bits % 8 == 0 && (8..=256).contains(&bits) => Ok(bits),
                _ => Err(ConversionError::UnsupportedKind(s.to_string())),
            }
        };
        match s {
            "bool" => Ok(Kind::Bool),
            "string" => Ok(Kind::String),
            "address" => Ok(Kind::Address),
            _ => {
                if let Some(digits) = s.strip_prefix("uint") {
                    Ok(Kind::Uint(parse_bits(digits)?))
                } else if let Some(digits) = s.strip_prefix("int") {
                    Ok(Kind::Int(parse_bits(digits)?))
                } else {
                    Err(ConversionError::UnsupportedKind(s.to_string()))
                }
            }
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Bool => write!(f, "bool"),
            Kind::Int(bits) => write!(f, "int{bits}"),
            Kind::Uint(bits) => write!(f, "uint{bits}"),
            Kind::String => write!(f, "string"),
            Kind::Address => write!(f, "address"),
        }
    }
}

/// Converts by kind name, e.g. `convert_named(v, "uint8")`.
pub fn convert_named(value: Value, kind: &str) -> Result<Value, ConversionError> {
    convert(value, kind.parse()?)
}

/// Numeric and string inputs are stringified and parsed into `kind`. Any other
/// input passes through unchanged.
pub fn convert(value: Value, kind: Kind) -> Result<Value, ConversionError> {
    let text = match &value {
        Value::String(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Uint(u) => u.to_string(),
        Value::Bool(b) if kind == Kind::Bool || kind == Kind::String => b.to_string(),
        Value::Address(address) if kind == Kind::String => address.to_string(),
        _ => return Ok(value),
    };

    let parse_error =
        |reason: String| ConversionError::Parse { value: text.clone(), kind: kind.to_string(), reason };

    match kind {
        Kind::Bool => match text.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(parse_error("not a boolean".to_string())),
        },
        Kind::Uint(bits) => parse_uint(&text, bits).map(Value::Uint).map_err(parse_error),
        Kind::Int(bits) => parse_int(&text, bits).map(Value::Int).map_err(parse_error),
        Kind::String => Ok(Value::String(text)),
        // Hex-formatted strings parse straight into an address.
        Kind::Address => Address::from_str(text.trim()).map(Value::Address).map_err(|e| parse_error(e.to_string())),
    }
}

fn parse_uint(text: &str, bits: usize) -> Result<U256, String> {
    // Base-10 digits only; `from_str` alone would accept a leading `+`.
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err("not a base-10 unsigned integer".to_string());
    }
    let parsed = match bits {
        8 => u8::from_str(text).map(U256::from).map_err(|e| e.to_string())?,
        16 => u16::from_str(text).map(U256::from).map_err(|e| e.to_string())?,
        32 => u32::from_str(text).map(U256::from).map_err(|e| e.to_string())?,
        64 => u64::from_str(text).map(U256::from).map_err(|e| e.to_string())?,
        _ => U256::from_str_radix(text, 10).map_err(|e| e.to_string())?,
    };
    if parsed.bit_len() > bits {
        return Err(format!("value out of range for uint{bits}"));
    }
    Ok(parsed)
}

fn parse_int(text: &str, bits: usize) -> Result<I256, String> {
    let narrow = match bits {
        8 => Some(i8::from_str(text).map(i64::from)),
        16 => Some(i16::from_str(text).map(i64::from)),
        32 => Some(i32::from_str(text).map(i64::from)),
        64 => Some(i64::from_str(text)),
        _ => None,
    };
    let parsed = match narrow {
        Some(result) => {
            let value = result.map_err(|e| e.to_string())?;
            I256::try_from(value).map_err(|e| e.to_string())?
        }
        None => I256::from_dec_str(text).map_err(|e| e.to_string())?,
    };
    if bits < 256 {
        let limit = U256::from(1) << (bits - 1);
        let magnitude = parsed.unsigned_abs();
        if (parsed.is_negative() && magnitude > limit) || (!parsed.is_negative() && magnitude >= limit) {
            return Err(format!("value out of range for int{bits}"));
        }
    }
    Ok(parsed)
}

/// Reads a converted `int64` value.
pub fn to_i64(value: &Value) -> Result<i64, ConversionError> {
    match convert(value.clone(), Kind::Int(64))? {
        Value::Int(i) => i64::try_from(i).map_err(|e| ConversionError::Parse {
            value: i.to_string(),
            kind: "int64".to_string(),
            reason: e.to_string(),
        }),
        other => Err(ConversionError::Coercion { value: other.to_string(), expected: "int64".to_string() }),
    }
}
