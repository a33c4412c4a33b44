use std::path::PathBuf;
use std::str::FromStr;

use alloy::primitives::U256;

use super::FunctionCall;
use crate::controller::ExecutionController;
use crate::converter::Kind;
use crate::error::{ExecutorError, ExecutorResult};
use crate::signer::{KeyDescriptor, KeyScheme, KeySourceType, PublicKey, Signature, SignerError, SigningDigest};
use crate::value::{G1Point, Record, Value};

/// Resolves `type`, `file` and `password` into a key descriptor.
async fn key_descriptor(
    call: &FunctionCall,
    ctl: &mut ExecutionController,
    scheme: KeyScheme,
) -> ExecutorResult<KeyDescriptor> {
    let source = match call.optional_string(ctl, "type").await? {
        Some(source) => KeySourceType::from_str(&source).map_err(|_| call.invalid("type", source))?,
        None => KeySourceType::Local,
    };
    let file = call.required_string(ctl, "file").await?;
    let password = call.optional_string(ctl, "password").await?.unwrap_or_default();
    Ok(KeyDescriptor { scheme, source, file: PathBuf::from(file), password })
}

pub(super) async fn ecdsa_public_key(call: &FunctionCall, ctl: &mut ExecutionController) -> ExecutorResult<Value> {
    let key = key_descriptor(call, ctl, KeyScheme::Ecdsa).await?;
    let format = call.optional_string(ctl, "format").await?;

    let PublicKey::Ecdsa { address } = ctl.signer().public_key(&key).await? else {
        return Err(unexpected_key(KeyScheme::Ecdsa));
    };
    match format.as_deref().unwrap_or("address") {
        "address" => Ok(Value::Address(address)),
        "hex" => Ok(Value::String(address.to_string())),
        "bytes" => Ok(Value::Bytes(address.to_vec())),
        other => Err(call.invalid("format", format!("unknown ecdsa key format {other}")).into()),
    }
}

pub(super) async fn bls_public_key(call: &FunctionCall, ctl: &mut ExecutionController) -> ExecutorResult<Value> {
    let key = key_descriptor(call, ctl, KeyScheme::Bls).await?;
    let format = call.optional_string(ctl, "format").await?;

    let PublicKey::Bls { g1, g2 } = ctl.signer().public_key(&key).await? else {
        return Err(unexpected_key(KeyScheme::Bls));
    };
    match format.as_deref().unwrap_or("g1") {
        "g1" => Ok(Value::G1(g1)),
        "g2" => Ok(Value::G2(g2)),
        "bytes" => Ok(Value::Bytes(g1_bytes(&g1))),
        other => Err(call.invalid("format", format!("unknown bls key format {other}")).into()),
    }
}

/// `ecdsa_sign(...)`: `{signature, salt, expiry}`, salt and expiry present
/// only when given.
pub(super) async fn ecdsa_sign(call: &FunctionCall, ctl: &mut ExecutionController) -> ExecutorResult<Value> {
    let (salt, expiry) = salt_and_expiry(call, ctl).await?;
    let digest = call.required(ctl, "digest", None).await?;
    let digest = SigningDigest::Hash(digest.to_b256()?);
    let key = key_descriptor(call, ctl, KeyScheme::Ecdsa).await?;

    let signature = match ctl.signer().sign(&key, &digest).await? {
        Signature::Ecdsa(bytes) => Value::Bytes(bytes),
        Signature::Bls(_) => return Err(unexpected_signature(KeyScheme::Ecdsa)),
    };
    Ok(Value::Record(signature_record(signature, salt, expiry)))
}

/// `bls_sign(...)`: `{signature, salt, expiry}` with the G1 signature packed as 64 bytes.
pub(super) async fn bls_sign(call: &FunctionCall, ctl: &mut ExecutionController) -> ExecutorResult<Value> {
    let (salt, expiry) = salt_and_expiry(call, ctl).await?;
    let digest = bls_digest(call, ctl).await?;
    let key = key_descriptor(call, ctl, KeyScheme::Bls).await?;

    let signature = match ctl.signer().sign(&key, &digest).await? {
        Signature::Bls(point) => Value::Bytes(g1_bytes(&point)),
        Signature::Ecdsa(_) => return Err(unexpected_signature(KeyScheme::Bls)),
    };
    Ok(Value::Record(signature_record(signature, salt, expiry)))
}

/// `bls_curve_sign(...)`: the signature and both public keys as curve points,
/// the shape BLS pubkey registration expects.
pub(super) async fn bls_curve_sign(call: &FunctionCall, ctl: &mut ExecutionController) -> ExecutorResult<Value> {
    let (salt, expiry) = salt_and_expiry(call, ctl).await?;
    let digest = bls_digest(call, ctl).await?;
    let key = key_descriptor(call, ctl, KeyScheme::Bls).await?;

    let signature = match ctl.signer().sign(&key, &digest).await? {
        Signature::Bls(point) => point,
        Signature::Ecdsa(_) => return Err(unexpected_signature(KeyScheme::Bls)),
    };
    let PublicKey::Bls { g1, g2 } = ctl.signer().public_key(&key).await? else {
        return Err(unexpected_key(KeyScheme::Bls));
    };

    let mut record = signature_record(Value::G1(signature), salt, expiry);
    record.insert("pubkeyG1", Value::G1(g1));
    record.insert("pubkeyG2", Value::G2(g2));
    Ok(Value::Record(record))
}

async fn salt_and_expiry(
    call: &FunctionCall,
    ctl: &mut ExecutionController,
) -> ExecutorResult<(Option<Value>, Option<Value>)> {
    let salt = call.optional(ctl, "salt", None).await?;
    let expiry = call.optional(ctl, "expiry", Some(Kind::Uint(256))).await?;
    Ok((salt, expiry))
}

/// A digest that resolves to a curve point is signed as is; anything else
/// must be a 32-byte hash.
async fn bls_digest(call: &FunctionCall, ctl: &mut ExecutionController) -> ExecutorResult<SigningDigest> {
    match call.required(ctl, "digest", None).await? {
        Value::G1(point) => Ok(SigningDigest::G1(point)),
        Value::Record(record) => match (record.get("X"), record.get("Y")) {
            (Some(Value::Uint(x)), Some(Value::Uint(y))) => Ok(SigningDigest::G1(G1Point::new(*x, *y))),
            _ => Err(call.type_mismatch("digest", "a G1 point or a 32-byte hash").into()),
        },
        other => Ok(SigningDigest::Hash(other.to_b256()?)),
    }
}

fn signature_record(signature: Value, salt: Option<Value>, expiry: Option<Value>) -> Record {
    let mut record = Record::new();
    record.insert("signature", signature);
    if let Some(salt) = salt {
        record.insert("salt", salt);
    }
    if let Some(expiry) = expiry {
        record.insert("expiry", expiry);
    }
    record
}

fn g1_bytes(point: &G1Point) -> Vec<u8> {
    [point.x, point.y].iter().flat_map(U256::to_be_bytes::<32>).collect()
}

fn unexpected_key(scheme: KeyScheme) -> ExecutorError {
    SignerError::Signing(format!("signer returned a public key that is not {scheme}")).into()
}

fn unexpected_signature(scheme: KeyScheme) -> ExecutorError {
    SignerError::Signing(format!("signer returned a signature that is not {scheme}")).into()
}
