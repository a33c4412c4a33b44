use alloy::primitives::{keccak256, U256};

use super::{FunctionCall, LAST_EXPIRY_KEY, LAST_SALT_KEY};
use crate::controller::ExecutionController;
use crate::converter::{self, Kind};
use crate::error::ExecutorResult;
use crate::value::Value;

/// Seconds added on top of the requested timeout, covering the time the
/// transaction spends between signing and inclusion.
pub const EXPIRY_MARGIN_SECS: u64 = 60;

/// `array_uint8(list=...)`: comma separated integers into a uint8 array.
pub(super) async fn array_uint8(call: &FunctionCall, ctl: &mut ExecutionController) -> ExecutorResult<Value> {
    let list = call.required_string(ctl, "list").await?;
    let items = list
        .split(',')
        .map(|item| converter::convert(Value::String(item.trim().to_string()), Kind::Uint(8)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(items))
}

pub(super) async fn chain_id(ctl: &mut ExecutionController) -> ExecutorResult<Value> {
    let chain_id = ctl.chain().chain_id().await?;
    Ok(Value::Uint(U256::from(chain_id)))
}

/// `expiry(timeout=...)`: latest block timestamp plus the timeout and a fixed margin.
pub(super) async fn expiry(call: &FunctionCall, ctl: &mut ExecutionController) -> ExecutorResult<Value> {
    let timeout = match call.required(ctl, "timeout", Some(Kind::Uint(64))).await? {
        Value::Uint(timeout) => u64::try_from(timeout).map_err(|e| call.invalid("timeout", e.to_string()))?,
        _ => return Err(call.type_mismatch("timeout", "an unsigned integer").into()),
    };
    let timestamp = ctl.chain().latest_block_timestamp().await?;
    let expiry = Value::Uint(U256::from(timestamp.saturating_add(timeout).saturating_add(EXPIRY_MARGIN_SECS)));

    tracing::debug!(timestamp, timeout, expiry = %expiry, "Computed signature expiry");
    ctl.cache_mut().store(LAST_EXPIRY_KEY, expiry.clone());
    Ok(expiry)
}

/// `salt(seed=...)`: keccak256 over the seed and the current time in nanoseconds.
pub(super) async fn salt(call: &FunctionCall, ctl: &mut ExecutionController) -> ExecutorResult<Value> {
    let seed = match call.optional(ctl, "seed", None).await? {
        Some(seed) => seed.to_bytes()?,
        None => Vec::new(),
    };
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();

    let mut preimage = seed;
    preimage.extend_from_slice(&nanos.to_be_bytes());
    let salt = Value::Bytes(keccak256(&preimage).to_vec());

    ctl.cache_mut().store(LAST_SALT_KEY, salt.clone());
    Ok(salt)
}
