use std::sync::Arc;

use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::Address;

use crate::error::{ExecutorError, ExecutorResult};

/// A contract ABI bound to a deployed address.
#[derive(Debug, Clone)]
pub struct BoundContract {
    pub name: String,
    pub address: Address,
    abi: Arc<JsonAbi>,
}

impl BoundContract {
    pub fn new(name: impl Into<String>, address: Address, abi: Arc<JsonAbi>) -> Self {
        Self { name: name.into(), address, abi }
    }

    /// Looks up `method`, choosing among overloads by argument count when known.
    pub fn method(&self, method: &str, arity: Option<usize>) -> ExecutorResult<&Function> {
        let overloads = self.abi.function(method).filter(|overloads| !overloads.is_empty()).ok_or_else(|| {
            ExecutorError::MethodNotFound { contract: self.name.clone(), method: method.to_string() }
        })?;

        let Some(arity) = arity else {
            return Ok(&overloads[0]);
        };
        overloads.iter().find(|function| function.inputs.len() == arity).ok_or_else(|| {
            ExecutorError::ParameterCount {
                method: overloads[0].signature(),
                expected: overloads[0].inputs.len(),
                actual: arity,
            }
        })
    }
}

/// Parses an ABI resource, accepting either a bare ABI array or a compiler
/// artifact carrying it under `abi`.
pub fn parse_abi(resource: &str, bytes: &[u8]) -> ExecutorResult<JsonAbi> {
    let abi_error = |reason: String| ExecutorError::AbiLoad { resource: resource.to_string(), reason };

    let document: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| abi_error(e.to_string()))?;
    let abi = match document {
        serde_json::Value::Object(mut artifact) => {
            artifact.remove("abi").ok_or_else(|| abi_error("artifact has no abi field".to_string()))?
        }
        other => other,
    };
    serde_json::from_value(abi).map_err(|e| abi_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn overloaded_abi() -> Vec<u8> {
        serde_json::to_vec(&json!([
            {"type": "function", "name": "status", "stateMutability": "view",
             "inputs": [], "outputs": [{"name": "", "type": "uint8"}]},
            {"type": "function", "name": "status", "stateMutability": "view",
             "inputs": [{"name": "operator", "type": "address"}], "outputs": [{"name": "", "type": "uint8"}]}
        ]))
        .unwrap()
    }

    #[test]
    fn selects_overload_by_arity() {
        let abi = Arc::new(parse_abi("abi.json", &overloaded_abi()).unwrap());
        let contract = BoundContract::new("directory", Address::ZERO, abi);

        assert_eq!(contract.method("status", Some(1)).unwrap().inputs.len(), 1);
        assert_eq!(contract.method("status", Some(0)).unwrap().inputs.len(), 0);
        assert_matches!(contract.method("status", Some(3)), Err(ExecutorError::ParameterCount { actual: 3, .. }));
        assert_matches!(contract.method("register", None), Err(ExecutorError::MethodNotFound { .. }));
    }

    #[test]
    fn accepts_compiler_artifacts() {
        let artifact = serde_json::to_vec(&json!({
            "contractName": "Directory",
            "abi": serde_json::from_slice::<serde_json::Value>(&overloaded_abi()).unwrap(),
        }))
        .unwrap();

        assert!(parse_abi("Directory.json", &artifact).unwrap().function("status").is_some());
        assert_matches!(parse_abi("broken.json", b"{\"bytecode\": \"0x\"}"), Err(ExecutorError::AbiLoad { .. }));
    }
}
