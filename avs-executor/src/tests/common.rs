use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use alloy::dyn_abi::{DynSolValue, JsonAbiExt};
use alloy::json_abi::JsonAbi;
use alloy::primitives::{address, Address, Bytes};
use serde_json::json;

use crate::chain::MockChainClient;
use crate::config::MockConfiguration;
use crate::controller::{Collaborators, ExecutionController};
use crate::signer::MockSigner;
use crate::spec::repository::{Repository, RepositoryError};
use crate::spec::Specification;
use crate::transaction::MockTransactionManager;

pub const AVS: &str = "eigenlayer";
pub const SERVICE_MANAGER_RESOURCE: &str = "service_manager.json";
pub const AVS_DIRECTORY_RESOURCE: &str = "avs_directory.json";

pub const PRIMARY: Address = address!("0000000000000000000000000000000000000a11");
pub const DIRECTORY: Address = address!("00000000000000000000000000000000000000d1");
pub const OPERATOR: Address = address!("00000000000000000000000000000000000000b0");

pub fn service_manager_abi() -> serde_json::Value {
    json!([
        {
            "type": "function", "name": "registerOperatorToAVS", "stateMutability": "nonpayable",
            "inputs": [
                {"name": "operator", "type": "address"},
                {"name": "operatorSignature", "type": "tuple", "components": [
                    {"name": "signature", "type": "bytes"},
                    {"name": "salt", "type": "bytes32"},
                    {"name": "expiry", "type": "uint256"}
                ]}
            ],
            "outputs": []
        },
        {
            "type": "function", "name": "deregisterOperatorFromAVS", "stateMutability": "nonpayable",
            "inputs": [{"name": "operator", "type": "address"}], "outputs": []
        },
        {
            "type": "function", "name": "updateOperatorWindow", "stateMutability": "nonpayable",
            "inputs": [{"name": "expiry", "type": "uint256"}, {"name": "deadline", "type": "uint256"}],
            "outputs": []
        },
        {
            "type": "function", "name": "avsDirectory", "stateMutability": "view",
            "inputs": [], "outputs": [{"name": "", "type": "address"}]
        },
        {
            "type": "function", "name": "quorumCount", "stateMutability": "view",
            "inputs": [], "outputs": [{"name": "", "type": "uint8"}]
        },
        {
            "type": "function", "name": "operatorInfo", "stateMutability": "view",
            "inputs": [{"name": "operator", "type": "address"}],
            "outputs": [{"name": "", "type": "tuple", "components": [
                {"name": "status", "type": "uint8"},
                {"name": "stake", "type": "uint96"}
            ]}]
        }
    ])
}

pub fn avs_directory_abi() -> serde_json::Value {
    json!([
        {
            "type": "function", "name": "avsOperatorStatus", "stateMutability": "view",
            "inputs": [{"name": "avs", "type": "address"}, {"name": "operator", "type": "address"}],
            "outputs": [{"name": "", "type": "uint8"}]
        },
        {
            "type": "function", "name": "calculateOperatorAVSRegistrationDigestHash", "stateMutability": "view",
            "inputs": [
                {"name": "operator", "type": "address"},
                {"name": "avs", "type": "address"},
                {"name": "salt", "type": "bytes32"},
                {"name": "expiry", "type": "uint256"}
            ],
            "outputs": [{"name": "", "type": "bytes32"}]
        }
    ])
}

pub fn parsed_abi(abi: serde_json::Value) -> JsonAbi {
    serde_json::from_value(abi).unwrap()
}

/// Selector of the first overload of `method`.
pub fn selector(abi: &serde_json::Value, method: &str) -> [u8; 4] {
    parsed_abi(abi.clone()).function(method).unwrap()[0].selector().0
}

/// Encodes return data the way a contract would.
pub fn encode_outputs(values: Vec<DynSolValue>) -> Bytes {
    DynSolValue::Tuple(values).abi_encode_params().into()
}

pub fn decode_calldata(abi: &serde_json::Value, method: &str, calldata: &[u8]) -> Vec<DynSolValue> {
    let abi = parsed_abi(abi.clone());
    abi.function(method).unwrap()[0].abi_decode_input(&calldata[4..]).unwrap()
}

/// Serves the fixture ABIs for [`AVS`].
pub struct InMemoryRepository {
    resources: HashMap<(String, String), Vec<u8>>,
}

impl InMemoryRepository {
    pub fn with_fixture_abis() -> Self {
        let mut resources = HashMap::new();
        for (resource, abi) in
            [(SERVICE_MANAGER_RESOURCE, service_manager_abi()), (AVS_DIRECTORY_RESOURCE, avs_directory_abi())]
        {
            resources.insert((AVS.to_string(), resource.to_string()), serde_json::to_vec(&abi).unwrap());
        }
        Self { resources }
    }
}

impl Repository for InMemoryRepository {
    fn load_resource(&self, name: &str, resource: &str) -> Result<Vec<u8>, RepositoryError> {
        self.resources
            .get(&(name.to_string(), resource.to_string()))
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound { name: name.to_string(), resource: resource.to_string() })
    }
}

/// A specification for [`AVS`] bound to [`PRIMARY`].
pub fn specification(functions: serde_json::Value, delegates: serde_json::Value) -> Specification {
    let document = json!({
        "name": AVS,
        "description": "EigenLayer test AVS",
        "network": "holesky",
        "contractAddress": PRIMARY.to_string(),
        "coordinatorKind": "none",
        "remoteSigning": false,
        "abi": SERVICE_MANAGER_RESOURCE,
        "functions": functions,
        "delegates": delegates,
    });
    Specification::from_slice(AVS, &serde_json::to_vec(&document).unwrap()).unwrap()
}

/// Collaborator mocks. Expectations are set on the public fields before
/// [`TestContext::controller`] consumes them.
pub struct TestContext {
    pub chain: MockChainClient,
    pub transactions: MockTransactionManager,
    pub signer: MockSigner,
    pub configuration: MockConfiguration,
    pub config_values: BTreeMap<String, serde_json::Value>,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            chain: MockChainClient::new(),
            transactions: MockTransactionManager::new(),
            signer: MockSigner::new(),
            configuration: MockConfiguration::new(),
            config_values: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, key: &str, value: serde_json::Value) -> Self {
        self.config_values.insert(key.to_string(), value);
        self
    }

    /// Every contract the test binds has code deployed.
    pub fn with_deployed_contracts(mut self) -> Self {
        self.chain.expect_has_code().returning(|_| Ok(true));
        self
    }

    pub fn controller(mut self, spec: Specification) -> ExecutionController {
        let values = self.config_values.clone();
        self.configuration.expect_get_all().returning(move || values.clone());
        let values = self.config_values;
        self.configuration.expect_get().returning(move |key| values.get(key).cloned());

        ExecutionController::new(
            spec,
            Collaborators {
                repository: Arc::new(InMemoryRepository::with_fixture_abis()),
                configuration: Arc::new(self.configuration),
                chain: Arc::new(self.chain),
                transactions: Arc::new(self.transactions),
                signer: Arc::new(self.signer),
            },
        )
    }
}
