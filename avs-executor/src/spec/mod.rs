pub mod repository;

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::SpecError;
use repository::Repository;

/// Resource holding the specification document of an AVS.
pub const SPECIFICATION_RESOURCE: &str = "avs.json";

pub const REGISTER: &str = "register";
pub const OPT_IN: &str = "opt-in";
pub const OPT_OUT: &str = "opt-out";
pub const DEREGISTER: &str = "deregister";
pub const STATUS: &str = "status";

/// Message reported for declared operations that have no contract call.
pub const NOT_SUPPORTED_MESSAGE: &str = "not supported";

/// Declarative description of an AVS's on-chain interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specification {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub network: String,
    pub contract_address: String,
    #[serde(default)]
    pub coordinator_kind: String,
    #[serde(default)]
    pub remote_signing: bool,
    /// ABI resource of the primary contract
    pub abi: String,
    #[serde(default)]
    pub functions: BTreeMap<String, Function>,
    #[serde(default)]
    pub delegates: Vec<Delegate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    /// Contract method, either `method` or `delegate.method`
    #[serde(default, rename = "name")]
    pub contract_function: String,
    /// Key expressions, one per method input
    #[serde(default, rename = "parameters")]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub transform: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegate {
    pub name: String,
    pub abi: String,
    /// When absent, read from the primary contract's getter named after the delegate.
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub functions: Vec<Function>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionTarget<'a> {
    /// Declared without a contract call; only reports its message.
    Stub,
    Direct { method: &'a str },
    Delegate { delegate: &'a str, method: &'a str },
}

impl Function {
    pub fn target(&self) -> FunctionTarget<'_> {
        if self.contract_function.is_empty() {
            return FunctionTarget::Stub;
        }
        match self.contract_function.split_once('.') {
            Some((delegate, method)) => FunctionTarget::Delegate { delegate, method },
            None => FunctionTarget::Direct { method: &self.contract_function },
        }
    }

    pub fn user_message(&self) -> &str {
        if self.message.is_empty() {
            NOT_SUPPORTED_MESSAGE
        } else {
            &self.message
        }
    }

    pub fn transform(&self) -> Option<&str> {
        Some(self.transform.trim()).filter(|transform| !transform.is_empty())
    }

    fn validate(&self, label: &str) -> Result<(), SpecError> {
        let function = label.to_string();
        match (self.contract_function.is_empty(), self.message.is_empty()) {
            (false, false) => return Err(SpecError::AmbiguousTarget { function }),
            (true, true) => return Err(SpecError::MissingTarget { function }),
            (true, false) if !self.parameters.is_empty() => {
                return Err(SpecError::ParametersWithoutTarget { function })
            }
            _ => {}
        }
        let valid_name = self.contract_function.split('.').count() <= 2
            && self.contract_function.split('.').all(|part| self.contract_function.is_empty() || !part.is_empty());
        if !valid_name {
            return Err(SpecError::InvalidFunctionName { function, name: self.contract_function.clone() });
        }
        Ok(())
    }
}

impl Delegate {
    /// The delegate's own declaration of `method`, if any.
    pub fn function(&self, method: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.contract_function == method)
    }
}

impl Specification {
    /// Loads and validates the specification named `name`.
    pub fn load(repository: &dyn Repository, name: &str) -> Result<Self, SpecError> {
        let bytes = repository
            .load_resource(name, SPECIFICATION_RESOURCE)
            .map_err(|source| SpecError::Load { name: name.to_string(), source })?;
        Self::from_slice(name, &bytes)
    }

    pub fn from_slice(name: &str, bytes: &[u8]) -> Result<Self, SpecError> {
        let spec: Specification =
            serde_json::from_slice(bytes).map_err(|source| SpecError::Decode { name: name.to_string(), source })?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        parse_address(&self.contract_address)?;

        let mut names = HashSet::new();
        for (index, delegate) in self.delegates.iter().enumerate() {
            if delegate.name.is_empty() {
                return Err(SpecError::UnnamedDelegate(index));
            }
            if !names.insert(delegate.name.as_str()) {
                return Err(SpecError::DuplicateDelegate(delegate.name.clone()));
            }
            if let Some(address) = &delegate.contract_address {
                parse_address(address)?;
            }
            for function in &delegate.functions {
                let label = format!("{}.{}", delegate.name, function.contract_function);
                function.validate(&label)?;
                if function.contract_function.contains('.') {
                    return Err(SpecError::InvalidFunctionName {
                        function: label,
                        name: function.contract_function.clone(),
                    });
                }
            }
        }

        for (operation, function) in &self.functions {
            function.validate(operation)?;
            if let FunctionTarget::Delegate { delegate, .. } = function.target() {
                if !names.contains(delegate) {
                    return Err(SpecError::UnknownDelegate {
                        function: operation.clone(),
                        delegate: delegate.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn address(&self) -> Result<Address, SpecError> {
        parse_address(&self.contract_address)
    }

    pub fn delegate(&self, name: &str) -> Option<&Delegate> {
        self.delegates.iter().find(|delegate| delegate.name == name)
    }
}

pub fn parse_address(address: &str) -> Result<Address, SpecError> {
    Address::from_str(address.trim())
        .map_err(|e| SpecError::InvalidAddress { address: address.to_string(), reason: e.to_string() })
}
