//! Runs the operations a specification declares.
//!
//! The controller owns the resolution cache and every collaborator. Resolution
//! is recursive (a `func:` parameter may itself be a `call:` that needs a
//! delegate address, which is another `call:`), so [`ExecutionController::load`]
//! returns a boxed future.

pub mod contract;

use std::collections::HashMap;
use std::sync::Arc;

use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt, Specifier};
use alloy::json_abi::{Function as AbiFunction, JsonAbi, Param};
use alloy::primitives::Address;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::cache::{
    split_invocation, split_top_level, KeyExpression, KeySource, ResolutionCache, CALL_PREFIX, CONFIG_PREFIX,
    SPEC_PREFIX,
};
use crate::chain::ChainClient;
use crate::config::Configuration;
use crate::converter::{self, Kind};
use crate::error::{ConversionError, ExecutorError, ExecutorResult, ResolutionError};
use crate::functions::FunctionCall;
use crate::signer::Signer;
use crate::spec::repository::Repository;
use crate::spec::{
    parse_address, Delegate, Function, FunctionTarget, Specification, DEREGISTER, OPT_IN, OPT_OUT, REGISTER, STATUS,
};
use crate::transaction::{ContractTransaction, TransactionManager, TransactionOutcome};
use crate::transform::transform;
use crate::value::Value;
use contract::{parse_abi, BoundContract};

/// External capabilities the controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub repository: Arc<dyn Repository>,
    pub configuration: Arc<dyn Configuration>,
    pub chain: Arc<dyn ChainClient>,
    pub transactions: Arc<dyn TransactionManager>,
    pub signer: Arc<dyn Signer>,
}

/// Result of a public operation. A declared operation without a contract
/// call is not a failure; it completes with its message.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Unsupported(String),
    Completed(T),
}

struct CallTarget {
    contract: BoundContract,
    method: String,
    parameters: Vec<String>,
    transform: Option<String>,
}

pub struct ExecutionController {
    spec: Specification,
    collaborators: Collaborators,
    cache: ResolutionCache,
    abis: HashMap<String, Arc<JsonAbi>>,
    primary: Option<BoundContract>,
    delegates: HashMap<String, BoundContract>,
}

impl ExecutionController {
    /// Seeds the cache with the specification's fields under `spec:` and every
    /// configuration value under `config:`.
    pub fn new(spec: Specification, collaborators: Collaborators) -> Self {
        let mut cache = ResolutionCache::new();
        match serde_json::to_value(&spec) {
            Ok(document) => cache.seed_json(SPEC_PREFIX, document),
            Err(e) => warn!(error = %e, "Failed to seed specification fields"),
        }
        for (key, value) in collaborators.configuration.get_all() {
            cache.store(format!("{CONFIG_PREFIX}{key}"), Value::from_json(value));
        }
        debug!(avs = %spec.name, entries = cache.len(), "Resolution cache seeded");

        Self {
            spec,
            collaborators,
            cache,
            abis: HashMap::new(),
            primary: None,
            delegates: HashMap::new(),
        }
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub(crate) fn cache_mut(&mut self) -> &mut ResolutionCache {
        &mut self.cache
    }

    pub(crate) fn chain(&self) -> &dyn ChainClient {
        self.collaborators.chain.as_ref()
    }

    pub(crate) fn signer(&self) -> &dyn Signer {
        self.collaborators.signer.as_ref()
    }

    /// Resolves a key expression, converts it to `expected` and enforces `required`.
    ///
    /// Cached values skip resolution but are still converted. Empty values
    /// are never converted.
    pub fn load<'a>(
        &'a mut self,
        key: &'a str,
        expected: Option<Kind>,
        required: bool,
    ) -> BoxFuture<'a, ExecutorResult<Value>> {
        async move {
            let value = match self.cache.get(key) {
                Some(value) => {
                    debug!(key, "Resolution cache hit");
                    value.clone()
                }
                None => self.resolve(key, required).await.map_err(|e| ExecutorError::resolution(key, e))?,
            };

            if value.is_empty() {
                if required {
                    let missing = ResolutionError::RequiredValueMissing(key.to_string());
                    return Err(ExecutorError::resolution(key, missing.into()));
                }
                return Ok(value);
            }
            match expected {
                Some(kind) => converter::convert(value, kind).map_err(|e| ExecutorError::resolution(key, e.into())),
                None => Ok(value),
            }
        }
        .boxed()
    }

    async fn resolve(&mut self, key: &str, required: bool) -> ExecutorResult<Value> {
        let expression = KeyExpression::parse(key)?;
        let value = match expression.source {
            KeySource::Call(payload) => self.read_call(payload).await?,
            KeySource::Config(name) => match self.collaborators.configuration.get(name) {
                Some(value) => Value::from_json(value),
                None => Value::String(self.collaborators.configuration.prompt(name, required, false)?),
            },
            KeySource::Passwd(name) => Value::String(self.collaborators.configuration.prompt(name, required, true)?),
            KeySource::Const(literal) => Value::String(literal.to_string()),
            KeySource::Func(payload) => FunctionCall::parse(payload)?.invoke(self).await?,
            KeySource::Bare(name) => return Err(ResolutionError::InvalidKeyFormat(name.to_string()).into()),
        };

        let value = match expression.transform {
            Some(expr) => transform(value, expr)?,
            None => value,
        };
        if expression.is_cacheable() {
            self.cache.memoize(key, value.clone());
        }
        debug!(key, kind = value.type_name(), "Resolved key");
        Ok(value)
    }

    /// `call:` payloads: `[delegate.]method[(expr,...)]`, returning the first output.
    async fn read_call(&mut self, payload: &str) -> ExecutorResult<Value> {
        let (target, arguments): (&str, Vec<String>) = match split_invocation(payload) {
            Some((target, args)) => (target, split_top_level(args).into_iter().map(str::to_string).collect()),
            None => (payload.trim(), Vec::new()),
        };
        let (contract, method) = match target.split_once('.') {
            Some((delegate, method)) => (self.bind_delegate(delegate).await?, method),
            None => (self.bind_primary().await?, target),
        };
        self.read(&contract, method, &arguments).await
    }

    async fn read(&mut self, contract: &BoundContract, method: &str, arguments: &[String]) -> ExecutorResult<Value> {
        let function = contract.method(method, Some(arguments.len()))?.clone();
        let signature = function.signature();
        let calldata = self.encode(&function, arguments).await?;

        debug!(contract = %contract.name, address = %contract.address, method = %signature, "Calling contract");
        let output = self.collaborators.chain.call(contract.address, calldata.into()).await?;

        let decoded = function
            .abi_decode_output(output.as_ref())
            .map_err(|e| ExecutorError::Decode { method: signature.clone(), reason: e.to_string() })?;
        let first = decoded
            .into_iter()
            .next()
            .ok_or_else(|| ExecutorError::Decode { method: signature, reason: "method returned no values".to_string() })?;
        let components = function.outputs.first().map(|output| output.components.as_slice()).unwrap_or_default();
        Ok(Value::from_sol(first, components))
    }

    /// Resolves every argument against the method's declared inputs, in order, and encodes the call.
    async fn encode(&mut self, function: &AbiFunction, arguments: &[String]) -> ExecutorResult<Vec<u8>> {
        let method = function.signature();
        if function.inputs.len() != arguments.len() {
            return Err(ExecutorError::ParameterCount {
                method,
                expected: function.inputs.len(),
                actual: arguments.len(),
            });
        }

        let mut values = Vec::with_capacity(arguments.len());
        for (index, (param, expression)) in function.inputs.iter().zip(arguments).enumerate() {
            let value = self.map_parameter(param, expression).await.map_err(|source| {
                ExecutorError::ParameterMapping { method: method.clone(), index, source: Box::new(source) }
            })?;
            values.push(value);
        }
        function.abi_encode_input(&values).map_err(|e| ExecutorError::Encode { method, reason: e.to_string() })
    }

    async fn map_parameter(&mut self, param: &Param, expression: &str) -> ExecutorResult<DynSolValue> {
        let ty = param
            .resolve()
            .map_err(|e| ExecutorError::Encode { method: param.ty.clone(), reason: e.to_string() })?;
        let value = self.load(expression, Kind::for_sol_type(&ty), true).await?;
        Ok(value.to_sol(&ty, &param.components)?)
    }

    fn load_abi(&mut self, resource: &str) -> ExecutorResult<Arc<JsonAbi>> {
        if let Some(abi) = self.abis.get(resource) {
            return Ok(abi.clone());
        }
        let bytes = self
            .collaborators
            .repository
            .load_resource(&self.spec.name, resource)
            .map_err(|e| ExecutorError::AbiLoad { resource: resource.to_string(), reason: e.to_string() })?;
        let abi = Arc::new(parse_abi(resource, &bytes)?);
        self.abis.insert(resource.to_string(), abi.clone());
        Ok(abi)
    }

    async fn bind(&self, name: &str, address: Address, abi: Arc<JsonAbi>) -> ExecutorResult<BoundContract> {
        let bind_error =
            |reason: String| ExecutorError::Bind { contract: name.to_string(), address: address.to_string(), reason };

        let deployed = self.collaborators.chain.has_code(address).await.map_err(|e| bind_error(e.to_string()))?;
        if !deployed {
            return Err(bind_error("no contract code at address".to_string()));
        }
        debug!(contract = name, %address, "Bound contract");
        Ok(BoundContract::new(name, address, abi))
    }

    async fn bind_primary(&mut self) -> ExecutorResult<BoundContract> {
        if let Some(contract) = &self.primary {
            return Ok(contract.clone());
        }
        let address = self.spec.address()?;
        let resource = self.spec.abi.clone();
        let abi = self.load_abi(&resource)?;
        let contract = self.bind(&self.spec.name, address, abi).await?;
        self.primary = Some(contract.clone());
        Ok(contract)
    }

    async fn bind_delegate(&mut self, name: &str) -> ExecutorResult<BoundContract> {
        if let Some(contract) = self.delegates.get(name) {
            return Ok(contract.clone());
        }
        let delegate = self.spec.delegate(name).cloned().ok_or_else(|| ExecutorError::UnknownDelegate(name.to_string()))?;
        let address = self.delegate_address(&delegate).await.map_err(|source| ExecutorError::DelegateResolution {
            delegate: name.to_string(),
            source: Box::new(source),
        })?;
        let abi = self.load_abi(&delegate.abi)?;
        let contract = self.bind(name, address, abi).await?;
        self.delegates.insert(name.to_string(), contract.clone());
        Ok(contract)
    }

    /// The configured address, or the primary contract's getter named after the delegate.
    async fn delegate_address(&mut self, delegate: &Delegate) -> ExecutorResult<Address> {
        if let Some(address) = &delegate.contract_address {
            return Ok(parse_address(address)?);
        }
        let key = format!("{CALL_PREFIX}{}", delegate.name);
        match self.load(&key, Some(Kind::Address), true).await? {
            Value::Address(address) => Ok(address),
            other => Err(ConversionError::Coercion { value: other.to_string(), expected: "address".to_string() }.into()),
        }
    }

    fn function(&self, operation: &str) -> ExecutorResult<Function> {
        self.spec.functions.get(operation).cloned().ok_or_else(|| ExecutorError::NotSupported(operation.to_string()))
    }

    /// Binds the contract an operation targets. `None` for declared stubs.
    async fn target(&mut self, function: &Function, explicit: Option<Vec<String>>) -> ExecutorResult<Option<CallTarget>> {
        let target = match function.target() {
            FunctionTarget::Stub => return Ok(None),
            FunctionTarget::Direct { method } => CallTarget {
                contract: self.bind_primary().await?,
                method: method.to_string(),
                parameters: explicit.unwrap_or_else(|| function.parameters.clone()),
                transform: None,
            },
            FunctionTarget::Delegate { delegate, method } => {
                self.bind_primary().await?;
                let contract = self.bind_delegate(delegate).await?;
                // The delegate's own declaration of the method wins over the operation's.
                let declared = self.spec.delegate(delegate).and_then(|d| d.function(method)).cloned();
                let declared = declared.as_ref().unwrap_or(function);
                CallTarget {
                    contract,
                    method: method.to_string(),
                    parameters: explicit.unwrap_or_else(|| declared.parameters.clone()),
                    transform: declared.transform().or(function.transform()).map(str::to_string),
                }
            }
        };
        Ok(Some(target))
    }

    /// Submits the operation's method as a write transaction.
    #[tracing::instrument(skip(self), fields(avs = %self.spec.name))]
    pub async fn execute(&mut self, operation: &str) -> ExecutorResult<Outcome<TransactionOutcome>> {
        let function = self.function(operation)?;
        let Some(target) = self.target(&function, None).await? else {
            info!(message = function.user_message(), "Operation has no contract call");
            return Ok(Outcome::Unsupported(function.user_message().to_string()));
        };

        let method = target.contract.method(&target.method, Some(target.parameters.len()))?.clone();
        let calldata = self.encode(&method, &target.parameters).await?;

        info!(
            contract = %target.contract.name,
            address = %target.contract.address,
            method = %method.signature(),
            "Submitting transaction"
        );
        let outcome = self
            .collaborators
            .transactions
            .call_and_wait_for_receipt(ContractTransaction {
                to: target.contract.address,
                method: method.signature(),
                calldata: calldata.into(),
            })
            .await?;
        info!(tx_hash = %outcome.tx_hash, dry_run = outcome.is_dry_run(), "Transaction completed");
        Ok(Outcome::Completed(outcome))
    }

    /// Reads the operation's method and returns its first output. Delegate
    /// reads pass it through the matched function's transform; direct reads
    /// return it as decoded. `explicit` replaces the declared parameter expressions.
    #[tracing::instrument(skip(self), fields(avs = %self.spec.name))]
    pub async fn call(&mut self, operation: &str, explicit: Option<Vec<String>>) -> ExecutorResult<Outcome<Value>> {
        let function = self.function(operation)?;
        let Some(target) = self.target(&function, explicit).await? else {
            info!(message = function.user_message(), "Operation has no contract call");
            return Ok(Outcome::Unsupported(function.user_message().to_string()));
        };

        let value = self.read(&target.contract, &target.method, &target.parameters).await?;
        let value = match &target.transform {
            Some(expr) => transform(value, expr)?,
            None => value,
        };
        Ok(Outcome::Completed(value))
    }

    /// Reads `status` and converts it to an integer.
    pub async fn status(&mut self) -> ExecutorResult<Outcome<i64>> {
        match self.call(STATUS, None).await? {
            Outcome::Completed(value) => Ok(Outcome::Completed(converter::to_i64(&value)?)),
            Outcome::Unsupported(message) => Ok(Outcome::Unsupported(message)),
        }
    }

    pub async fn register(&mut self) -> ExecutorResult<Outcome<TransactionOutcome>> {
        self.execute(REGISTER).await
    }

    pub async fn opt_in(&mut self) -> ExecutorResult<Outcome<TransactionOutcome>> {
        self.execute(OPT_IN).await
    }

    pub async fn opt_out(&mut self) -> ExecutorResult<Outcome<TransactionOutcome>> {
        self.execute(OPT_OUT).await
    }

    pub async fn deregister(&mut self) -> ExecutorResult<Outcome<TransactionOutcome>> {
        self.execute(DEREGISTER).await
    }
}
