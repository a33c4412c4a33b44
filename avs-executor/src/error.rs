use thiserror::Error;

use crate::chain::ChainError;
use crate::config::ConfigError;
use crate::signer::SignerError;
use crate::spec::repository::RepositoryError;
use crate::transaction::TransactionError;

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Errors raised while loading or validating a specification document.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Failed to load specification {name}: {source}")]
    Load {
        name: String,
        #[source]
        source: RepositoryError,
    },

    #[error("Failed to decode specification {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Function {function} must declare either a contract function or a message")]
    MissingTarget { function: String },

    #[error("Function {function} declares a contract function and a message")]
    AmbiguousTarget { function: String },

    #[error("Function {function} declares parameters without a contract function")]
    ParametersWithoutTarget { function: String },

    #[error("Function {function} has an invalid contract function name: {name}")]
    InvalidFunctionName { function: String, name: String },

    #[error("Function {function} targets unknown delegate {delegate}")]
    UnknownDelegate { function: String, delegate: String },

    #[error("Delegate at position {0} has no name")]
    UnnamedDelegate(usize),

    #[error("Delegate {0} is declared more than once")]
    DuplicateDelegate(String),

    #[error("Invalid contract address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// Errors raised by the key grammar and the function registry.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("invalid function: {0}")]
    InvalidFunction(String),

    #[error("malformed function parameter: {0}")]
    MalformedFunctionParameter(String),

    #[error("required value missing: {0}")]
    RequiredValueMissing(String),

    #[error("function {function} is missing parameter {parameter}")]
    MissingParameter { function: String, parameter: String },

    #[error("parameter {parameter} of function {function} must be {expected}")]
    ParameterType { function: String, parameter: String, expected: &'static str },

    #[error("invalid parameter {parameter} of function {function}: {reason}")]
    InvalidParameter { function: String, parameter: String, reason: String },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Errors raised by the type converter and ABI coercion.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConversionError {
    #[error("unsupported type {0}")]
    UnsupportedKind(String),

    #[error("cannot parse {value} as {kind}: {reason}")]
    Parse { value: String, kind: String, reason: String },

    #[error("cannot encode {value} as {expected}")]
    Coercion { value: String, expected: String },

    #[error("record is missing field {0}")]
    MissingField(String),
}

/// Errors raised by the transform engine.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransformError {
    #[error("unknown transform {0}")]
    UnknownTransform(String),

    #[error("malformed transform {0}")]
    Malformed(String),

    #[error("transform {transform} requires a record, got {value}")]
    NotARecord { transform: String, value: String },

    #[error("transform {transform} references missing field {field}")]
    MissingField { transform: String, field: String },
}

/// Main error enum for the executor
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("operation {0} is not supported")]
    NotSupported(String),

    #[error("Specification error: {0}")]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Key(#[from] ResolutionError),

    #[error("failed to resolve {key}: {source}")]
    Resolution {
        key: String,
        #[source]
        source: Box<ExecutorError>,
    },

    #[error("failed to map parameter {index} of {method}: {source}")]
    ParameterMapping {
        method: String,
        index: usize,
        #[source]
        source: Box<ExecutorError>,
    },

    #[error("method {method} expects {expected} parameters, got {actual}")]
    ParameterCount { method: String, expected: usize, actual: usize },

    #[error("failed to load ABI {resource}: {reason}")]
    AbiLoad { resource: String, reason: String },

    #[error("failed to bind contract {contract} at {address}: {reason}")]
    Bind { contract: String, address: String, reason: String },

    #[error("method {method} not found in ABI of {contract}")]
    MethodNotFound { contract: String, method: String },

    #[error("delegate {0} is not declared")]
    UnknownDelegate(String),

    #[error("failed to resolve delegate {delegate}: {source}")]
    DelegateResolution {
        delegate: String,
        #[source]
        source: Box<ExecutorError>,
    },

    #[error("failed to encode call to {method}: {reason}")]
    Encode { method: String, reason: String },

    #[error("failed to decode result of {method}: {reason}")]
    Decode { method: String, reason: String },

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<ConversionError> for ExecutorError {
    fn from(err: ConversionError) -> Self {
        ExecutorError::Key(ResolutionError::Conversion(err))
    }
}

impl From<TransformError> for ExecutorError {
    fn from(err: TransformError) -> Self {
        ExecutorError::Key(ResolutionError::Transform(err))
    }
}

impl ExecutorError {
    pub fn resolution(key: impl Into<String>, source: ExecutorError) -> Self {
        ExecutorError::Resolution { key: key.into(), source: Box::new(source) }
    }

    /// Returns the innermost resolution error, skipping stage wrappers.
    pub fn root_resolution_error(&self) -> Option<&ResolutionError> {
        match self {
            ExecutorError::Key(err) => Some(err),
            ExecutorError::Resolution { source, .. }
            | ExecutorError::ParameterMapping { source, .. }
            | ExecutorError::DelegateResolution { source, .. } => source.root_resolution_error(),
            _ => None,
        }
    }
}

/// Renders the text a user sees for a failure: the last `:`-delimited segment.
pub fn user_facing_message(message: &str) -> &str {
    message.rsplit(':').next().map(str::trim).unwrap_or(message)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::nested("failed to resolve config:x: required value missing: x", "x")]
    #[case::plain("operation status is not supported", "operation status is not supported")]
    #[case::trailing("a: b: c ", "c")]
    fn user_facing_message_keeps_last_segment(#[case] message: &str, #[case] expected: &str) {
        assert_eq!(user_facing_message(message), expected);
    }

    #[test]
    fn root_resolution_error_unwraps_stage_context() {
        let inner = ExecutorError::Key(ResolutionError::RequiredValueMissing("config:a".to_string()));
        let wrapped = ExecutorError::ParameterMapping {
            method: "register".to_string(),
            index: 0,
            source: Box::new(ExecutorError::resolution("config:a", inner)),
        };
        assert!(matches!(wrapped.root_resolution_error(), Some(ResolutionError::RequiredValueMissing(_))));
    }
}
