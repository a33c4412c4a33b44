//! The closed catalog of `func:` operations.
//!
//! A function receives its parameters as unresolved key expressions and
//! resolves each one only when it needs it. That ordering is observable: a
//! function that generates a salt before resolving its digest lets the digest
//! expression reference `last:salt`.

mod chain;
mod keys;

use std::collections::BTreeMap;
use std::str::FromStr;

use strum_macros::{Display, EnumIter, EnumString};

use crate::cache::{split_invocation, split_top_level};
use crate::controller::ExecutionController;
use crate::converter::Kind;
use crate::error::{ExecutorResult, ResolutionError};
use crate::value::{G1Point, G2Point, Value};

pub use chain::EXPIRY_MARGIN_SECS;

/// Cache key of the latest salt produced by `salt(...)`.
pub const LAST_SALT_KEY: &str = "last:salt";
/// Cache key of the latest expiry produced by `expiry(...)`.
pub const LAST_EXPIRY_KEY: &str = "last:expiry";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
pub enum RegistryFunction {
    #[strum(serialize = "array_uint8")]
    ArrayUint8,
    #[strum(serialize = "chain_id")]
    ChainId,
    #[strum(serialize = "expiry")]
    Expiry,
    #[strum(serialize = "salt")]
    Salt,
    #[strum(serialize = "ecdsa_public_key")]
    EcdsaPublicKey,
    #[strum(serialize = "bls_public_key")]
    BlsPublicKey,
    #[strum(serialize = "ecdsa_sign")]
    EcdsaSign,
    #[strum(serialize = "bls_sign")]
    BlsSign,
    #[strum(serialize = "bls_curve_sign")]
    BlsCurveSign,
    #[strum(serialize = "g1_zero")]
    G1Zero,
    #[strum(serialize = "g2_zero")]
    G2Zero,
}

/// A parsed `name(key=expr,...)` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub function: RegistryFunction,
    params: BTreeMap<String, String>,
}

impl FunctionCall {
    pub fn parse(payload: &str) -> Result<Self, ResolutionError> {
        let (name, args) = split_invocation(payload).unwrap_or((payload.trim(), ""));
        let function =
            RegistryFunction::from_str(name).map_err(|_| ResolutionError::InvalidFunction(name.to_string()))?;

        let mut params = BTreeMap::new();
        for part in split_top_level(args) {
            let (key, expr) = part
                .split_once('=')
                .map(|(key, expr)| (key.trim(), expr.trim()))
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| ResolutionError::MalformedFunctionParameter(part.to_string()))?;
            params.insert(key.to_string(), expr.to_string());
        }
        Ok(Self { function, params })
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    #[tracing::instrument(skip(self, ctl), fields(function = %self.function))]
    pub async fn invoke(&self, ctl: &mut ExecutionController) -> ExecutorResult<Value> {
        match self.function {
            RegistryFunction::ArrayUint8 => chain::array_uint8(self, ctl).await,
            RegistryFunction::ChainId => chain::chain_id(ctl).await,
            RegistryFunction::Expiry => chain::expiry(self, ctl).await,
            RegistryFunction::Salt => chain::salt(self, ctl).await,
            RegistryFunction::EcdsaPublicKey => keys::ecdsa_public_key(self, ctl).await,
            RegistryFunction::BlsPublicKey => keys::bls_public_key(self, ctl).await,
            RegistryFunction::EcdsaSign => keys::ecdsa_sign(self, ctl).await,
            RegistryFunction::BlsSign => keys::bls_sign(self, ctl).await,
            RegistryFunction::BlsCurveSign => keys::bls_curve_sign(self, ctl).await,
            RegistryFunction::G1Zero => Ok(Value::G1(G1Point::ZERO)),
            RegistryFunction::G2Zero => Ok(Value::G2(G2Point::ZERO)),
        }
    }

    async fn required(&self, ctl: &mut ExecutionController, name: &str, kind: Option<Kind>) -> ExecutorResult<Value> {
        let expr = self.param(name).ok_or_else(|| ResolutionError::MissingParameter {
            function: self.function.to_string(),
            parameter: name.to_string(),
        })?;
        ctl.load(expr, kind, true).await
    }

    async fn optional(
        &self,
        ctl: &mut ExecutionController,
        name: &str,
        kind: Option<Kind>,
    ) -> ExecutorResult<Option<Value>> {
        match self.param(name) {
            Some(expr) => Ok(Some(ctl.load(expr, kind, false).await?).filter(|value| !value.is_empty())),
            None => Ok(None),
        }
    }

    async fn required_string(&self, ctl: &mut ExecutionController, name: &str) -> ExecutorResult<String> {
        let value = self.required(ctl, name, Some(Kind::String)).await?;
        self.expect_string(name, value)
    }

    async fn optional_string(&self, ctl: &mut ExecutionController, name: &str) -> ExecutorResult<Option<String>> {
        match self.optional(ctl, name, Some(Kind::String)).await? {
            Some(value) => self.expect_string(name, value).map(Some),
            None => Ok(None),
        }
    }

    fn expect_string(&self, name: &str, value: Value) -> ExecutorResult<String> {
        match value {
            Value::String(s) => Ok(s),
            _ => Err(self.type_mismatch(name, "a string").into()),
        }
    }

    fn type_mismatch(&self, name: &str, expected: &'static str) -> ResolutionError {
        ResolutionError::ParameterType { function: self.function.to_string(), parameter: name.to_string(), expected }
    }

    fn invalid(&self, name: &str, reason: impl Into<String>) -> ResolutionError {
        ResolutionError::InvalidParameter {
            function: self.function.to_string(),
            parameter: name.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn every_function_parses_by_name() {
        for function in RegistryFunction::iter() {
            let parsed = FunctionCall::parse(&format!("{function}()")).unwrap();
            assert_eq!(parsed.function, function);
        }
    }

    #[test]
    fn parses_nested_parameter_expressions() {
        let call = FunctionCall::parse(
            "ecdsa_sign(type=const:local, digest=call:avsDirectory.digest(config:operator,last:salt), salt=func:salt(seed=const:a))",
        )
        .unwrap();

        assert_eq!(call.function, RegistryFunction::EcdsaSign);
        assert_eq!(call.param("type"), Some("const:local"));
        assert_eq!(call.param("digest"), Some("call:avsDirectory.digest(config:operator,last:salt)"));
        assert_eq!(call.param("salt"), Some("func:salt(seed=const:a)"));
    }

    #[test]
    fn name_without_parentheses_has_no_parameters() {
        assert_eq!(FunctionCall::parse("chain_id").unwrap().function, RegistryFunction::ChainId);
    }

    #[rstest]
    #[case::unknown("rsa_sign(file=const:a)")]
    #[case::empty("()")]
    fn unknown_functions_are_invalid(#[case] payload: &str) {
        assert_matches!(FunctionCall::parse(payload), Err(ResolutionError::InvalidFunction(_)));
    }

    #[rstest]
    #[case::no_equals("expiry(const:300)")]
    #[case::empty_key("expiry(=const:300)")]
    #[case::trailing_comma("expiry(timeout=const:300,)")]
    fn malformed_parameters_are_rejected(#[case] payload: &str) {
        assert_matches!(FunctionCall::parse(payload), Err(ResolutionError::MalformedFunctionParameter(_)));
    }
}
