//! Key grammar and the per-session resolution store.
//!
//! A key expression reads `prefix:payload[->transform]`. The transform starts
//! at the first `->`, except that inside the argument list of a `func:` or
//! `call:` payload a nested `->` belongs to that argument. The store only holds
//! values; resolving a missing key goes through
//! [`ExecutionController::load`](crate::controller::ExecutionController::load),
//! which owns the collaborators a prefix may need.

use std::collections::HashMap;

use crate::error::ResolutionError;
use crate::value::Value;

pub const CALL_PREFIX: &str = "call:";
pub const CONFIG_PREFIX: &str = "config:";
pub const CONST_PREFIX: &str = "const:";
pub const FUNC_PREFIX: &str = "func:";
pub const PASSWD_PREFIX: &str = "passwd:";
pub const SPEC_PREFIX: &str = "spec:";

/// Where the value of a key expression comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource<'a> {
    Call(&'a str),
    Config(&'a str),
    Const(&'a str),
    Func(&'a str),
    Passwd(&'a str),
    /// No recognized prefix, looked up in the store as is.
    Bare(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExpression<'a> {
    pub source: KeySource<'a>,
    pub transform: Option<&'a str>,
}

impl<'a> KeyExpression<'a> {
    pub fn parse(key: &'a str) -> Result<Self, ResolutionError> {
        // Only `func:` and `call:` carry argument lists that may nest their own transforms.
        let nested = [FUNC_PREFIX, CALL_PREFIX].iter().any(|prefix| key.trim_start().starts_with(prefix));
        let arrow = if nested { find_top_level(key, "->") } else { key.find("->") };
        let (core, transform) = match arrow {
            Some(index) => (&key[..index], Some(key[index + 2..].trim())),
            None => (key, None),
        };
        let core = core.trim();
        if core.is_empty() || transform == Some("") {
            return Err(ResolutionError::InvalidKeyFormat(key.to_string()));
        }

        let source = if let Some(payload) = core.strip_prefix(CALL_PREFIX) {
            KeySource::Call(payload)
        } else if let Some(payload) = core.strip_prefix(CONFIG_PREFIX) {
            KeySource::Config(payload)
        } else if let Some(payload) = core.strip_prefix(CONST_PREFIX) {
            KeySource::Const(payload)
        } else if let Some(payload) = core.strip_prefix(FUNC_PREFIX) {
            KeySource::Func(payload)
        } else if let Some(payload) = core.strip_prefix(PASSWD_PREFIX) {
            KeySource::Passwd(payload)
        } else {
            KeySource::Bare(core)
        };
        Ok(Self { source, transform })
    }

    /// `func:` results are produced fresh on every resolution.
    pub fn is_cacheable(&self) -> bool {
        !matches!(self.source, KeySource::Func(_))
    }
}

/// Byte offset of the first `pattern` outside any parentheses.
pub(crate) fn find_top_level(input: &str, pattern: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (index, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && input[index..].starts_with(pattern) => return Some(index),
            _ => {}
        }
    }
    None
}

/// Splits on commas that are not nested inside parentheses.
pub(crate) fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(input[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    let last = input[start..].trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last);
    }
    parts
}

/// Splits `name(args)` into the name and the raw argument text.
pub(crate) fn split_invocation(input: &str) -> Option<(&str, &str)> {
    let open = input.find('(')?;
    let args = input[open + 1..].trim_end().strip_suffix(')')?;
    Some((input[..open].trim(), args))
}

#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: HashMap<String, Value>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts `value`, flattening records into dotted sub-keys instead of
    /// storing them whole.
    pub fn store(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match value {
            Value::Record(record) => {
                for (name, field) in record.into_fields() {
                    self.store(format!("{key}.{name}"), field);
                }
            }
            other => {
                self.entries.insert(key, other);
            }
        }
    }

    /// Remembers a resolution result under its exact key text, plus the
    /// flattened sub-keys of a record.
    pub fn memoize(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if matches!(value, Value::Record(_)) {
            self.store(key.clone(), value.clone());
        }
        self.entries.insert(key, value);
    }

    /// Seeds every entry of a JSON document under `prefix`.
    pub fn seed_json(&mut self, prefix: &str, document: serde_json::Value) {
        match Value::from_json(document) {
            Value::Record(record) => {
                for (name, field) in record.into_fields() {
                    self.store(format!("{prefix}{name}"), field);
                }
            }
            other => self.store(prefix.trim_end_matches(':').to_string(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::U256;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::value::Record;

    #[rstest]
    #[case::call("call:avsDirectory", KeySource::Call("avsDirectory"), None)]
    #[case::config("config:operator.address", KeySource::Config("operator.address"), None)]
    #[case::constant("const:0x01->[]byte()", KeySource::Const("0x01"), Some("[]byte()"))]
    #[case::passwd("passwd:ecdsa", KeySource::Passwd("ecdsa"), None)]
    #[case::bare("last:salt", KeySource::Bare("last:salt"), None)]
    #[case::literal_parenthesis("const:a(b->struct(x:y)", KeySource::Const("a(b"), Some("struct(x:y)"))]
    #[case::call_arguments(
        "call:avsDirectory.digest(func:salt()->[]byte())->[]byte()",
        KeySource::Call("avsDirectory.digest(func:salt()->[]byte())"),
        Some("[]byte()")
    )]
    #[case::func(
        "func:ecdsa_sign(digest=call:x->struct(a:b))->struct(s:signature)",
        KeySource::Func("ecdsa_sign(digest=call:x->struct(a:b))"),
        Some("struct(s:signature)")
    )]
    fn parses_key_expressions(
        #[case] key: &str,
        #[case] source: KeySource<'static>,
        #[case] transform: Option<&'static str>,
    ) {
        assert_eq!(KeyExpression::parse(key).unwrap(), KeyExpression { source, transform });
    }

    #[rstest]
    #[case::empty("")]
    #[case::only_transform("->struct(a:b)")]
    #[case::dangling_arrow("const:1->")]
    fn rejects_malformed_keys(#[case] key: &str) {
        assert!(matches!(KeyExpression::parse(key), Err(ResolutionError::InvalidKeyFormat(_))));
    }

    #[test]
    fn splits_only_top_level_commas() {
        assert_eq!(split_top_level("a=1, b=f(x=1,y=2) ,c=3"), vec!["a=1", "b=f(x=1,y=2)", "c=3"]);
        assert!(split_top_level("").is_empty());
    }

    #[test]
    fn store_flattens_nested_records() {
        let mut cache = ResolutionCache::new();
        let inner = Record::from_fields(vec![("address".to_string(), Value::from("0x1"))]);
        let outer = Record::from_fields(vec![("operator".to_string(), Value::Record(inner))]);

        cache.store("config:root", Value::Record(outer));

        assert_eq!(cache.get("config:root.operator.address"), Some(&Value::from("0x1")));
        assert!(!cache.contains("config:root"));
    }

    #[test]
    fn memoize_keeps_exact_key_and_sub_keys() {
        let mut cache = ResolutionCache::new();
        let record = Record::from_fields(vec![("expiry".to_string(), Value::Uint(U256::from(9)))]);

        cache.memoize("call:signature", Value::Record(record.clone()));

        assert_eq!(cache.get("call:signature"), Some(&Value::Record(record)));
        assert_eq!(cache.get("call:signature.expiry"), Some(&Value::Uint(U256::from(9))));
    }

    #[test]
    fn seed_json_prefixes_top_level_fields() {
        let mut cache = ResolutionCache::new();
        cache.seed_json("config:", json!({"operator": {"address": "0xabc"}, "network": "holesky"}));

        assert_eq!(cache.get("config:operator.address"), Some(&Value::from("0xabc")));
        assert_eq!(cache.get("config:network"), Some(&Value::from("holesky")));
    }
}
