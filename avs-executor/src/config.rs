use std::collections::BTreeMap;
use std::path::Path;

use dialoguer::{Input, Password};
use figment::providers::{Env, Format, Json};
use figment::Figment;
use mockall::automock;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Environment variables overriding the configuration file, e.g.
/// `AVS_CONFIG_OPERATOR__ADDRESS` for `operator.address`.
pub const CONFIG_ENV_PREFIX: &str = "AVS_CONFIG_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Read(#[from] Box<figment::Error>),

    #[error("Failed to prompt for {key}: {reason}")]
    Prompt { key: String, reason: String },

    #[error("No value entered for {0}")]
    Empty(String),
}

/// Operator configuration values, flattened to dotted keys.
#[automock]
pub trait Configuration: Send + Sync {
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    fn get_all(&self) -> BTreeMap<String, serde_json::Value>;

    /// Asks the operator interactively. `hidden` masks the input.
    fn prompt(&self, key: &str, required: bool, hidden: bool) -> Result<String, ConfigError>;
}

pub struct FileConfiguration {
    figment: Figment,
    values: BTreeMap<String, serde_json::Value>,
}

impl FileConfiguration {
    /// Loads the optional JSON file, then applies `AVS_CONFIG_` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Json::file(path));
        }
        figment = figment.merge(Env::prefixed(CONFIG_ENV_PREFIX).split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let document: serde_json::Value = figment.extract().map_err(Box::new)?;
        let mut values = BTreeMap::new();
        flatten_into(&mut values, String::new(), document);
        Ok(Self { figment, values })
    }

    /// Extracts a typed view of the whole configuration.
    pub fn unmarshal<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        Ok(self.figment.extract().map_err(Box::new)?)
    }
}

fn flatten_into(values: &mut BTreeMap<String, serde_json::Value>, prefix: String, value: serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (name, nested) in map {
                let key = if prefix.is_empty() { name } else { format!("{prefix}.{name}") };
                flatten_into(values, key, nested);
            }
        }
        other if !prefix.is_empty() => {
            values.insert(prefix, other);
        }
        _ => {}
    }
}

impl Configuration for FileConfiguration {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.get(key).cloned()
    }

    fn get_all(&self) -> BTreeMap<String, serde_json::Value> {
        self.values.clone()
    }

    fn prompt(&self, key: &str, required: bool, hidden: bool) -> Result<String, ConfigError> {
        let prompt_error = |e: dialoguer::Error| ConfigError::Prompt { key: key.to_string(), reason: e.to_string() };
        let answer = if hidden {
            Password::new().with_prompt(key).allow_empty_password(!required).interact().map_err(prompt_error)?
        } else {
            Input::<String>::new().with_prompt(key).allow_empty(!required).interact_text().map_err(prompt_error)?
        };
        if required && answer.is_empty() {
            return Err(ConfigError::Empty(key.to_string()));
        }
        Ok(answer)
    }
}
