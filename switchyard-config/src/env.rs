// Environment variable loading

use crate::{ConfigError, Result};
use serde_json::{Map, Value};
use std::env;
use switchyard_core::DispatcherConfig;

/// Prefix of every switchyard environment variable.
pub const ENV_PREFIX: &str = "SWITCHYARD";

/// Reads prefixed environment variables as dispatcher overrides.
///
/// `SWITCHYARD_THROW_IF_NO_HANDLER_FOUND=true` overrides
/// `dispatcher.throw_if_no_handler_found`. Variables that name no dispatcher
/// setting (such as `SWITCHYARD_LOG_LEVEL`) are left to their own readers.
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Dispatcher overrides from the process environment.
    pub fn load(&self) -> Map<String, Value> {
        self.load_from(env::vars())
    }

    /// Dispatcher overrides from the given variables.
    pub fn load_from(&self, vars: impl IntoIterator<Item = (String, String)>) -> Map<String, Value> {
        let known = dispatcher_fields();
        let mut overrides = Map::new();

        for (key, value) in vars {
            let Some(rest) = key.strip_prefix(&self.prefix) else {
                continue;
            };
            let Some(field) = rest.strip_prefix('_') else {
                continue;
            };
            let field = field.to_lowercase();
            if known.contains(&field) {
                overrides.insert(field, typed(&value));
            }
        }

        overrides
    }

    /// A single prefixed variable, e.g. `load_var("log_level")`.
    pub fn load_var(&self, key: &str) -> Result<String> {
        let full_key = format!("{}_{}", self.prefix, key.to_uppercase());
        env::var(&full_key).map_err(ConfigError::EnvError)
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(ENV_PREFIX)
    }
}

fn dispatcher_fields() -> Vec<String> {
    match serde_json::to_value(DispatcherConfig::default()) {
        Ok(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Booleans and integers keep their type; anything else stays a string.
fn typed(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => return Value::Bool(true),
        "false" | "no" | "off" => return Value::Bool(false),
        _ => {}
    }
    trimmed
        .parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(trimmed.to_string()))
}
