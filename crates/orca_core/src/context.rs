//! Context values used by lookups (e.g. an existing VPC).
//!
//! Lookups never call AWS. They read a pre-populated context store, keyed by
//! provider, account, region and filters. A key that is not present is
//! reported as missing and the provider falls back to a dummy value, so a
//! tree can always be built and the missing keys listed afterwards.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::CoreResult;

/// Default file name of the context store.
pub const CONTEXT_FILE: &str = "orca.context.json";

/// Key/value context store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a context store from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        debug!("Reading context from {:?}", path);
        let content = fs::read_to_string(path)?;
        let context: Context = serde_json::from_str(&content)?;
        Ok(context)
    }

    /// Save the context store as pretty JSON.
    pub fn to_file(&self, path: impl AsRef<Path>) -> CoreResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A lookup that could not be answered from the context store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingContext {
    pub key: String,
    pub provider: String,
    pub props: Value,
}

/// Build the context key for a lookup.
///
/// Filters are sorted so the key does not depend on insertion order.
pub fn context_key(
    provider: &str,
    account: &str,
    region: &str,
    filters: &BTreeMap<String, String>,
) -> String {
    let mut key = format!("{}:account={}", provider, account);
    for (name, value) in filters {
        key.push_str(&format!(":{}={}", name, value));
    }
    key.push_str(&format!(":region={}", region));
    key
}
