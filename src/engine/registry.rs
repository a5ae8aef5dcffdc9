//! Engine Registry
//!
//! Holds one engine per configured database, keyed by the database name.
//! Handlers resolve the engine for a request through [`EngineRegistry::get`];
//! nothing else holds a pool.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use studio_core::{DataEngine, EngineError, EngineResult};

/// Registry of named database engines
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn DataEngine>>,
    default: Option<String>,
}

/// Public description of a registered database
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub name: String,
    pub driver_id: String,
    pub driver_name: String,
    pub is_default: bool,
}

impl EngineRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
            default: None,
        }
    }

    /// Registers an engine under `name`, replacing any previous one.
    ///
    /// The first registered engine becomes the default until
    /// [`EngineRegistry::set_default`] says otherwise.
    pub fn register(&mut self, name: impl Into<String>, engine: Arc<dyn DataEngine>) {
        let name = name.into();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.engines.insert(name, engine);
    }

    pub fn set_default(&mut self, name: &str) -> EngineResult<()> {
        if !self.engines.contains_key(name) {
            return Err(EngineError::unknown_database(name));
        }
        self.default = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Resolves `name`, or the default engine when `name` is `None`
    pub fn get(&self, name: Option<&str>) -> EngineResult<Arc<dyn DataEngine>> {
        let name = match name.or(self.default.as_deref()) {
            Some(name) => name,
            None => return Err(EngineError::unknown_database("<default>")),
        };
        self.engines
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::unknown_database(name))
    }

    /// Lists registered databases, sorted by name
    pub fn list(&self) -> Vec<DatabaseInfo> {
        let mut infos: Vec<DatabaseInfo> = self
            .engines
            .iter()
            .map(|(name, engine)| DatabaseInfo {
                name: name.clone(),
                driver_id: engine.driver_id().to_string(),
                driver_name: engine.driver_name().to_string(),
                is_default: self.default.as_deref() == Some(name.as_str()),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Closes every engine's pool
    pub async fn close_all(&self) {
        for engine in self.engines.values() {
            engine.close().await;
        }
    }

    /// Returns the number of registered engines
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Returns true if no engines are registered
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}
