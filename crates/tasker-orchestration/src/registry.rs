//! Name-keyed handler registry (§9 "dynamic string-named handler classes" ->
//! an interface plus a name-keyed map populated at startup). Lives here
//! rather than in `tasker-worker` because the Step Executor (C8), which
//! looks handlers up by key, belongs to the orchestration core; the worker
//! crate only builds and populates one of these at boot.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use tasker_shared::error::{TaskerError, TaskerResult};
use tasker_shared::handler::StepHandler;

/// `(namespace, name, version)` — the lookup key from §9.
pub type HandlerKey = (String, String, i32);

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<HandlerKey, Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Registers `handler` under `key`, first calling
    /// `custom_event_configuration` and failing atomically on error (§6):
    /// neither the handler nor its events are inserted if that call errors.
    pub fn register(&self, key: HandlerKey, handler: Arc<dyn StepHandler>) -> TaskerResult<()> {
        handler
            .custom_event_configuration()
            .map_err(|message| TaskerError::Registration {
                namespace: key.0.clone(),
                name: key.1.clone(),
                version: key.2,
                message,
            })?;
        self.handlers.insert(key, handler);
        Ok(())
    }

    pub fn lookup(&self, key: &HandlerKey) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(key).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Convenience for tests: build a registry from an already-assembled map.
impl From<HashMap<HandlerKey, Arc<dyn StepHandler>>> for HandlerRegistry {
    fn from(map: HashMap<HandlerKey, Arc<dyn StepHandler>>) -> Self {
        let handlers = DashMap::new();
        for (key, handler) in map {
            handlers.insert(key, handler);
        }
        Self { handlers }
    }
}
