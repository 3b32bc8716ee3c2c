use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::models::CoreError;
use crate::orchestration::{Operation, OrchestrationResult};

pub type OperationFactory = Arc<dyn Fn(&Value) -> OrchestrationResult<Operation> + Send + Sync>;

/// Named operation factories used to resolve run plan steps.
#[derive(Clone, Default)]
pub struct OperationRegistry {
    factories: HashMap<String, OperationFactory>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> OrchestrationResult<()>
    where
        F: Fn(&Value) -> OrchestrationResult<Operation> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(CoreError::invalid_argument(format!(
                "duplicate operation registration for '{name}'"
            )));
        }
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn resolve(&self, name: &str, args: &Value) -> OrchestrationResult<Operation> {
        let factory = self.factories.get(name).ok_or_else(|| {
            CoreError::invalid_operation(format!("no operation is registered as '{name}'"))
        })?;
        factory(args)
    }
}
