//! Mock secret store for testing
//!
//! This store keeps payloads in memory, useful for unit tests
//! without a cluster or an AWS account.

use async_trait::async_trait;
use refimpl_core::SecretPayload;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::SecretStore;
use crate::error::{KubeError, Result};

/// In-memory secret store for testing
#[derive(Clone)]
pub struct MockSecretStore {
    name: String,
    /// Storage: payload name -> document
    entries: Arc<RwLock<HashMap<String, JsonValue>>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
    /// Reject every write
    failing: bool,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub creates: usize,
    pub updates: usize,
}

impl MockSecretStore {
    /// Create a new empty mock store
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Arc::new(RwLock::new(HashMap::new())),
            operations: Arc::new(RwLock::new(OperationCounts::default())),
            failing: false,
        }
    }

    /// Create a store whose writes always fail
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            failing: true,
            ..Self::new(name)
        }
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    /// Stored document for a payload name
    pub fn get(&self, name: &str) -> Option<JsonValue> {
        self.entries.read().unwrap().get(name).cloned()
    }

    /// Count stored entries
    pub fn entry_count(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    fn rejected(&self, payload: &SecretPayload) -> KubeError {
        KubeError::Io(std::io::Error::other(format!(
            "{} rejected {}",
            self.name,
            payload.name()
        )))
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn entry_name(&self, payload: &SecretPayload) -> String {
        payload.name().to_string()
    }

    async fn create(&self, payload: &SecretPayload) -> Result<()> {
        self.operations.write().unwrap().creates += 1;
        if self.failing {
            return Err(self.rejected(payload));
        }

        let mut entries = self.entries.write().unwrap();
        if entries.contains_key(payload.name()) {
            return Err(KubeError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", payload.name()),
            )));
        }
        entries.insert(payload.name().to_string(), payload.data().clone());
        Ok(())
    }

    async fn update(&self, payload: &SecretPayload) -> Result<()> {
        self.operations.write().unwrap().updates += 1;
        if self.failing {
            return Err(self.rejected(payload));
        }

        let mut entries = self.entries.write().unwrap();
        match entries.get_mut(payload.name()) {
            Some(existing) => {
                *existing = payload.data().clone();
                Ok(())
            }
            None => Err(KubeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", payload.name()),
            ))),
        }
    }
}
