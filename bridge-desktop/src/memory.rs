//! Process-local settings store.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{SettingsStore, SettingsTransaction},
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum Value {
    String(String),
    Bool(bool),
    I64(i64),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Bool(_) => "bool",
            Value::I64(_) => "i64",
        }
    }
}

fn mismatch(key: &str, expected: &str, found: &Value) -> BridgeError {
    BridgeError::TypeMismatch {
        key: key.to_string(),
        expected: expected.to_string(),
        actual: found.type_name().to_string(),
    }
}

type Entries = Arc<RwLock<BTreeMap<String, Value>>>;

/// `SettingsStore` kept entirely in memory.
///
/// Clones share the same map, so a clone handed to a second engine instance
/// behaves like reopening the same database after a restart.
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    entries: Entries,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), Value::String(value.to_string()));
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.entries.read().get(key) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(other) => Err(mismatch(key, "string", other)),
        }
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), Value::Bool(value));
        Ok(())
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.entries.read().get(key) {
            None => Ok(None),
            Some(Value::Bool(value)) => Ok(Some(*value)),
            Some(other) => Err(mismatch(key, "bool", other)),
        }
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.entries.write().insert(key.to_string(), Value::I64(value));
        Ok(())
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.entries.read().get(key) {
            None => Ok(None),
            Some(Value::I64(value)) => Ok(Some(*value)),
            Some(other) => Err(mismatch(key, "i64", other)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn SettingsTransaction + Send>> {
        Ok(Box::new(MemoryTransaction {
            target: Arc::clone(&self.entries),
            staged: Vec::new(),
        }))
    }
}

/// Buffers writes and applies them under one write lock on commit.
struct MemoryTransaction {
    target: Entries,
    staged: Vec<(String, Option<Value>)>,
}

#[async_trait]
impl SettingsTransaction for MemoryTransaction {
    async fn set_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.staged
            .push((key.to_string(), Some(Value::String(value.to_string()))));
        Ok(())
    }

    async fn set_bool(&mut self, key: &str, value: bool) -> Result<()> {
        self.staged.push((key.to_string(), Some(Value::Bool(value))));
        Ok(())
    }

    async fn set_i64(&mut self, key: &str, value: i64) -> Result<()> {
        self.staged.push((key.to_string(), Some(Value::I64(value))));
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<()> {
        self.staged.push((key.to_string(), None));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { target, staged } = *self;
        let mut entries = target.write();
        for (key, value) in staged {
            match value {
                Some(value) => {
                    entries.insert(key, value);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
