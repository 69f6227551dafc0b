//! Live instances and the live instance registry
//!
//! An `Instance` is a constructed object of some type: a vector of fixed
//! property slots plus a by-name table for properties that were assigned the
//! dynamic-lookup position. The registry is a multimap from fully-qualified
//! type name to the instances constructed for that type.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{SdkError, SdkResult};
use crate::value::Value;

/// Global counter for generating unique instance IDs
static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique instance identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        InstanceId(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric ID
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Shared handle to a live instance
pub type InstanceHandle = Arc<Instance>;

/// A constructed object
#[derive(Debug)]
pub struct Instance {
    id: InstanceId,
    /// Fully-qualified name of the concrete type
    type_name: RwLock<String>,
    /// Fixed-position property values
    slots: RwLock<Vec<Value>>,
    /// Properties stored by name (dynamic-lookup positions)
    named: RwLock<FxHashMap<String, Value>>,
}

impl Instance {
    /// Create a new instance with `slot_count` null slots
    pub fn new(type_name: impl Into<String>, slot_count: usize) -> InstanceHandle {
        Arc::new(Self {
            id: InstanceId::next(),
            type_name: RwLock::new(type_name.into()),
            slots: RwLock::new(vec![Value::Null; slot_count]),
            named: RwLock::new(FxHashMap::default()),
        })
    }

    /// Unique ID of this instance
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Fully-qualified type name
    pub fn type_name(&self) -> String {
        self.type_name.read().clone()
    }

    /// Re-point the instance at a renamed type
    pub fn set_type_name(&self, name: impl Into<String>) {
        *self.type_name.write() = name.into();
    }

    /// Get a slot value by position
    pub fn slot(&self, index: usize) -> Option<Value> {
        self.slots.read().get(index).cloned()
    }

    /// Set a slot value by position
    pub fn set_slot(&self, index: usize, value: Value) -> SdkResult<()> {
        let mut slots = self.slots.write();
        let len = slots.len();
        match slots.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(SdkError::SlotOutOfBounds { index, len }),
        }
    }

    /// Number of fixed slots
    pub fn slot_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Copy of all fixed slot values
    pub fn slots(&self) -> Vec<Value> {
        self.slots.read().clone()
    }

    /// Re-lay out the instance in one step.
    ///
    /// `f` receives the current fixed slots and the by-name table and
    /// returns the new fixed slots. Both locks are held until the new
    /// vector is in place, so no concurrent write is lost.
    pub fn migrate<F>(&self, f: F)
    where
        F: FnOnce(&[Value], &mut FxHashMap<String, Value>) -> Vec<Value>,
    {
        let mut slots = self.slots.write();
        let mut named = self.named.write();
        let migrated = f(slots.as_slice(), &mut named);
        *slots = migrated;
    }

    /// Get a by-name property value
    pub fn named(&self, name: &str) -> Option<Value> {
        self.named.read().get(name).cloned()
    }

    /// Set a by-name property value
    pub fn set_named(&self, name: impl Into<String>, value: Value) {
        self.named.write().insert(name.into(), value);
    }

    /// Remove a by-name property value
    pub fn remove_named(&self, name: &str) -> Option<Value> {
        self.named.write().remove(name)
    }
}

/// The live instance registry consumed by the engine.
///
/// Implementations must be safe to call from any thread; the engine only
/// writes while holding its structural mutation lock.
pub trait InstanceRegistry: Send + Sync {
    /// All live instances registered under `type_name`
    fn instances_of(&self, type_name: &str) -> Vec<InstanceHandle>;

    /// Register a constructed instance
    fn register(&self, type_name: &str, instance: InstanceHandle);

    /// Remove an instance; returns false if it was not registered
    fn unregister(&self, type_name: &str, instance: &InstanceHandle) -> bool;

    /// Move every instance registered under `old_name` to `new_name`
    fn rekey(&self, old_name: &str, new_name: &str);

    /// Number of live instances registered under `type_name`
    fn count(&self, type_name: &str) -> usize {
        self.instances_of(type_name).len()
    }
}

/// In-memory instance registry backed by a concurrent map
pub struct MemoryInstanceRegistry {
    instances: DashMap<String, Vec<InstanceHandle>>,
}

impl MemoryInstanceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
        }
    }

    /// Names of all types with at least one live instance
    pub fn type_names(&self) -> Vec<String> {
        self.instances
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Drop every registered instance
    pub fn clear(&self) {
        self.instances.clear();
    }
}

impl Default for MemoryInstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceRegistry for MemoryInstanceRegistry {
    fn instances_of(&self, type_name: &str) -> Vec<InstanceHandle> {
        self.instances
            .get(type_name)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    fn register(&self, type_name: &str, instance: InstanceHandle) {
        self.instances
            .entry(type_name.to_string())
            .or_default()
            .push(instance);
    }

    fn unregister(&self, type_name: &str, instance: &InstanceHandle) -> bool {
        let Some(mut entry) = self.instances.get_mut(type_name) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|i| i.id() != instance.id());
        before != entry.len()
    }

    fn rekey(&self, old_name: &str, new_name: &str) {
        if old_name == new_name {
            return;
        }
        if let Some((_, moved)) = self.instances.remove(old_name) {
            for instance in &moved {
                instance.set_type_name(new_name);
            }
            self.instances
                .entry(new_name.to_string())
                .or_default()
                .extend(moved);
        }
    }

    fn count(&self, type_name: &str) -> usize {
        self.instances.get(type_name).map(|e| e.len()).unwrap_or(0)
    }
}
