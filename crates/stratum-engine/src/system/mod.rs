//! The type system session
//!
//! `TypeSystem` owns the type arena and every registry the resolver and the
//! update engine consult. Each arena slot holds an immutable `TypeNode`
//! snapshot plus the per-node caches derived from it.
//!
//! Mutations (declarations, modify links, version bumps, instance
//! registration) serialize on a single structural lock. Reads never take
//! it: they clone the current snapshot and validate cached entries against
//! the snapshot's `version`. Property access on live instances shares a
//! separate layout gate that an update holds exclusively while it swaps
//! slot tables and migrates instances.

mod chain;
mod declare;
pub(crate) mod instances;

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use rustc_hash::FxHashMap;
use stratum_sdk::{ArtifactStore, InstanceHandle, InstanceRegistry, LayerOrdering};

use crate::config::EngineOptions;
use crate::diagnostics::Diagnostics;
use crate::error::EngineResult;
use crate::model::{TypeId, TypeNode, TypeRef};
use crate::processor::DefinitionProcessor;
use crate::resolve::{CachedLookup, MemberIndex, MemberKey};
use crate::slots::SlotTable;
use crate::stale::StaleModel;
use crate::update::UpdateListener;

/// A natively compiled class known to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledClass {
    /// Qualified name of the type the class implements
    pub name: String,
    /// Constructor parameter lists
    pub constructors: Vec<Vec<TypeRef>>,
    /// Class exposes the dynamic-object protocol (no stub needed below it)
    pub dynamic_protocol: bool,
}

impl CompiledClass {
    /// Create a class with a single no-arg constructor
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructors: vec![Vec::new()],
            dynamic_protocol: false,
        }
    }

    /// Replace the constructor list
    pub fn with_constructors(mut self, constructors: Vec<Vec<TypeRef>>) -> Self {
        self.constructors = constructors;
        self
    }

    /// Mark the class as implementing the dynamic-object protocol
    pub fn with_dynamic_protocol(mut self) -> Self {
        self.dynamic_protocol = true;
        self
    }
}

/// Arena slot: current snapshot plus caches derived from it
pub(crate) struct NodeCell {
    node: RwLock<Arc<TypeNode>>,
    pub(crate) index: Mutex<Option<Arc<MemberIndex>>>,
    pub(crate) members: DashMap<MemberKey, CachedLookup>,
    pub(crate) slots: Mutex<Option<Arc<SlotTable>>>,
}

impl NodeCell {
    fn new(node: TypeNode) -> Self {
        Self {
            node: RwLock::new(Arc::new(node)),
            index: Mutex::new(None),
            members: DashMap::new(),
            slots: Mutex::new(None),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<TypeNode> {
        self.node.read().clone()
    }
}

/// Session object holding the arena and all registries
pub struct TypeSystem {
    options: EngineOptions,
    layers: Arc<dyn LayerOrdering>,
    instances: Arc<dyn InstanceRegistry>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    arena: RwLock<Vec<Arc<NodeCell>>>,
    /// Qualified name -> root node of the modify chain
    names: RwLock<FxHashMap<String, TypeId>>,
    /// Qualified base/interface name -> nodes extending or implementing it
    subtypes: RwLock<FxHashMap<String, Vec<TypeId>>>,
    compiled: DashMap<String, CompiledClass>,
    statics: DashMap<String, InstanceHandle>,
    structure: Mutex<()>,
    /// Held shared by instance property access, exclusively while live
    /// instances are re-laid out
    layouts: RwLock<()>,
    processors: RwLock<Vec<Arc<dyn DefinitionProcessor>>>,
    listeners: RwLock<Vec<Arc<dyn UpdateListener>>>,
    stale: StaleModel,
    diagnostics: Diagnostics,
}

impl TypeSystem {
    /// Create a session with default options
    pub fn new(layers: Arc<dyn LayerOrdering>, instances: Arc<dyn InstanceRegistry>) -> Self {
        Self::build(EngineOptions::default(), layers, instances)
    }

    /// Create a session with explicit options
    pub fn with_options(
        options: EngineOptions,
        layers: Arc<dyn LayerOrdering>,
        instances: Arc<dyn InstanceRegistry>,
    ) -> EngineResult<Self> {
        options.validate()?;
        Ok(Self::build(options, layers, instances))
    }

    fn build(
        options: EngineOptions,
        layers: Arc<dyn LayerOrdering>,
        instances: Arc<dyn InstanceRegistry>,
    ) -> Self {
        Self {
            options,
            layers,
            instances,
            artifacts: None,
            arena: RwLock::new(Vec::new()),
            names: RwLock::new(FxHashMap::default()),
            subtypes: RwLock::new(FxHashMap::default()),
            compiled: DashMap::new(),
            statics: DashMap::new(),
            structure: Mutex::new(()),
            layouts: RwLock::new(()),
            processors: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            stale: StaleModel::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Attach the artifact store used for stub generation
    pub fn with_artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(store);
        self
    }

    /// Session options
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Layer ordering collaborator
    pub fn layers(&self) -> &Arc<dyn LayerOrdering> {
        &self.layers
    }

    /// Live instance registry collaborator
    pub fn instances(&self) -> &Arc<dyn InstanceRegistry> {
        &self.instances
    }

    pub(crate) fn artifacts(&self) -> Option<&Arc<dyn ArtifactStore>> {
        self.artifacts.as_ref()
    }

    /// Recorded diagnostics
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Stale-model flag
    pub fn stale(&self) -> &StaleModel {
        &self.stale
    }

    /// Check if a rebuild is required before further structural changes
    pub fn is_stale(&self) -> bool {
        self.stale.is_stale()
    }

    /// Union of all stale reasons
    pub fn stale_reason(&self) -> Option<String> {
        self.stale.reason()
    }

    /// Called by the build driver after a full rebuild
    pub fn rebuild_completed(&self) {
        tracing::debug!("rebuild completed, clearing stale model flag");
        self.stale.clear();
    }

    // ========================================================================
    // Registries
    // ========================================================================

    /// Register a definition processor; applies to types declared afterwards
    pub fn register_processor(&self, processor: Arc<dyn DefinitionProcessor>) {
        tracing::debug!(processor = processor.name(), "registered definition processor");
        self.processors.write().push(processor);
    }

    /// Register an update listener
    pub fn add_listener(&self, listener: Arc<dyn UpdateListener>) {
        self.listeners.write().push(listener);
    }

    pub(crate) fn listeners(&self) -> Vec<Arc<dyn UpdateListener>> {
        self.listeners.read().clone()
    }

    pub(crate) fn processors(&self) -> Vec<Arc<dyn DefinitionProcessor>> {
        self.processors.read().clone()
    }

    /// Record a natively compiled class
    pub fn register_compiled_class(&self, class: CompiledClass) {
        tracing::debug!(class = %class.name, "registered compiled class");
        self.compiled.insert(class.name.clone(), class);
    }

    /// Compiled class for a qualified type name
    pub fn compiled_class(&self, name: &str) -> Option<CompiledClass> {
        self.compiled.get(name).map(|entry| entry.clone())
    }

    /// Check if a compiled class is loaded for the qualified name
    pub fn has_compiled_class(&self, name: &str) -> bool {
        self.compiled.contains_key(name)
    }

    pub(crate) fn statics(&self) -> &DashMap<String, InstanceHandle> {
        &self.statics
    }

    // ========================================================================
    // Arena
    // ========================================================================

    /// Current snapshot of a node
    pub fn node(&self, id: TypeId) -> Option<Arc<TypeNode>> {
        self.cell(id).map(|cell| cell.snapshot())
    }

    /// Qualified name of a node
    pub fn qualified_name(&self, id: TypeId) -> Option<String> {
        self.node(id).map(|node| node.qualified_name.clone())
    }

    /// Number of nodes in the arena (including superseded ones)
    pub fn type_count(&self) -> usize {
        self.arena.read().len()
    }

    pub(crate) fn cell(&self, id: TypeId) -> Option<Arc<NodeCell>> {
        self.arena.read().get(id.index()).cloned()
    }

    /// Allocate a node; `init` receives the new handle
    pub(crate) fn push_node(&self, init: impl FnOnce(TypeId) -> TypeNode) -> TypeId {
        let mut arena = self.arena.write();
        let id = TypeId(arena.len() as u32);
        arena.push(Arc::new(NodeCell::new(init(id))));
        id
    }

    /// Replace a node's snapshot with a modified copy. The version bump is
    /// part of the same swap. Caller holds the structural lock.
    pub(crate) fn update_node(&self, id: TypeId, f: impl FnOnce(&mut TypeNode)) {
        let Some(cell) = self.cell(id) else {
            return;
        };
        let mut guard = cell.node.write();
        let mut next = TypeNode::clone(&guard);
        f(&mut next);
        next.version = guard.version + 1;
        *guard = Arc::new(next);
    }

    /// Replace a freshly allocated node's snapshot without a version bump
    pub(crate) fn fill_node(&self, id: TypeId, node: TypeNode) {
        if let Some(cell) = self.cell(id) {
            *cell.node.write() = Arc::new(node);
        }
    }

    pub(crate) fn lock_structure(&self) -> MutexGuard<'_, ()> {
        self.structure.lock()
    }

    pub(crate) fn layout_gate(&self) -> &RwLock<()> {
        &self.layouts
    }

    pub(crate) fn names(&self) -> &RwLock<FxHashMap<String, TypeId>> {
        &self.names
    }

    pub(crate) fn subtype_index(&self) -> &RwLock<FxHashMap<String, Vec<TypeId>>> {
        &self.subtypes
    }
}
