//! Update context: effective bodies before and after, and the
//! classification of their differences

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::error::{EngineError, EngineResult};
use crate::model::{BlockDecl, FieldDecl, Initializer, InnerTypeRef, Member, MethodDecl, TypeId, TypeNode};
use crate::system::TypeSystem;
use crate::update::UpdateMode;

/// A field as seen through a whole modify chain
#[derive(Debug, Clone)]
pub(crate) struct FieldEntry {
    pub(crate) decl: FieldDecl,
    pub(crate) owner: TypeId,
}

/// Effective body of a logical type: the merge of its modify chain
#[derive(Debug, Default)]
pub(crate) struct BodyView {
    pub(crate) fields: IndexMap<String, FieldEntry>,
    /// Assignments to properties not declared in the chain
    pub(crate) assigns: IndexMap<String, Initializer>,
    pub(crate) inners: IndexMap<String, InnerTypeRef>,
    pub(crate) methods: IndexMap<String, MethodDecl>,
    pub(crate) blocks: Vec<BlockDecl>,
    pub(crate) extends: Option<String>,
    /// Property names in the order their first field or assignment appears
    pub(crate) order: IndexSet<String>,
}

impl BodyView {
    /// Merge a chain of snapshots, root first
    pub(crate) fn of(chain: &[Arc<TypeNode>]) -> Self {
        let mut view = BodyView::default();
        for node in chain {
            if node.extends.is_some() {
                view.extends = node.extends.clone();
            }
            for member in &node.body {
                match member.as_ref() {
                    Member::Field(f) => {
                        view.order.insert(f.name.clone());
                        view.assigns.shift_remove(&f.name);
                        view.fields.insert(
                            f.name.clone(),
                            FieldEntry {
                                decl: f.clone(),
                                owner: node.id,
                            },
                        );
                    }
                    Member::Assign(a) => {
                        view.order.insert(a.name.clone());
                        match view.fields.get_mut(&a.name) {
                            Some(entry) => entry.decl.init = Some(a.init.clone()),
                            None => {
                                view.assigns.insert(a.name.clone(), a.init.clone());
                            }
                        }
                    }
                    Member::InnerType(inner) => {
                        view.inners.insert(inner.name.clone(), inner.clone());
                    }
                    Member::Method(m) => {
                        view.methods.insert(m.signature(), m.clone());
                    }
                    Member::Block(b) => view.blocks.push(b.clone()),
                    Member::Constructor(_) => {}
                }
            }
        }
        view
    }
}

/// Nested update of an inner type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChildUpdate {
    pub(crate) old: TypeId,
    pub(crate) new: TypeId,
    pub(crate) mode: UpdateMode,
}

/// Per-update structure: built, consumed and discarded within one
/// `update_type` call
#[derive(Debug)]
pub struct UpdateContext {
    pub(crate) mode: UpdateMode,
    /// Live node being replaced, modified or removed
    pub(crate) old: TypeId,
    pub(crate) new: TypeId,
    pub(crate) old_name: String,
    pub(crate) new_name: String,
    pub(crate) old_node: Arc<TypeNode>,
    pub(crate) new_node: Arc<TypeNode>,
    pub(crate) before: BodyView,
    pub(crate) after: BodyView,
    /// `after` is empty because the whole type goes away
    pub(crate) type_removed: bool,
    pub(crate) to_add: Vec<String>,
    pub(crate) to_update: Vec<String>,
    pub(crate) to_remove: Vec<String>,
    pub(crate) inner_added: Vec<TypeId>,
    pub(crate) inner_removed: Vec<String>,
    /// Inner types replaced wholesale (different base type)
    pub(crate) inner_replaced: Vec<(TypeId, TypeId)>,
    pub(crate) children: Vec<ChildUpdate>,
    pub(crate) methods_changed: Vec<String>,
    pub(crate) blocks_changed: bool,
    pub(crate) base_changed: bool,
}

impl UpdateContext {
    /// Build the context. Caller holds the structural lock.
    pub(crate) fn build(system: &TypeSystem, old: TypeId, new: TypeId, mode: UpdateMode) -> EngineResult<Self> {
        let old = system.resolve(old, false);
        let old_node = system
            .node(old)
            .ok_or_else(|| EngineError::TypeNotFound(old.to_string()))?;
        let new_node = match mode {
            UpdateMode::Remove => old_node.clone(),
            UpdateMode::Replace | UpdateMode::Add => {
                let node = system
                    .node(new)
                    .ok_or_else(|| EngineError::TypeNotFound(new.to_string()))?;
                if new == old || node.replaces.is_some() || node.replaced_by.is_some() {
                    return Err(EngineError::InvalidDeclaration(format!(
                        "{} is already part of a modify chain",
                        node.qualified_name
                    )));
                }
                let renames = node.qualified_name != old_node.qualified_name;
                if renames && (mode == UpdateMode::Add || old_node.is_modify) {
                    return Err(EngineError::InvalidDeclaration(format!(
                        "modify overlay {} must keep the name {}",
                        node.qualified_name, old_node.qualified_name
                    )));
                }
                node
            }
        };

        let chain = system.modify_chain(old);
        let snapshots: Vec<Arc<TypeNode>> = chain.iter().filter_map(|&id| system.node(id)).collect();

        let mut after_chain: Vec<Arc<TypeNode>> = Vec::new();
        let mut type_removed = false;
        match mode {
            UpdateMode::Replace => {
                for node in &snapshots {
                    after_chain.push(if node.id == old {
                        new_node.clone()
                    } else {
                        node.clone()
                    });
                }
            }
            UpdateMode::Add => {
                let at = system.overlay_position(&chain, new_node.layer);
                after_chain = snapshots.clone();
                after_chain.insert(at + 1, new_node.clone());
            }
            UpdateMode::Remove => {
                if old_node.is_modify && old_node.replaces.is_some() {
                    after_chain = snapshots.iter().filter(|n| n.id != old).cloned().collect();
                } else {
                    type_removed = true;
                }
            }
        }

        let mut ctx = UpdateContext {
            mode,
            old,
            new: new_node.id,
            old_name: old_node.qualified_name.clone(),
            new_name: new_node.qualified_name.clone(),
            before: BodyView::of(&snapshots),
            after: BodyView::of(&after_chain),
            old_node,
            new_node,
            type_removed,
            to_add: Vec::new(),
            to_update: Vec::new(),
            to_remove: Vec::new(),
            inner_added: Vec::new(),
            inner_removed: Vec::new(),
            inner_replaced: Vec::new(),
            children: Vec::new(),
            methods_changed: Vec::new(),
            blocks_changed: false,
            base_changed: false,
        };
        ctx.classify(system);
        Ok(ctx)
    }

    fn classify(&mut self, system: &TypeSystem) {
        let (before, after) = (&self.before, &self.after);

        for (name, entry) in &after.fields {
            match before.fields.get(name) {
                None => self.to_add.push(name.clone()),
                Some(previous) => {
                    let decl = &entry.decl;
                    let old = &previous.decl;
                    if decl.init != old.init
                        || decl.ty != old.ty
                        || decl.modifiers.is_static != old.modifiers.is_static
                    {
                        self.to_update.push(name.clone());
                    }
                }
            }
        }
        for name in before.fields.keys() {
            if !after.fields.contains_key(name) {
                self.to_remove.push(name.clone());
            }
        }
        for (name, init) in &after.assigns {
            if before.assigns.get(name) != Some(init) && !self.to_update.contains(name) {
                self.to_update.push(name.clone());
            }
        }
        for name in before.assigns.keys() {
            if !after.assigns.contains_key(name) && !after.fields.contains_key(name) {
                self.to_update.push(name.clone());
            }
        }

        for (signature, method) in &after.methods {
            match before.methods.get(signature) {
                Some(previous) if previous.body == method.body && previous.ret == method.ret => {}
                _ => self.methods_changed.push(signature.clone()),
            }
        }
        for signature in before.methods.keys() {
            if !after.methods.contains_key(signature) {
                self.methods_changed.push(signature.clone());
            }
        }
        self.blocks_changed = before.blocks != after.blocks;
        self.base_changed = !self.type_removed && before.extends != after.extends;

        for (name, inner) in &before.inners {
            if inner.is_object && !after.inners.contains_key(name) {
                self.inner_removed.push(name.clone());
            }
        }
        self.classify_inners(system);
    }

    /// Pair up inner types of the old and new nodes
    fn classify_inners(&mut self, system: &TypeSystem) {
        let extends_of = |id: TypeId| system.node(id).and_then(|n| n.extends.clone());
        match self.mode {
            UpdateMode::Replace => {
                for inner in self.new_node.inner_types() {
                    match self.old_node.inner_named(&inner.name) {
                        Some(previous) if extends_of(previous.id) == extends_of(inner.id) => {
                            self.children.push(ChildUpdate {
                                old: previous.id,
                                new: inner.id,
                                mode: UpdateMode::Replace,
                            });
                        }
                        Some(previous) => self.inner_replaced.push((previous.id, inner.id)),
                        None => match self.before.inners.get(&inner.name) {
                            Some(inherited) => self.children.push(ChildUpdate {
                                old: inherited.id,
                                new: inner.id,
                                mode: UpdateMode::Add,
                            }),
                            None => self.inner_added.push(inner.id),
                        },
                    }
                }
                for inner in self.old_node.inner_types() {
                    if self.new_node.inner_named(&inner.name).is_none() {
                        self.children.push(ChildUpdate {
                            old: inner.id,
                            new: inner.id,
                            mode: UpdateMode::Remove,
                        });
                    }
                }
            }
            UpdateMode::Add => {
                for inner in self.new_node.inner_types() {
                    match self.before.inners.get(&inner.name) {
                        Some(existing) => self.children.push(ChildUpdate {
                            old: existing.id,
                            new: inner.id,
                            mode: UpdateMode::Add,
                        }),
                        None => self.inner_added.push(inner.id),
                    }
                }
            }
            UpdateMode::Remove => {
                for inner in self.old_node.inner_types() {
                    self.children.push(ChildUpdate {
                        old: inner.id,
                        new: inner.id,
                        mode: UpdateMode::Remove,
                    });
                }
            }
        }
    }

    /// Qualified name of the type after the update
    pub fn type_name(&self) -> &str {
        &self.new_name
    }

    /// Properties only in the new body
    pub fn to_add(&self) -> &[String] {
        &self.to_add
    }

    /// Properties whose initializer or type changed
    pub fn to_update(&self) -> &[String] {
        &self.to_update
    }

    /// Properties only in the old body
    pub fn to_remove(&self) -> &[String] {
        &self.to_remove
    }

    /// Check if the effective base type changes
    pub fn base_changed(&self) -> bool {
        self.base_changed
    }

    /// Properties whose initializers re-run on live instances, in new body
    /// order: changed ones plus added ones that have an initializer.
    /// Assignments reverted to an inherited initializer come last.
    pub(crate) fn reinit_order(&self) -> Vec<(String, bool)> {
        let mut order = Vec::new();
        for name in &self.after.order {
            match self.after.fields.get(name) {
                Some(entry) => {
                    let changed = self.to_update.contains(name);
                    let added_with_init = self.to_add.contains(name) && entry.decl.init.is_some();
                    if changed || added_with_init {
                        order.push((name.clone(), entry.decl.modifiers.is_static));
                    }
                }
                None if self.to_update.contains(name) => order.push((name.clone(), false)),
                None => {}
            }
        }
        for name in &self.to_update {
            if !self.after.order.contains(name) {
                order.push((name.clone(), false));
            }
        }
        order
    }
}
