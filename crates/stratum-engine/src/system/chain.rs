//! Modify-chain and base-chain resolution, version propagation

use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use stratum_sdk::LayerId;

use super::TypeSystem;
use crate::diagnostics::DiagnosticKind;
use crate::model::{TypeId, TypeNode, TypeRef};

impl TypeSystem {
    /// Current authoritative node for the logical type of `id`.
    ///
    /// With `most_specific` the whole `replaced_by` chain is followed to its
    /// end. Otherwise only nodes superseded wholesale (`replaced`) are
    /// skipped, so a modified-but-live node resolves to itself.
    pub fn resolve(&self, id: TypeId, most_specific: bool) -> TypeId {
        let max = self.options().max_chain_depth;
        let mut current = id;
        for _ in 0..=max {
            let Some(node) = self.node(current) else {
                return current;
            };
            match node.replaced_by {
                Some(next) if most_specific || node.replaced => current = next,
                _ => return current,
            }
        }
        let name = self.qualified_name(id).unwrap_or_default();
        self.diagnostics().report(
            DiagnosticKind::CycleGuard,
            &name,
            format!("replaced-by chain exceeds {} links; resolution stopped", max),
        );
        current
    }

    /// Most specific node registered under a qualified name
    pub fn find_type(&self, name: &str) -> Option<TypeId> {
        let root = self.names().read().get(name).copied()?;
        let id = self.resolve(root, true);
        match self.node(id) {
            Some(node) if !node.removed => Some(id),
            _ => None,
        }
    }

    /// Most specific node of `name` visible from `layer`: the last chain
    /// member declared in `layer` or one of its ancestor layers
    pub fn find_type_in_layer(&self, name: &str, layer: LayerId) -> Option<TypeId> {
        let root = self.names().read().get(name).copied()?;
        self.modify_chain(root)
            .into_iter()
            .filter_map(|id| self.node(id))
            .filter(|node| !node.removed && self.layers().is_ancestor_layer(node.layer, layer))
            .map(|node| node.id)
            .last()
    }

    /// Live modify chain containing `id`, root first
    pub fn modify_chain(&self, id: TypeId) -> Vec<TypeId> {
        let max = self.options().max_chain_depth;
        let start = self.resolve(id, false);

        let mut root = start;
        let mut steps = 0;
        while let Some(prev) = self.node(root).and_then(|n| n.replaces) {
            if steps >= max {
                self.report_chain_overflow(start, "replaces");
                break;
            }
            root = prev;
            steps += 1;
        }

        let mut chain = vec![root];
        let mut current = root;
        while let Some(next) = self.node(current).and_then(|n| n.replaced_by) {
            if chain.len() > max || chain.contains(&next) {
                self.report_chain_overflow(start, "replaced-by");
                break;
            }
            chain.push(next);
            current = next;
        }
        chain
    }

    fn report_chain_overflow(&self, id: TypeId, link: &str) {
        let name = self.qualified_name(id).unwrap_or_default();
        self.diagnostics().report(
            DiagnosticKind::CycleGuard,
            &name,
            format!("{} chain is cyclic or exceeds the depth guard", link),
        );
    }

    /// The type this node derives from: the modified node for a modify
    /// overlay, the base type otherwise
    pub fn derived_type(&self, id: TypeId) -> Option<TypeId> {
        let node = self.node(id)?;
        if node.is_modify {
            return node.replaces;
        }
        self.extends_type(id)
    }

    /// Most specific base type seen at the compiled level. A modify overlay
    /// without its own `extends` inherits the modified type's.
    pub fn extends_type(&self, id: TypeId) -> Option<TypeId> {
        let name = self.extends_name(id)?;
        let base = self.find_type(&name);
        if base.is_none() {
            self.diagnostics().report(
                DiagnosticKind::UnresolvedType,
                &self.qualified_name(id).unwrap_or_default(),
                format!("base type {} is not declared", name),
            );
        }
        base
    }

    /// Declared base type name, following modify overlays
    pub fn extends_name(&self, id: TypeId) -> Option<String> {
        let max = self.options().max_chain_depth;
        let mut current = self.node(id)?;
        for _ in 0..=max {
            if let Some(extends) = &current.extends {
                return Some(extends.clone());
            }
            if !current.is_modify {
                return None;
            }
            current = self.node(current.replaces?)?;
        }
        self.report_chain_overflow(id, "replaces");
        None
    }

    /// Check if `sub` is `sup` or inherits from it, by logical type
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        match (self.node(sub), self.node(sup)) {
            (Some(sub), Some(sup)) => self.is_subtype_name(&sub.qualified_name, &sup.qualified_name),
            _ => false,
        }
    }

    /// Name-based form of `is_subtype`
    pub fn is_subtype_name(&self, sub: &str, sup: &str) -> bool {
        if sub == sup {
            return true;
        }
        let mut seen = FxHashSet::default();
        let mut queue = VecDeque::from([sub.to_string()]);
        while let Some(name) = queue.pop_front() {
            if name == sup {
                return true;
            }
            if !seen.insert(name.clone()) {
                continue;
            }
            let Some(id) = self.find_type(&name) else {
                continue;
            };
            for member in self.modify_chain(id) {
                if let Some(node) = self.node(member) {
                    queue.extend(node_supers(&node));
                }
            }
        }
        false
    }

    /// Assignability with named types checked along the hierarchy
    pub fn is_assignable(&self, from: &TypeRef, to: &TypeRef) -> bool {
        match from.primitive_assignable_to(to) {
            Some(result) => result,
            None => match (from.type_name(), to.type_name()) {
                (Some(from), Some(to)) => self.is_subtype_name(from, to),
                _ => false,
            },
        }
    }

    // ========================================================================
    // Link mutation (caller holds the structural lock)
    // ========================================================================

    /// Index in `chain` after which an overlay declared in `layer` goes:
    /// the last member whose layer does not come after `layer`
    pub(crate) fn overlay_position(&self, chain: &[TypeId], layer: LayerId) -> usize {
        let position = self.layers().position_of(layer);
        let mut at = 0;
        for (i, &id) in chain.iter().enumerate() {
            match self.node(id) {
                Some(node) if self.layers().position_of(node.layer) <= position => at = i,
                _ => break,
            }
        }
        at
    }

    /// Insert `overlay` into the modify chain of `target`
    pub(crate) fn link_overlay(&self, target: TypeId, overlay: TypeId) {
        let Some(overlay_node) = self.node(overlay) else {
            return;
        };
        let chain = self.modify_chain(target);
        let after = chain[self.overlay_position(&chain, overlay_node.layer)];
        let next = self.node(after).and_then(|n| n.replaced_by);

        self.update_node(overlay, |n| {
            n.replaces = Some(after);
            n.replaced_by = next;
            n.is_modify = true;
            n.replaced = false;
            n.removed = false;
        });
        if let Some(next) = next {
            self.update_node(next, |n| n.replaces = Some(overlay));
        }
        self.update_node(after, |n| n.replaced_by = Some(overlay));
    }

    /// Put `new` in the chain position of `old` and retire `old`
    pub(crate) fn splice_replace(&self, old: TypeId, new: TypeId) {
        let Some(old_node) = self.node(old) else {
            return;
        };
        self.update_node(new, |n| {
            n.replaces = old_node.replaces;
            n.replaced_by = old_node.replaced_by;
            n.is_modify = old_node.is_modify;
            n.replaced = false;
        });
        if let Some(prev) = old_node.replaces {
            self.update_node(prev, |n| n.replaced_by = Some(new));
        }
        if let Some(next) = old_node.replaced_by {
            self.update_node(next, |n| n.replaces = Some(new));
        }
        self.update_node(old, |n| {
            n.replaced_by = Some(new);
            n.replaced = true;
        });
    }

    /// Take `old` out of its chain. An overlay reverts to the node it
    /// modified; a root type is marked removed and loses its name.
    pub(crate) fn unlink(&self, old: TypeId) {
        let Some(old_node) = self.node(old) else {
            return;
        };
        match (old_node.is_modify, old_node.replaces) {
            (true, Some(prev)) => {
                let next = old_node.replaced_by;
                if let Some(next) = next {
                    self.update_node(next, |n| n.replaces = Some(prev));
                }
                self.update_node(prev, |n| n.replaced_by = next);
                self.update_node(old, |n| {
                    n.replaced_by = Some(prev);
                    n.replaced = true;
                    n.removed = true;
                });
            }
            _ => {
                self.unregister_name(old);
                self.remove_subtype_edges(&old_node);
                self.update_node(old, |n| n.removed = true);
            }
        }
    }

    /// Point `id` at a new superseding node. Low-level: no cycle check is
    /// made; every chain walk is depth guarded.
    pub fn link_replaced_by(&self, id: TypeId, next: Option<TypeId>) {
        let _guard = self.lock_structure();
        self.update_node(id, |n| n.replaced_by = next);
    }

    /// Attach the transformed representation of a type
    pub fn set_transformed(&self, id: TypeId, transformed: Option<TypeId>) {
        let _guard = self.lock_structure();
        self.update_node(id, |n| n.transformed = transformed);
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Bump the version of `id`, of every node overriding it and of every
    /// transitively known sub-type. Caller holds the structural lock.
    pub(crate) fn invalidate(&self, id: TypeId) {
        let Some(node) = self.node(id) else {
            return;
        };
        let mut bumped = FxHashSet::default();
        let mut propagated = FxHashSet::default();
        self.bump_chain(id, &mut bumped);
        self.propagate(&node.qualified_name, &mut Vec::new(), &mut propagated, &mut bumped);
    }

    /// Public form of `invalidate` for external drivers
    pub fn invalidate_type(&self, id: TypeId) {
        let _guard = self.lock_structure();
        self.invalidate(id);
    }

    fn bump_chain(&self, id: TypeId, bumped: &mut FxHashSet<TypeId>) {
        let max = self.options().max_chain_depth;
        let mut seen = FxHashSet::default();
        let mut current = Some(id);
        while let Some(cur) = current {
            if !seen.insert(cur) || seen.len() > max {
                self.report_chain_overflow(id, "replaced-by");
                return;
            }
            if bumped.insert(cur) {
                self.update_node(cur, |_| {});
            }
            current = self.node(cur).and_then(|n| n.replaced_by);
        }
    }

    fn propagate(
        &self,
        name: &str,
        path: &mut Vec<String>,
        propagated: &mut FxHashSet<String>,
        bumped: &mut FxHashSet<TypeId>,
    ) {
        if path.iter().any(|p| p == name) {
            self.diagnostics().report(
                DiagnosticKind::CycleGuard,
                name,
                format!("sub-type graph is cyclic: {} -> {}", path.join(" -> "), name),
            );
            return;
        }
        if path.len() > self.options().max_propagation_depth {
            self.diagnostics().report(
                DiagnosticKind::CycleGuard,
                name,
                "version propagation exceeds the depth guard",
            );
            return;
        }
        if !propagated.insert(name.to_string()) {
            return;
        }

        let subtypes = self
            .subtype_index()
            .read()
            .get(name)
            .cloned()
            .unwrap_or_default();
        path.push(name.to_string());
        for sub in subtypes {
            self.bump_chain(sub, bumped);
            if let Some(sub_name) = self.qualified_name(sub) {
                self.propagate(&sub_name, path, propagated, bumped);
            }
        }
        path.pop();
    }

    /// Qualified names of every transitive sub-type of `name`
    pub fn subtype_names(&self, name: &str) -> Vec<String> {
        let max = self.options().max_propagation_depth;
        let mut found: Vec<String> = Vec::new();
        let mut frontier = vec![name.to_string()];
        for _ in 0..max {
            let mut next = Vec::new();
            for current in &frontier {
                let subs = self
                    .subtype_index()
                    .read()
                    .get(current)
                    .cloned()
                    .unwrap_or_default();
                for sub in subs {
                    let Some(node) = self.node(sub) else {
                        continue;
                    };
                    if node.replaced || node.removed {
                        continue;
                    }
                    if node.qualified_name != name && !found.contains(&node.qualified_name) {
                        found.push(node.qualified_name.clone());
                        next.push(node.qualified_name.clone());
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        found
    }
}

/// Names a node extends or implements, in lookup order
fn node_supers(node: &TypeNode) -> Vec<String> {
    node.extends
        .iter()
        .chain(node.interfaces.iter())
        .chain(node.scope_interfaces.iter())
        .cloned()
        .collect()
}
