//! Update transaction: stale checks, structural application, field
//! re-initialization and notification

use std::sync::Arc;

use rustc_hash::FxHashSet;
use stratum_sdk::Value;

use crate::diagnostics::DiagnosticKind;
use crate::error::EngineResult;
use crate::model::{EvalScope, TypeId};
use crate::slots::SlotTable;
use crate::system::instances::{migrate_instance, write_slot};
use crate::system::TypeSystem;
use crate::update::context::{ChildUpdate, UpdateContext};
use crate::update::{UpdateMode, UpdateOutcome, UpdatePhase, UpdateResult, UpdateSummary};

/// Slot table of a type with live instances, captured before the change
struct CapturedLayout {
    /// Name the instances are registered under after the change
    type_name: String,
    table: Arc<SlotTable>,
}

impl TypeSystem {
    /// Apply `new` to `old` and push the difference to live instances.
    ///
    /// Layouts of live instances are always migrated so they match the new
    /// slot tables; `apply_to_live_instances` controls whether changed
    /// initializers are re-run on them. A change that cannot be applied
    /// safely returns `UpdateOutcome::Stale` and marks the session stale.
    pub fn update_type(
        &self,
        old: TypeId,
        new: TypeId,
        mode: UpdateMode,
        apply_to_live_instances: bool,
    ) -> EngineResult<UpdateResult> {
        let request = ChildUpdate { old, new, mode };
        self.update_at(request, apply_to_live_instances, 0)
    }

    /// Remove a type (or a modify overlay) in `Remove` mode
    pub fn remove_type(&self, id: TypeId, apply_to_live_instances: bool) -> EngineResult<UpdateResult> {
        self.update_type(id, id, UpdateMode::Remove, apply_to_live_instances)
    }

    fn update_at(&self, request: ChildUpdate, apply: bool, depth: usize) -> EngineResult<UpdateResult> {
        let mut phases = Vec::new();
        let max = self.options().max_chain_depth;
        if depth > max {
            let type_name = self.qualified_name(request.old).unwrap_or_default();
            let message = format!("nested update exceeds {} levels", max);
            self.diagnostics()
                .report(DiagnosticKind::CycleGuard, &type_name, message.clone());
            return Ok(UpdateResult {
                type_name,
                outcome: UpdateOutcome::Aborted(message),
                summary: UpdateSummary::empty(request.mode),
                phases,
                children: Vec::new(),
            });
        }

        let guard = self.lock_structure();
        phases.push(UpdatePhase::BuildingContext);
        let ctx = UpdateContext::build(self, request.old, request.new, request.mode)?;
        phases.push(UpdatePhase::Classifying);
        let mut summary = self.summarize(&ctx);
        tracing::debug!(
            type_name = %ctx.new_name,
            mode = ?ctx.mode,
            added = ctx.to_add.len(),
            updated = ctx.to_update.len(),
            removed = ctx.to_remove.len(),
            children = ctx.children.len(),
            "classified update"
        );

        let reasons = self.stale_reasons(&ctx);
        if !reasons.is_empty() {
            drop(guard);
            for reason in &reasons {
                self.stale().mark(reason.clone());
            }
            let reason = reasons.join("; ");
            tracing::warn!(type_name = %ctx.new_name, %reason, "update needs a rebuild");
            phases.push(UpdatePhase::Stale);
            return Ok(UpdateResult {
                type_name: ctx.new_name.clone(),
                outcome: UpdateOutcome::Stale(reason),
                summary,
                phases,
                children: Vec::new(),
            });
        }

        phases.push(UpdatePhase::ApplyingStructural);
        let layouts = self.capture_layouts(&ctx);
        {
            let _gate = self.layout_gate().write();
            self.apply_structural(&ctx);
            self.migrate_layouts(&ctx, &layouts);
        }
        drop(guard);

        phases.push(UpdatePhase::ApplyingFieldReinit);
        if apply {
            summary.instances_updated = self.reinit_fields(&ctx);
        }

        let mut children = Vec::new();
        for child in &ctx.children {
            match self.update_at(*child, apply, depth + 1) {
                Ok(result) => children.push(result),
                Err(err) => {
                    let type_name = self.qualified_name(child.old).unwrap_or_default();
                    self.diagnostics().report(
                        DiagnosticKind::UnresolvedType,
                        &type_name,
                        format!("inner type update failed: {}", err),
                    );
                    children.push(UpdateResult {
                        type_name,
                        outcome: UpdateOutcome::Aborted(err.to_string()),
                        summary: UpdateSummary::empty(child.mode),
                        phases: Vec::new(),
                        children: Vec::new(),
                    });
                }
            }
        }

        phases.push(UpdatePhase::Notifying);
        let mut result = UpdateResult {
            type_name: ctx.new_name.clone(),
            outcome: UpdateOutcome::Applied,
            summary,
            phases,
            children,
        };
        for listener in self.listeners() {
            listener.type_updated(&result);
        }
        result.phases.push(UpdatePhase::Done);
        tracing::debug!(type_name = %result.type_name, "update applied");
        Ok(result)
    }

    fn summarize(&self, ctx: &UpdateContext) -> UpdateSummary {
        let inner_removed = ctx
            .children
            .iter()
            .filter(|child| child.mode == UpdateMode::Remove)
            .filter_map(|child| self.qualified_name(child.old))
            .collect();
        UpdateSummary {
            mode: ctx.mode,
            added: ctx.to_add.clone(),
            updated: ctx.to_update.clone(),
            removed: ctx.to_remove.clone(),
            inner_added: ctx
                .inner_added
                .iter()
                .filter_map(|&id| self.qualified_name(id))
                .collect(),
            inner_removed,
            methods_changed: ctx.methods_changed.clone(),
            blocks_changed: ctx.blocks_changed,
            base_changed: ctx.base_changed,
            instances_updated: 0,
        }
    }

    fn live_instance_count(&self, type_name: &str) -> usize {
        self.instances_of_type_and_subtypes(type_name).len()
    }

    /// Reasons the change cannot be applied live; empty when it can
    fn stale_reasons(&self, ctx: &UpdateContext) -> Vec<String> {
        let mut reasons = Vec::new();
        let name = &ctx.old_name;

        for &(old_inner, _) in &ctx.inner_replaced {
            let Some(inner) = self.node(old_inner) else {
                continue;
            };
            // live instances are laid out for the old base, dynamic or not
            let loaded = self.has_compiled_class(&inner.qualified_name)
                || self.live_instance_count(&inner.qualified_name) > 0;
            if loaded {
                reasons.push(format!(
                    "inner type {} was replaced with a different base type",
                    inner.qualified_name
                ));
            }
        }

        let compiled = self.has_compiled_class(name);
        let loaded = compiled || self.live_instance_count(name) > 0;

        // instances and compiled subclasses are laid out for the old base
        if ctx.base_changed && loaded {
            reasons.push(format!(
                "base type of {} changed from {} to {}",
                name,
                ctx.before.extends.as_deref().unwrap_or("none"),
                ctx.after.extends.as_deref().unwrap_or("none"),
            ));
        }
        let removed: Vec<&str> = ctx
            .to_remove
            .iter()
            .chain(ctx.inner_removed.iter())
            .map(String::as_str)
            .collect();
        if !removed.is_empty() && compiled {
            reasons.push(format!(
                "properties removed from compiled type {}: {}",
                name,
                removed.join(", ")
            ));
        }
        if compiled {
            if !ctx.to_add.is_empty() {
                reasons.push(format!(
                    "properties added to compiled type {}: {}",
                    name,
                    ctx.to_add.join(", ")
                ));
            }
            if !ctx.methods_changed.is_empty() {
                reasons.push(format!(
                    "methods changed on compiled type {}: {}",
                    name,
                    ctx.methods_changed.join(", ")
                ));
            }
            if ctx.blocks_changed {
                reasons.push(format!("initializer blocks changed on compiled type {}", name));
            }
        }
        reasons
    }

    fn capture_layouts(&self, ctx: &UpdateContext) -> Vec<CapturedLayout> {
        let mut names = vec![ctx.old_name.clone()];
        names.extend(self.subtype_names(&ctx.old_name));

        let mut layouts = Vec::new();
        for name in names {
            if self.instances().count(&name) == 0 {
                continue;
            }
            let Some(id) = self.find_type(&name) else {
                continue;
            };
            let table = self.get_property_slots(id);
            let type_name = if name == ctx.old_name {
                ctx.new_name.clone()
            } else {
                name
            };
            layouts.push(CapturedLayout { type_name, table });
        }
        layouts
    }

    /// Register links and names, then bump versions. Caller holds the
    /// structural lock.
    fn apply_structural(&self, ctx: &UpdateContext) {
        match ctx.mode {
            UpdateMode::Remove => self.unlink(ctx.old),
            UpdateMode::Add => {
                self.link_overlay(ctx.old, ctx.new);
                self.register_node(ctx.new);
            }
            UpdateMode::Replace => self.replace_node(ctx.old, ctx.new),
        }
        for &(old_inner, new_inner) in &ctx.inner_replaced {
            self.replace_node(old_inner, new_inner);
            self.invalidate(new_inner);
        }

        if ctx.type_removed {
            self.invalidate(ctx.old);
        } else {
            let anchor = if ctx.mode == UpdateMode::Remove { ctx.old } else { ctx.new };
            let root = self.modify_chain(anchor).first().copied().unwrap_or(anchor);
            self.invalidate(root);
        }
    }

    /// `splice_replace` plus name, edge and registry bookkeeping
    fn replace_node(&self, old: TypeId, new: TypeId) {
        let (Some(old_node), Some(new_node)) = (self.node(old), self.node(new)) else {
            return;
        };
        self.splice_replace(old, new);
        self.remove_subtype_edges(&old_node);
        if !old_node.is_modify {
            {
                let mut names = self.names().write();
                if names.get(&old_node.qualified_name) == Some(&old) {
                    names.remove(&old_node.qualified_name);
                }
                names.insert(new_node.qualified_name.clone(), new);
            }
            if old_node.qualified_name != new_node.qualified_name {
                tracing::debug!(from = %old_node.qualified_name, to = %new_node.qualified_name, "re-keying renamed type");
                self.instances()
                    .rekey(&old_node.qualified_name, &new_node.qualified_name);
                if let Some((_, holder)) = self.statics().remove(&old_node.qualified_name) {
                    holder.set_type_name(new_node.qualified_name.clone());
                    self.statics().insert(new_node.qualified_name.clone(), holder);
                }
            }
        }
        self.register_node(new);
    }

    /// Re-lay out live instances by name. Runs no user code.
    fn migrate_layouts(&self, ctx: &UpdateContext, layouts: &[CapturedLayout]) {
        let replaced_objects: Vec<String> = ctx
            .inner_replaced
            .iter()
            .filter_map(|&(old_inner, _)| self.node(old_inner))
            .filter(|inner| inner.is_object())
            .map(|inner| inner.name.clone())
            .collect();

        for layout in layouts {
            let Some(id) = self.find_type(&layout.type_name) else {
                continue;
            };
            let table = self.get_property_slots(id);
            if Arc::ptr_eq(&table, &layout.table) && replaced_objects.is_empty() {
                continue;
            }
            let instances = self.instances().instances_of(&layout.type_name);
            for instance in &instances {
                migrate_instance(instance, &layout.table, &table);
                for property in &replaced_objects {
                    if let Some(slot) = table.instance_slot(property) {
                        write_slot(instance, slot, Value::Lazy);
                    }
                }
            }
            tracing::debug!(
                type_name = %layout.type_name,
                instances = instances.len(),
                slots = table.instance_count(),
                "migrated instance layouts"
            );
        }
    }

    /// Re-run changed and added initializers on live instances of the type
    /// and of sub-types that inherit the same initializer. Runs outside the
    /// structural lock. Returns the number of instances touched.
    fn reinit_fields(&self, ctx: &UpdateContext) -> usize {
        let order = ctx.reinit_order();
        if order.is_empty() {
            return 0;
        }
        let Some(tip) = self.find_type(&ctx.new_name) else {
            return 0;
        };
        let mut types = vec![ctx.new_name.clone()];
        types.extend(self.subtype_names(&ctx.new_name));

        let mut touched = FxHashSet::default();
        for (name, is_static) in order {
            if is_static {
                self.reinit_static(ctx, tip, &name);
                continue;
            }
            let Some(expected) = self.initializer_for(tip, &name) else {
                continue;
            };
            for type_name in &types {
                let Some(sub) = self.find_type(type_name) else {
                    continue;
                };
                let effective = if sub == tip {
                    Some(expected.clone())
                } else {
                    self.initializer_for(sub, &name)
                };
                // sub-types overriding the initializer keep their own
                let Some(effective) = effective.filter(|e| e.init == expected.init) else {
                    continue;
                };
                for instance in self.instances().instances_of(type_name) {
                    let scope = EvalScope {
                        system: self,
                        type_id: effective.owner,
                        instance: Some(&instance),
                    };
                    let outcome = effective.init.evaluate(&scope).and_then(|value| {
                        self.set_property(&instance, &name, value)
                            .map_err(|e| e.to_string())
                    });
                    match outcome {
                        Ok(()) => {
                            touched.insert(instance.id());
                        }
                        Err(message) => self.diagnostics().report(
                            DiagnosticKind::InitializerFailed,
                            type_name,
                            format!("re-running the initializer of {} failed: {}", name, message),
                        ),
                    }
                }
            }
        }
        touched.len()
    }

    /// Re-run a static initializer if the type's statics are initialized
    fn reinit_static(&self, ctx: &UpdateContext, tip: TypeId, name: &str) {
        if !self.statics().contains_key(&ctx.new_name) {
            return;
        }
        let statics = self.effective_initializers(tip, true);
        let Some(effective) = statics.get(name) else {
            return;
        };
        let scope = EvalScope {
            system: self,
            type_id: effective.owner,
            instance: None,
        };
        match effective.init.evaluate(&scope) {
            Ok(value) => self.reset_static(&ctx.new_name, name, value),
            Err(message) => self.diagnostics().report(
                DiagnosticKind::InitializerFailed,
                &ctx.new_name,
                format!("re-running the static initializer of {} failed: {}", name, message),
            ),
        }
    }
}
