//! Instance construction, property access and statics

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use stratum_sdk::{Instance, InstanceHandle, Value};

use super::{CompiledClass, TypeSystem};
use crate::diagnostics::DiagnosticKind;
use crate::error::{EngineError, EngineResult};
use crate::model::{ConstructorDecl, EvalScope, Initializer, Member, TypeId, TypeRef};
use crate::slots::{PropertySlot, SlotAccessor, SlotPosition, SlotTable};

/// Effective initializer of one property
#[derive(Debug, Clone)]
pub(crate) struct EffectiveInit {
    pub(crate) init: Initializer,
    pub(crate) owner: TypeId,
}

impl TypeSystem {
    /// Construct an instance of the most specific version of `id`.
    ///
    /// Fails when a non-dynamic type has no compiled class or when no
    /// constructor accepts `args`. Initializers run base first, then
    /// through the modify chain, in body order; user code runs without the
    /// structural lock held.
    pub fn create_instance(&self, id: TypeId, args: &[Value]) -> EngineResult<InstanceHandle> {
        let target = self.resolve(id, true);
        let node = self
            .node(target)
            .filter(|node| !node.removed)
            .ok_or_else(|| EngineError::TypeNotFound(id.to_string()))?;
        if node.is_interface() {
            return Err(EngineError::InvalidDeclaration(format!(
                "cannot instantiate interface {}",
                node.qualified_name
            )));
        }
        let compiled = self.compiled_class(&node.qualified_name);
        if !node.is_dynamic() && compiled.is_none() {
            return Err(EngineError::NoCompiledClass(node.qualified_name.clone()));
        }
        let constructor = self.select_constructor(target, compiled.as_ref(), args, &node.qualified_name)?;

        let table = self.get_property_slots(target);
        let instance = Instance::new(node.qualified_name.clone(), table.instance_count());
        for slot in table.instance_slots() {
            write_slot(&instance, slot, default_for(slot));
        }

        for (name, effective) in self.effective_initializers(target, false) {
            let scope = EvalScope {
                system: self,
                type_id: effective.owner,
                instance: Some(&instance),
            };
            let value = effective
                .init
                .evaluate(&scope)
                .map_err(|message| EngineError::Initializer {
                    type_name: node.qualified_name.clone(),
                    field: name.clone(),
                    message,
                })?;
            self.store(target, &table, &instance, &name, value)?;
        }

        if let Some(constructor) = constructor {
            for (field, index) in &constructor.binds {
                let value = args.get(*index).cloned().unwrap_or_default();
                self.store(target, &table, &instance, field, value)?;
            }
        }

        {
            let _guard = self.lock_structure();
            // an update may have changed the layout while initializers ran
            let current = self.get_property_slots(target);
            if !Arc::ptr_eq(&current, &table) {
                migrate_instance(&instance, &table, &current);
            }
            self.instances().register(&node.qualified_name, instance.clone());
        }
        tracing::debug!(type_name = %node.qualified_name, instance = instance.id().as_u64(), "created instance");
        Ok(instance)
    }

    fn select_constructor(
        &self,
        target: TypeId,
        compiled: Option<&CompiledClass>,
        args: &[Value],
        type_name: &str,
    ) -> EngineResult<Option<ConstructorDecl>> {
        let declared: Vec<ConstructorDecl> = self
            .modify_chain(target)
            .into_iter()
            .rev()
            .filter_map(|id| self.node(id))
            .flat_map(|node| node.constructors().cloned().collect::<Vec<_>>())
            .collect();

        if let Some(found) = declared
            .iter()
            .find(|c| accepts_args(c.params.iter().map(|p| &p.ty), args))
        {
            return Ok(Some(found.clone()));
        }
        if declared.is_empty() {
            let matched = match compiled {
                Some(class) => class
                    .constructors
                    .iter()
                    .any(|params| accepts_args(params.iter(), args)),
                None => args.is_empty(),
            };
            if matched {
                return Ok(None);
            }
        }
        Err(EngineError::ConstructorNotFound {
            type_name: type_name.to_string(),
            arity: args.len(),
        })
    }

    /// Live instances of `type_name` and of every known sub-type
    pub fn instances_of_type_and_subtypes(&self, type_name: &str) -> Vec<InstanceHandle> {
        let mut found = self.instances().instances_of(type_name);
        for sub in self.subtype_names(type_name) {
            found.extend(self.instances().instances_of(&sub));
        }
        found
    }

    /// Remove an instance from the live registry
    pub fn dispose_instance(&self, instance: &InstanceHandle) -> bool {
        let _guard = self.lock_structure();
        self.instances().unregister(&instance.type_name(), instance)
    }

    // ========================================================================
    // Property access
    // ========================================================================

    fn instance_layout(&self, instance: &InstanceHandle) -> EngineResult<(TypeId, Arc<SlotTable>)> {
        let type_name = instance.type_name();
        let id = self
            .find_type(&type_name)
            .ok_or(EngineError::TypeNotFound(type_name))?;
        Ok((id, self.get_property_slots(id)))
    }

    /// Read a property; inner objects are constructed on first access.
    ///
    /// The layout and the slot are read under the shared layout gate, so a
    /// concurrent update is seen either fully before or fully after its
    /// migration.
    pub fn get_property(&self, instance: &InstanceHandle, name: &str) -> EngineResult<Value> {
        let (id, table, value) = {
            let _gate = self.layout_gate().read();
            let (id, table) = self.instance_layout(instance)?;
            let value = table.instance_slot(name).map(|slot| read_slot(instance, slot));
            (id, table, value)
        };
        let Some(value) = value else {
            if table.static_slot(name).is_some() {
                return self.get_static(id, name);
            }
            return Err(EngineError::PropertyNotFound {
                type_name: instance.type_name(),
                property: name.to_string(),
            });
        };

        let inner_type = match table.instance_slot(name).map(|slot| &slot.accessor) {
            Some(SlotAccessor::InnerObject { type_id }) if value.is_lazy() => *type_id,
            _ => return Ok(value),
        };
        // constructed outside the gate: construction takes the structural lock
        let created = Value::Object(self.create_instance(inner_type, &[])?);
        let _gate = self.layout_gate().read();
        let (_, table) = self.instance_layout(instance)?;
        let Some(slot) = table.instance_slot(name) else {
            return Ok(created);
        };
        let current = read_slot(instance, slot);
        if !current.is_lazy() {
            return Ok(current);
        }
        write_slot(instance, slot, created.clone());
        Ok(created)
    }

    /// Write a property after checking it against the declared type
    pub fn set_property(&self, instance: &InstanceHandle, name: &str, value: Value) -> EngineResult<()> {
        let gate = self.layout_gate().read();
        let (id, table) = self.instance_layout(instance)?;
        if table.instance_slot(name).is_none() {
            drop(gate);
        }
        self.store(id, &table, instance, name, value)
    }

    /// Write through an explicit layout
    fn store(
        &self,
        id: TypeId,
        table: &SlotTable,
        instance: &InstanceHandle,
        name: &str,
        value: Value,
    ) -> EngineResult<()> {
        let Some(slot) = table.instance_slot(name) else {
            if table.static_slot(name).is_some() {
                return self.set_static(id, name, value);
            }
            return Err(EngineError::PropertyNotFound {
                type_name: instance.type_name(),
                property: name.to_string(),
            });
        };
        check_value(&instance.type_name(), slot, &value)?;
        write_slot(instance, slot, value);
        Ok(())
    }

    /// Read a static property of `id`
    pub fn get_static(&self, id: TypeId, name: &str) -> EngineResult<Value> {
        let (holder, slot) = self.static_target(id, name)?;
        let value = holder.named(name).unwrap_or_else(|| default_for(&slot));
        if let (true, SlotAccessor::InnerObject { type_id }) = (value.is_lazy(), &slot.accessor) {
            let created = Value::Object(self.create_instance(*type_id, &[])?);
            holder.set_named(name, created.clone());
            return Ok(created);
        }
        Ok(value)
    }

    /// Write a static property of `id`
    pub fn set_static(&self, id: TypeId, name: &str, value: Value) -> EngineResult<()> {
        let (holder, slot) = self.static_target(id, name)?;
        check_value(&holder.type_name(), &slot, &value)?;
        holder.set_named(name, value);
        Ok(())
    }

    fn static_target(&self, id: TypeId, name: &str) -> EngineResult<(InstanceHandle, PropertySlot)> {
        let table = self.get_property_slots(id);
        let slot = table
            .static_slot(name)
            .cloned()
            .ok_or_else(|| EngineError::PropertyNotFound {
                type_name: self.qualified_name(id).unwrap_or_default(),
                property: name.to_string(),
            })?;
        let owner = self
            .qualified_name(slot.owner)
            .ok_or_else(|| EngineError::TypeNotFound(slot.owner.to_string()))?;
        Ok((self.static_holder(&owner)?, slot))
    }

    /// Static storage of a logical type, initialized on first use
    fn static_holder(&self, type_name: &str) -> EngineResult<InstanceHandle> {
        let mut created = false;
        let holder = self
            .statics()
            .entry(type_name.to_string())
            .or_insert_with(|| {
                created = true;
                Instance::new(type_name, 0)
            })
            .clone();
        if !created {
            return Ok(holder);
        }

        let Some(tip) = self.find_type(type_name) else {
            return Ok(holder);
        };
        let table = self.get_property_slots(tip);
        for slot in table.static_slots() {
            if self.qualified_name(slot.owner).as_deref() == Some(type_name) {
                holder.set_named(slot.name.clone(), default_for(slot));
            }
        }
        for (name, effective) in self.effective_initializers(tip, true) {
            let scope = EvalScope {
                system: self,
                type_id: effective.owner,
                instance: None,
            };
            let value = effective
                .init
                .evaluate(&scope)
                .map_err(|message| EngineError::Initializer {
                    type_name: type_name.to_string(),
                    field: name.clone(),
                    message,
                })?;
            holder.set_named(name, value);
        }
        Ok(holder)
    }

    pub(crate) fn reset_static(&self, type_name: &str, name: &str, value: Value) {
        if let Some(holder) = self.statics().get(type_name) {
            holder.set_named(name, value);
        }
    }

    // ========================================================================
    // Initializers
    // ========================================================================

    /// Ancestors of `tip` (each most specific), root-most first
    pub(crate) fn base_chain(&self, tip: TypeId) -> Vec<TypeId> {
        let max = self.options().max_chain_depth;
        let mut chain = Vec::new();
        let mut seen = FxHashSet::default();
        let mut current = Some(tip);
        while let Some(id) = current {
            let name = self.qualified_name(id).unwrap_or_default();
            if !seen.insert(name.clone()) || chain.len() > max {
                self.diagnostics().report(
                    DiagnosticKind::CycleGuard,
                    &name,
                    "base chain is cyclic or exceeds the depth guard",
                );
                break;
            }
            chain.push(id);
            current = self.extends_type(id);
        }
        chain.reverse();
        chain
    }

    /// Initializers in effect for the instance (or static) properties of
    /// `tip`, in execution order. Later declarations and property
    /// assignments override earlier ones but keep their position.
    pub(crate) fn effective_initializers(&self, tip: TypeId, statics: bool) -> IndexMap<String, EffectiveInit> {
        let table = self.get_property_slots(tip);
        let logical_types = if statics { vec![tip] } else { self.base_chain(tip) };

        let mut order: IndexMap<String, EffectiveInit> = IndexMap::new();
        for logical in logical_types {
            for id in self.modify_chain(logical) {
                let Some(node) = self.node(id) else {
                    continue;
                };
                for member in &node.body {
                    let (name, init) = match member.as_ref() {
                        Member::Field(f) if f.modifiers.is_static == statics => match &f.init {
                            Some(init) => (&f.name, init),
                            None => continue,
                        },
                        Member::Assign(a) => {
                            let is_static = table.static_slot(&a.name).is_some()
                                && table.instance_slot(&a.name).is_none();
                            if is_static != statics {
                                continue;
                            }
                            (&a.name, &a.init)
                        }
                        _ => continue,
                    };
                    order.insert(
                        name.clone(),
                        EffectiveInit {
                            init: init.clone(),
                            owner: id,
                        },
                    );
                }
            }
        }
        order
    }

    /// Initializer currently in effect for one property of `tip`
    pub(crate) fn initializer_for(&self, tip: TypeId, name: &str) -> Option<EffectiveInit> {
        self.effective_initializers(tip, false).shift_remove(name)
    }
}

fn accepts_args<'a>(params: impl ExactSizeIterator<Item = &'a TypeRef>, args: &[Value]) -> bool {
    params.len() == args.len() && params.zip(args).all(|(ty, arg)| ty.accepts_value(arg))
}

/// Value of a freshly allocated slot
pub(crate) fn default_for(slot: &PropertySlot) -> Value {
    match slot.accessor {
        SlotAccessor::InnerObject { .. } => Value::Lazy,
        _ => slot.ty.default_value(),
    }
}

pub(crate) fn read_slot(instance: &Instance, slot: &PropertySlot) -> Value {
    match slot.position {
        SlotPosition::Fixed(index) => instance.slot(index as usize).unwrap_or_default(),
        SlotPosition::ByName => instance
            .named(&slot.name)
            .unwrap_or_else(|| default_for(slot)),
    }
}

pub(crate) fn write_slot(instance: &Instance, slot: &PropertySlot, value: Value) {
    match slot.position {
        SlotPosition::Fixed(index) => {
            if let Err(err) = instance.set_slot(index as usize, value) {
                tracing::warn!(instance = instance.id().as_u64(), property = %slot.name, "{}", err);
            }
        }
        SlotPosition::ByName => instance.set_named(slot.name.clone(), value),
    }
}

fn check_value(type_name: &str, slot: &PropertySlot, value: &Value) -> EngineResult<()> {
    if slot.ty.accepts_value(value) || value.is_lazy() {
        return Ok(());
    }
    Err(EngineError::TypeMismatch {
        type_name: type_name.to_string(),
        property: slot.name.clone(),
        expected: slot.ty.to_string(),
        actual: value.kind_name().to_string(),
    })
}

/// Re-lay out `instance` from `old` to `new`, carrying values by name.
/// Properties only in `new` get their default (or the lazy sentinel).
pub(crate) fn migrate_instance(instance: &Instance, old: &SlotTable, new: &SlotTable) {
    instance.migrate(|current, named| {
        let mut slots = vec![Value::Null; new.instance_count()];
        let mut by_name = Vec::new();
        for slot in new.instance_slots() {
            let value = match old.instance_slot(&slot.name).map(|previous| previous.position) {
                Some(SlotPosition::Fixed(index)) => current.get(index as usize).cloned().unwrap_or_default(),
                Some(SlotPosition::ByName) => named.get(&slot.name).cloned().unwrap_or_else(|| default_for(slot)),
                None => default_for(slot),
            };
            match slot.position {
                SlotPosition::Fixed(index) => {
                    if let Some(target) = slots.get_mut(index as usize) {
                        *target = value;
                    }
                }
                SlotPosition::ByName => by_name.push((slot.name.clone(), value)),
            }
        }
        for slot in old.instance_slots() {
            if slot.position == SlotPosition::ByName {
                named.remove(&slot.name);
            }
        }
        for slot in new.instance_slots() {
            if let SlotPosition::Fixed(_) = slot.position {
                named.remove(&slot.name);
            }
        }
        named.extend(by_name);
        slots
    });
}
