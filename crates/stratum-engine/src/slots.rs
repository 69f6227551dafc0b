//! Property slot tables
//!
//! Every instance and static property of a type gets a stable position:
//! either a fixed index into the instance's slot vector or the `ByName`
//! sentinel, used for interface-contributed properties so that several
//! interfaces can contribute to one layout without overlapping.
//!
//! A table starts as a verbatim copy of the base type's table, so sub-types
//! never renumber inherited slots. Building is best-effort: a failure part
//! way (cyclic base chain, incomplete base) is logged, recorded as a
//! diagnostic and the partial table is returned uncached.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::diagnostics::DiagnosticKind;
use crate::model::{AccessorRole, MethodDecl, TypeId, TypeNode, TypeRef};
use crate::system::TypeSystem;

/// Position of a property in an instance (or in the type's statics)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotPosition {
    /// Fixed index
    Fixed(u32),
    /// Looked up by name at run time
    ByName,
}

impl SlotPosition {
    /// Fixed index, if any
    pub fn index(self) -> Option<usize> {
        match self {
            SlotPosition::Fixed(index) => Some(index as usize),
            SlotPosition::ByName => None,
        }
    }
}

/// How a property is read and written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotAccessor {
    /// Plain field
    Field,
    /// Accessor methods folded into one property
    GetSet {
        /// `getX` / `isX`
        getter: Option<String>,
        /// Signature of the selected `setX` overload
        setter: Option<String>,
        /// `validateX`
        validator: Option<String>,
    },
    /// Inner object, constructed lazily
    InnerObject {
        /// Inner type node
        type_id: TypeId,
    },
}

/// One property slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySlot {
    /// Property name
    pub name: String,
    /// Node declaring the property
    pub owner: TypeId,
    /// Position
    pub position: SlotPosition,
    /// Accessor kind
    pub accessor: SlotAccessor,
    /// Property type
    pub ty: TypeRef,
}

/// Ordered instance and static slots of one type node
#[derive(Debug, Clone)]
pub struct SlotTable {
    type_id: TypeId,
    version: u64,
    instance: Vec<PropertySlot>,
    statics: Vec<PropertySlot>,
    instance_index: FxHashMap<String, usize>,
    static_index: FxHashMap<String, usize>,
    next_instance: u32,
    next_static: u32,
    complete: bool,
}

impl SlotTable {
    fn empty(type_id: TypeId, version: u64) -> Self {
        Self {
            type_id,
            version,
            instance: Vec::new(),
            statics: Vec::new(),
            instance_index: FxHashMap::default(),
            static_index: FxHashMap::default(),
            next_instance: 0,
            next_static: 0,
            complete: true,
        }
    }

    /// Node the table was built for
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Node version the table was built from
    pub fn version(&self) -> u64 {
        self.version
    }

    /// False when building aborted part way
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Instance slots in allocation order
    pub fn instance_slots(&self) -> &[PropertySlot] {
        &self.instance
    }

    /// Static slots in allocation order
    pub fn static_slots(&self) -> &[PropertySlot] {
        &self.statics
    }

    /// Instance slot by property name
    pub fn instance_slot(&self, name: &str) -> Option<&PropertySlot> {
        self.instance_index.get(name).map(|&i| &self.instance[i])
    }

    /// Static slot by property name
    pub fn static_slot(&self, name: &str) -> Option<&PropertySlot> {
        self.static_index.get(name).map(|&i| &self.statics[i])
    }

    /// Number of fixed instance positions
    pub fn instance_count(&self) -> usize {
        self.next_instance as usize
    }

    /// Number of fixed static positions
    pub fn static_count(&self) -> usize {
        self.next_static as usize
    }

    /// Position of an instance property
    pub fn position_of(&self, name: &str) -> Option<SlotPosition> {
        self.instance_slot(name).map(|slot| slot.position)
    }

    fn copy_from(&mut self, other: &SlotTable) {
        self.instance = other.instance.clone();
        self.statics = other.statics.clone();
        self.instance_index = other.instance_index.clone();
        self.static_index = other.static_index.clone();
        self.next_instance = other.next_instance;
        self.next_static = other.next_static;
    }

    fn slot_mut(&mut self, is_static: bool, name: &str) -> Option<&mut PropertySlot> {
        let (index, slots) = if is_static {
            (&self.static_index, &mut self.statics)
        } else {
            (&self.instance_index, &mut self.instance)
        };
        index.get(name).map(|&i| &mut slots[i])
    }

    /// Give `name` a fixed position, keeping an already fixed one
    fn add_fixed(&mut self, is_static: bool, name: &str, owner: TypeId, accessor: SlotAccessor, ty: TypeRef) {
        let next = if is_static {
            &mut self.next_static
        } else {
            &mut self.next_instance
        };
        let fresh = SlotPosition::Fixed(*next);
        let (index, slots) = if is_static {
            (&mut self.static_index, &mut self.statics)
        } else {
            (&mut self.instance_index, &mut self.instance)
        };
        let existing = index.get(name).copied();
        match existing {
            Some(i) => {
                let slot = &mut slots[i];
                if slot.position == SlotPosition::ByName {
                    slot.position = fresh;
                    *next += 1;
                }
                slot.owner = owner;
                slot.accessor = accessor;
                slot.ty = ty;
            }
            None => {
                index.insert(name.to_string(), slots.len());
                slots.push(PropertySlot {
                    name: name.to_string(),
                    owner,
                    position: fresh,
                    accessor,
                    ty,
                });
                *next += 1;
            }
        }
    }

    /// Add `name` with the by-name sentinel unless it already exists
    fn add_by_name(&mut self, is_static: bool, slot: &PropertySlot) {
        let (index, slots) = if is_static {
            (&mut self.static_index, &mut self.statics)
        } else {
            (&mut self.instance_index, &mut self.instance)
        };
        if index.contains_key(&slot.name) {
            return;
        }
        index.insert(slot.name.clone(), slots.len());
        slots.push(PropertySlot {
            position: SlotPosition::ByName,
            ..slot.clone()
        });
    }

    /// Append `slot` with a new fixed position unless the name exists
    fn merge_fixed(&mut self, is_static: bool, slot: &PropertySlot) {
        let exists = if is_static {
            self.static_index.contains_key(&slot.name)
        } else {
            self.instance_index.contains_key(&slot.name)
        };
        if !exists {
            self.add_fixed(is_static, &slot.name, slot.owner, slot.accessor.clone(), slot.ty.clone());
        }
    }
}

/// Accessor methods found for one property
#[derive(Default)]
struct AccessorGroup<'a> {
    getter: Option<&'a MethodDecl>,
    setters: Vec<&'a MethodDecl>,
    validator: Option<&'a MethodDecl>,
}

impl TypeSystem {
    /// Slot table of the most specific version of `id`
    pub fn get_property_slots(&self, id: TypeId) -> Arc<SlotTable> {
        let target = self.resolve(id, true);
        self.slot_table_at(target, 0)
    }

    /// Slot table of exactly `id`, without resolving it
    pub fn slot_table_of(&self, id: TypeId) -> Arc<SlotTable> {
        self.slot_table_at(id, 0)
    }

    fn slot_table_at(&self, id: TypeId, depth: usize) -> Arc<SlotTable> {
        let Some(cell) = self.cell(id) else {
            return Arc::new(SlotTable::empty(id, 0));
        };
        let node = cell.snapshot();
        if let Some(cached) = cell.slots.lock().as_ref() {
            if cached.version == node.version {
                return cached.clone();
            }
        }

        // built without holding the cache lock: building recurses into
        // base and interface tables
        let table = Arc::new(self.build_slot_table(&node, depth));
        if table.complete {
            let mut slot = cell.slots.lock();
            if slot.as_ref().map_or(true, |cached| cached.version <= table.version) {
                *slot = Some(table.clone());
            }
        }
        table
    }

    fn build_slot_table(&self, node: &TypeNode, depth: usize) -> SlotTable {
        let mut table = SlotTable::empty(node.id, node.version);
        if let Err(message) = self.fill_slots(&mut table, node, depth) {
            table.complete = false;
            self.diagnostics().report(
                DiagnosticKind::SlotTableFailure,
                &node.qualified_name,
                message,
            );
        } else {
            tracing::debug!(
                type_name = %node.qualified_name,
                version = node.version,
                instance = table.instance.len(),
                statics = table.statics.len(),
                "built property slot table"
            );
        }
        table
    }

    fn fill_slots(&self, table: &mut SlotTable, node: &TypeNode, depth: usize) -> Result<(), String> {
        if depth > self.options().max_chain_depth {
            return Err(format!(
                "base chain of {} exceeds {} levels",
                node.qualified_name,
                self.options().max_chain_depth
            ));
        }

        let modified = if node.is_modify { node.replaces } else { None };
        let changes_base = match modified {
            Some(prev) => node.extends.is_some() && node.extends != self.extends_name(prev),
            None => false,
        };

        match modified {
            Some(prev) if !changes_base => {
                let prev_table = self.slot_table_at(prev, depth + 1);
                table.copy_from(&prev_table);
                if !prev_table.complete {
                    return Err(format!("modified type of {} has an incomplete slot table", node.qualified_name));
                }
            }
            _ => {
                if let Some(base) = self.extends_type(node.id) {
                    let base_node = self.node(base);
                    if base == node.id
                        || base_node.is_some_and(|b| b.qualified_name == node.qualified_name)
                    {
                        return Err(format!("{} extends itself", node.qualified_name));
                    }
                    let base_table = self.slot_table_at(base, depth + 1);
                    table.copy_from(&base_table);
                    if !base_table.complete {
                        return Err(format!("base type of {} has an incomplete slot table", node.qualified_name));
                    }
                }
            }
        }

        for field in node.fields() {
            table.add_fixed(
                field.modifiers.is_static,
                &field.name,
                node.id,
                SlotAccessor::Field,
                field.ty.clone(),
            );
        }

        self.fold_accessors(table, node);

        for inner in node.inner_types().filter(|inner| inner.is_object) {
            let ty = self
                .qualified_name(inner.id)
                .map(TypeRef::Named)
                .unwrap_or(TypeRef::Any);
            table.add_fixed(
                inner.is_static,
                &inner.name,
                node.id,
                SlotAccessor::InnerObject { type_id: inner.id },
                ty,
            );
        }

        // the overlay's own positions take precedence over the modified
        // type's when the overlay changes the base type
        if let (Some(prev), true) = (modified, changes_base) {
            let chain: FxHashSet<TypeId> = self.modify_chain(prev).into_iter().collect();
            let prev_table = self.slot_table_at(prev, depth + 1);
            for slot in prev_table.instance_slots().iter().filter(|s| chain.contains(&s.owner)) {
                table.merge_fixed(false, slot);
            }
            for slot in prev_table.static_slots().iter().filter(|s| chain.contains(&s.owner)) {
                table.merge_fixed(true, slot);
            }
        }

        for name in node.interfaces.iter().chain(node.scope_interfaces.iter()) {
            let Some(iface) = self.find_type(name) else {
                continue;
            };
            if iface == node.id {
                return Err(format!("{} implements itself", node.qualified_name));
            }
            let iface_table = self.slot_table_at(iface, depth + 1);
            for slot in iface_table.instance_slots() {
                table.add_by_name(false, slot);
            }
            for slot in iface_table.static_slots() {
                table.add_by_name(true, slot);
            }
            if !iface_table.complete {
                return Err(format!("interface {} has an incomplete slot table", name));
            }
        }
        Ok(())
    }

    /// Fold `getX`/`isX`/`setX`/`validateX` methods into one slot per
    /// property name
    fn fold_accessors(&self, table: &mut SlotTable, node: &TypeNode) {
        let mut order: Vec<(String, bool)> = Vec::new();
        let mut groups: FxHashMap<(String, bool), AccessorGroup<'_>> = FxHashMap::default();
        for method in node.methods() {
            let Some((role, property)) = method.accessor_property() else {
                continue;
            };
            let key = (property, method.modifiers.is_static);
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            let group = groups.entry(key).or_default();
            match role {
                AccessorRole::Getter => {
                    group.getter.get_or_insert(method);
                }
                AccessorRole::Setter => group.setters.push(method),
                AccessorRole::Validator => {
                    group.validator.get_or_insert(method);
                }
            }
        }

        for key in order {
            let Some(group) = groups.get(&key) else {
                continue;
            };
            let (property, is_static) = (&key.0, key.1);
            let existing = table.slot_mut(is_static, property).cloned();
            let known = group
                .getter
                .map(|g| g.ret.clone())
                .or_else(|| existing.as_ref().map(|slot| slot.ty.clone()));
            let setter = self.select_setter(&group.setters, known.as_ref());

            let (mut getter, mut setter_name, mut validator) = match existing.as_ref().map(|s| &s.accessor) {
                Some(SlotAccessor::GetSet {
                    getter,
                    setter,
                    validator,
                }) => (getter.clone(), setter.clone(), validator.clone()),
                _ => (None, None, None),
            };
            if let Some(g) = group.getter {
                getter = Some(g.name.clone());
            }
            if let Some(s) = setter {
                setter_name = Some(s.signature());
            }
            if let Some(v) = group.validator {
                validator = Some(v.name.clone());
            }

            let ty = known
                .or_else(|| setter.and_then(|s| s.params.first()).map(|p| p.ty.clone()))
                .unwrap_or(TypeRef::Any);
            table.add_fixed(
                is_static,
                property,
                node.id,
                SlotAccessor::GetSet {
                    getter,
                    setter: setter_name,
                    validator,
                },
                ty,
            );
        }
    }

    /// Pick the setter among overloads: the first whose parameter accepts
    /// the known property type (getter return or field type), else the
    /// first declared. Best-effort when the types are only partially
    /// compatible.
    fn select_setter<'a>(&self, setters: &[&'a MethodDecl], known: Option<&TypeRef>) -> Option<&'a MethodDecl> {
        if let Some(known) = known {
            let compatible = setters.iter().find(|s| {
                s.params
                    .first()
                    .is_some_and(|p| self.is_assignable(known, &p.ty))
            });
            if let Some(setter) = compatible {
                return Some(*setter);
            }
        }
        setters.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(name: &str) -> PropertySlot {
        PropertySlot {
            name: name.to_string(),
            owner: TypeId(0),
            position: SlotPosition::Fixed(0),
            accessor: SlotAccessor::Field,
            ty: TypeRef::Int,
        }
    }

    #[test]
    fn test_add_fixed_keeps_existing_position() {
        let mut table = SlotTable::empty(TypeId(0), 0);
        table.add_fixed(false, "a", TypeId(0), SlotAccessor::Field, TypeRef::Int);
        table.add_fixed(false, "b", TypeId(0), SlotAccessor::Field, TypeRef::Int);
        table.add_fixed(false, "a", TypeId(1), SlotAccessor::Field, TypeRef::Long);

        assert_eq!(table.position_of("a"), Some(SlotPosition::Fixed(0)));
        assert_eq!(table.position_of("b"), Some(SlotPosition::Fixed(1)));
        assert_eq!(table.instance_count(), 2);
        assert_eq!(table.instance_slot("a").map(|s| s.owner), Some(TypeId(1)));
    }

    #[test]
    fn test_by_name_does_not_consume_positions() {
        let mut table = SlotTable::empty(TypeId(0), 0);
        table.add_fixed(false, "a", TypeId(0), SlotAccessor::Field, TypeRef::Int);
        table.add_by_name(false, &slot("a"));
        table.add_by_name(false, &slot("z"));

        assert_eq!(table.position_of("a"), Some(SlotPosition::Fixed(0)));
        assert_eq!(table.position_of("z"), Some(SlotPosition::ByName));
        assert_eq!(table.instance_count(), 1);
        assert_eq!(table.instance_slots().len(), 2);
    }

    #[test]
    fn test_fixed_upgrades_by_name() {
        let mut table = SlotTable::empty(TypeId(0), 0);
        table.add_by_name(false, &slot("z"));
        table.add_fixed(false, "z", TypeId(2), SlotAccessor::Field, TypeRef::Int);
        assert_eq!(table.position_of("z"), Some(SlotPosition::Fixed(0)));
    }

    #[test]
    fn test_statics_numbered_separately() {
        let mut table = SlotTable::empty(TypeId(0), 0);
        table.add_fixed(false, "a", TypeId(0), SlotAccessor::Field, TypeRef::Int);
        table.add_fixed(true, "COUNT", TypeId(0), SlotAccessor::Field, TypeRef::Int);
        assert_eq!(
            table.static_slot("COUNT").map(|s| s.position),
            Some(SlotPosition::Fixed(0))
        );
        assert_eq!(table.static_count(), 1);
        assert!(table.instance_slot("COUNT").is_none());
    }
}
