//! Type declaration and name registration

use std::sync::Arc;

use stratum_sdk::LayerId;

use super::TypeSystem;
use crate::diagnostics::DiagnosticKind;
use crate::error::{EngineError, EngineResult};
use crate::model::node::package_of;
use crate::model::{InnerTypeRef, Member, MemberDecl, TypeDecl, TypeFlags, TypeId, TypeNode};
use crate::update::UpdateMode;

/// Enclosing type of an inner declaration
struct Enclosing<'a> {
    id: TypeId,
    qualified_name: &'a str,
    package: &'a str,
}

impl TypeSystem {
    /// Declare a type and its inner types.
    ///
    /// A second declaration of an already registered qualified name keeps
    /// the first one and records a `DuplicateDeclaration` diagnostic.
    pub fn declare(&self, decl: TypeDecl, layer: LayerId) -> EngineResult<TypeId> {
        validate_decl(&decl, true)?;
        let _guard = self.lock_structure();

        let existing = self.names().read().get(&decl.name).copied();
        if let Some(existing) = existing {
            self.diagnostics().report(
                DiagnosticKind::DuplicateDeclaration,
                &decl.name,
                "type declared more than once; keeping the first declaration",
            );
            return Ok(existing);
        }

        let id = self.insert_decl(&decl, layer, None);
        self.register_node(id);
        // types declared earlier may already name this one as their base
        self.invalidate(id);
        tracing::debug!(type_name = %decl.name, id = %id, "declared type");
        Ok(id)
    }

    /// Allocate a type without registering its name.
    ///
    /// Staged nodes are the `new` side of `update_type`; they become visible
    /// through `find_type` once the update links them in.
    pub fn stage_type(&self, decl: TypeDecl, layer: LayerId) -> EngineResult<TypeId> {
        validate_decl(&decl, true)?;
        let _guard = self.lock_structure();
        Ok(self.insert_decl(&decl, layer, None))
    }

    /// Declare a modify overlay of `target` in `layer`.
    ///
    /// Equivalent to staging the declaration and applying it in `Add` mode
    /// without pushing the change to live instances.
    pub fn declare_modify(
        &self,
        target: TypeId,
        decl: TypeDecl,
        layer: LayerId,
    ) -> EngineResult<TypeId> {
        let target_node = self
            .node(target)
            .ok_or_else(|| EngineError::TypeNotFound(target.to_string()))?;
        if decl.name != target_node.qualified_name && decl.name != target_node.name {
            return Err(EngineError::InvalidDeclaration(format!(
                "modify declaration {} does not name {}",
                decl.name, target_node.qualified_name
            )));
        }
        validate_decl(&decl, true)?;

        let staged = {
            let _guard = self.lock_structure();
            let enclosing = target_node.outer.and_then(|outer| self.node(outer));
            let mut decl = decl;
            decl.name = target_node.name.clone();
            match &enclosing {
                Some(outer) => self.insert_decl(
                    &decl,
                    layer,
                    Some(Enclosing {
                        id: outer.id,
                        qualified_name: &outer.qualified_name,
                        package: &outer.package,
                    }),
                ),
                None => {
                    decl.name = target_node.qualified_name.clone();
                    self.insert_decl(&decl, layer, None)
                }
            }
        };

        self.update_type(target, staged, UpdateMode::Add, false)?;
        Ok(staged)
    }

    /// Build the node for `decl` (and its inner types) in the arena
    fn insert_decl(&self, decl: &TypeDecl, layer: LayerId, outer: Option<Enclosing<'_>>) -> TypeId {
        let qualified = match &outer {
            Some(enclosing) => format!("{}.{}", enclosing.qualified_name, decl.name),
            None => decl.name.clone(),
        };
        let package = match &outer {
            Some(enclosing) => enclosing.package.to_string(),
            None => package_of(&qualified).to_string(),
        };

        let id = self.push_node(|id| TypeNode::new(id, qualified.clone(), layer, decl.flags));
        let mut node = TypeNode::new(id, qualified, layer, decl.flags);
        node.package = package;
        node.outer = outer.map(|enclosing| enclosing.id);
        node.extends = decl.extends.clone();
        node.interfaces = decl.interfaces.clone();

        for member in &decl.members {
            let member = match member {
                MemberDecl::Field(f) => Member::Field(f.clone()),
                MemberDecl::Method(m) => Member::Method(m.clone()),
                MemberDecl::Constructor(c) => Member::Constructor(c.clone()),
                MemberDecl::Assign(a) => Member::Assign(a.clone()),
                MemberDecl::Block(b) => Member::Block(b.clone()),
                MemberDecl::Inner { decl: inner, is_static } => {
                    let inner_id = self.insert_decl(
                        inner,
                        layer,
                        Some(Enclosing {
                            id,
                            qualified_name: &node.qualified_name,
                            package: &node.package,
                        }),
                    );
                    Member::InnerType(InnerTypeRef {
                        name: inner.name.clone(),
                        id: inner_id,
                        is_object: inner.flags.contains(TypeFlags::OBJECT),
                        is_static: *is_static,
                    })
                }
            };
            node.body.push(Arc::new(member));
        }

        for processor in self.processors() {
            if !processor.applies_to(&node) {
                continue;
            }
            let interfaces = processor.scope_interfaces(&node);
            let members = processor.synthetic_members(&node);
            tracing::debug!(
                processor = processor.name(),
                type_name = %node.qualified_name,
                interfaces = interfaces.len(),
                members = members.len(),
                "applied definition processor"
            );
            node.scope_interfaces.extend(interfaces);
            node.hidden_body.extend(members.into_iter().map(Arc::new));
        }

        self.fill_node(id, node);
        id
    }

    /// Register the node's name and sub-type edges, recursively for inner
    /// types. Caller holds the structural lock.
    pub(crate) fn register_node(&self, id: TypeId) {
        let Some(node) = self.node(id) else {
            return;
        };
        self.names()
            .write()
            .entry(node.qualified_name.clone())
            .or_insert(id);
        self.add_subtype_edges(&node);
        for inner in node.inner_types() {
            self.register_node(inner.id);
        }
    }

    /// Drop the name registration if it points at `id`
    pub(crate) fn unregister_name(&self, id: TypeId) {
        let Some(node) = self.node(id) else {
            return;
        };
        let mut names = self.names().write();
        if names.get(&node.qualified_name) == Some(&id) {
            names.remove(&node.qualified_name);
        }
    }

    pub(crate) fn add_subtype_edges(&self, node: &TypeNode) {
        let mut index = self.subtype_index().write();
        for base in super_names(node) {
            let entry = index.entry(base.to_string()).or_default();
            if !entry.contains(&node.id) {
                entry.push(node.id);
            }
        }
    }

    pub(crate) fn remove_subtype_edges(&self, node: &TypeNode) {
        let mut index = self.subtype_index().write();
        for base in super_names(node) {
            if let Some(entry) = index.get_mut(base) {
                entry.retain(|id| *id != node.id);
            }
        }
    }
}

/// Names of everything a node extends or implements
fn super_names(node: &TypeNode) -> impl Iterator<Item = &str> {
    node.extends
        .iter()
        .chain(node.interfaces.iter())
        .chain(node.scope_interfaces.iter())
        .map(String::as_str)
}

fn validate_decl(decl: &TypeDecl, top_level: bool) -> EngineResult<()> {
    if decl.name.is_empty() {
        return Err(EngineError::InvalidDeclaration("empty type name".to_string()));
    }
    if !top_level && decl.name.contains('.') {
        return Err(EngineError::InvalidDeclaration(format!(
            "inner type name {} must be a simple name",
            decl.name
        )));
    }
    if decl.extends.as_deref() == Some(decl.name.as_str()) {
        return Err(EngineError::InvalidDeclaration(format!(
            "{} extends itself",
            decl.name
        )));
    }
    for member in &decl.members {
        if let MemberDecl::Inner { decl: inner, .. } = member {
            validate_decl(inner, false)?;
        }
    }
    Ok(())
}
