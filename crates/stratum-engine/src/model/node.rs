//! Type nodes and the declaration builder
//!
//! A `TypeNode` is an immutable snapshot. The session stores one snapshot
//! per arena slot and swaps in a modified copy on every mutation, bumping
//! `version` in the same swap.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use stratum_sdk::LayerId;

use crate::model::member::{
    BlockDecl, ConstructorDecl, FieldDecl, InnerTypeRef, Initializer, Member, MethodDecl,
    PropertyAssign,
};

/// Stable arena handle of a type node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Arena index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// Type-level flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u16 {
        /// Interpreted from its body at run time
        const DYNAMIC = 1 << 0;
        /// Only exists as a compiled class (no dynamic body)
        const COMPILED_ONLY = 1 << 1;
        /// Synthetic type describing a layer
        const LAYER_TYPE = 1 << 2;
        /// A concrete native class must exist even if dynamic
        const NEEDS_OWN_CLASS = 1 << 3;
        /// Interface
        const INTERFACE = 1 << 4;
        /// Object type (singleton / inner object)
        const OBJECT = 1 << 5;
        /// Auto-component with synthesized lifecycle methods
        const COMPONENT = 1 << 6;
    }
}

/// A declared type
#[derive(Debug, Clone)]
pub struct TypeNode {
    /// Arena handle
    pub id: TypeId,
    /// Simple name
    pub name: String,
    /// Fully qualified name (`pkg.Outer.Inner`); shared by modify overlays
    pub qualified_name: String,
    /// Package of the enclosing top-level type
    pub package: String,
    /// Owning layer
    pub layer: LayerId,
    /// Flags
    pub flags: TypeFlags,
    /// Declared base type (qualified name)
    pub extends: Option<String>,
    /// Declared interfaces (qualified names)
    pub interfaces: Vec<String>,
    /// Interfaces contributed by definition processors
    pub scope_interfaces: Vec<String>,
    /// Members in declaration order
    pub body: Vec<Arc<Member>>,
    /// Members injected by definition processors
    pub hidden_body: Vec<Arc<Member>>,
    /// Enclosing type for inner types
    pub outer: Option<TypeId>,
    /// Parallel transformed representation
    pub transformed: Option<TypeId>,
    /// Type this node overrides
    pub replaces: Option<TypeId>,
    /// Type overriding this node
    pub replaced_by: Option<TypeId>,
    /// Superseded wholesale (no longer part of its modify chain)
    pub replaced: bool,
    /// Unloaded or explicitly removed
    pub removed: bool,
    /// Modify overlay rather than a new type
    pub is_modify: bool,
    /// Bumped on every mutation of this snapshot
    pub version: u64,
}

impl TypeNode {
    pub(crate) fn new(id: TypeId, qualified_name: String, layer: LayerId, flags: TypeFlags) -> Self {
        let name = simple_name(&qualified_name).to_string();
        Self {
            id,
            name,
            package: String::new(),
            qualified_name,
            layer,
            flags,
            extends: None,
            interfaces: Vec::new(),
            scope_interfaces: Vec::new(),
            body: Vec::new(),
            hidden_body: Vec::new(),
            outer: None,
            transformed: None,
            replaces: None,
            replaced_by: None,
            replaced: false,
            removed: false,
            is_modify: false,
            version: 0,
        }
    }

    /// Check if the type is purely dynamic
    pub fn is_dynamic(&self) -> bool {
        self.flags.contains(TypeFlags::DYNAMIC)
    }

    /// Check if the type is an interface
    pub fn is_interface(&self) -> bool {
        self.flags.contains(TypeFlags::INTERFACE)
    }

    /// Check if the type is an object type
    pub fn is_object(&self) -> bool {
        self.flags.contains(TypeFlags::OBJECT)
    }

    /// Check if lifecycle methods are synthesized for this type
    pub fn is_component(&self) -> bool {
        self.flags.contains(TypeFlags::COMPONENT)
    }

    /// Declared fields in body order
    pub fn fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.body.iter().filter_map(|m| m.as_field())
    }

    /// Declared methods in body order
    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.body.iter().filter_map(|m| m.as_method())
    }

    /// Declared inner types in body order
    pub fn inner_types(&self) -> impl Iterator<Item = &InnerTypeRef> {
        self.body.iter().filter_map(|m| m.as_inner())
    }

    /// Declared constructors
    pub fn constructors(&self) -> impl Iterator<Item = &ConstructorDecl> {
        self.body.iter().filter_map(|m| match m.as_ref() {
            Member::Constructor(c) => Some(c),
            _ => None,
        })
    }

    /// Property assignments in body order
    pub fn assigns(&self) -> impl Iterator<Item = &PropertyAssign> {
        self.body.iter().filter_map(|m| match m.as_ref() {
            Member::Assign(a) => Some(a),
            _ => None,
        })
    }

    /// Initializer blocks in body order
    pub fn blocks(&self) -> impl Iterator<Item = &BlockDecl> {
        self.body.iter().filter_map(|m| match m.as_ref() {
            Member::Block(b) => Some(b),
            _ => None,
        })
    }

    /// Inner type declared with the given simple name
    pub fn inner_named(&self, name: &str) -> Option<&InnerTypeRef> {
        self.inner_types().find(|t| t.name == name)
    }
}

/// Last segment of a qualified name
pub(crate) fn simple_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

/// Package part of a qualified top-level name
pub(crate) fn package_of(qualified: &str) -> &str {
    qualified.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
}

// ============================================================================
// Declarations
// ============================================================================

/// Body entry of a `TypeDecl`
#[derive(Debug, Clone)]
pub enum MemberDecl {
    /// Field
    Field(FieldDecl),
    /// Method
    Method(MethodDecl),
    /// Constructor
    Constructor(ConstructorDecl),
    /// Inner type, declared recursively
    Inner {
        /// Inner declaration (simple name)
        decl: TypeDecl,
        /// Static inner type
        is_static: bool,
    },
    /// Property assignment
    Assign(PropertyAssign),
    /// Initializer block
    Block(BlockDecl),
}

/// Declaration of a type, as produced by an external parser
#[derive(Debug, Clone)]
pub struct TypeDecl {
    /// Qualified name for top-level types, simple name for inner types
    pub name: String,
    /// Flags
    pub flags: TypeFlags,
    /// Base type (qualified name)
    pub extends: Option<String>,
    /// Implemented interfaces
    pub interfaces: Vec<String>,
    /// Body in declaration order
    pub members: Vec<MemberDecl>,
}

impl TypeDecl {
    /// Declare a class
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: TypeFlags::empty(),
            extends: None,
            interfaces: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Declare an object type
    pub fn object(name: impl Into<String>) -> Self {
        Self::class(name).flag(TypeFlags::OBJECT)
    }

    /// Declare an interface
    pub fn interface(name: impl Into<String>) -> Self {
        Self::class(name).flag(TypeFlags::INTERFACE)
    }

    /// Add flags
    pub fn flag(mut self, flags: TypeFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Mark as dynamic
    pub fn dynamic(self) -> Self {
        self.flag(TypeFlags::DYNAMIC)
    }

    /// Mark as auto-component
    pub fn component(self) -> Self {
        self.flag(TypeFlags::COMPONENT)
    }

    /// Set the base type
    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.extends = Some(base.into());
        self
    }

    /// Add an implemented interface
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Add a field
    pub fn field(mut self, field: FieldDecl) -> Self {
        self.members.push(MemberDecl::Field(field));
        self
    }

    /// Add a method
    pub fn method(mut self, method: MethodDecl) -> Self {
        self.members.push(MemberDecl::Method(method));
        self
    }

    /// Add a constructor
    pub fn constructor(mut self, ctor: ConstructorDecl) -> Self {
        self.members.push(MemberDecl::Constructor(ctor));
        self
    }

    /// Add a property assignment
    pub fn assign(mut self, name: impl Into<String>, init: Initializer) -> Self {
        self.members.push(MemberDecl::Assign(PropertyAssign {
            name: name.into(),
            init,
        }));
        self
    }

    /// Add an initializer block
    pub fn block(mut self, is_static: bool, source: impl Into<String>) -> Self {
        self.members.push(MemberDecl::Block(BlockDecl {
            is_static,
            source: source.into(),
        }));
        self
    }

    /// Add an inner type
    pub fn inner(mut self, decl: TypeDecl) -> Self {
        self.members.push(MemberDecl::Inner {
            decl,
            is_static: false,
        });
        self
    }

    /// Add a static inner type
    pub fn inner_static(mut self, decl: TypeDecl) -> Self {
        self.members.push(MemberDecl::Inner {
            decl,
            is_static: true,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ty::TypeRef;

    #[test]
    fn test_name_helpers() {
        assert_eq!(simple_name("demo.ui.Button"), "Button");
        assert_eq!(simple_name("Button"), "Button");
        assert_eq!(package_of("demo.ui.Button"), "demo.ui");
        assert_eq!(package_of("Button"), "");
    }

    #[test]
    fn test_decl_builder() {
        let decl = TypeDecl::class("demo.Counter")
            .dynamic()
            .extends("demo.Base")
            .field(FieldDecl::new("count", TypeRef::Int))
            .inner(TypeDecl::object("label"));
        assert!(decl.flags.contains(TypeFlags::DYNAMIC));
        assert_eq!(decl.extends.as_deref(), Some("demo.Base"));
        assert_eq!(decl.members.len(), 2);
        assert!(matches!(decl.members[1], MemberDecl::Inner { is_static: false, .. }));
    }
}
