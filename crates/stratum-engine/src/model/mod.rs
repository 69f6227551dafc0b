//! Type model: declared types, their members and type references

pub mod member;
pub mod node;
pub mod ty;

pub use member::{
    Access, AccessorRole, BlockDecl, ConstructorDecl, EvalScope, FieldDecl, InitFn, Initializer, InnerTypeRef,
    Member, MemberKinds, MethodDecl, Modifiers, Param, PropertyAssign,
};
pub use node::{MemberDecl, TypeDecl, TypeFlags, TypeId, TypeNode};
pub use ty::TypeRef;
