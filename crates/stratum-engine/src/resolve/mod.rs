//! Member and method resolution
//!
//! Resolution walks a node's own body, its hidden body, synthesized
//! lifecycle methods, the transformed representation, the modify target,
//! the base type, declared interfaces and finally processor-contributed
//! scope interfaces. Results are memoized per node and validated against
//! the node's version on every access.

mod cache;
mod index;
mod lookup;

use std::sync::Arc;

pub(crate) use cache::{CachedLookup, MemberKey};
pub use index::MemberIndex;

use crate::model::{FieldDecl, Member, MethodDecl, TypeId};

/// Where a resolved member came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOrigin {
    /// Declared in the owner's body
    Body,
    /// Injected by a definition processor
    Hidden,
    /// Synthesized on demand (component lifecycle methods)
    Synthesized,
}

/// A member found by resolution
#[derive(Debug, Clone)]
pub struct ResolvedMember {
    /// The declaration
    pub member: Arc<Member>,
    /// Node declaring it
    pub owner: TypeId,
    /// Origin
    pub origin: MemberOrigin,
}

impl ResolvedMember {
    /// Get as method
    pub fn as_method(&self) -> Option<&MethodDecl> {
        self.member.as_method()
    }

    /// Get as field
    pub fn as_field(&self) -> Option<&FieldDecl> {
        self.member.as_field()
    }
}

impl PartialEq for ResolvedMember {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner
            && self.origin == other.origin
            && (Arc::ptr_eq(&self.member, &other.member) || self.member == other.member)
    }
}

/// Outcome of a member lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Matching member
    Found(ResolvedMember),
    /// Nothing matches anywhere in the hierarchy
    NotFound,
    /// A same-named declaration of another kind shadows every ancestor;
    /// searching further would report a member that is hidden at run time
    Stop,
}

impl Lookup {
    /// Found member, treating `Stop` as not found
    pub fn found(self) -> Option<ResolvedMember> {
        match self {
            Lookup::Found(member) => Some(member),
            Lookup::NotFound | Lookup::Stop => None,
        }
    }

    /// Check if the lookup stopped on a shadowing declaration
    pub fn is_stop(&self) -> bool {
        matches!(self, Lookup::Stop)
    }
}
