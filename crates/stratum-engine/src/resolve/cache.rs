//! Member resolution cache entries

use crate::model::{MemberKinds, TypeId};
use crate::resolve::Lookup;

/// Cache key: one entry per distinct query against a node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct MemberKey {
    pub(crate) name: String,
    pub(crate) kinds: MemberKinds,
    pub(crate) transformed: bool,
    pub(crate) ref_type: Option<TypeId>,
}

/// Memoized result, valid only while the node's version equals `version`
#[derive(Debug, Clone)]
pub(crate) struct CachedLookup {
    pub(crate) version: u64,
    pub(crate) result: Lookup,
}

impl CachedLookup {
    pub(crate) fn valid_at(&self, version: u64) -> Option<&Lookup> {
        (self.version == version).then_some(&self.result)
    }
}
