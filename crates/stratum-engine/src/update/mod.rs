//! Live-update diff engine
//!
//! An update compares the effective body of a type before and after the
//! change and walks a fixed sequence of phases:
//!
//! ```text
//! BuildingContext -> Classifying -> ApplyingStructural -> ApplyingFieldReinit -> Notifying -> Done
//!                                \-> Stale
//! ```
//!
//! The first three phases run under the structural lock; initializers are
//! re-run on live instances after it is released. A change that cannot be
//! applied safely to compiled classes or live instances marks the session
//! stale and leaves the type and its instances untouched.

mod apply;
mod context;

pub use context::UpdateContext;

/// How the new node relates to the old one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateMode {
    /// The new node takes the old node's place in its modify chain
    Replace,
    /// The new node becomes a modify overlay of the old type
    Add,
    /// The old node is taken out (the new node is ignored)
    Remove,
}

/// Phases of one update transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdatePhase {
    /// Effective bodies indexed by name
    BuildingContext,
    /// Members classified as added, updated or removed
    Classifying,
    /// Links registered, versions bumped, instance layouts migrated
    ApplyingStructural,
    /// Changed initializers re-run on live instances
    ApplyingFieldReinit,
    /// Listeners notified
    Notifying,
    /// Completed
    Done,
    /// Gave up: the change needs a rebuild
    Stale,
}

/// Final state of an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Change applied
    Applied,
    /// Change not applied; session marked stale with this reason
    Stale(String),
    /// Traversal aborted by the depth guard
    Aborted(String),
}

/// What an update changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Mode the update ran in
    pub mode: UpdateMode,
    /// Properties added
    pub added: Vec<String>,
    /// Properties whose initializer or type changed
    pub updated: Vec<String>,
    /// Properties removed
    pub removed: Vec<String>,
    /// Inner types added (qualified names)
    pub inner_added: Vec<String>,
    /// Inner types removed (qualified names)
    pub inner_removed: Vec<String>,
    /// Method signatures added, removed or changed
    pub methods_changed: Vec<String>,
    /// Initializer blocks changed
    pub blocks_changed: bool,
    /// Base type changed
    pub base_changed: bool,
    /// Live instances whose fields were re-initialized
    pub instances_updated: usize,
}

impl UpdateSummary {
    pub(crate) fn empty(mode: UpdateMode) -> Self {
        Self {
            mode,
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            inner_added: Vec::new(),
            inner_removed: Vec::new(),
            methods_changed: Vec::new(),
            blocks_changed: false,
            base_changed: false,
            instances_updated: 0,
        }
    }

    /// Check if nothing changed
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.inner_added.is_empty()
            && self.inner_removed.is_empty()
            && self.methods_changed.is_empty()
            && !self.blocks_changed
            && !self.base_changed
    }
}

/// Result of `update_type`, with one nested result per inner type updated
#[derive(Debug, Clone)]
pub struct UpdateResult {
    /// Qualified name of the updated type
    pub type_name: String,
    /// Outcome
    pub outcome: UpdateOutcome,
    /// Change summary
    pub summary: UpdateSummary,
    /// Phases visited, in order
    pub phases: Vec<UpdatePhase>,
    /// Inner type updates
    pub children: Vec<UpdateResult>,
}

impl UpdateResult {
    /// Check if the change was applied
    pub fn is_applied(&self) -> bool {
        self.outcome == UpdateOutcome::Applied
    }

    /// Stale reason, if the update degraded
    pub fn stale_reason(&self) -> Option<&str> {
        match &self.outcome {
            UpdateOutcome::Stale(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Observer notified after each applied update
pub trait UpdateListener: Send + Sync {
    /// Called in the `Notifying` phase, outside the structural lock
    fn type_updated(&self, result: &UpdateResult);
}
