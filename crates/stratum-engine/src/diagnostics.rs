//! Diagnostics sink
//!
//! Conditions that are reported rather than raised: duplicate declarations,
//! ambiguous overloads, depth-guard trips, slot table failures and failed
//! initializers during live update. Each report is logged through `tracing`
//! and retained so a build driver or editor can read it back.

use std::fmt;

use parking_lot::Mutex;

/// Diagnostic category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Two declarations collide on name and kind
    DuplicateDeclaration,
    /// Overload resolution found incomparable candidates
    AmbiguousOverload,
    /// A chain walk exceeded its depth budget or revisited a node
    CycleGuard,
    /// Property slot table construction aborted part way
    SlotTableFailure,
    /// An initializer failed while re-running on a live instance
    InitializerFailed,
    /// A referenced type name does not resolve
    UnresolvedType,
}

impl DiagnosticKind {
    /// Invariant violations are logged at error level
    pub fn is_invariant_violation(self) -> bool {
        matches!(self, DiagnosticKind::CycleGuard | DiagnosticKind::SlotTableFailure)
    }
}

/// A recorded diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Category
    pub kind: DiagnosticKind,
    /// Qualified name of the type the diagnostic is attached to
    pub type_name: String,
    /// Human-readable message
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.kind, self.type_name, self.message)
    }
}

/// Session-wide diagnostics sink
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic; identical repeats are kept once
    pub fn report(&self, kind: DiagnosticKind, type_name: &str, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            kind,
            type_name: type_name.to_string(),
            message: message.into(),
        };
        if kind.is_invariant_violation() {
            tracing::error!(kind = ?kind, type_name, "{}", diagnostic.message);
        } else {
            tracing::warn!(kind = ?kind, type_name, "{}", diagnostic.message);
        }
        let mut entries = self.entries.lock();
        if !entries.contains(&diagnostic) {
            entries.push(diagnostic);
        }
    }

    /// Copy of every recorded diagnostic
    pub fn all(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    /// Number of diagnostics of a given kind
    pub fn count_of(&self, kind: DiagnosticKind) -> usize {
        self.entries.lock().iter().filter(|d| d.kind == kind).count()
    }

    /// Check if any diagnostic of `kind` mentions `type_name`
    pub fn has(&self, kind: DiagnosticKind, type_name: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|d| d.kind == kind && d.type_name == type_name)
    }

    /// Drop all recorded diagnostics
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
