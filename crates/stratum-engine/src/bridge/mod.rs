//! Dynamic/compiled bridge
//!
//! A dynamic type that extends a compiled class without the dynamic-object
//! protocol (or that must exist as a concrete class for other reasons)
//! gets a generated forwarding stub. Stubs are content hashed; the
//! artifact store's index lets unchanged stubs be skipped.

mod stub;

use rustc_hash::FxHashSet;

use crate::diagnostics::DiagnosticKind;
use crate::error::{EngineError, EngineResult};
use crate::model::{TypeFlags, TypeId};
use crate::system::{CompiledClass, TypeSystem};

pub use stub::content_hash;

/// Whether a stub was written or found up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubStatus {
    /// Content changed (or was missing) and has been written
    Generated,
    /// Index hash matched; nothing written
    UpToDate,
}

/// One stub produced by `compile_stub`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubArtifact {
    /// Qualified name of the dynamic type
    pub type_name: String,
    /// Store-relative path (`<layer>/<stub dir>/<path>.rs`)
    pub rel_path: String,
    /// Hex-encoded SHA-256 of the content
    pub hash: String,
    /// Generated or skipped
    pub status: StubStatus,
}

/// Nearest ancestor that exists as a compiled class
pub(crate) enum CompiledAncestor {
    /// No compiled ancestor; the type roots in the interpreter
    None,
    /// Ancestor type name and its class, if one is registered
    Found(String, Option<CompiledClass>),
}

impl TypeSystem {
    /// Require a concrete native class for `id` (class literal or type
    /// test against it in compiled code)
    pub fn require_own_class(&self, id: TypeId) {
        let id = self.resolve(id, true);
        let _guard = self.lock_structure();
        self.update_node(id, |node| node.flags.insert(TypeFlags::NEEDS_OWN_CLASS));
    }

    /// Check if `id` needs a generated forwarding stub
    pub fn needs_stub(&self, id: TypeId) -> bool {
        let id = self.resolve(id, true);
        let Some(node) = self.node(id) else {
            return false;
        };
        if !node.is_dynamic() || node.is_interface() {
            return false;
        }
        if node.flags.contains(TypeFlags::NEEDS_OWN_CLASS) {
            return true;
        }
        match self.compiled_ancestor(id) {
            CompiledAncestor::None => false,
            CompiledAncestor::Found(_, Some(class)) => !class.dynamic_protocol,
            CompiledAncestor::Found(_, None) => true,
        }
    }

    pub(crate) fn compiled_ancestor(&self, id: TypeId) -> CompiledAncestor {
        let max = self.options().max_chain_depth;
        let mut seen = FxHashSet::default();
        let mut current = self.extends_type(id);
        while let Some(ancestor) = current {
            let Some(node) = self.node(ancestor) else {
                break;
            };
            if !seen.insert(node.qualified_name.clone()) || seen.len() > max {
                self.diagnostics().report(
                    DiagnosticKind::CycleGuard,
                    &node.qualified_name,
                    "base chain is cyclic or exceeds the depth guard",
                );
                break;
            }
            let class = self.compiled_class(&node.qualified_name);
            if class.is_some() || !node.is_dynamic() {
                return CompiledAncestor::Found(node.qualified_name.clone(), class);
            }
            current = self.extends_type(ancestor);
        }
        CompiledAncestor::None
    }

    /// Generate the stubs of `id` and of its inner types, inner types
    /// first. Types that need no stub are skipped; the result lists every
    /// stub considered, written or up to date.
    pub fn compile_stub(&self, id: TypeId) -> EngineResult<Vec<StubArtifact>> {
        if self.artifacts().is_none() {
            return Err(EngineError::Artifact("no artifact store attached".into()));
        }
        let mut out = Vec::new();
        self.compile_stub_at(self.resolve(id, true), 0, &mut out)?;
        Ok(out)
    }

    fn compile_stub_at(&self, id: TypeId, depth: usize, out: &mut Vec<StubArtifact>) -> EngineResult<Option<StubArtifact>> {
        let node = self
            .node(id)
            .ok_or_else(|| EngineError::TypeNotFound(id.to_string()))?;
        if depth > self.options().max_chain_depth {
            self.diagnostics().report(
                DiagnosticKind::CycleGuard,
                &node.qualified_name,
                "inner type nesting exceeds the depth guard",
            );
            return Ok(None);
        }

        let mut inner_stubs = Vec::new();
        for inner in node.inner_types() {
            let inner_id = self.resolve(inner.id, true);
            if let Some(artifact) = self.compile_stub_at(inner_id, depth + 1, out)? {
                inner_stubs.push(artifact.type_name.clone());
            }
        }

        if !self.needs_stub(id) {
            return Ok(None);
        }
        let source = stub::render(self, id, &inner_stubs)?;
        let hash = content_hash(&source);
        let rel_path = self.stub_path(id);
        let store = self
            .artifacts()
            .ok_or_else(|| EngineError::Artifact("no artifact store attached".into()))?;

        let status = if store.read_index(&rel_path).as_deref() == Some(hash.as_str()) {
            StubStatus::UpToDate
        } else {
            store.write_artifact(&rel_path, &source, &hash)?;
            StubStatus::Generated
        };
        tracing::debug!(type_name = %node.qualified_name, path = %rel_path, ?status, "stub compiled");

        let artifact = StubArtifact {
            type_name: node.qualified_name.clone(),
            rel_path,
            hash,
            status,
        };
        out.push(artifact.clone());
        Ok(Some(artifact))
    }

    /// Store-relative path of the stub for `id`
    pub fn stub_path(&self, id: TypeId) -> String {
        let Some(node) = self.node(id) else {
            return String::new();
        };
        let options = self.options();
        format!(
            "{}/{}/{}{}.rs",
            self.layers().layer_name(node.layer),
            options.stub_dir,
            node.qualified_name.replace('.', "/"),
            options.stub_suffix
        )
    }
}
