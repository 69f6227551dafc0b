//! Build artifact store
//!
//! Generated stubs are written through an `ArtifactStore`. Each store keeps
//! a name→hash index per layer so that regeneration can be skipped when the
//! content hash has not changed. The index is a cache: losing it only costs
//! a regeneration, never correctness.
//!
//! Relative paths are `<layer>/<path...>`; the first component selects the
//! layer index.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::SdkResult;

/// Name of the per-layer index file
pub const INDEX_FILE_NAME: &str = ".stub-index.json";

/// Artifact store consumed by the dynamic/compiled bridge
pub trait ArtifactStore: Send + Sync {
    /// Hash recorded for `rel_path`, if any
    fn read_index(&self, rel_path: &str) -> Option<String>;

    /// Write `content` to `rel_path` and record `hash` in the layer index
    fn write_artifact(&self, rel_path: &str, content: &str, hash: &str) -> SdkResult<()>;
}

/// Split `<layer>/<rest>` into its layer component and the remainder
fn split_layer(rel_path: &str) -> (&str, &str) {
    match rel_path.split_once('/') {
        Some((layer, rest)) => (layer, rest),
        None => ("", rel_path),
    }
}

/// In-memory artifact store (tests, editors without a build directory)
#[derive(Default)]
pub struct MemoryArtifactStore {
    entries: Mutex<FxHashMap<String, (String, String)>>,
    writes: Mutex<usize>,
}

impl MemoryArtifactStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Content written for `rel_path`
    pub fn content(&self, rel_path: &str) -> Option<String> {
        self.entries.lock().get(rel_path).map(|(content, _)| content.clone())
    }

    /// Number of writes performed so far
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn read_index(&self, rel_path: &str) -> Option<String> {
        self.entries.lock().get(rel_path).map(|(_, hash)| hash.clone())
    }

    fn write_artifact(&self, rel_path: &str, content: &str, hash: &str) -> SdkResult<()> {
        self.entries
            .lock()
            .insert(rel_path.to_string(), (content.to_string(), hash.to_string()));
        *self.writes.lock() += 1;
        Ok(())
    }
}

/// On-disk layer index
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
struct LayerIndex {
    /// Artifact path (relative to the layer) -> content hash
    entries: BTreeMap<String, String>,
}

/// File-backed artifact store rooted at a build directory
pub struct FsArtifactStore {
    root: PathBuf,
    indices: Mutex<FxHashMap<String, LayerIndex>>,
}

impl FsArtifactStore {
    /// Create a store rooted at `root` (created on first write)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            indices: Mutex::new(FxHashMap::default()),
        }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self, layer: &str) -> PathBuf {
        self.root.join(layer).join(INDEX_FILE_NAME)
    }

    /// Load an index from disk; a missing or unreadable index is empty
    fn load_index(&self, layer: &str) -> LayerIndex {
        let path = self.index_path(layer);
        fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }
}

impl ArtifactStore for FsArtifactStore {
    fn read_index(&self, rel_path: &str) -> Option<String> {
        let (layer, rest) = split_layer(rel_path);
        let mut indices = self.indices.lock();
        let index = indices
            .entry(layer.to_string())
            .or_insert_with(|| self.load_index(layer));
        index.entries.get(rest).cloned()
    }

    fn write_artifact(&self, rel_path: &str, content: &str, hash: &str) -> SdkResult<()> {
        let (layer, rest) = split_layer(rel_path);
        let target = self.root.join(rel_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, content)?;

        let mut indices = self.indices.lock();
        let index = indices
            .entry(layer.to_string())
            .or_insert_with(|| self.load_index(layer));
        index.entries.insert(rest.to_string(), hash.to_string());

        let index_path = self.index_path(layer);
        if let Some(parent) = index_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(index_path, serde_json::to_string_pretty(index)?)?;
        Ok(())
    }
}
