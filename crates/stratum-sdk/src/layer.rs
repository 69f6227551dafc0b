//! Layer ordering
//!
//! Layers are ordered units of source. A later layer may define new types
//! or modify types from the layers it builds on. The engine only needs a
//! total position per layer and an ancestry test.

use rustc_hash::FxHashMap;

use crate::error::{SdkError, SdkResult};

/// Layer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u32);

impl LayerId {
    /// Raw index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Layer ordering service consumed by the engine
pub trait LayerOrdering: Send + Sync {
    /// Total position of a layer (lower loads first)
    fn position_of(&self, layer: LayerId) -> i32;

    /// True when `ancestor` is `layer` itself or a layer `layer` builds on
    fn is_ancestor_layer(&self, ancestor: LayerId, layer: LayerId) -> bool;

    /// Display name of a layer (diagnostics only)
    fn layer_name(&self, layer: LayerId) -> String {
        format!("layer#{}", layer.0)
    }
}

#[derive(Debug, Clone)]
struct LayerEntry {
    name: String,
    bases: Vec<LayerId>,
}

/// Layer stack in load order.
///
/// `push` adds a layer that builds on every earlier layer; `add_layer`
/// names its base layers explicitly. Bases must already exist, so the
/// ancestry graph is acyclic by construction.
#[derive(Debug, Clone, Default)]
pub struct LinearLayers {
    layers: Vec<LayerEntry>,
    by_name: FxHashMap<String, LayerId>,
}

impl LinearLayers {
    /// Create an empty layer stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer on top of all existing layers
    pub fn push(&mut self, name: impl Into<String>) -> LayerId {
        let bases = (0..self.layers.len() as u32).map(LayerId).collect();
        self.insert(name.into(), bases)
    }

    /// Add a layer with explicit base layers
    pub fn add_layer(&mut self, name: impl Into<String>, bases: &[LayerId]) -> SdkResult<LayerId> {
        for base in bases {
            if base.index() >= self.layers.len() {
                return Err(SdkError::UnknownLayer(format!("layer#{}", base.0)));
            }
        }
        Ok(self.insert(name.into(), bases.to_vec()))
    }

    fn insert(&mut self, name: String, bases: Vec<LayerId>) -> LayerId {
        let id = LayerId(self.layers.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.layers.push(LayerEntry { name, bases });
        id
    }

    /// Look up a layer by name
    pub fn get(&self, name: &str) -> Option<LayerId> {
        self.by_name.get(name).copied()
    }

    /// Number of layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Check if there are no layers
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl LayerOrdering for LinearLayers {
    fn position_of(&self, layer: LayerId) -> i32 {
        if layer.index() < self.layers.len() {
            layer.0 as i32
        } else {
            -1
        }
    }

    fn is_ancestor_layer(&self, ancestor: LayerId, layer: LayerId) -> bool {
        if ancestor == layer {
            return true;
        }
        let mut pending = vec![layer];
        let mut seen = vec![false; self.layers.len()];
        while let Some(current) = pending.pop() {
            let Some(entry) = self.layers.get(current.index()) else {
                continue;
            };
            for &base in &entry.bases {
                if base == ancestor {
                    return true;
                }
                if !seen[base.index()] {
                    seen[base.index()] = true;
                    pending.push(base);
                }
            }
        }
        false
    }

    fn layer_name(&self, layer: LayerId) -> String {
        self.layers
            .get(layer.index())
            .map(|l| l.name.clone())
            .unwrap_or_else(|| format!("layer#{}", layer.0))
    }
}
