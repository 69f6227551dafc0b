//! Stratum SDK - collaborator interfaces for the Stratum type system
//!
//! This crate provides the runtime value model and the narrow interfaces the
//! engine consumes without owning them:
//! - **Values and instances**: `Value`, `Instance`, `InstanceHandle`
//! - **Live instance registry**: `InstanceRegistry` (+ `MemoryInstanceRegistry`)
//! - **Layer ordering**: `LayerOrdering` (+ `LinearLayers`)
//! - **Artifact store**: `ArtifactStore` (+ `MemoryArtifactStore`, `FsArtifactStore`)
//!
//! # Example
//!
//! ```ignore
//! use stratum_sdk::{Instance, InstanceRegistry, MemoryInstanceRegistry, Value};
//!
//! let registry = MemoryInstanceRegistry::new();
//! let instance = Instance::new("demo.Counter", 1);
//! instance.set_slot(0, Value::Int(5));
//! registry.register("demo.Counter", instance.clone());
//! assert_eq!(registry.instances_of("demo.Counter").len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod artifact;
pub mod error;
pub mod instance;
pub mod layer;
pub mod value;

pub use artifact::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
pub use error::{SdkError, SdkResult};
pub use instance::{Instance, InstanceHandle, InstanceId, InstanceRegistry, MemoryInstanceRegistry};
pub use layer::{LayerId, LayerOrdering, LinearLayers};
pub use value::Value;
