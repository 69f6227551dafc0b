//! Stratum engine - layered type system with live update
//!
//! The engine keeps every declared type of a running program in a
//! `TypeSystem` session and answers, for each of them:
//! - **Member resolution**: which declaration a name refers to, across
//!   modify overlays, hidden members, base types and interfaces
//! - **Property slots**: a stable instance and static layout per type
//! - **Live update**: how a changed definition is pushed to running
//!   instances, or why it cannot be and a rebuild is needed
//! - **Stubs**: which dynamic types need a generated forwarding class
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stratum_engine::{FieldDecl, Initializer, TypeDecl, TypeRef, TypeSystem, UpdateMode};
//! use stratum_sdk::{LinearLayers, MemoryInstanceRegistry, Value};
//!
//! let mut layers = LinearLayers::new();
//! let app = layers.push("app");
//! let system = TypeSystem::new(Arc::new(layers), Arc::new(MemoryInstanceRegistry::new()));
//!
//! let counter = system.declare(
//!     TypeDecl::class("demo.Counter")
//!         .dynamic()
//!         .field(FieldDecl::new("count", TypeRef::Int).init(Initializer::literal(Value::Int(5)))),
//!     app,
//! )?;
//! let instance = system.create_instance(counter, &[])?;
//!
//! let next = system.stage_type(
//!     TypeDecl::class("demo.Counter")
//!         .dynamic()
//!         .field(FieldDecl::new("count", TypeRef::Int).init(Initializer::literal(Value::Int(7)))),
//!     app,
//! )?;
//! system.update_type(counter, next, UpdateMode::Replace, true)?;
//! assert_eq!(system.get_property(&instance, "count")?, Value::Int(7));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod processor;
pub mod resolve;
pub mod slots;
pub mod stale;
pub mod system;
pub mod update;

pub use bridge::{StubArtifact, StubStatus};
pub use config::EngineOptions;
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::{EngineError, EngineResult};
pub use model::{
    Access, AccessorRole, ConstructorDecl, EvalScope, FieldDecl, Initializer, Member, MemberDecl, MemberKinds,
    MethodDecl, Param, TypeDecl, TypeFlags, TypeId, TypeNode, TypeRef,
};
pub use processor::DefinitionProcessor;
pub use resolve::{Lookup, MemberIndex, MemberOrigin, ResolvedMember};
pub use slots::{PropertySlot, SlotAccessor, SlotPosition, SlotTable};
pub use stale::StaleModel;
pub use system::{CompiledClass, TypeSystem};
pub use update::{
    UpdateContext, UpdateListener, UpdateMode, UpdateOutcome, UpdatePhase, UpdateResult, UpdateSummary,
};
