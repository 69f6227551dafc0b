//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use std::sync::Arc;

use stratum_engine::{EngineOptions, FieldDecl, Initializer, TypeDecl, TypeRef, TypeSystem};
use stratum_sdk::{LayerId, LinearLayers, MemoryInstanceRegistry, Value};

/// A session over three stacked layers: `core` <- `app` <- `plugin`
pub struct Fixture {
    pub system: TypeSystem,
    pub registry: Arc<MemoryInstanceRegistry>,
    pub core: LayerId,
    pub app: LayerId,
    pub plugin: LayerId,
}

pub fn fixture() -> Fixture {
    fixture_with(EngineOptions::default())
}

pub fn fixture_with(options: EngineOptions) -> Fixture {
    let mut layers = LinearLayers::new();
    let core = layers.push("core");
    let app = layers.push("app");
    let plugin = layers.push("plugin");
    let registry = Arc::new(MemoryInstanceRegistry::new());
    let system = TypeSystem::with_options(options, Arc::new(layers), registry.clone()).unwrap();
    Fixture {
        system,
        registry,
        core,
        app,
        plugin,
    }
}

/// `name: int = value`
pub fn int_field(name: &str, value: i64) -> FieldDecl {
    FieldDecl::new(name, TypeRef::Int).init(Initializer::literal(value))
}

/// Dynamic `demo.Counter` whose `count` starts at `initial`
pub fn counter(initial: i64) -> TypeDecl {
    TypeDecl::class("demo.Counter")
        .dynamic()
        .field(int_field("count", initial))
}

pub fn int(value: i64) -> Value {
    Value::Int(value)
}
