//! Forwarding stubs for dynamic types below compiled classes

mod common;

use std::sync::Arc;

use stratum_engine::{
    CompiledClass, FieldDecl, MethodDecl, StubStatus, TypeDecl, TypeRef, TypeSystem, UpdateMode,
};
use stratum_sdk::artifact::INDEX_FILE_NAME;
use stratum_sdk::{FsArtifactStore, LayerId, MemoryArtifactStore};

use common::{fixture, Fixture};

/// Non-dynamic `base.Widget` with a compiled class taking `()` or `(int, String)`
fn declare_widget(f: &Fixture, dynamic_protocol: bool) {
    let mut class = CompiledClass::new("base.Widget")
        .with_constructors(vec![Vec::new(), vec![TypeRef::Int, TypeRef::Str]]);
    if dynamic_protocol {
        class = class.with_dynamic_protocol();
    }
    f.system.register_compiled_class(class);
    f.system
        .declare(TypeDecl::class("base.Widget"), f.core)
        .unwrap();
}

fn fancy() -> TypeDecl {
    TypeDecl::class("demo.Fancy")
        .dynamic()
        .extends("base.Widget")
        .field(FieldDecl::new("label", TypeRef::Str))
        .method(MethodDecl::new("render", TypeRef::Str))
        .method(MethodDecl::new("resize", TypeRef::Void).param("newWidth", TypeRef::Int))
}

fn declare_fancy(system: &TypeSystem, layer: LayerId) -> stratum_engine::TypeId {
    system.declare(fancy(), layer).unwrap()
}

#[test]
fn test_stub_needed_below_plain_compiled_class() {
    let f = fixture();
    declare_widget(&f, false);
    let id = declare_fancy(&f.system, f.app);
    assert!(f.system.needs_stub(id));

    let deeper = f
        .system
        .declare(TypeDecl::class("demo.Fancier").dynamic().extends("demo.Fancy"), f.app)
        .unwrap();
    assert!(f.system.needs_stub(deeper));
}

#[test]
fn test_no_stub_below_dynamic_protocol_class() {
    let f = fixture();
    declare_widget(&f, true);
    let id = declare_fancy(&f.system, f.app);
    assert!(!f.system.needs_stub(id));
}

#[test]
fn test_no_stub_for_pure_dynamic_or_compiled_types() {
    let f = fixture();
    let dynamic = f
        .system
        .declare(TypeDecl::class("demo.Free").dynamic(), f.app)
        .unwrap();
    let plain = f
        .system
        .declare(TypeDecl::class("demo.Plain"), f.app)
        .unwrap();
    let interface = f
        .system
        .declare(TypeDecl::interface("demo.Shape").dynamic(), f.app)
        .unwrap();
    assert!(!f.system.needs_stub(dynamic));
    assert!(!f.system.needs_stub(plain));
    assert!(!f.system.needs_stub(interface));

    f.system.require_own_class(dynamic);
    assert!(f.system.needs_stub(dynamic));
}

#[test]
fn test_stub_needed_below_unregistered_compiled_type() {
    let f = fixture();
    f.system
        .declare(TypeDecl::class("base.Native"), f.core)
        .unwrap();
    let id = f
        .system
        .declare(TypeDecl::class("demo.Child").dynamic().extends("base.Native"), f.app)
        .unwrap();
    assert!(f.system.needs_stub(id));
}

#[test]
fn test_compile_without_store_fails() {
    let f = fixture();
    declare_widget(&f, false);
    let id = declare_fancy(&f.system, f.app);
    assert!(f.system.compile_stub(id).is_err());
}

#[test]
fn test_compile_writes_once_and_skips_unchanged() {
    let f = fixture();
    declare_widget(&f, false);
    let store = Arc::new(MemoryArtifactStore::new());
    let app = f.app;
    let system = f.system.with_artifact_store(store.clone());
    let id = declare_fancy(&system, app);

    let first = system.compile_stub(id).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].type_name, "demo.Fancy");
    assert_eq!(first[0].rel_path, "app/stubs/demo/FancyStub.rs");
    assert_eq!(first[0].status, StubStatus::Generated);
    assert_eq!(first[0].hash.len(), 64);

    let content = store.content("app/stubs/demo/FancyStub.rs").unwrap();
    assert_eq!(first[0].hash, stratum_engine::bridge::content_hash(&content));
    assert!(content.contains("pub struct FancyStub {"));
    assert!(content.contains("pub const QUALIFIED_NAME: &'static str = \"demo.Fancy\";"));
    assert!(content.contains("// Compiled ancestor: base.Widget"));
    assert!(content.contains("pub fn new(type_handle: TypeHandle) -> Self {"));
    assert!(content.contains("pub fn new_1(type_handle: TypeHandle, a0: i32, a1: String) -> Self {"));
    assert!(content.contains("pub fn label(&self) -> Value {"));
    assert!(content.contains("pub fn call_render(&self) -> Value {"));
    assert!(content.contains("pub fn call_resize_1(&self, new_width: i32) {"));
    assert!(content.contains("self.inner.invoke(\"resize\", &[Value::from(new_width)]);"));

    let second = system.compile_stub(id).unwrap();
    assert_eq!(second[0].status, StubStatus::UpToDate);
    assert_eq!(second[0].hash, first[0].hash);
    assert_eq!(store.write_count(), 1);

    let changed = system
        .stage_type(fancy().method(MethodDecl::new("hide", TypeRef::Void)), app)
        .unwrap();
    let result = system
        .update_type(id, changed, UpdateMode::Replace, true)
        .unwrap();
    assert!(result.is_applied());

    let third = system.compile_stub(id).unwrap();
    assert_eq!(third[0].status, StubStatus::Generated);
    assert_ne!(third[0].hash, first[0].hash);
    assert_eq!(store.write_count(), 2);
    assert!(store
        .content("app/stubs/demo/FancyStub.rs")
        .unwrap()
        .contains("pub fn call_hide(&self) {"));
}

#[test]
fn test_same_arity_overloads_get_distinct_stub_methods() {
    let f = fixture();
    declare_widget(&f, false);
    let store = Arc::new(MemoryArtifactStore::new());
    let app = f.app;
    let system = f.system.with_artifact_store(store.clone());
    let id = system
        .declare(
            fancy().method(MethodDecl::new("resize", TypeRef::Void).param("spec", TypeRef::Str)),
            app,
        )
        .unwrap();

    system.compile_stub(id).unwrap();
    let content = store.content("app/stubs/demo/FancyStub.rs").unwrap();
    assert_eq!(content.matches("pub fn call_resize_i32(&self, new_width: i32) {").count(), 1);
    assert_eq!(content.matches("pub fn call_resize_string(&self, spec: String) {").count(), 1);
    assert!(!content.contains("call_resize_1"));
    assert!(content.contains("self.inner.invoke(\"resize\", &[Value::from(spec)]);"));
}

#[test]
fn test_compile_skips_types_without_stub() {
    let f = fixture();
    let store = Arc::new(MemoryArtifactStore::new());
    let app = f.app;
    let system = f.system.with_artifact_store(store.clone());
    let id = system
        .declare(TypeDecl::class("demo.Free").dynamic(), app)
        .unwrap();
    assert!(system.compile_stub(id).unwrap().is_empty());
    assert_eq!(store.write_count(), 0);
}

#[test]
fn test_inner_stubs_come_first() {
    let f = fixture();
    declare_widget(&f, false);
    let store = Arc::new(MemoryArtifactStore::new());
    let app = f.app;
    let system = f.system.with_artifact_store(store.clone());
    let id = system
        .declare(
            fancy().inner(TypeDecl::class("Part").dynamic().extends("base.Widget")),
            app,
        )
        .unwrap();

    let artifacts = system.compile_stub(id).unwrap();
    let names: Vec<&str> = artifacts.iter().map(|a| a.type_name.as_str()).collect();
    assert_eq!(names, vec!["demo.Fancy.Part", "demo.Fancy"]);
    assert_eq!(artifacts[0].rel_path, "app/stubs/demo/Fancy/PartStub.rs");

    let outer = store.content("app/stubs/demo/FancyStub.rs").unwrap();
    assert!(outer.contains("#[path = \"Fancy/PartStub.rs\"]\npub mod part_stub;"));
    let inner = store.content("app/stubs/demo/Fancy/PartStub.rs").unwrap();
    assert!(inner.contains("pub struct PartStub {"));
    assert!(inner.contains("\"demo.Fancy.Part\""));
}

#[test]
fn test_fs_store_index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let compile = || {
        let f = fixture();
        declare_widget(&f, false);
        let app = f.app;
        let system = f
            .system
            .with_artifact_store(Arc::new(FsArtifactStore::new(dir.path())));
        let id = declare_fancy(&system, app);
        system.compile_stub(id).unwrap()
    };

    let first = compile();
    assert_eq!(first[0].status, StubStatus::Generated);
    let written = dir.path().join("app/stubs/demo/FancyStub.rs");
    assert!(written.exists());
    assert!(dir.path().join("app").join(INDEX_FILE_NAME).exists());

    let second = compile();
    assert_eq!(second[0].status, StubStatus::UpToDate);
    assert_eq!(second[0].hash, first[0].hash);
}
