//! Instance construction, property access and statics

mod common;

use stratum_engine::{
    CompiledClass, ConstructorDecl, EngineError, FieldDecl, Initializer, TypeDecl, TypeRef,
};
use stratum_sdk::{InstanceRegistry, Value};

use common::{counter, fixture, int, int_field};

#[test]
fn test_non_dynamic_type_needs_compiled_class() {
    let f = fixture();
    let id = f
        .system
        .declare(TypeDecl::class("demo.Engine").field(int_field("rpm", 800)), f.app)
        .unwrap();
    let err = f.system.create_instance(id, &[]).unwrap_err();
    assert!(matches!(err, EngineError::NoCompiledClass(name) if name == "demo.Engine"));

    f.system
        .register_compiled_class(CompiledClass::new("demo.Engine"));
    let instance = f.system.create_instance(id, &[]).unwrap();
    assert_eq!(f.system.get_property(&instance, "rpm").unwrap(), int(800));
}

#[test]
fn test_interface_cannot_be_instantiated() {
    let f = fixture();
    let id = f
        .system
        .declare(TypeDecl::interface("demo.Shape").dynamic(), f.app)
        .unwrap();
    assert!(matches!(
        f.system.create_instance(id, &[]),
        Err(EngineError::InvalidDeclaration(_))
    ));
}

#[test]
fn test_constructor_binds_arguments_after_initializers() {
    let f = fixture();
    let id = f
        .system
        .declare(
            counter(5).constructor(ConstructorDecl::new().param("start", TypeRef::Int).bind("count", 0)),
            f.app,
        )
        .unwrap();

    let instance = f.system.create_instance(id, &[int(42)]).unwrap();
    assert_eq!(f.system.get_property(&instance, "count").unwrap(), int(42));

    let err = f
        .system
        .create_instance(id, &[Value::string("nope")])
        .unwrap_err();
    assert!(matches!(err, EngineError::ConstructorNotFound { arity: 1, .. }));
    let err = f.system.create_instance(id, &[]).unwrap_err();
    assert!(matches!(err, EngineError::ConstructorNotFound { arity: 0, .. }));
}

#[test]
fn test_compiled_constructors_are_matched_by_type() {
    let f = fixture();
    f.system.register_compiled_class(
        CompiledClass::new("demo.Engine").with_constructors(vec![vec![TypeRef::Int, TypeRef::Str]]),
    );
    let id = f
        .system
        .declare(TypeDecl::class("demo.Engine"), f.app)
        .unwrap();

    assert!(f.system.create_instance(id, &[]).is_err());
    assert!(f
        .system
        .create_instance(id, &[int(1), int(2)])
        .is_err());
    assert!(f
        .system
        .create_instance(id, &[int(1), Value::string("v8")])
        .is_ok());
}

#[test]
fn test_set_property_checks_declared_type() {
    let f = fixture();
    let id = f.system.declare(counter(1), f.app).unwrap();
    let instance = f.system.create_instance(id, &[]).unwrap();

    let err = f
        .system
        .set_property(&instance, "count", Value::string("many"))
        .unwrap_err();
    assert!(matches!(err, EngineError::TypeMismatch { ref property, .. } if property == "count"));
    assert_eq!(f.system.get_property(&instance, "count").unwrap(), int(1));

    f.system.set_property(&instance, "count", int(2)).unwrap();
    f.system.set_property(&instance, "count", Value::Null).unwrap();
    assert!(f.system.get_property(&instance, "count").unwrap().is_null());

    assert!(matches!(
        f.system.set_property(&instance, "missing", int(1)),
        Err(EngineError::PropertyNotFound { .. })
    ));
}

#[test]
fn test_statics_live_on_the_type() {
    let f = fixture();
    let id = f
        .system
        .declare(
            counter(0).field(int_field("total", 10).as_static()),
            f.app,
        )
        .unwrap();
    assert_eq!(f.system.get_static(id, "total").unwrap(), int(10));

    let a = f.system.create_instance(id, &[]).unwrap();
    let b = f.system.create_instance(id, &[]).unwrap();
    f.system.set_property(&a, "total", int(11)).unwrap();
    assert_eq!(f.system.get_property(&b, "total").unwrap(), int(11));

    f.system.set_static(id, "total", int(12)).unwrap();
    assert_eq!(f.system.get_property(&a, "total").unwrap(), int(12));
    assert!(f.system.set_static(id, "count", int(1)).is_err());
}

#[test]
fn test_initializers_run_base_first_in_body_order() {
    let f = fixture();
    f.system
        .declare(TypeDecl::class("demo.Base").dynamic().field(int_field("a", 3)), f.core)
        .unwrap();
    let id = f
        .system
        .declare(
            TypeDecl::class("demo.Derived")
                .dynamic()
                .extends("demo.Base")
                .field(FieldDecl::new("b", TypeRef::Int).init(Initializer::property("a")))
                .field(FieldDecl::new("c", TypeRef::Int).init(Initializer::expr("b * 2", |scope| {
                    let b = scope.get("b")?.as_int().ok_or("b is not an int")?;
                    Ok(Value::Int(b * 2))
                }))),
            f.app,
        )
        .unwrap();

    let instance = f.system.create_instance(id, &[]).unwrap();
    assert_eq!(f.system.get_property(&instance, "a").unwrap(), int(3));
    assert_eq!(f.system.get_property(&instance, "b").unwrap(), int(3));
    assert_eq!(f.system.get_property(&instance, "c").unwrap(), int(6));
}

#[test]
fn test_subtype_assignment_overrides_inherited_initializer() {
    let f = fixture();
    f.system
        .declare(TypeDecl::class("demo.Vehicle").dynamic().field(int_field("speed", 1)), f.core)
        .unwrap();
    let id = f
        .system
        .declare(
            TypeDecl::class("demo.Car")
                .dynamic()
                .extends("demo.Vehicle")
                .assign("speed", Initializer::literal(5i64)),
            f.app,
        )
        .unwrap();
    let instance = f.system.create_instance(id, &[]).unwrap();
    assert_eq!(f.system.get_property(&instance, "speed").unwrap(), int(5));
}

#[test]
fn test_failing_initializer_is_an_error() {
    let f = fixture();
    let id = f
        .system
        .declare(
            TypeDecl::class("demo.Broken").dynamic().field(
                FieldDecl::new("n", TypeRef::Int).init(Initializer::expr("fail()", |_| Err("boom".to_string()))),
            ),
            f.app,
        )
        .unwrap();
    let err = f.system.create_instance(id, &[]).unwrap_err();
    assert!(matches!(err, EngineError::Initializer { ref field, ref message, .. } if field == "n" && message == "boom"));
    assert_eq!(f.registry.count("demo.Broken"), 0);
}

#[test]
fn test_new_object_initializer() {
    let f = fixture();
    f.system
        .declare(TypeDecl::class("demo.Part").dynamic().field(int_field("size", 2)), f.core)
        .unwrap();
    let id = f
        .system
        .declare(
            TypeDecl::class("demo.Machine").dynamic().field(
                FieldDecl::new("part", TypeRef::named("demo.Part"))
                    .init(Initializer::new_object("demo.Part")),
            ),
            f.app,
        )
        .unwrap();
    let instance = f.system.create_instance(id, &[]).unwrap();
    let part = f.system.get_property(&instance, "part").unwrap();
    let part = part.as_object().unwrap();
    assert_eq!(part.type_name(), "demo.Part");
    assert_eq!(f.system.get_property(part, "size").unwrap(), int(2));
}

#[test]
fn test_dispose_unregisters() {
    let f = fixture();
    let id = f.system.declare(counter(1), f.app).unwrap();
    let instance = f.system.create_instance(id, &[]).unwrap();
    assert_eq!(f.registry.count("demo.Counter"), 1);

    assert!(f.system.dispose_instance(&instance));
    assert_eq!(f.registry.count("demo.Counter"), 0);
    assert!(!f.system.dispose_instance(&instance));
}

#[test]
fn test_instances_of_type_and_subtypes() {
    let f = fixture();
    let base = f
        .system
        .declare(TypeDecl::class("demo.Vehicle").dynamic(), f.core)
        .unwrap();
    let car = f
        .system
        .declare(TypeDecl::class("demo.Car").dynamic().extends("demo.Vehicle"), f.app)
        .unwrap();
    f.system.create_instance(base, &[]).unwrap();
    f.system.create_instance(car, &[]).unwrap();
    f.system.create_instance(car, &[]).unwrap();

    assert_eq!(f.system.instances_of_type_and_subtypes("demo.Vehicle").len(), 3);
    assert_eq!(f.system.instances_of_type_and_subtypes("demo.Car").len(), 2);
}
