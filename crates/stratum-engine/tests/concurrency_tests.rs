//! Readers racing a writer never see a half-applied layout

mod common;

use std::sync::atomic::{AtomicBool, Ordering};

use stratum_engine::{MemberKinds, TypeDecl, UpdateMode};

use common::{fixture, int, int_field};

/// Replace `demo.Point` `rounds` times, swapping its field order each time
fn swap_fields(system: &stratum_engine::TypeSystem, app: stratum_sdk::LayerId, rounds: usize) {
    for round in 0..rounds {
        let (first, second) = if round % 2 == 0 { ("y", "x") } else { ("x", "y") };
        let Some(current) = system.find_type("demo.Point") else {
            continue;
        };
        let staged = system.stage_type(point(first, second), app).unwrap();
        let result = system
            .update_type(current, staged, UpdateMode::Replace, false)
            .unwrap();
        assert!(result.is_applied());
    }
}

fn point(first: &str, second: &str) -> TypeDecl {
    TypeDecl::class("demo.Point")
        .dynamic()
        .field(int_field(first, 1))
        .field(int_field(second, 2))
}

#[test]
fn test_readers_see_consistent_slot_tables() {
    let f = fixture();
    let system = &f.system;
    let app = f.app;
    system.declare(point("x", "y"), app).unwrap();
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            swap_fields(system, app, 200);
            done.store(true, Ordering::SeqCst);
        });

        for _ in 0..3 {
            scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    let id = system.find_type("demo.Point").expect("type stays registered");
                    let table = system.get_property_slots(id);
                    let x = table.instance_slot("x").expect("x has a slot");
                    let y = table.instance_slot("y").expect("y has a slot");
                    assert_eq!(x.owner, y.owner);

                    let mut positions = [x.position.index().unwrap(), y.position.index().unwrap()];
                    positions.sort_unstable();
                    assert_eq!(positions, [0, 1]);

                    let owner = system.node(x.owner).unwrap();
                    let order: Vec<&str> = owner.fields().map(|field| field.name.as_str()).collect();
                    assert_eq!(order[x.position.index().unwrap()], "x");
                    assert_eq!(order[y.position.index().unwrap()], "y");

                    assert!(system
                        .resolve_member(id, "x", MemberKinds::FIELD, None)
                        .is_some());
                }
            });
        }
    });

    assert!(!f.system.is_stale());
    assert_eq!(f.system.type_count(), 201);
}

#[test]
fn test_property_access_races_layout_migration() {
    let f = fixture();
    let system = &f.system;
    let app = f.app;
    let id = system.declare(point("x", "y"), app).unwrap();
    let instance = system.create_instance(id, &[]).unwrap();
    let done = AtomicBool::new(false);

    let last = std::thread::scope(|scope| {
        scope.spawn(|| {
            swap_fields(system, app, 100);
            done.store(true, Ordering::SeqCst);
        });

        for _ in 0..2 {
            scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    assert_eq!(system.get_property(&instance, "y").unwrap(), int(2));
                }
            });
        }

        let writer = scope.spawn(|| {
            let mut n = 100;
            while !done.load(Ordering::SeqCst) {
                n += 1;
                system.set_property(&instance, "x", int(n)).unwrap();
                assert_eq!(system.get_property(&instance, "x").unwrap(), int(n));
            }
            n
        });
        writer.join().unwrap()
    });

    assert_eq!(instance.slot_count(), 2);
    assert_eq!(f.system.get_property(&instance, "y").unwrap(), int(2));
    if last > 100 {
        assert_eq!(f.system.get_property(&instance, "x").unwrap(), int(last));
    } else {
        assert_eq!(f.system.get_property(&instance, "x").unwrap(), int(1));
    }
    assert!(!f.system.is_stale());
}
