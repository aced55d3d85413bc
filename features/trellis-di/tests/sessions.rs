use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, OnceLock,
    },
    thread,
};

use trellis_di::{
    Dependency, DiError, DynError, FromFn, Injectable, Registration, Registry, RegistryConfig, Resolution, Stage,
};

struct A {
    b: Arc<B>,
}

struct B {
    a: OnceLock<Arc<A>>,
}

struct Looping;

fn store<T: Injectable + ?Sized>(cell: &OnceLock<Arc<T>>, value: Resolution) -> Result<(), DynError> {
    let value = value.instance().ok_or("expected one object")?.downcast::<T>()?;
    cell.set(value).map_err(|_| "injected twice")?;
    Ok(())
}

fn a_needs_b() -> Registration {
    Registration::producer(
        FromFn::new(|dependencies, _| Ok(A { b: dependencies.get("b")? })).dependency("b", Dependency::on::<B>()),
    )
    .name("a")
}

fn built(other: Result<impl Sized, DiError>) -> String {
    match other {
        Ok(_) => "built".to_string(),
        Err(error) => error.to_string(),
    }
}

fn constructor_cycle() -> Registry {
    let registry = Registry::new();
    registry.add(a_needs_b()).unwrap();
    registry
        .add(
            Registration::producer(
                FromFn::new(|_, _| Ok(B { a: OnceLock::new() })).dependency("a", Dependency::on::<A>()),
            )
            .name("b"),
        )
        .unwrap();
    registry
}

#[test]
fn constructor_cycle_is_reported_with_its_path() {
    let registry = constructor_cycle();

    match registry.get::<A>() {
        Err(DiError::CyclicDependency { cycle }) => assert_eq!(cycle, vec!["a", "b", "a"]),
        other => panic!("expected a cycle, got {}", built(other)),
    }
}

#[test]
fn constructor_cycle_from_the_other_end() {
    let registry = constructor_cycle();

    match registry.get::<B>() {
        Err(DiError::CyclicDependency { cycle }) => assert_eq!(cycle, vec!["b", "a", "b"]),
        other => panic!("expected a cycle, got {}", built(other)),
    }
}

#[test]
fn producer_depending_on_itself() {
    let registry = Registry::new();
    registry
        .add(
            Registration::producer(FromFn::new(|_, _| Ok(Looping)).dependency("me", Dependency::on::<Looping>()))
                .name("looping"),
        )
        .unwrap();

    match registry.get::<Looping>() {
        Err(DiError::CyclicDependency { cycle }) => assert_eq!(cycle, vec!["looping", "looping"]),
        other => panic!("expected a cycle, got {}", built(other)),
    }
}

fn setter_cycle(events: &Arc<Mutex<Vec<String>>>) -> Registry {
    let registry = Registry::new();
    let a_events = events.clone();
    let b_events = events.clone();
    registry
        .add(Registration::producer(
            FromFn::new(|dependencies, _| Ok(A { b: dependencies.get("b")? }))
                .dependency("b", Dependency::on::<B>())
                .post_initialize(move |a| {
                    let state = if a.b.a.get().is_some() { "a sees b injected" } else { "a sees b empty" };
                    a_events.lock().unwrap().push(state.to_string());
                    Ok(())
                }),
        ))
        .unwrap();
    registry
        .add(Registration::producer(
            FromFn::new(|_, _| Ok(B { a: OnceLock::new() }))
                .setter("a", Dependency::on::<A>(), |b, value| store(&b.a, value))
                .post_initialize(move |b| {
                    let state = if b.a.get().is_some() { "b injected" } else { "b empty" };
                    b_events.lock().unwrap().push(state.to_string());
                    Ok(())
                }),
        ))
        .unwrap();
    registry
}

#[test]
fn setter_dependency_breaks_the_cycle() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let registry = setter_cycle(&events);

    let a = registry.get::<A>().unwrap();
    let injected = a.b.a.get().expect("setter dependency injected");
    assert!(Arc::ptr_eq(injected, &a));
    assert!(Arc::ptr_eq(&a.b, &registry.get::<B>().unwrap()));
}

#[test]
fn post_initialize_runs_once_after_injection() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let registry = setter_cycle(&events);

    registry.get::<B>().unwrap();
    registry.get::<A>().unwrap();

    let mut events = events.lock().unwrap().clone();
    events.sort();
    assert_eq!(events, vec!["a sees b injected", "b injected"]);
}

#[test]
fn post_initialize_sees_injected_counterpart_from_either_end() {
    for start_with_a in [true, false] {
        let events = Arc::new(Mutex::new(Vec::new()));
        let registry = setter_cycle(&events);

        match start_with_a {
            true => drop(registry.get::<A>().unwrap()),
            false => drop(registry.get::<B>().unwrap()),
        }

        let mut events = events.lock().unwrap().clone();
        events.sort();
        assert_eq!(events, vec!["a sees b injected", "b injected"]);
    }
}

#[test]
fn build_failure() {
    let registry = Registry::new();
    registry
        .add(Registration::build_fn::<Looping>(|_, _| Err("disk full".into())).name("looping"))
        .unwrap();

    match registry.get::<Looping>() {
        Err(DiError::ConstructionFailure { producer, stage, source }) => {
            assert_eq!(producer, "looping");
            assert_eq!(stage, Stage::Build);
            assert_eq!(source.to_string(), "disk full");
        }
        other => panic!("expected a construction failure, got {}", built(other)),
    }
}

#[test]
fn injection_failure() {
    let registry = Registry::new();
    registry.add(Registration::instance(Looping)).unwrap();
    registry
        .add(Registration::producer(FromFn::new(|_, _| Ok(B { a: OnceLock::new() })).setter(
            "looping",
            Dependency::on::<Looping>(),
            |_, _| Err("read only".into()),
        )))
        .unwrap();

    match registry.get::<B>() {
        Err(DiError::ConstructionFailure { stage, .. }) => assert_eq!(
            stage,
            Stage::Inject {
                argument: "looping".to_string()
            }
        ),
        other => panic!("expected an injection failure, got {}", built(other)),
    }
}

struct Service {
    helper: OnceLock<Arc<Looping>>,
}

#[test]
fn failed_singletons_are_not_served_half_built() {
    let builds = Arc::new(AtomicUsize::new(0));
    let injections = Arc::new(AtomicUsize::new(0));
    let initialized = Arc::new(AtomicUsize::new(0));

    let registry = Registry::new();
    registry.add(Registration::instance(Looping)).unwrap();
    let (counted_builds, counted_injections, counted_initialized) =
        (builds.clone(), injections.clone(), initialized.clone());
    registry
        .add(
            Registration::producer(
                FromFn::new(move |_, _| {
                    counted_builds.fetch_add(1, Ordering::SeqCst);
                    Ok(Service { helper: OnceLock::new() })
                })
                .setter("helper", Dependency::on::<Looping>(), move |service, value| {
                    match counted_injections.fetch_add(1, Ordering::SeqCst) {
                        0 => Err("helper offline".into()),
                        _ => store(&service.helper, value),
                    }
                })
                .post_initialize(move |_| {
                    counted_initialized.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .singleton(true),
        )
        .unwrap();
    let looping = registry.get::<Looping>().unwrap();

    assert!(matches!(
        registry.get::<Service>(),
        Err(DiError::ConstructionFailure { stage: Stage::Inject { .. }, .. })
    ));

    let service = registry.get::<Service>().unwrap();
    assert!(service.helper.get().is_some());
    assert_eq!(builds.load(Ordering::SeqCst), 2);
    assert_eq!(initialized.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&service, &registry.get::<Service>().unwrap()));

    // singletons of earlier sessions stay cached
    assert!(Arc::ptr_eq(&looping, &registry.get::<Looping>().unwrap()));
}

struct Ping {
    pong: OnceLock<Arc<Pong>>,
}

struct Pong {
    ping: OnceLock<Arc<Ping>>,
}

#[test]
fn transient_setter_loops_are_bounded() {
    let registry = Registry::with_config(RegistryConfig {
        max_session_objects: 50,
        ..RegistryConfig::default()
    });
    registry
        .add(
            Registration::producer(
                FromFn::new(|_, _| Ok(Ping { pong: OnceLock::new() }))
                    .setter("pong", Dependency::on::<Pong>(), |ping, value| store(&ping.pong, value)),
            )
            .singleton(false),
        )
        .unwrap();
    registry
        .add(
            Registration::producer(
                FromFn::new(|_, _| Ok(Pong { ping: OnceLock::new() }))
                    .setter("ping", Dependency::on::<Ping>(), |pong, value| store(&pong.ping, value)),
            )
            .singleton(false),
        )
        .unwrap();

    assert!(matches!(
        registry.get::<Ping>(),
        Err(DiError::SessionTooLarge { limit: 50 })
    ));
}

#[test]
fn post_initialize_failure() {
    let registry = Registry::new();
    registry
        .add(Registration::producer(
            FromFn::new(|_, _| Ok(Looping)).post_initialize(|_| Err("not ready".into())),
        ))
        .unwrap();

    match registry.get::<Looping>() {
        Err(DiError::ConstructionFailure { stage, .. }) => assert_eq!(stage, Stage::PostInitialize),
        other => panic!("expected a post initialize failure, got {}", built(other)),
    }
}

#[test]
fn engine_errors_from_producers_pass_through() {
    let registry = Registry::new();
    registry
        .add(Registration::build_fn::<Looping>(|_, _| {
            Err(DiError::UnknownName("elsewhere".to_string()).into())
        }))
        .unwrap();

    assert!(matches!(registry.get::<Looping>(), Err(DiError::UnknownName(name)) if name == "elsewhere"));
}

#[test]
fn missing_dependency_aborts_the_request() {
    let registry = Registry::new();
    registry.add(a_needs_b()).unwrap();

    assert!(matches!(registry.get::<A>(), Err(DiError::DependencyNotFound { .. })));

    // the registry is usable again afterwards
    registry.add(Registration::instance(Looping)).unwrap();
    assert!(registry.get::<Looping>().is_ok());
}

#[test]
fn optional_dependency_left_out() {
    let registry = Registry::new();
    registry
        .add(Registration::producer(
            FromFn::new(|dependencies, _| Ok(dependencies.optional::<Looping>("looping")?.is_some()))
                .dependency("looping", Dependency::on::<Looping>().optional()),
        ))
        .unwrap();

    assert!(!*registry.get::<bool>().unwrap());
}

#[test]
fn requests_from_inside_a_session_are_refused() {
    let registry = Registry::new();
    registry.add(Registration::instance(Looping)).unwrap();
    let inner = registry.clone();
    registry
        .add(Registration::build_fn(move |_, _| {
            inner.get::<Looping>()?;
            Ok(A {
                b: Arc::new(B { a: OnceLock::new() }),
            })
        }))
        .unwrap();

    assert!(matches!(registry.get::<A>(), Err(DiError::ReentrantRequest)));
}

#[test]
fn registering_from_inside_a_session_is_refused() {
    let registry = Registry::new();
    let inner = registry.clone();
    registry
        .add(Registration::build_fn(move |_, _| {
            inner.add(Registration::instance(Looping))?;
            Ok(0u8)
        }))
        .unwrap();

    assert!(matches!(registry.get::<u8>(), Err(DiError::ReentrantRequest)));
    assert_eq!(registry.len(), 1);
}

struct Level1(#[allow(dead_code)] Arc<Level2>);
struct Level2(#[allow(dead_code)] Arc<Level3>);
struct Level3;

#[test]
fn nesting_is_bounded() {
    let registry = Registry::with_config(RegistryConfig {
        max_resolution_depth: 2,
        ..RegistryConfig::default()
    });
    registry
        .add(Registration::producer(
            FromFn::new(|dependencies, _| Ok(Level1(dependencies.get("next")?)))
                .dependency("next", Dependency::on::<Level2>()),
        ))
        .unwrap();
    registry
        .add(Registration::producer(
            FromFn::new(|dependencies, _| Ok(Level2(dependencies.get("next")?)))
                .dependency("next", Dependency::on::<Level3>()),
        ))
        .unwrap();
    registry.add(Registration::build_fn(|_, _| Ok(Level3))).unwrap();

    assert!(matches!(
        registry.get::<Level1>(),
        Err(DiError::ResolutionTooDeep { depth: 2 })
    ));
    assert!(registry.get::<Level2>().is_ok());
}

#[test]
fn concurrent_requests_share_singletons() {
    let registry = Registry::new();
    registry
        .add(Registration::build_fn(|_, _| Ok(Mutex::new(0u32))))
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || registry.get::<Mutex<u32>>().unwrap())
        })
        .collect();
    let built: Vec<Arc<Mutex<u32>>> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

    assert!(built.iter().all(|value| Arc::ptr_eq(value, &built[0])));
}
