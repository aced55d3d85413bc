use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use trellis_di::{
    Args, DiError, FromFn, Instance, Query, Registration, Registry, RegistryConfig, RequireError, Resolution,
};

#[derive(Debug, PartialEq)]
struct Port(u16);

struct Counter {
    id: usize,
}

fn counting(builds: &Arc<AtomicUsize>) -> FromFn<Counter> {
    let builds = builds.clone();
    FromFn::new(move |_, _| {
        Ok(Counter {
            id: builds.fetch_add(1, Ordering::SeqCst),
        })
    })
}

#[test]
fn get_registered_instance() {
    let registry = Registry::new();
    registry.add(Registration::instance(Port(8080))).unwrap();

    assert_eq!(*registry.get::<Port>().unwrap(), Port(8080));
    assert_eq!(registry.len(), 1);
}

#[test]
fn missing_type() {
    let registry = Registry::new();
    let result = registry.get::<Port>();
    assert!(matches!(result, Err(DiError::DependencyNotFound { .. })));
    assert!(registry.optional::<Port>().unwrap().is_none());
}

#[test]
fn named_lookup() {
    let registry = Registry::new();
    registry.add(Registration::instance(Port(80)).name("http")).unwrap();
    registry.add(Registration::instance(Port(443)).name("https")).unwrap();

    assert_eq!(*registry.named::<Port>("https").unwrap(), Port(443));
    assert!(registry.lookup("http").is_some());
    assert!(registry.lookup("ftp").is_none());
    assert!(matches!(registry.named::<Port>("ftp"), Err(DiError::UnknownName(name)) if name == "ftp"));
}

#[test]
fn duplicate_name() {
    let registry = Registry::new();
    registry.add(Registration::instance(Port(80)).name("port")).unwrap();

    let result = registry.add(Registration::instance(Port(81)).name("port"));
    assert!(matches!(result, Err(DiError::DuplicateName(name)) if name == "port"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn names_become_features() {
    let registry = Registry::new();
    registry.add(Registration::instance(Port(80)).name("http")).unwrap();
    registry.add(Registration::instance(Port(443)).name("https")).unwrap();

    let found = registry
        .query(Query::Features(vec!["https".into()]))
        .unwrap();
    let port = found.instance().unwrap().downcast::<Port>().unwrap();
    assert_eq!(*port, Port(443));
}

#[test]
fn several_matches_are_ambiguous() {
    let registry = Registry::new();
    registry.add(Registration::instance(Port(80))).unwrap();
    registry.add(Registration::instance(Port(443))).unwrap();

    match registry.get::<Port>() {
        Err(DiError::AmbiguousDependency { candidates, .. }) => assert_eq!(candidates.len(), 2),
        other => panic!("expected an ambiguity, got {other:?}"),
    }
}

#[test]
fn default_breaks_ties() {
    let registry = Registry::new();
    registry.add(Registration::instance(Port(80))).unwrap();
    registry.add(Registration::instance(Port(443)).default()).unwrap();

    assert_eq!(*registry.get::<Port>().unwrap(), Port(443));
}

#[test]
fn all_in_registration_order() {
    let registry = Registry::new();
    for port in [3, 1, 2] {
        registry.add(Registration::instance(Port(port))).unwrap();
    }

    let ports: Vec<u16> = registry.all::<Port>().unwrap().iter().map(|port| port.0).collect();
    assert_eq!(ports, vec![3, 1, 2]);
    assert!(registry.all::<String>().unwrap().is_empty());
}

#[test]
fn singletons_are_built_once() {
    let builds = Arc::new(AtomicUsize::new(0));
    let registry = Registry::new();
    let id = registry.add(Registration::producer(counting(&builds))).unwrap();

    let first = registry.get::<Counter>().unwrap();
    let second = registry.get::<Counter>().unwrap();

    assert!(registry.is_singleton(id));
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}

#[test]
fn transients_are_built_per_request() {
    let builds = Arc::new(AtomicUsize::new(0));
    let registry = Registry::new();
    let id = registry
        .add(Registration::producer(counting(&builds)).transient())
        .unwrap();

    let first = registry.get::<Counter>().unwrap();
    let second = registry.get::<Counter>().unwrap();

    assert!(!registry.is_singleton(id));
    assert_ne!(first.id, second.id);
    assert_eq!(builds.load(Ordering::SeqCst), 2);
}

#[test]
fn default_singleton_from_config() {
    let builds = Arc::new(AtomicUsize::new(0));
    let registry = Registry::with_config(RegistryConfig {
        default_singleton: false,
        ..RegistryConfig::default()
    });
    registry.add(Registration::producer(counting(&builds))).unwrap();
    registry.get::<Counter>().unwrap();
    registry.get::<Counter>().unwrap();

    assert_eq!(builds.load(Ordering::SeqCst), 2);
}

#[test]
fn arguments_bypass_the_cache() {
    let registry = Registry::new();
    registry
        .add(
            Registration::build_fn(|_, args| {
                let port = args.get::<u16>(0).map(|port| *port).unwrap_or(80);
                Ok(Port(port))
            })
            .name("port"),
        )
        .unwrap();

    let cached = registry.named::<Port>("port").unwrap();
    let custom = registry.call_as::<Port>("port", Args::new().push(9000u16)).unwrap();

    assert_eq!(*cached, Port(80));
    assert_eq!(*custom, Port(9000));
    assert!(Arc::ptr_eq(&cached, &registry.named::<Port>("port").unwrap()));
}

#[test]
fn accessor_calls_by_name() {
    let registry = Registry::new();
    registry
        .add(
            Registration::build_fn(|_, args| Ok(Port(*args.named::<u16>("port")?)))
                .name("port")
                .transient(),
        )
        .unwrap();

    let accessor = registry.accessor("port").unwrap();
    assert_eq!(accessor.name(), "port");
    let port = accessor.call_as::<Port>(Args::new().with("port", 22u16)).unwrap();
    assert_eq!(*port, Port(22));

    assert!(matches!(registry.accessor("nope"), Err(DiError::UnknownName(_))));
}

#[test]
fn extraction_mismatch() {
    let registry = Registry::new();
    registry.add(Registration::instance(Port(80)).name("port")).unwrap();

    let result = registry.named::<String>("port");
    assert!(matches!(
        result,
        Err(DiError::Require(RequireError::DowncastFailed { .. }))
    ));
}

#[test]
fn request_returns_a_resolution() {
    let registry = Registry::new();
    registry.add(Registration::instance_of(Instance::new(Port(1)))).unwrap();
    registry.add(Registration::instance(Port(2))).unwrap();

    let found = registry
        .query(trellis_di::Dependency::on::<Port>().multiple())
        .unwrap();
    match found {
        Resolution::Many(instances) => assert_eq!(instances.len(), 2),
        other => panic!("expected a list, got {other:?}"),
    }
}

#[test]
fn debug_lists_producers() {
    let registry = Registry::new();
    registry.add(Registration::instance(Port(80)).name("port")).unwrap();
    registry.get::<Port>().unwrap();

    let debug = format!("{registry:?}");
    assert!(debug.contains("\"port\": \"built\""), "{debug}");
}
