use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, OnceLock,
};

use trellis_di::{
    Args, CurriedHandle, Dependency, DiError, FromFn, Registration, Registry, Resolution,
};

struct Pool {
    size: usize,
}

struct Connection {
    pool: Arc<Pool>,
    port: u16,
    ready: OnceLock<()>,
    audit: OnceLock<Arc<Audit>>,
}

struct Audit;

struct Client {
    connections: CurriedHandle,
}

fn connection() -> FromFn<Connection> {
    FromFn::new(|dependencies, args| {
        Ok(Connection {
            pool: dependencies.get("pool")?,
            port: args.get::<u16>(0).map(|port| *port).unwrap_or(5432),
            ready: OnceLock::new(),
            audit: OnceLock::new(),
        })
    })
    .dependency("pool", Dependency::on::<Pool>())
}

fn registry() -> Registry {
    let registry = Registry::new();
    registry.add(Registration::instance(Pool { size: 4 })).unwrap();
    registry
}

#[test]
fn every_build_is_fresh() {
    let registry = registry();
    registry.add(Registration::producer(connection()).transient()).unwrap();

    let handle = registry.handle::<Connection>().unwrap();
    let first = handle.build_as::<Connection>(Args::new()).unwrap();
    let second = handle.build_as::<Connection>(Args::new().push(6543u16)).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.port, 5432);
    assert_eq!(second.port, 6543);
}

#[test]
fn dependencies_are_shared_between_builds() {
    let registry = registry();
    registry.add(Registration::producer(connection()).transient()).unwrap();

    let handle = registry.handle::<Connection>().unwrap();
    let first = handle.build_as::<Connection>(Args::new()).unwrap();
    let second = handle.build_as::<Connection>(Args::new()).unwrap();

    assert!(handle.dependencies().contains("pool"));
    assert!(Arc::ptr_eq(&first.pool, &second.pool));
    assert_eq!(first.pool.size, 4);
}

#[test]
fn singletons_cannot_be_handles() {
    let registry = registry();
    registry.add(Registration::producer(connection()).name("connection")).unwrap();

    match registry.handle::<Connection>() {
        Err(DiError::IllegalFactoryHandle { producer }) => assert_eq!(producer, "connection"),
        other => panic!("expected an illegal handle, got {other:?}"),
    }
}

#[test]
fn handle_builds_are_completed() {
    let registry = registry();
    registry.add(Registration::instance(Audit)).unwrap();
    registry
        .add(
            Registration::producer(
                connection()
                    .setter("audit", Dependency::on::<Audit>(), |connection, value| {
                        let audit = value.instance().ok_or("no audit")?.downcast::<Audit>()?;
                        let _ = connection.audit.set(audit);
                        Ok(())
                    })
                    .post_initialize(|connection| {
                        connection.audit.get().ok_or("audit missing")?;
                        let _ = connection.ready.set(());
                        Ok(())
                    }),
            )
            .transient(),
        )
        .unwrap();

    let connection = registry
        .handle::<Connection>()
        .unwrap()
        .build_as::<Connection>(Args::new())
        .unwrap();
    assert!(connection.audit.get().is_some());
    assert!(connection.ready.get().is_some());
}

#[test]
fn handle_dependency_of_a_producer() {
    let registry = registry();
    registry.add(Registration::producer(connection()).transient()).unwrap();
    registry
        .add(Registration::producer(
            FromFn::new(|dependencies, _| {
                Ok(Client {
                    connections: dependencies.handle("connections")?,
                })
            })
            .dependency("connections", Dependency::on::<Connection>().handle()),
        ))
        .unwrap();

    let client = registry.get::<Client>().unwrap();
    let connection = client.connections.build_as::<Connection>(Args::new().push(1u16)).unwrap();
    assert_eq!(connection.port, 1);
}

#[test]
fn handles_used_while_building() {
    let posted = Arc::new(AtomicUsize::new(0));
    let counter = posted.clone();
    let registry = registry();
    registry
        .add(
            Registration::producer(connection().post_initialize(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .transient(),
        )
        .unwrap();
    registry
        .add(Registration::producer(
            FromFn::new(|dependencies, _| {
                let handle = dependencies.handle("connections")?;
                let warm = handle.build_as::<Connection>(Args::new())?;
                Ok(vec![warm])
            })
            .dependency("connections", Dependency::on::<Connection>().handle()),
        ))
        .unwrap();

    let warm = registry.get::<Vec<Arc<Connection>>>().unwrap();
    assert_eq!(warm.len(), 1);
    assert_eq!(posted.load(Ordering::SeqCst), 1);
}

#[test]
fn multiple_handles() {
    let registry = registry();
    registry
        .add(Registration::producer(connection()).feature("fresh").transient())
        .unwrap();
    registry
        .add(Registration::build_fn(|_, _| Ok(Audit)).feature("fresh").transient())
        .unwrap();

    // the pool is a singleton but lacks the feature
    let found = registry
        .query(Dependency::feature("fresh").multiple().handle())
        .unwrap();
    match found {
        Resolution::Handles(handles) => assert_eq!(handles.len(), 2),
        other => panic!("expected handles, got {other:?}"),
    }
}

#[test]
fn handle_as_function() {
    let registry = registry();
    registry.add(Registration::producer(connection()).transient()).unwrap();

    let build = registry.handle::<Connection>().unwrap().as_fn();
    let connection = build(Args::new().push(80u16)).unwrap();
    assert_eq!(connection.downcast::<Connection>().unwrap().port, 80);
}

#[test]
fn handle_outliving_its_registry() {
    let handle = {
        let registry = registry();
        registry.add(Registration::producer(connection()).transient()).unwrap();
        registry.handle::<Connection>().unwrap()
    };

    assert!(matches!(handle.build(Args::new()), Err(DiError::RegistryDropped)));
}
