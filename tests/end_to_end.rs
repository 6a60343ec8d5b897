use std::{
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Barrier, Mutex,
    },
    thread,
    time::Duration,
};

use pome::{Injector, InjectorBuilder, ResolveErrorKind, TypeKey};

struct Logger;
struct Database;
#[derive(Debug)]
struct Service;

fn app_builder(events: &Arc<Mutex<Vec<&'static str>>>) -> InjectorBuilder {
    InjectorBuilder::new()
        .bind([], {
            let events = events.clone();
            move |_: &Injector| {
                events.lock().unwrap().push("create logger");
                Ok(Logger)
            }
        })
        .bind([TypeKey::of::<Logger>()], {
            let events = events.clone();
            move |injector: &Injector| {
                let _logger = injector.get::<Logger>()?;
                events.lock().unwrap().push("create database");
                Ok(Database)
            }
        })
        .bind([TypeKey::of::<Database>(), TypeKey::of::<Logger>()], {
            let events = events.clone();
            move |injector: &Injector| {
                let _database = injector.get::<Database>()?;
                let _logger = injector.get::<Logger>()?;
                events.lock().unwrap().push("create service");
                Ok(Service)
            }
        })
        .add_finalizer({
            let events = events.clone();
            move |_: Arc<Logger>| events.lock().unwrap().push("destroy logger")
        })
        .add_finalizer({
            let events = events.clone();
            move |_: Arc<Database>| events.lock().unwrap().push("destroy database")
        })
        .add_finalizer({
            let events = events.clone();
            move |_: Arc<Service>| events.lock().unwrap().push("destroy service")
        })
}

#[test]
fn test_construction_and_destruction_order() {
    let events = Arc::new(Mutex::new(Vec::new()));

    let injector = app_builder(&events).build().unwrap();
    injector.get::<Service>().unwrap();
    injector.get::<Service>().unwrap();
    injector.teardown();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "create logger",
            "create database",
            "create service",
            "destroy service",
            "destroy database",
            "destroy logger",
        ]
    );
}

#[test]
fn test_get_after_teardown_is_reported() {
    let events = Arc::new(Mutex::new(Vec::new()));

    let injector = app_builder(&events).build().unwrap();
    injector.teardown();

    assert!(matches!(
        injector.get::<Service>().unwrap_err(),
        ResolveErrorKind::UseAfterTeardown { .. }
    ));
}

#[test]
fn test_shared_base_with_divergent_extras() {
    struct RequestHandler;
    struct JobRunner;

    let events = Arc::new(Mutex::new(Vec::new()));
    let base = app_builder(&events).freeze().unwrap();

    let web = InjectorBuilder::extend(base.clone())
        .bind([TypeKey::of::<Service>()], |injector: &Injector| {
            let _service = injector.get::<Service>()?;
            Ok(RequestHandler)
        })
        .build()
        .unwrap();
    let worker = InjectorBuilder::extend(base)
        .bind([TypeKey::of::<Service>()], |injector: &Injector| {
            let _service = injector.get::<Service>()?;
            Ok(JobRunner)
        })
        .build()
        .unwrap();

    web.get::<RequestHandler>().unwrap();
    worker.get::<JobRunner>().unwrap();

    // Shared graph, but each injector materialized its own Service.
    let web_service = web.get::<Service>().unwrap();
    let worker_service = worker.get::<Service>().unwrap();
    assert!(!Arc::ptr_eq(&web_service, &worker_service));

    assert!(web.get::<JobRunner>().is_err());
    assert!(worker.get::<RequestHandler>().is_err());
}

#[test]
fn test_concurrent_first_requests_are_single_flight() {
    struct Slow;

    const THREADS: usize = 8;

    let creator_call_count = Arc::new(AtomicU8::new(0));

    let injector = InjectorBuilder::new()
        .bind([], {
            let creator_call_count = creator_call_count.clone();
            move |_: &Injector| {
                creator_call_count.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                Ok(Slow)
            }
        })
        .build()
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let injector = injector.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                injector.get::<Slow>().unwrap()
            })
        })
        .collect();

    let objects: Vec<Arc<Slow>> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();

    assert_eq!(creator_call_count.load(Ordering::SeqCst), 1);
    for object in &objects[1..] {
        assert!(Arc::ptr_eq(&objects[0], object));
    }
}

#[test]
fn test_multibindings_across_shared_base() {
    trait Plugin: Send + Sync {}

    struct Metrics;
    struct Tracing;

    impl Plugin for Metrics {}
    impl Plugin for Tracing {}

    let base = InjectorBuilder::new()
        .bind_multi([], |_: &Injector| Ok(Box::new(Metrics) as Box<dyn Plugin>))
        .freeze()
        .unwrap();

    let injector = InjectorBuilder::extend(base)
        .bind_multi([], |_: &Injector| Ok(Box::new(Tracing) as Box<dyn Plugin>))
        .build()
        .unwrap();

    let plugins = injector.get_all::<Box<dyn Plugin>>().unwrap();
    assert_eq!(plugins.len(), 2);
}
