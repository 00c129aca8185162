use super::*;
use std::sync::{Arc, Mutex};

fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> impl Fn() -> futures::future::Ready<Result<(), HookError>> + Send + Sync + 'static {
    let log = Arc::clone(log);
    move || {
        log.lock().unwrap().push(label);
        futures::future::ready(Ok(()))
    }
}

#[tokio::test]
async fn test_handlers_run_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut events = Events::new();
    events
        .on(Hook::BeforeStart, recorder(&log, "first"))
        .on(Hook::BeforeStart, recorder(&log, "second"))
        .on(Hook::BeforeStop, recorder(&log, "stop"));

    assert_eq!(events.handler_count(Hook::BeforeStart), 2);
    events.emit(Hook::BeforeStart).await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);

    events.emit(Hook::BeforeStop).await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "stop"]);
}

#[tokio::test]
async fn test_emit_stops_at_first_error() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut events = Events::new();
    events
        .on(Hook::BeforeStart, || async { Err::<(), HookError>("boom".into()) })
        .on(Hook::BeforeStart, recorder(&log, "after"));

    let err = events.emit(Hook::BeforeStart).await.unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_emit_without_handlers() {
    let events = Events::new();
    assert_eq!(events.handler_count(Hook::BeforeStop), 0);
    assert!(events.emit(Hook::BeforeStop).await.is_ok());
}
