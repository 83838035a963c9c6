mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::MemoryBackend;
use serde_json::Value;
use wlaunch_core::clipboard::protocol::handle_json;
use wlaunch_core::clipboard::{
    ClientError, ClipContent, ClipboardClient, ClipboardService, ClipboardStore, Daemon,
};

fn service(backend: Arc<MemoryBackend>) -> ClipboardService {
    let store = Arc::new(ClipboardStore::open_memory(5).unwrap());
    ClipboardService::new(store, backend, vec!["password".to_string()])
}

fn call(service: &ClipboardService, request: &str) -> Value {
    serde_json::from_str(&handle_json(service, request)).unwrap()
}

#[test]
fn ping_reports_capacity_and_protocol_version() {
    let service = service(Arc::new(MemoryBackend::default()));
    let response = call(&service, r#"{"kind":"ping"}"#);
    assert_eq!(response["status"], "ok");
    assert_eq!(response["protocol_version"], 1);
    assert_eq!(response["response"]["kind"], "ping");
    assert_eq!(response["response"]["payload"]["capacity"], 5);
}

#[test]
fn query_ignores_unknown_fields_and_returns_newest_first() {
    let service = service(Arc::new(MemoryBackend::default()));
    service.store().append(ClipContent::text("alpha")).unwrap();
    service.store().append(ClipContent::text("beta")).unwrap();

    let response = call(
        &service,
        r#"{"kind":"query","payload":{"filter":"","limit":10,"extra":true}}"#,
    );
    assert_eq!(response["status"], "ok");
    let entries = response["response"]["payload"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["text"], "beta");
    assert_eq!(entries[0]["sequence_id"], 2);
}

#[test]
fn errors_carry_stable_codes() {
    let service = service(Arc::new(MemoryBackend::default()));

    let cases = [
        ("not json", "invalid_json"),
        (r#"{"payload":{}}"#, "invalid_request"),
        (r#"{"kind":"explode"}"#, "unsupported"),
        (r#"{"kind":"restore","payload":{"sequence_id":42}}"#, "not_found"),
        (r#"{"kind":"restore","payload":{"sequence_id":0}}"#, "invalid_request"),
    ];
    for (request, code) in cases {
        let response = call(&service, request);
        assert_eq!(response["status"], "err", "{request}");
        assert_eq!(response["error"]["code"], code, "{request}");
    }
}

#[test]
fn restore_writes_entry_back_to_the_clipboard() {
    let backend = Arc::new(MemoryBackend::default());
    let service = service(Arc::clone(&backend));
    service
        .store()
        .append(ClipContent::image("image/png", vec![1, 2, 3]))
        .unwrap();

    let response = call(&service, r#"{"kind":"restore","payload":{"sequence_id":1}}"#);
    assert_eq!(response["status"], "ok");
    assert_eq!(
        backend.writes.lock().as_slice(),
        &[ClipContent::image("image/png", vec![1, 2, 3])]
    );
}

#[test]
fn capture_skips_ignored_text() {
    let backend = Arc::new(MemoryBackend::default());
    let service = service(Arc::clone(&backend));

    backend.set(ClipContent::text("my password is hunter2"));
    assert_eq!(service.capture().unwrap(), None);
    backend.set(ClipContent::text("hello"));
    assert_eq!(service.capture().unwrap(), Some(1));
    assert_eq!(service.capture().unwrap(), None);
}

#[test]
fn client_reports_missing_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let client = ClipboardClient::new(dir.path().join("none.sock"), Duration::from_millis(100));
    match client.ping() {
        Err(ClientError::DaemonUnavailable(_)) => {}
        _ => panic!("expected daemon unavailable"),
    }
}

fn wait_for<T>(mut attempt: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = attempt() {
            return value;
        }
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn daemon_serves_clients_over_the_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("clipboard.sock");
    let backend = Arc::new(MemoryBackend::default());
    backend.set(ClipContent::text("seed"));

    let store = Arc::new(ClipboardStore::open(&dir.path().join("history.sqlite3"), 10).unwrap());
    let service = Arc::new(ClipboardService::new(store, backend.clone(), Vec::new()));
    let daemon = Daemon::new(
        service,
        backend.clone(),
        socket.clone(),
        Duration::from_millis(50),
    );
    let handle = std::thread::spawn(move || daemon.run());

    let client = ClipboardClient::new(&socket, Duration::from_millis(500));
    let ping = wait_for(|| client.ping().ok());
    assert_eq!(ping.capacity, 10);

    backend.set(ClipContent::text("fresh copy"));
    let entries = wait_for(|| {
        let entries = client.query("", None).ok()?;
        (entries.len() == 2).then_some(entries)
    });
    assert_eq!(entries[0].text.as_deref(), Some("fresh copy"));
    assert_eq!(entries[1].text.as_deref(), Some("seed"));

    client.restore(entries[1].sequence_id).unwrap();
    assert_eq!(
        backend.writes.lock().last(),
        Some(&ClipContent::text("seed"))
    );

    client.shutdown().unwrap();
    handle.join().unwrap().unwrap();
    assert!(!socket.exists());
}

#[test]
fn shutdown_wakes_an_idle_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("idle.sock");
    let backend = Arc::new(MemoryBackend::default());
    let store = Arc::new(ClipboardStore::open_memory(5).unwrap());
    let service = Arc::new(ClipboardService::new(store, backend.clone(), Vec::new()));
    let daemon = Daemon::new(
        Arc::clone(&service),
        backend,
        socket.clone(),
        Duration::from_millis(50),
    );
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = done_tx.send(daemon.run());
    });

    wait_for(|| socket.exists().then_some(()));
    std::thread::sleep(Duration::from_millis(100));
    service.request_shutdown();

    let outcome = done_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("daemon did not stop after shutdown was requested");
    outcome.unwrap();
    assert!(!socket.exists());
}
