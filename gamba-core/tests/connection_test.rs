use gamba_core::connection::{ConnectError, ConnectionManager, ConnectionState};
use gamba_core::workspace::{JsonFileStore, WorkspaceConfig, WorkspaceStore};
use std::sync::Arc;
use std::time::Duration;

mod support;

fn config(address: impl Into<String>) -> WorkspaceConfig {
    WorkspaceConfig {
        address: address.into(),
        ..Default::default()
    }
}

/// A local port nothing is listening on anymore.
async fn dead_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

#[tokio::test]
async fn starts_idle_with_no_connection() {
    let manager = ConnectionManager::new();

    assert_eq!(manager.state(), ConnectionState::Idle);
    assert!(manager.channel().is_none());
    assert!(manager.address().is_none());
}

#[tokio::test]
async fn empty_address_is_rejected() {
    let mut manager = ConnectionManager::new();

    assert!(matches!(
        manager.connect(&config("")).await,
        Err(ConnectError::MissingAddress)
    ));
}

#[tokio::test]
async fn connect_reaches_ready() {
    let addr = support::serve_echo().await;
    let mut manager = ConnectionManager::new();

    manager.connect(&config(addr.to_string())).await.unwrap();

    assert_eq!(manager.state(), ConnectionState::Ready);
    assert!(manager.channel().is_some());
    assert_eq!(manager.address(), Some(addr.to_string().as_str()));
}

#[tokio::test]
async fn reconnecting_to_the_same_address_is_a_no_op() {
    let addr = support::serve_echo().await;
    let mut manager = ConnectionManager::new();
    manager.connect(&config(addr.to_string())).await.unwrap();

    let rx = manager.watch_state();
    manager.connect(&config(addr.to_string())).await.unwrap();

    // No second dial: no state transition was published.
    assert!(!rx.has_changed().unwrap());
    assert_eq!(manager.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn dial_failure_leaves_no_active_connection() {
    let addr = dead_address().await;
    let mut manager = ConnectionManager::new();

    let err = manager.connect(&config(addr)).await.unwrap_err();

    assert!(matches!(err, ConnectError::DialFailure { .. }));
    assert_eq!(manager.state(), ConnectionState::TransientFailure);
    assert!(manager.channel().is_none());

    // A retry with working parameters is still valid.
    let live = support::serve_echo().await;
    manager.connect(&config(live.to_string())).await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Ready);
}

#[tokio::test]
async fn disconnect_publishes_shutdown() {
    let addr = support::serve_echo().await;
    let mut manager = ConnectionManager::new();
    manager.connect(&config(addr.to_string())).await.unwrap();

    manager.disconnect().await;

    assert_eq!(manager.state(), ConnectionState::Shutdown);
    assert!(manager.channel().is_none());
}

#[tokio::test]
async fn connecting_elsewhere_supersedes_the_old_connection() {
    let first = support::serve_echo().await;
    let second = support::serve_echo().await;
    let mut manager = ConnectionManager::new();

    manager.connect(&config(first.to_string())).await.unwrap();
    manager.connect(&config(second.to_string())).await.unwrap();

    assert_eq!(manager.state(), ConnectionState::Ready);
    assert_eq!(manager.address(), Some(second.to_string().as_str()));
}

#[tokio::test]
async fn successful_connect_persists_the_session() {
    let addr = support::serve_echo().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workspace.json");

    let store: Arc<dyn WorkspaceStore> = Arc::new(JsonFileStore::at_path(&path));
    let mut manager = ConnectionManager::with_store(store);
    manager.connect(&config(addr.to_string())).await.unwrap();

    // The persist runs off the connect path; poll briefly for it.
    let reader = JsonFileStore::at_path(&path);
    let mut persisted = None;
    for _ in 0..100 {
        if let Some(found) = reader.get().unwrap() {
            persisted = Some(found);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(persisted.unwrap().address, addr.to_string());
}
