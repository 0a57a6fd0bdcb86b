//! # Connection Manager
//!
//! Owns the single active transport connection and its observable
//! connectivity state.
//!
//! A [`ConnectionManager`] holds at most one [`Channel`] at a time.
//! Reconnecting to the address it is already connected to is a no-op;
//! connecting anywhere else strictly closes the old channel and cancels its
//! state observer before the new dial begins, so no two observers ever run
//! for the same manager. Other components borrow the channel for the
//! duration of one call and never retain it.
//!
//! Connectivity transitions are derived from the dial/teardown lifecycle and
//! published through a `watch` channel: `Connecting` around the dial,
//! `Ready` or `TransientFailure` with its outcome, and `Shutdown` from the
//! observer when the connection is torn down or superseded.
use crate::workspace::{TlsMode, TlsOptions, WorkspaceConfig, WorkspaceStore};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};

/// Connectivity of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "IDLE",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Ready => "READY",
            ConnectionState::TransientFailure => "TRANSIENT_FAILURE",
            ConnectionState::Shutdown => "SHUTDOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("no address to connect")]
    MissingAddress,

    #[error("invalid address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        source: tonic::transport::Error,
    },

    #[error("invalid TLS configuration: {0}")]
    InvalidTls(#[source] tonic::transport::Error),

    #[error("failed to read credential file '{path}': {source}")]
    CredentialRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to connect to '{addr}': {source}")]
    DialFailure {
        addr: String,
        source: tonic::transport::Error,
    },
}

pub struct ConnectionManager {
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    active: Option<ActiveConnection>,
    store: Option<Arc<dyn WorkspaceStore>>,
}

struct ActiveConnection {
    address: String,
    channel: Channel,
    observer: Observer,
}

struct Observer {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A manager that persists the session through `store` after every
    /// successful connect.
    pub fn with_store(store: Arc<dyn WorkspaceStore>) -> Self {
        Self::build(Some(store))
    }

    fn build(store: Option<Arc<dyn WorkspaceStore>>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        Self {
            state_tx: Arc::new(state_tx),
            state_rx,
            active: None,
            store,
        }
    }

    /// The current connectivity state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A receiver observing every subsequent state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// The active channel, if any. Clones are cheap handles onto the same
    /// connection; callers should use one for a single call and drop it.
    pub fn channel(&self) -> Option<Channel> {
        self.active.as_ref().map(|active| active.channel.clone())
    }

    /// The address of the active connection, if any.
    pub fn address(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.address.as_str())
    }

    /// Dials `config.address` with the configured TLS policy.
    ///
    /// Calling this while already connected to the same address is a no-op
    /// success; no second dial happens and the running observer is kept.
    /// Connecting to a different address closes the existing connection
    /// first. On a dial failure the manager is left with no active
    /// connection and the error is returned; a later retry with different
    /// parameters is always valid.
    pub async fn connect(&mut self, config: &WorkspaceConfig) -> Result<(), ConnectError> {
        if config.address.is_empty() {
            return Err(ConnectError::MissingAddress);
        }

        if let Some(active) = &self.active
            && active.address == config.address
        {
            return Ok(());
        }

        self.teardown().await;

        let endpoint = build_endpoint(&config.address, &config.tls)?;

        self.state_tx.send_replace(ConnectionState::Connecting);
        let channel = match endpoint.connect().await {
            Ok(channel) => channel,
            Err(source) => {
                self.state_tx.send_replace(ConnectionState::TransientFailure);
                return Err(ConnectError::DialFailure {
                    addr: config.address.clone(),
                    source,
                });
            }
        };
        self.state_tx.send_replace(ConnectionState::Ready);
        tracing::debug!(address = %config.address, "connection established");

        let observer = spawn_observer(Arc::clone(&self.state_tx), self.state_rx.clone());
        self.active = Some(ActiveConnection {
            address: config.address.clone(),
            channel,
            observer,
        });

        // Persisting the session must never block or fail the connect path.
        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            let session = config.clone();
            tokio::task::spawn_blocking(move || {
                if let Err(err) = store.put(&session) {
                    tracing::warn!(error = %err, "failed to persist workspace session");
                }
            });
        }

        Ok(())
    }

    /// Closes the active connection, cancels its observer and waits for the
    /// observer to publish `Shutdown`.
    pub async fn disconnect(&mut self) {
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        drop(active.channel);
        let Observer { cancel, handle } = active.observer;
        let _ = cancel.send(());
        let _ = handle.await;
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// One observer task runs per active connection. It logs every state
/// transition and exits when the state reaches `Shutdown` or when its
/// cancellation fires, publishing `Shutdown` itself in the latter case.
/// Dropping the manager drops the cancel sender, which also wakes the task.
fn spawn_observer(
    state_tx: Arc<watch::Sender<ConnectionState>>,
    mut state_rx: watch::Receiver<ConnectionState>,
) -> Observer {
    let (cancel, mut cancel_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    state_tx.send_replace(ConnectionState::Shutdown);
                    tracing::debug!(state = %ConnectionState::Shutdown, "connection state changed");
                    break;
                }
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *state_rx.borrow_and_update();
                    tracing::debug!(state = %state, "connection state changed");
                    if state == ConnectionState::Shutdown {
                        break;
                    }
                }
            }
        }
    });
    Observer { cancel, handle }
}

fn build_endpoint(address: &str, tls: &TlsOptions) -> Result<Endpoint, ConnectError> {
    let uri = if address.contains("://") {
        address.to_string()
    } else if tls.mode == TlsMode::Plaintext {
        format!("http://{address}")
    } else {
        format!("https://{address}")
    };

    let mut endpoint =
        Endpoint::from_shared(uri).map_err(|source| ConnectError::InvalidAddress {
            addr: address.to_string(),
            source,
        })?;

    if tls.mode != TlsMode::Plaintext {
        let mut tls_config = ClientTlsConfig::new();

        match &tls.root_ca {
            Some(path) => {
                tls_config = tls_config.ca_certificate(Certificate::from_pem(read_pem(path)?));
            }
            // No pinned CA: trust the platform roots.
            None => tls_config = tls_config.with_native_roots(),
        }

        if let (Some(cert), Some(key)) = (&tls.client_cert, &tls.client_key) {
            tls_config = tls_config.identity(Identity::from_pem(read_pem(cert)?, read_pem(key)?));
        }

        endpoint = endpoint
            .tls_config(tls_config)
            .map_err(ConnectError::InvalidTls)?;
    }

    Ok(endpoint)
}

fn read_pem(path: &Path) -> Result<String, ConnectError> {
    std::fs::read_to_string(path).map_err(|source| ConnectError::CredentialRead {
        path: path.to_path_buf(),
        source,
    })
}
