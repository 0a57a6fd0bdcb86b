//! # Workspace Configuration
//!
//! The persisted shape of a user session: target address, TLS policy and the
//! schema file lists. The [`ConnectionManager`](crate::connection) reads a
//! [`WorkspaceConfig`] at connect time and asks a [`WorkspaceStore`] to save
//! it after a successful connect; a store failure is never allowed to affect
//! connection or registry state.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// A connectable session: where to dial and which schema sources to use.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct WorkspaceConfig {
    /// Target address (e.g. `localhost:50051` or `https://api.example.com`).
    pub address: String,
    #[serde(default)]
    pub tls: TlsOptions,
    /// Schema files to parse instead of using server reflection.
    #[serde(default)]
    pub proto_files: Vec<PathBuf>,
    /// Import directories used to resolve the schema files.
    #[serde(default)]
    pub import_paths: Vec<PathBuf>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TlsOptions {
    #[serde(default)]
    pub mode: TlsMode,
    /// Root CA certificate (PEM) used instead of the platform trust roots.
    pub root_ca: Option<PathBuf>,
    /// Client certificate (PEM) for mutual TLS.
    pub client_cert: Option<PathBuf>,
    /// Client private key (PEM) for mutual TLS.
    pub client_key: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// No transport security.
    #[default]
    Plaintext,
    /// TLS without certificate pinning.
    Insecure,
    /// TLS verified against the configured (or platform) roots.
    Verified,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("could not determine a config directory for this platform")]
    NoConfigDir,
    #[error("failed to access the workspace store: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode the workspace config: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persistence seam for the last-used workspace session.
///
/// Both operations are best-effort from the caller's point of view: a failed
/// `get` means "no previous session", a failed `put` is logged and dropped.
pub trait WorkspaceStore: Send + Sync {
    fn get(&self) -> Result<Option<WorkspaceConfig>, StoreError>;
    fn put(&self, config: &WorkspaceConfig) -> Result<(), StoreError>;
}

/// Stores the workspace as pretty-printed JSON in a single file.
pub struct JsonFileStore {
    config_path: PathBuf,
}

impl JsonFileStore {
    /// Opens the store at the platform's config directory for this app.
    pub fn new() -> Result<Self, StoreError> {
        let proj_dirs = directories::ProjectDirs::from("rs", "gamba", "gamba")
            .ok_or(StoreError::NoConfigDir)?;
        let config_dir = proj_dirs.config_dir();
        fs::create_dir_all(config_dir)?;

        Ok(Self {
            config_path: config_dir.join("workspace.json"),
        })
    }

    /// Opens the store at an explicit file path.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }
}

impl WorkspaceStore for JsonFileStore {
    fn get(&self) -> Result<Option<WorkspaceConfig>, StoreError> {
        if !self.config_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.config_path)?;
        // A corrupt file reads as an absent session rather than an error.
        Ok(serde_json::from_str(&content).ok())
    }

    fn put(&self, config: &WorkspaceConfig) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_path, content)?;
        Ok(())
    }
}
