//! # Gamba CLI Entry Point
//!
//! The main executable for the Gamba tool. This file drives the application
//! lifecycle:
//!
//! 1. **Initialization**: Parses command-line arguments using [`cli::Cli`]
//!    and restores the last workspace session from the store.
//! 2. **Discovery**: Builds a descriptor registry, from `.proto` files when
//!    any were given and from server reflection otherwise.
//! 3. **Execution**: Lists or describes services, or builds and dispatches a
//!    unary call through `gamba_core`.
//! 4. **Presentation**: Prints resulting data as pretty JSON on standard
//!    output.
mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use gamba_core::builder::build_message;
use gamba_core::connection::ConnectionManager;
use gamba_core::registry::{DescriptorRegistry, files, reflection};
use gamba_core::value::MessageValue;
use gamba_core::workspace::{JsonFileStore, TlsMode, TlsOptions, WorkspaceConfig, WorkspaceStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gamba=warn")),
        )
        .init();

    let args = Cli::parse();

    let store = open_store(&args);
    let restored = store.as_ref().and_then(|store| match store.get() {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "failed to restore the workspace session");
            None
        }
    });
    let config = merge_config(&args, restored);

    let mut manager = match store {
        Some(store) => ConnectionManager::with_store(store),
        None => ConnectionManager::new(),
    };

    match &args.command {
        Commands::List => {
            let registry = load_registry(&config, &mut manager).await?;
            for service in registry.services() {
                println!("{service}");
            }
        }
        Commands::Describe { service } => {
            let registry = load_registry(&config, &mut manager).await?;
            let descriptor = registry.service(service)?;
            for method in descriptor.methods() {
                let client_stream = if method.is_client_streaming() { "stream " } else { "" };
                let server_stream = if method.is_server_streaming() { "stream " } else { "" };
                println!(
                    "rpc {}({}{}) returns ({}{});",
                    method.name(),
                    client_stream,
                    method.input().full_name(),
                    server_stream,
                    method.output().full_name(),
                );
            }
        }
        Commands::Call {
            endpoint: (service, method_name),
            body,
            headers,
        } => {
            manager.connect(&config).await?;
            let registry = load_registry(&config, &mut manager).await?;
            let method = registry.method(service, method_name)?;

            let tree = MessageValue::from_json(body)?;
            let request = build_message(&method.input(), &tree)?;

            let response =
                gamba_core::grpc::invoke(manager.channel(), &method, request, headers.clone())
                    .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    manager.disconnect().await;
    Ok(())
}

/// Builds the registry from the configured schema files, or from server
/// reflection when none were given (connecting first if necessary).
async fn load_registry(
    config: &WorkspaceConfig,
    manager: &mut ConnectionManager,
) -> anyhow::Result<DescriptorRegistry> {
    if config.proto_files.is_empty() {
        if manager.channel().is_none() {
            manager.connect(config).await?;
        }
        reflection::from_connection(manager.channel())
            .await
            .context("failed to resolve the schema via server reflection")
    } else {
        files::from_files(&config.import_paths, &config.proto_files)
            .context("failed to process the schema files")
    }
}

fn open_store(args: &Cli) -> Option<Arc<dyn WorkspaceStore>> {
    if args.no_workspace {
        return None;
    }
    match JsonFileStore::new() {
        Ok(store) => {
            let store: Arc<dyn WorkspaceStore> = Arc::new(store);
            Some(store)
        }
        Err(err) => {
            tracing::warn!(error = %err, "workspace store unavailable");
            None
        }
    }
}

/// Explicit flags win over the restored session, field group by field group.
fn merge_config(args: &Cli, restored: Option<WorkspaceConfig>) -> WorkspaceConfig {
    let restored = restored.unwrap_or_default();

    let address = args.address.clone().unwrap_or(restored.address);

    let tls = if args.plaintext {
        TlsOptions::default()
    } else if args.root_ca.is_some() || args.client_cert.is_some() {
        TlsOptions {
            mode: if args.insecure { TlsMode::Insecure } else { TlsMode::Verified },
            root_ca: args.root_ca.clone(),
            client_cert: args.client_cert.clone(),
            client_key: args.client_key.clone(),
        }
    } else if args.insecure {
        TlsOptions {
            mode: TlsMode::Insecure,
            ..Default::default()
        }
    } else {
        restored.tls
    };

    let proto_files = if args.proto_files.is_empty() {
        restored.proto_files
    } else {
        args.proto_files.clone()
    };
    let import_paths = if args.import_paths.is_empty() {
        restored.import_paths
    } else {
        args.import_paths.clone()
    };

    WorkspaceConfig {
        address,
        tls,
        proto_files,
        import_paths,
    }
}
