//! # CLI
//!
//! This module defines the command-line interface of `gamba` using `clap`.
//!
//! It is responsible for parsing user input and performing validation (e.g.,
//! ensuring headers are `key:value` and endpoints are `Service/Method`).
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gamba", version, about = "Dynamic gRPC client")]
pub struct Cli {
    /// The server address to connect to (e.g. localhost:50051)
    #[arg(long, global = true)]
    pub address: Option<String>,

    /// Connect without transport security
    #[arg(long, global = true)]
    pub plaintext: bool,

    /// Connect over TLS without pinning a CA certificate
    #[arg(long, global = true, conflicts_with = "plaintext")]
    pub insecure: bool,

    /// Root CA certificate (PEM) to verify the server against
    #[arg(long, global = true)]
    pub root_ca: Option<PathBuf>,

    /// Client certificate (PEM) for mutual TLS
    #[arg(long, global = true, requires = "client_key")]
    pub client_cert: Option<PathBuf>,

    /// Client private key (PEM) for mutual TLS
    #[arg(long, global = true, requires = "client_cert")]
    pub client_key: Option<PathBuf>,

    /// Schema file to parse instead of using server reflection (repeatable)
    #[arg(long = "proto", global = true)]
    pub proto_files: Vec<PathBuf>,

    /// Import directory for resolving schema files (repeatable)
    #[arg(long = "import", global = true)]
    pub import_paths: Vec<PathBuf>,

    /// Do not restore or persist the workspace session
    #[arg(long, global = true)]
    pub no_workspace: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the services exposed by the server or the schema files
    List,

    /// Describe a service (list its methods)
    Describe {
        /// Fully qualified service name (e.g. my.package.Service)
        service: String,
    },

    /// Perform a unary gRPC call
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// gamba --address localhost:50051 --plaintext call my.pkg.Service/Method --body '{"key": "value"}'
    /// ```
    Call {
        /// Endpoint (package.Service/Method)
        #[arg(value_parser = parse_endpoint)]
        endpoint: (String, String),

        /// JSON body for the request message
        #[arg(long, value_parser = parse_body, default_value = "{}")]
        body: serde_json::Value,

        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
}

fn parse_endpoint(value: &str) -> Result<(String, String), String> {
    let (service, method) = value.split_once('/').ok_or_else(|| {
        format!("Invalid endpoint format: '{value}'. Expected 'package.Service/Method'",)
    })?;

    if service.trim().is_empty() || method.trim().is_empty() {
        return Err("Service and Method names cannot be empty".to_string());
    }

    Ok((service.to_string(), method.to_string()))
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| "Format must be 'key:value'".to_string())
}

fn parse_body(value: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(value).map_err(|e| format!("Invalid JSON: {e}"))
}
