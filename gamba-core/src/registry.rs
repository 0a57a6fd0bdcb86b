//! # Descriptor Registry
//!
//! This module handles the construction and querying of Protobuf schema
//! registries. A [`DescriptorRegistry`] acts as a database of schema
//! definitions, letting the application resolve service, method and message
//! names into `prost-reflect` descriptors at runtime.
//!
//! Registries are built through one of two discovery paths:
//!
//! * [`reflection`] - query a live server's `grpc.reflection.v1` service.
//! * [`files`] - compile a set of `.proto` sources from disk.
//!
//! Both paths feed their file descriptors through the same deduplicating
//! dependency walk before aggregation, so lookups behave identically no
//! matter where the schema came from. Once built, a registry is immutable
//! and can be shared freely across concurrent lookups.
use prost_reflect::{DescriptorPool, MessageDescriptor, MethodDescriptor, ServiceDescriptor};
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

pub mod files;
pub mod reflection;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("service '{0}' not found")]
    ServiceNotFound(String),
    #[error("method '{method}' not found on service '{service}'")]
    MethodNotFound { service: String, method: String },
}

/// A registry that holds resolved Protobuf definitions and allows looking up
/// services, methods and messages by fully qualified name.
#[derive(Debug, Clone)]
pub struct DescriptorRegistry {
    pool: DescriptorPool,
}

impl DescriptorRegistry {
    /// Builds the registry from an already deduplicated file descriptor list.
    ///
    /// The pool resolves the whole batch at once, so the order of `files`
    /// does not matter as long as every transitive dependency is present.
    pub(crate) fn from_file_descriptors(
        files: Vec<FileDescriptorProto>,
    ) -> Result<Self, prost_reflect::DescriptorError> {
        let pool = DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: files })?;
        Ok(Self { pool })
    }

    /// Lists the fully qualified names of all services in the registry.
    pub fn services(&self) -> Vec<String> {
        self.pool
            .services()
            .map(|s| s.full_name().to_string())
            .collect()
    }

    /// Looks up a service by fully qualified name (e.g. `my.package.Service`).
    pub fn service(&self, name: &str) -> Result<ServiceDescriptor, LookupError> {
        self.pool
            .get_service_by_name(name)
            .ok_or_else(|| LookupError::ServiceNotFound(name.to_string()))
    }

    /// Resolves a `(service, method)` pair into a [`MethodDescriptor`].
    pub fn method(&self, service: &str, method: &str) -> Result<MethodDescriptor, LookupError> {
        self.service(service)?
            .methods()
            .find(|m| m.name() == method)
            .ok_or_else(|| LookupError::MethodNotFound {
                service: service.to_string(),
                method: method.to_string(),
            })
    }

    /// Looks up a message type by fully qualified name.
    pub fn message(&self, name: &str) -> Option<MessageDescriptor> {
        self.pool.get_message_by_name(name)
    }

    /// Names of the files aggregated into this registry.
    pub fn file_names(&self) -> Vec<String> {
        self.pool.files().map(|f| f.name().to_string()).collect()
    }

    /// The underlying descriptor pool.
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }
}

/// Depth-first walk over a file dependency graph, emitting each file exactly
/// once. Dependencies are only walked the first time a file is seen, which
/// keeps diamonds and cycles from duplicating output or looping.
pub(crate) fn walk_file_descriptors<'a>(
    roots: impl IntoIterator<Item = &'a str>,
    by_name: &HashMap<String, FileDescriptorProto>,
) -> Vec<FileDescriptorProto> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for root in roots {
        walk_one(root, by_name, &mut seen, &mut out);
    }
    out
}

fn walk_one(
    name: &str,
    by_name: &HashMap<String, FileDescriptorProto>,
    seen: &mut HashSet<String>,
    out: &mut Vec<FileDescriptorProto>,
) {
    if !seen.insert(name.to_string()) {
        return;
    }
    let Some(fd) = by_name.get(name) else {
        return;
    };
    out.push(fd.clone());
    for dep in &fd.dependency {
        walk_one(dep, by_name, seen, out);
    }
}
