//! # Gamba Core
//!
//! `gamba-core` is the engine behind the Gamba CLI. It lets a caller invoke
//! arbitrary RPCs against a gRPC server without any precompiled client stubs:
//! the schema is discovered at runtime and requests are assembled from plain
//! text field values.
//!
//! ## Key Components
//!
//! * **[`registry::DescriptorRegistry`]:** a deduplicated, dependency-closed
//!   collection of file descriptors, built either from a server's reflection
//!   service ([`registry::reflection`]) or from `.proto` sources on disk
//!   ([`registry::files`]), and queried by fully qualified name.
//! * **[`value::MessageValue`] & [`value::FieldValue`]:** a schema-agnostic
//!   tree of textual field values, the input format for building requests.
//! * **[`builder::MessageBuilder`]:** converts a value tree into an encodable
//!   [`prost_reflect::DynamicMessage`], guided by a message descriptor.
//! * **[`connection::ConnectionManager`]:** owns the single active transport
//!   connection, its TLS policy and its observable connectivity state.
//! * **[`grpc::invoke`]:** dispatches a single unary call with metadata over
//!   the active connection and returns the decoded response.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost`, `prost-reflect`, and `tonic` to ensure that
//! consumers use compatible versions of these underlying dependencies.
pub mod builder;
pub mod connection;
pub mod grpc;
pub mod registry;
pub mod value;
pub mod workspace;

// Re-exports
pub use prost;
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
