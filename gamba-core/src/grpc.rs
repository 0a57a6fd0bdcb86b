//! # Invocation Dispatch
//!
//! The low-level building blocks for performing gRPC calls with dynamic
//! message types, plus [`invoke`], the single entry point that ties them to
//! an active connection.
//!
//! Unlike standard `tonic` clients which are strongly typed, the components
//! here work with [`prost_reflect::DynamicMessage`], encoding and decoding
//! against descriptors resolved at runtime.
pub mod client;
pub mod codec;

use client::{GrpcClient, GrpcRequestError};
use prost_reflect::{DynamicMessage, MethodDescriptor};
use tonic::transport::Channel;

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("not connected to a grpc server")]
    NotConnected,

    #[error("method '{0}' is a streaming method, only unary calls are supported")]
    UnsupportedStreaming(String),

    #[error(transparent)]
    Request(#[from] GrpcRequestError),

    #[error("remote call failed: '{0}'")]
    RemoteFailure(tonic::Status),
}

/// Dispatches a single unary call over `channel`.
///
/// Metadata entries with an empty key are dropped before attachment. The
/// remote status (code + message) is surfaced verbatim on failure; no retry
/// happens here.
pub async fn invoke(
    channel: Option<Channel>,
    method: &MethodDescriptor,
    request: DynamicMessage,
    metadata: Vec<(String, String)>,
) -> Result<DynamicMessage, InvokeError> {
    let channel = channel.ok_or(InvokeError::NotConnected)?;

    if method.is_client_streaming() || method.is_server_streaming() {
        return Err(InvokeError::UnsupportedStreaming(format!(
            "{}/{}",
            method.parent_service().full_name(),
            method.name()
        )));
    }

    let metadata = filter_metadata(metadata);

    let mut client = GrpcClient::new(channel);
    match client.unary(method.clone(), request, metadata).await? {
        Ok(response) => Ok(response),
        Err(status) => Err(InvokeError::RemoteFailure(status)),
    }
}

pub(crate) fn filter_metadata(metadata: Vec<(String, String)>) -> Vec<(String, String)> {
    metadata.into_iter().filter(|(key, _)| !key.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_drops_empty_keys_only() {
        let metadata = vec![
            (String::new(), "ignored".to_string()),
            ("auth".to_string(), "x".to_string()),
        ];

        let filtered = filter_metadata(metadata);

        assert_eq!(filtered, vec![("auth".to_string(), "x".to_string())]);
    }

    #[test]
    fn filtered_metadata_attaches_to_the_request() {
        let metadata = filter_metadata(vec![
            (String::new(), "ignored".to_string()),
            ("auth".to_string(), "x".to_string()),
        ]);

        let request = client::build_request((), metadata).unwrap();

        let attached = request.metadata();
        assert_eq!(attached.len(), 1);
        assert_eq!(attached.get("auth").unwrap().to_str().unwrap(), "x");
    }
}
