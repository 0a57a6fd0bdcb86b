//! # Reflection Discovery
//!
//! Builds a [`DescriptorRegistry`] by querying a live server's
//! `grpc.reflection.v1` service.
//!
//! ## The Resolution Process
//!
//! 1. **List**: Ask the server for every service it exposes.
//! 2. **Request Symbol**: For each service, request the file containing it.
//! 3. **Recursive Resolution**:
//!    - The server returns a `FileDescriptorProto`.
//!    - The client inspects the imports (dependencies) of that file.
//!    - It recursively requests any missing dependencies until the full
//!      schema tree is collected.
//! 4. **Build Registry**: Deduplicate with the shared dependency walk and
//!    aggregate into a registry.
//!
//! ## References
//!
//! * [gRPC Server Reflection Protocol](https://github.com/grpc/grpc/blob/master/doc/server-reflection.md)
use super::{DescriptorRegistry, walk_file_descriptors};
use crate::BoxError;
use futures_util::stream::once;
use http_body::Body as HttpBody;
use prost::Message;
use prost_types::FileDescriptorProto;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Streaming, client::GrpcService};
use tonic_reflection::pb::v1::{
    ServerReflectionRequest, ServerReflectionResponse,
    server_reflection_client::ServerReflectionClient, server_reflection_request::MessageRequest,
    server_reflection_response::MessageResponse,
};

#[derive(Debug, thiserror::Error)]
pub enum ReflectionError {
    #[error("no connection to a grpc server available")]
    NoConnection,

    #[error(
        "failed to start a stream request with the reflection server, reflection might not be supported: '{0}'"
    )]
    ServerStreamInitFailed(#[source] tonic::Status),

    #[error("the server stream returned an error status: '{0}'")]
    ServerStreamFailure(#[source] tonic::Status),

    #[error("reflection stream closed unexpectedly")]
    StreamClosed,

    #[error("internal error: failed to send request to stream")]
    SendFailed,

    #[error("server returned reflection error code {code}: {message}")]
    ServerError { code: i32, message: String },

    #[error("protocol error: received unexpected response type: {0}")]
    UnexpectedResponseType(String),

    #[error("failed to decode FileDescriptorProto: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("failed to build descriptor registry: {0}")]
    InvalidRegistry(#[from] prost_reflect::DescriptorError),
}

// The host defined in the reflection requests doesn't seem to be a mandatory
// field and there is no documentation about what it is about.
// So we won't enforce it from the user.
const EMPTY_HOST: &str = "";

/// Builds a registry covering every service the endpoint behind `channel`
/// exposes.
///
/// The reflection session lives only for the duration of this call; its
/// streams are torn down when the function returns, whatever the outcome.
pub async fn from_connection(channel: Option<Channel>) -> Result<DescriptorRegistry, ReflectionError> {
    let channel = channel.ok_or(ReflectionError::NoConnection)?;
    ReflectionSession::new(channel).resolve_registry().await
}

/// A session against a server's `grpc.reflection.v1` endpoint, generic over
/// the underlying transport service.
pub struct ReflectionSession<S = Channel> {
    client: ServerReflectionClient<S>,
}

impl<S> ReflectionSession<S>
where
    S: GrpcService<tonic::body::Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: HttpBody<Data = tonic::codegen::Bytes> + Send + 'static,
    <S::ResponseBody as HttpBody>::Error: Into<BoxError> + Send,
{
    pub fn new(channel: S) -> Self {
        let client = ServerReflectionClient::new(channel);
        Self { client }
    }

    /// Lists all services exposed by the server.
    pub async fn list_services(&mut self) -> Result<Vec<String>, ReflectionError> {
        let req = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(MessageRequest::ListServices(String::new())),
        };

        let mut response_stream = self
            .client
            .server_reflection_info(once(async { req }))
            .await
            .map_err(ReflectionError::ServerStreamInitFailed)?
            .into_inner();

        let response = response_stream
            .message()
            .await
            .map_err(ReflectionError::ServerStreamFailure)?
            .ok_or(ReflectionError::StreamClosed)?;

        match response.message_response {
            Some(MessageResponse::ListServicesResponse(resp)) => {
                let services = resp.service.into_iter().map(|s| s.name).collect();
                Ok(services)
            }
            Some(MessageResponse::ErrorResponse(e)) => Err(ReflectionError::ServerError {
                code: e.error_code,
                message: e.error_message,
            }),
            Some(other) => Err(ReflectionError::UnexpectedResponseType(format!(
                "{other:?}",
            ))),
            None => Err(ReflectionError::UnexpectedResponseType(
                "Empty Message".into(),
            )),
        }
    }

    /// Resolves the file descriptors of every listed service, including all
    /// transitive imports, and aggregates them into one registry.
    pub async fn resolve_registry(&mut self) -> Result<DescriptorRegistry, ReflectionError> {
        let services = self.list_services().await?;

        let mut collected = HashMap::new();
        for service in &services {
            self.collect_files_for_symbol(service, &mut collected)
                .await?;
        }

        let mut roots: Vec<String> = collected.keys().cloned().collect();
        roots.sort();

        let files = walk_file_descriptors(roots.iter().map(String::as_str), &collected);
        tracing::debug!(
            services = services.len(),
            files = files.len(),
            "resolved descriptors via server reflection"
        );

        Ok(DescriptorRegistry::from_file_descriptors(files)?)
    }

    /// Fetches the file containing `symbol` plus any of its dependencies not
    /// already present in `collected`.
    async fn collect_files_for_symbol(
        &mut self,
        symbol: &str,
        collected: &mut HashMap<String, FileDescriptorProto>,
    ) -> Result<(), ReflectionError> {
        // Initialize Stream
        let (tx, rx) = mpsc::channel(100);

        let mut response_stream = self
            .client
            .server_reflection_info(ReceiverStream::new(rx))
            .await
            .map_err(ReflectionError::ServerStreamInitFailed)?
            .into_inner();

        // Send Initial Request
        let req = ServerReflectionRequest {
            host: EMPTY_HOST.to_string(),
            message_request: Some(MessageRequest::FileContainingSymbol(symbol.to_string())),
        };

        tx.send(req)
            .await
            .map_err(|_| ReflectionError::SendFailed)?;

        // Fetch all transitive dependencies
        collect_descriptors(&mut response_stream, tx, collected).await
    }
}

async fn collect_descriptors(
    response_stream: &mut Streaming<ServerReflectionResponse>,
    request_channel: mpsc::Sender<ServerReflectionRequest>,
    collected_files: &mut HashMap<String, FileDescriptorProto>,
) -> Result<(), ReflectionError> {
    let mut inflight = 1;
    let mut requested = HashSet::new();

    while inflight > 0 {
        let response = response_stream
            .message()
            .await
            .map_err(ReflectionError::ServerStreamFailure)?
            .ok_or(ReflectionError::StreamClosed)?;

        inflight -= 1;

        match response.message_response {
            Some(MessageResponse::FileDescriptorResponse(res)) => {
                let sent_count = process_descriptor_batch(
                    res.file_descriptor_proto,
                    collected_files,
                    &mut requested,
                    &request_channel,
                )
                .await?;

                inflight += sent_count;
            }
            Some(MessageResponse::ErrorResponse(e)) => {
                return Err(ReflectionError::ServerError {
                    message: e.error_message,
                    code: e.error_code,
                });
            }
            Some(other) => {
                return Err(ReflectionError::UnexpectedResponseType(format!(
                    "{:?}",
                    other
                )));
            }
            None => {
                return Err(ReflectionError::UnexpectedResponseType(
                    "Empty Message".into(),
                ));
            }
        }
    }

    Ok(())
}

async fn process_descriptor_batch(
    raw_protos: Vec<Vec<u8>>,
    collected_files: &mut HashMap<String, FileDescriptorProto>,
    requested: &mut HashSet<String>,
    tx: &mpsc::Sender<ServerReflectionRequest>,
) -> Result<usize, ReflectionError> {
    let mut sent_count = 0;

    for raw in raw_protos {
        let fd = FileDescriptorProto::decode(raw.as_ref())?;

        if let Some(name) = &fd.name
            && !collected_files.contains_key(name)
        {
            sent_count += queue_dependencies(&fd, collected_files, requested, tx).await?;

            collected_files.insert(name.clone(), fd);
        }
    }

    Ok(sent_count)
}

async fn queue_dependencies(
    fd: &FileDescriptorProto,
    collected_files: &HashMap<String, FileDescriptorProto>,
    requested: &mut HashSet<String>,
    tx: &mpsc::Sender<ServerReflectionRequest>,
) -> Result<usize, ReflectionError> {
    let mut count = 0;

    for dep in &fd.dependency {
        if !collected_files.contains_key(dep) && requested.insert(dep.clone()) {
            let req = ServerReflectionRequest {
                host: EMPTY_HOST.to_string(),
                message_request: Some(MessageRequest::FileByFilename(dep.clone())),
            };

            tx.send(req)
                .await
                .map_err(|_| ReflectionError::SendFailed)?;
            count += 1;
        }
    }

    Ok(count)
}
