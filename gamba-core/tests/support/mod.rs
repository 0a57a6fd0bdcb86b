//! Shared fixtures: an in-test schema compiler and a dynamic echo service
//! that speaks the crate's own codec, so no generated stubs are needed.
#![allow(dead_code)]

use gamba_core::grpc::codec::DynamicCodec;
use prost_reflect::{DescriptorPool, DynamicMessage, MethodDescriptor, Value};
use prost_types::FileDescriptorSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::task::{Context, Poll};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::codegen::{BoxFuture, Service};
use tonic::server::{NamedService, UnaryService};

pub const ECHO_PROTO: &str = r#"
syntax = "proto3";

package echotest;

message EchoRequest {
  string message = 1;
}

message EchoResponse {
  string message = 1;
  string auth = 2;
}

service EchoService {
  rpc Echo(EchoRequest) returns (EchoResponse);
  rpc Fail(EchoRequest) returns (EchoResponse);
  rpc StreamEcho(EchoRequest) returns (stream EchoResponse);
}
"#;

/// Compiles `(name, content)` fixtures in a temporary directory and returns
/// the resulting descriptor set.
pub fn compile(files: &[(&str, &str)]) -> FileDescriptorSet {
    let dir = tempfile::tempdir().expect("failed to create fixture dir");
    for (name, content) in files {
        std::fs::write(dir.path().join(name), content).expect("failed to write fixture");
    }
    let names: Vec<PathBuf> = files.iter().map(|(name, _)| PathBuf::from(name)).collect();
    protox::compile(&names, [dir.path()]).expect("failed to compile fixture")
}

pub fn echo_pool() -> DescriptorPool {
    let set = compile(&[("echo.proto", ECHO_PROTO)]);
    DescriptorPool::from_file_descriptor_set(set).expect("failed to build fixture pool")
}

pub fn echo_method(name: &str) -> MethodDescriptor {
    echo_pool()
        .get_service_by_name("echotest.EchoService")
        .expect("echo service in fixture pool")
        .methods()
        .find(|m| m.name() == name)
        .expect("echo method in fixture pool")
}

/// A hand-rolled dynamic echo service. `Echo` mirrors the request message
/// and the `auth` metadata entry back; `Fail` always returns
/// `FAILED_PRECONDITION`.
#[derive(Clone)]
pub struct EchoServer {
    pool: DescriptorPool,
}

impl EchoServer {
    pub fn new() -> Self {
        Self { pool: echo_pool() }
    }

    fn method(&self, name: &str) -> MethodDescriptor {
        self.pool
            .get_service_by_name("echotest.EchoService")
            .expect("echo service in fixture pool")
            .methods()
            .find(|m| m.name() == name)
            .expect("echo method in fixture pool")
    }
}

impl Service<http::Request<tonic::body::Body>> for EchoServer {
    type Response = http::Response<tonic::body::Body>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<tonic::body::Body>) -> Self::Future {
        match req.uri().path() {
            "/echotest.EchoService/Echo" => {
                let method = self.method("Echo");
                Box::pin(async move {
                    // Server side encodes outputs and decodes inputs.
                    let codec = DynamicCodec::new(method.output(), method.input());
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(EchoHandler { method }, req).await)
                })
            }
            "/echotest.EchoService/Fail" => {
                let method = self.method("Fail");
                Box::pin(async move {
                    let codec = DynamicCodec::new(method.output(), method.input());
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(FailHandler, req).await)
                })
            }
            _ => Box::pin(async move {
                let mut response = http::Response::new(tonic::body::Body::default());
                let headers = response.headers_mut();
                headers.insert(
                    "grpc-status",
                    (tonic::Code::Unimplemented as i32)
                        .to_string()
                        .parse()
                        .unwrap(),
                );
                headers.insert("content-type", "application/grpc".parse().unwrap());
                Ok(response)
            }),
        }
    }
}

impl NamedService for EchoServer {
    const NAME: &'static str = "echotest.EchoService";
}

struct EchoHandler {
    method: MethodDescriptor,
}

impl UnaryService<DynamicMessage> for EchoHandler {
    type Response = DynamicMessage;
    type Future = BoxFuture<tonic::Response<DynamicMessage>, tonic::Status>;

    fn call(&mut self, request: tonic::Request<DynamicMessage>) -> Self::Future {
        let output = self.method.output();
        Box::pin(async move {
            let auth = request
                .metadata()
                .get("auth")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let message = request
                .into_inner()
                .get_field_by_name("message")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();

            let mut response = DynamicMessage::new(output);
            response.set_field_by_name("message", Value::String(message));
            response.set_field_by_name("auth", Value::String(auth));
            Ok(tonic::Response::new(response))
        })
    }
}

struct FailHandler;

impl UnaryService<DynamicMessage> for FailHandler {
    type Response = DynamicMessage;
    type Future = BoxFuture<tonic::Response<DynamicMessage>, tonic::Status>;

    fn call(&mut self, _request: tonic::Request<DynamicMessage>) -> Self::Future {
        Box::pin(async move { Err(tonic::Status::failed_precondition("echo refused")) })
    }
}

/// Serves the echo service on an OS-assigned local port.
pub async fn serve_echo() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind echo listener");
    let addr = listener.local_addr().expect("listener address");
    let incoming = TcpListenerStream::new(listener);

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(EchoServer::new())
            .serve_with_incoming(incoming)
            .await
            .expect("echo server terminated");
    });

    addr
}
