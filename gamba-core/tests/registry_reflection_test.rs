use gamba_core::registry::reflection::{ReflectionError, ReflectionSession, from_connection};
use tonic::Code;
use tonic_reflection::server::v1::{ServerReflection, ServerReflectionServer};

mod support;

const TYPES_PROTO: &str = r#"
syntax = "proto3";

package hello;

message HelloRequest {
  string name = 1;
}

message HelloReply {
  string message = 1;
}
"#;

const GREETER_PROTO: &str = r#"
syntax = "proto3";

package hello;

import "types.proto";

service Greeter {
  rpc SayHello(HelloRequest) returns (HelloReply);
}
"#;

fn reflection_server() -> ServerReflectionServer<impl ServerReflection> {
    let set = support::compile(&[("greeter.proto", GREETER_PROTO), ("types.proto", TYPES_PROTO)]);

    tonic_reflection::server::Builder::configure()
        .register_file_descriptor_set(set)
        .build_v1()
        .expect("failed to set up reflection service")
}

#[tokio::test]
async fn resolves_a_registry_for_every_exposed_service() {
    let mut session = ReflectionSession::new(reflection_server());

    let registry = session.resolve_registry().await.unwrap();

    assert!(registry.services().contains(&"hello.Greeter".to_string()));

    let method = registry.method("hello.Greeter", "SayHello").unwrap();
    assert_eq!(method.input().full_name(), "hello.HelloRequest");
    assert_eq!(method.output().full_name(), "hello.HelloReply");
    assert!(!method.is_client_streaming());
    assert!(!method.is_server_streaming());

    // The service file and its import each appear exactly once.
    let names = registry.file_names();
    assert_eq!(names.iter().filter(|n| *n == "greeter.proto").count(), 1);
    assert_eq!(names.iter().filter(|n| *n == "types.proto").count(), 1);
}

#[tokio::test]
async fn listing_services_includes_the_fixture_service() {
    let mut session = ReflectionSession::new(reflection_server());

    let services = session.list_services().await.unwrap();

    assert!(services.contains(&"hello.Greeter".to_string()));
}

#[tokio::test]
async fn absent_connection_is_rejected() {
    assert!(matches!(
        from_connection(None).await,
        Err(ReflectionError::NoConnection)
    ));
}

#[tokio::test]
async fn server_without_reflection_fails_stream_init() {
    // The echo server hosts no reflection endpoint, so the very first
    // stream request comes back UNIMPLEMENTED.
    let mut session = ReflectionSession::new(support::EchoServer::new());

    match session.resolve_registry().await {
        Err(ReflectionError::ServerStreamInitFailed(status)) => {
            assert_eq!(status.code(), Code::Unimplemented);
        }
        other => panic!("expected stream init failure, got: {:?}", other.map(|_| ())),
    }
}
