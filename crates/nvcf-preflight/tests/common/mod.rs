//! Shared fixtures: a fake engine plus real servers standing in for the
//! container's published port.

#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use nvcf_container::FakeRuntime;
use nvcf_preflight::PreflightSettings;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    MethodDescriptorProto, ServiceDescriptorProto,
};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::codegen::{empty_body, http, Body, BoxFuture, Service, StdError};
use tonic::server::NamedService;

/// Bind an ephemeral loopback port.
pub async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    (listener, port)
}

/// Settings that publish on `port` with fast polling.
pub fn settings(port: u16) -> PreflightSettings {
    PreflightSettings {
        default_host_port: port,
        wait_iterations: 10,
        min_poll_interval_ms: 10,
        settle_delay_ms: 0,
        http_probe_timeout_secs: 1,
        http_connect_timeout_secs: 1,
        grpc_connect_timeout_secs: 2,
        grpc_call_timeout_secs: 5,
        ..PreflightSettings::default()
    }
}

/// Fake engine shared with the smoke test.
pub fn runtime() -> Arc<FakeRuntime> {
    Arc::new(FakeRuntime::new())
}

/// Serve an axum router on `listener`.
pub fn serve_http(listener: TcpListener, app: axum::Router) {
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("http server");
    });
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SayRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int32, tag = "2")]
    pub count: i32,
    #[prost(bool, tag = "3")]
    pub loud: bool,
    #[prost(double, tag = "4")]
    pub temperature: f64,
    #[prost(int64, tag = "5")]
    pub offset: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SayReply {
    #[prost(string, tag = "1")]
    pub message: String,
    #[prost(int64, tag = "2")]
    pub length: i64,
    #[prost(float, tag = "3")]
    pub score: f32,
}

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

/// Descriptor for `package echo; service Echo { rpc Say(SayRequest) returns (SayReply); }`.
pub fn echo_descriptor() -> FileDescriptorSet {
    let file = FileDescriptorProto {
        name: Some("echo.proto".to_string()),
        package: Some("echo".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![
            DescriptorProto {
                name: Some("SayRequest".to_string()),
                field: vec![
                    field("name", 1, Type::String),
                    field("count", 2, Type::Int32),
                    field("loud", 3, Type::Bool),
                    field("temperature", 4, Type::Double),
                    field("offset", 5, Type::Int64),
                ],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("SayReply".to_string()),
                field: vec![
                    field("message", 1, Type::String),
                    field("length", 2, Type::Int64),
                    field("score", 3, Type::Float),
                ],
                ..Default::default()
            },
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("Echo".to_string()),
            method: vec![MethodDescriptorProto {
                name: Some("Say".to_string()),
                input_type: Some(".echo.SayRequest".to_string()),
                output_type: Some(".echo.SayReply".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    };
    FileDescriptorSet { file: vec![file] }
}

/// `echo.Echo` server; counts calls to `Say`.
#[derive(Debug, Clone, Default)]
pub struct EchoServer {
    pub calls: Arc<AtomicUsize>,
}

impl EchoServer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NamedService for EchoServer {
    const NAME: &'static str = "echo.Echo";
}

struct Say;

impl tonic::server::UnaryService<SayRequest> for Say {
    type Response = SayReply;
    type Future = BoxFuture<tonic::Response<SayReply>, tonic::Status>;

    fn call(&mut self, request: tonic::Request<SayRequest>) -> Self::Future {
        Box::pin(async move {
            let request = request.into_inner();
            if request.name.is_empty() {
                return Err(tonic::Status::invalid_argument("name is required"));
            }
            let greeting = format!("hello {}", request.name);
            let message = if request.loud {
                greeting.to_uppercase()
            } else {
                greeting
            };
            Ok(tonic::Response::new(SayReply {
                length: i64::try_from(message.len()).expect("length") * i64::from(request.count.max(1))
                    + request.offset,
                message,
                score: (request.temperature * 2.0) as f32,
            }))
        })
    }
}

impl<B> Service<http::Request<B>> for EchoServer
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        match req.uri().path() {
            "/echo.Echo/Say" => {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    let codec = tonic::codec::ProstCodec::<SayReply, SayRequest>::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(Say, req).await)
                })
            }
            _ => Box::pin(async move {
                Ok(http::Response::builder()
                    .status(200)
                    .header("grpc-status", (tonic::Code::Unimplemented as i32).to_string())
                    .header(http::header::CONTENT_TYPE, "application/grpc")
                    .body(empty_body())
                    .expect("response"))
            }),
        }
    }
}

/// Serve health, reflection and `echo.Echo` on `listener`.
///
/// Health starts as `status` for the default service.
pub async fn serve_grpc(
    listener: TcpListener,
    echo: EchoServer,
    status: tonic_health::ServingStatus,
) -> tonic_health::server::HealthReporter {
    let (mut reporter, health) = tonic_health::server::health_reporter();
    reporter.set_service_status("", status).await;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_file_descriptor_set(echo_descriptor())
        .build_v1alpha()
        .expect("reflection service");

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(health)
            .add_service(reflection)
            .add_service(echo)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .expect("grpc server");
    });

    reporter
}
