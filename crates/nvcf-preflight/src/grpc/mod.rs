//! gRPC inference over server reflection.
//!
//! The function container's service is not known at build time. The
//! [`GrpcInvoker`] lists services through reflection, resolves the method's
//! request and response messages from the returned descriptor, fills the
//! request from flat JSON and calls it with a schema-driven codec.

pub mod codec;
pub mod error;
pub mod invoke;
pub mod message;
pub mod reflection;
pub mod schema;

pub use codec::DynamicCodec;
pub use error::{FieldError, GrpcError};
pub use invoke::{Discovery, GrpcInvocation, GrpcInvoker};
pub use message::{coerce, DynamicMessage, FieldValue};
pub use reflection::ReflectionClient;
pub use schema::{resolve_service_name, FieldKind, FieldSchema, MessageSchema, ServiceSchema};
