//! Method schemas built from reflected file descriptors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FileDescriptorProto};

use super::error::GrpcError;

/// Protobuf field kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `double`
    Double,
    /// `float`
    Float,
    /// `int64`
    Int64,
    /// `uint64`
    Uint64,
    /// `int32`
    Int32,
    /// `fixed64`
    Fixed64,
    /// `fixed32`
    Fixed32,
    /// `bool`
    Bool,
    /// `string`
    String,
    /// `group`
    Group,
    /// Nested message.
    Message,
    /// `bytes`
    Bytes,
    /// `uint32`
    Uint32,
    /// Enum.
    Enum,
    /// `sfixed32`
    Sfixed32,
    /// `sfixed64`
    Sfixed64,
    /// `sint32`
    Sint32,
    /// `sint64`
    Sint64,
}

impl FieldKind {
    /// Proto keyword for the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Float => "float",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Int32 => "int32",
            Self::Fixed64 => "fixed64",
            Self::Fixed32 => "fixed32",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Group => "group",
            Self::Message => "message",
            Self::Bytes => "bytes",
            Self::Uint32 => "uint32",
            Self::Enum => "enum",
            Self::Sfixed32 => "sfixed32",
            Self::Sfixed64 => "sfixed64",
            Self::Sint32 => "sint32",
            Self::Sint64 => "sint64",
        }
    }

    /// Kinds that flat JSON input can populate.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        matches!(
            self,
            Self::String | Self::Int32 | Self::Int64 | Self::Bool | Self::Float | Self::Double
        )
    }
}

impl From<Type> for FieldKind {
    fn from(ty: Type) -> Self {
        match ty {
            Type::Double => Self::Double,
            Type::Float => Self::Float,
            Type::Int64 => Self::Int64,
            Type::Uint64 => Self::Uint64,
            Type::Int32 => Self::Int32,
            Type::Fixed64 => Self::Fixed64,
            Type::Fixed32 => Self::Fixed32,
            Type::Bool => Self::Bool,
            Type::String => Self::String,
            Type::Group => Self::Group,
            Type::Message => Self::Message,
            Type::Bytes => Self::Bytes,
            Type::Uint32 => Self::Uint32,
            Type::Enum => Self::Enum,
            Type::Sfixed32 => Self::Sfixed32,
            Type::Sfixed64 => Self::Sfixed64,
            Type::Sint32 => Self::Sint32,
            Type::Sint64 => Self::Sint64,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One field of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    /// Field name as declared.
    pub name: String,
    /// Field number.
    pub number: u32,
    /// Scalar or composite kind.
    pub kind: FieldKind,
    /// Declared `repeated`.
    pub repeated: bool,
}

impl FieldSchema {
    /// Kind as written in a `.proto` file, including `repeated`.
    #[must_use]
    pub fn describe(&self) -> String {
        if self.repeated {
            format!("repeated {}", self.kind)
        } else {
            self.kind.to_string()
        }
    }
}

/// Flattened message descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSchema {
    /// Fully-qualified name without the leading dot.
    pub full_name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldSchema>,
}

impl MessageSchema {
    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field by number.
    #[must_use]
    pub fn field_by_number(&self, number: u32) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.number == number)
    }

    fn from_proto(full_name: String, proto: &DescriptorProto) -> Self {
        let fields = proto
            .field
            .iter()
            .filter_map(|field| {
                let number = u32::try_from(field.number()).ok()?;
                Some(FieldSchema {
                    name: field.name().to_string(),
                    number,
                    kind: field.r#type().into(),
                    repeated: field.label() == Label::Repeated,
                })
            })
            .collect();

        Self { full_name, fields }
    }
}

/// A resolved unary method: the call path plus request and response shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSchema {
    /// Fully-qualified service name, e.g. `echo.Echo`.
    pub full_service_name: String,
    /// Method name.
    pub method_name: String,
    /// Request message.
    pub input: Arc<MessageSchema>,
    /// Response message.
    pub output: Arc<MessageSchema>,
}

impl ServiceSchema {
    /// Resolve `method_name` on `full_service_name` inside one descriptor file.
    ///
    /// Only message types declared in the same file (including nested types)
    /// are resolvable.
    ///
    /// # Errors
    ///
    /// Returns an error naming the missing service, method or message type,
    /// or [`GrpcError::StreamingMethod`] for non-unary methods.
    pub fn resolve(
        file: &FileDescriptorProto,
        full_service_name: &str,
        method_name: &str,
    ) -> Result<Self, GrpcError> {
        let package = file.package();
        let short_name = if package.is_empty() {
            full_service_name
        } else {
            full_service_name
                .strip_prefix(package)
                .and_then(|rest| rest.strip_prefix('.'))
                .unwrap_or(full_service_name)
        };

        let service = file
            .service
            .iter()
            .find(|s| s.name() == short_name)
            .ok_or_else(|| GrpcError::ServiceNotInDescriptor {
                service: full_service_name.to_string(),
                file: file.name().to_string(),
            })?;

        let method = service
            .method
            .iter()
            .find(|m| m.name() == method_name)
            .ok_or_else(|| GrpcError::MethodNotFound {
                method: method_name.to_string(),
                service: full_service_name.to_string(),
            })?;

        if method.client_streaming() || method.server_streaming() {
            return Err(GrpcError::StreamingMethod {
                method: method_name.to_string(),
            });
        }

        let messages = index_messages(file);
        let lookup = |type_name: &str| {
            let key = type_name.trim_start_matches('.');
            messages
                .get(key)
                .cloned()
                .ok_or_else(|| GrpcError::MessageTypeNotFound {
                    type_name: key.to_string(),
                })
        };

        Ok(Self {
            full_service_name: full_service_name.to_string(),
            method_name: method_name.to_string(),
            input: lookup(method.input_type())?,
            output: lookup(method.output_type())?,
        })
    }

    /// HTTP/2 path for the call, `/<service>/<method>`.
    #[must_use]
    pub fn method_path(&self) -> String {
        format!("/{}/{}", self.full_service_name, self.method_name)
    }
}

/// All messages in a file keyed by fully-qualified name.
fn index_messages(file: &FileDescriptorProto) -> HashMap<String, Arc<MessageSchema>> {
    fn visit(
        prefix: &str,
        messages: &[DescriptorProto],
        out: &mut HashMap<String, Arc<MessageSchema>>,
    ) {
        for message in messages {
            let full_name = if prefix.is_empty() {
                message.name().to_string()
            } else {
                format!("{prefix}.{}", message.name())
            };
            visit(&full_name, &message.nested_type, out);
            out.insert(
                full_name.clone(),
                Arc::new(MessageSchema::from_proto(full_name, message)),
            );
        }
    }

    let mut out = HashMap::new();
    visit(file.package(), &file.message_type, &mut out);
    out
}

/// Match a requested service name against the advertised list.
///
/// A request matches exactly, or as `name.name` for services registered
/// under a package named after themselves.
#[must_use]
pub fn resolve_service_name(requested: &str, available: &[String]) -> Option<String> {
    let doubled = format!("{requested}.{requested}");
    available
        .iter()
        .find(|name| name.as_str() == requested)
        .or_else(|| available.iter().find(|name| **name == doubled))
        .cloned()
}
