//! Tonic codec for [`DynamicMessage`].

use std::sync::Arc;

use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::Status;

use super::message::DynamicMessage;
use super::schema::MessageSchema;

/// Encodes requests as-is and decodes responses against the output schema.
#[derive(Debug, Clone)]
pub struct DynamicCodec {
    output: Arc<MessageSchema>,
}

impl DynamicCodec {
    /// Codec whose responses decode as `output`.
    #[must_use]
    pub fn new(output: Arc<MessageSchema>) -> Self {
        Self { output }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;
    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder {
            schema: Arc::clone(&self.output),
        }
    }
}

/// Request encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicEncoder;

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode(dst);
        Ok(())
    }
}

/// Response decoder.
#[derive(Debug, Clone)]
pub struct DynamicDecoder {
    schema: Arc<MessageSchema>,
}

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        DynamicMessage::decode(Arc::clone(&self.schema), src)
            .map(Some)
            .map_err(|e| Status::internal(format!("failed to decode response: {e}")))
    }
}
