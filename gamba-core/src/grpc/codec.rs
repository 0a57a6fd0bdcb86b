//! # Dynamic Message Codec
//!
//! An implementation of `tonic::codec::Codec` that moves
//! [`DynamicMessage`]s over the wire, bypassing the need for generated Rust
//! structs. The codec carries the descriptors for both directions of a call:
//! encoding serializes a message that already knows its own schema (after a
//! cheap check that it is the expected type), decoding materializes incoming
//! bytes against the expected descriptor.
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor, ReflectMessage};
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// A codec bridging [`DynamicMessage`] and the Protobuf binary format.
pub struct DynamicCodec {
    /// Schema of the messages this side sends.
    send_desc: MessageDescriptor,
    /// Schema of the messages this side receives.
    recv_desc: MessageDescriptor,
}

impl DynamicCodec {
    /// Creates a new `DynamicCodec`.
    ///
    /// A client passes `(input, output)` of the method it calls; a server
    /// handler passes the reverse.
    pub fn new(send_desc: MessageDescriptor, recv_desc: MessageDescriptor) -> Self {
        Self {
            send_desc,
            recv_desc,
        }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;

    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder(self.send_desc.clone())
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder(self.recv_desc.clone())
    }
}

/// Responsible for encoding a dynamic message into Protobuf bytes.
pub struct DynamicEncoder(MessageDescriptor);

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        if item.descriptor() != self.0 {
            return Err(Status::internal(format!(
                "message type '{}' does not match the expected type '{}'",
                item.descriptor().full_name(),
                self.0.full_name()
            )));
        }

        item.encode_raw(dst);
        Ok(())
    }
}

/// Responsible for decoding Protobuf bytes into a dynamic message.
pub struct DynamicDecoder(MessageDescriptor);

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut message = DynamicMessage::new(self.0.clone());
        message
            .merge(src)
            .map_err(|e| Status::internal(format!("Failed to decode Protobuf bytes: {}", e)))?;
        Ok(Some(message))
    }
}
