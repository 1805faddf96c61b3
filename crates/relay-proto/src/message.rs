//! Length-framed relay protocol messages and the tokio codec.
//!
//! A frame is `[u32 total length][u8 compression flag][body]` where the
//! total length covers itself. The body is the message id (a `str` object
//! payload) followed by any number of `(type code, payload)` objects.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};
use crate::object::{Object, Reader, TypeCode};

/// Upper bound on a single frame; anything larger is treated as corrupt.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Header bytes: 4-byte length plus 1-byte compression flag.
const HEADER_LEN: usize = 5;

/// One relay protocol message: an id and a sequence of typed objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    /// Correlation id echoed from a request, or a well-known event name.
    pub id: String,
    /// The payload objects.
    pub objects: Vec<Object>,
}

impl RelayMessage {
    /// Build a message from an id and objects.
    pub fn new(id: impl Into<String>, objects: Vec<Object>) -> Self {
        RelayMessage {
            id: id.into(),
            objects,
        }
    }

    /// Append the full frame (length prefix included) to `buf`.
    ///
    /// The body is assembled in a scratch buffer first so the length prefix
    /// can be computed before anything reaches the transport.
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut body = BytesMut::new();
        Object::str(&self.id).encode_payload(&mut body);
        for object in &self.objects {
            body.put_slice(object.type_code().as_bytes());
            object.encode_payload(&mut body);
        }

        buf.put_u32((HEADER_LEN + body.len()) as u32);
        buf.put_u8(0); // compression off
        buf.put_slice(&body);
    }

    /// Encode into a fresh byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.to_vec()
    }

    /// Decode a complete frame, length prefix included.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let mut r = Reader::new(frame);
        let len_bytes = r.take(4, "frame length")?;
        let total = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
            as usize;
        if total != frame.len() {
            return Err(ProtocolError::InvalidLength {
                what: "frame",
                len: total as i64,
            });
        }
        let compression = r.take(1, "compression flag")?[0];
        if compression != 0 {
            return Err(ProtocolError::UnsupportedCompression(compression));
        }
        Self::decode_body(&frame[HEADER_LEN..])
    }

    /// Decode a frame body (everything after the compression flag).
    pub fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let id = match Object::decode_payload(TypeCode::Str, &mut r)? {
            Object::Str(id) => id.unwrap_or_default(),
            _ => unreachable!("str payload decodes to Str"),
        };

        let mut objects = Vec::new();
        while r.remaining() > 0 {
            let code = TypeCode::from_bytes(r.code("object type")?)?;
            objects.push(Object::decode_payload(code, &mut r)?);
        }

        Ok(RelayMessage { id, objects })
    }
}

/// Tokio codec for relay protocol frames.
///
/// The encoder is what the bridge uses on client sockets; the decoder exists
/// for clients and tests that consume the server's byte stream.
#[derive(Debug, Default)]
pub struct RelayCodec;

impl Encoder<RelayMessage> for RelayCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: RelayMessage, dst: &mut BytesMut) -> Result<()> {
        msg.encode(dst);
        Ok(())
    }
}

impl Decoder for RelayCodec {
    type Item = RelayMessage;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RelayMessage>> {
        if src.len() < 4 {
            return Ok(None);
        }
        let total = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if total > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge {
                actual: total,
                limit: MAX_FRAME_LEN,
            });
        }
        if total < HEADER_LEN {
            return Err(ProtocolError::InvalidLength {
                what: "frame",
                len: total as i64,
            });
        }
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        let frame = src.copy_to_bytes(total);
        RelayMessage::decode(&frame).map(Some)
    }
}
