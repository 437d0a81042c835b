// Frame codec for request/response streams.
//
// Frames follow the HTTP/3 layout (varint type, varint length, payload) but
// header blocks are plain literal name/value lists with no QPACK state, so a
// HEADERS frame can be decoded without any connection context.
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

pub const FRAME_DATA: u64 = 0x00;
pub const FRAME_HEADERS: u64 = 0x01;

pub const PSEUDO_METHOD: &str = ":method";
pub const PSEUDO_SCHEME: &str = ":scheme";
pub const PSEUDO_AUTHORITY: &str = ":authority";
pub const PSEUDO_PATH: &str = ":path";
pub const PSEUDO_STATUS: &str = ":status";

/// Largest value a QUIC varint can carry (2^62 - 1).
pub const MAX_VARINT: u64 = (1 << 62) - 1;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("incomplete frame")]
    Incomplete,
    #[error("frame too large: {length} bytes (cap {max})")]
    FrameTooLarge { length: u64, max: usize },
    #[error("varint value {0} out of range")]
    VarintOutOfRange(u64),
    #[error("malformed header block: {0}")]
    MalformedHeaderBlock(&'static str),
}

/// Encode a QUIC variable-length integer (RFC 9000 section 16).
///
/// ```
/// use bytes::BytesMut;
/// use strand_wire::{decode_varint, encode_varint};
///
/// let mut buf = BytesMut::new();
/// encode_varint(&mut buf, 15293).expect("encode");
/// assert_eq!(&buf[..], &[0x7b, 0xbd]);
/// assert_eq!(decode_varint(&buf), Some((15293, 2)));
/// ```
pub fn encode_varint(buf: &mut BytesMut, value: u64) -> Result<()> {
    if value > MAX_VARINT {
        return Err(Error::VarintOutOfRange(value));
    }
    if value < (1 << 6) {
        buf.put_u8(value as u8);
    } else if value < (1 << 14) {
        buf.put_u16(0x4000 | value as u16);
    } else if value < (1 << 30) {
        buf.put_u32(0x8000_0000 | value as u32);
    } else {
        buf.put_u64(0xc000_0000_0000_0000 | value);
    }
    Ok(())
}

/// Decode a varint from the front of `buf`, returning `(value, consumed)`.
pub fn decode_varint(buf: &[u8]) -> Option<(u64, usize)> {
    let first = *buf.first()?;
    let len = 1usize << (first >> 6);
    if buf.len() < len {
        return None;
    }
    let mut value = u64::from(first & 0x3f);
    for byte in &buf[1..len] {
        value = (value << 8) | u64::from(*byte);
    }
    Some((value, len))
}

pub fn varint_len(value: u64) -> usize {
    if value < (1 << 6) {
        1
    } else if value < (1 << 14) {
        2
    } else if value < (1 << 30) {
        4
    } else {
        8
    }
}

/// One header name/value pair, kept as raw bytes.
///
/// Values are not required to be UTF-8 on the wire; callers decide how to
/// treat bytes that do not decode.
#[derive(Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Bytes,
    pub value: Bytes,
}

impl HeaderField {
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is_pseudo(&self) -> bool {
        self.name.first() == Some(&b':')
    }

    pub fn name_str(&self) -> std::result::Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.name)
    }

    pub fn value_str(&self) -> std::result::Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.value)
    }
}

impl fmt::Debug for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            String::from_utf8_lossy(&self.name),
            String::from_utf8_lossy(&self.value)
        )
    }
}

/// A single frame on a request or response stream.
///
/// ```
/// use bytes::{Bytes, BytesMut};
/// use strand_wire::{Frame, FrameDecoder, HeaderField};
///
/// let mut buf = BytesMut::new();
/// Frame::Headers(vec![HeaderField::new(":status", "200")])
///     .encode(&mut buf)
///     .expect("encode");
/// Frame::Data(Bytes::from_static(b"hello")).encode(&mut buf).expect("encode");
///
/// let mut decoder = FrameDecoder::new(1024);
/// decoder.extend(&buf);
/// assert!(matches!(decoder.next_frame(), Ok(Some(Frame::Headers(_)))));
/// assert_eq!(
///     decoder.next_frame().expect("decode"),
///     Some(Frame::Data(Bytes::from_static(b"hello")))
/// );
/// assert_eq!(decoder.next_frame().expect("decode"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(Bytes),
    Headers(Vec<HeaderField>),
    // Unknown types are surfaced so readers can skip them explicitly.
    Unknown { frame_type: u64, payload: Bytes },
}

impl Frame {
    pub fn frame_type(&self) -> u64 {
        match self {
            Frame::Data(_) => FRAME_DATA,
            Frame::Headers(_) => FRAME_HEADERS,
            Frame::Unknown { frame_type, .. } => *frame_type,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Frame::Data(payload) => {
                encode_varint(buf, FRAME_DATA)?;
                encode_varint(buf, payload.len() as u64)?;
                buf.extend_from_slice(payload);
            }
            Frame::Headers(fields) => {
                let mut block = BytesMut::with_capacity(header_block_len(fields));
                encode_header_block(fields, &mut block)?;
                encode_varint(buf, FRAME_HEADERS)?;
                encode_varint(buf, block.len() as u64)?;
                buf.extend_from_slice(&block);
            }
            Frame::Unknown {
                frame_type,
                payload,
            } => {
                encode_varint(buf, *frame_type)?;
                encode_varint(buf, payload.len() as u64)?;
                buf.extend_from_slice(payload);
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode one frame from the front of `input`.
    ///
    /// Returns `Ok(None)` when more bytes are needed; otherwise the frame and
    /// the number of bytes it occupied.
    pub fn decode(input: &[u8], max_frame_bytes: usize) -> Result<Option<(Frame, usize)>> {
        let Some((frame_type, type_len)) = decode_varint(input) else {
            return Ok(None);
        };
        let Some((length, length_len)) = decode_varint(&input[type_len..]) else {
            return Ok(None);
        };
        // Check the declared length before waiting for (or allocating) the payload.
        if length > max_frame_bytes as u64 {
            return Err(Error::FrameTooLarge {
                length,
                max: max_frame_bytes,
            });
        }
        let header_len = type_len + length_len;
        let total = header_len + length as usize;
        if input.len() < total {
            return Ok(None);
        }
        let payload = Bytes::copy_from_slice(&input[header_len..total]);
        let frame = match frame_type {
            FRAME_DATA => Frame::Data(payload),
            FRAME_HEADERS => Frame::Headers(decode_header_block(payload)?),
            other => Frame::Unknown {
                frame_type: other,
                payload,
            },
        };
        Ok(Some((frame, total)))
    }
}

fn header_block_len(fields: &[HeaderField]) -> usize {
    fields
        .iter()
        .map(|field| {
            varint_len(field.name.len() as u64)
                + field.name.len()
                + varint_len(field.value.len() as u64)
                + field.value.len()
        })
        .sum()
}

pub fn encode_header_block(fields: &[HeaderField], buf: &mut BytesMut) -> Result<()> {
    for field in fields {
        encode_varint(buf, field.name.len() as u64)?;
        buf.extend_from_slice(&field.name);
        encode_varint(buf, field.value.len() as u64)?;
        buf.extend_from_slice(&field.value);
    }
    Ok(())
}

pub fn decode_header_block(mut block: Bytes) -> Result<Vec<HeaderField>> {
    let mut fields = Vec::new();
    while block.has_remaining() {
        let name = take_prefixed(&mut block, "truncated header name")?;
        if name.is_empty() {
            return Err(Error::MalformedHeaderBlock("empty header name"));
        }
        let value = take_prefixed(&mut block, "truncated header value")?;
        fields.push(HeaderField { name, value });
    }
    Ok(fields)
}

fn take_prefixed(block: &mut Bytes, what: &'static str) -> Result<Bytes> {
    let (len, consumed) = decode_varint(block).ok_or(Error::MalformedHeaderBlock(what))?;
    block.advance(consumed);
    let len = usize::try_from(len).map_err(|_| Error::MalformedHeaderBlock(what))?;
    if block.remaining() < len {
        return Err(Error::MalformedHeaderBlock(what));
    }
    Ok(block.split_to(len))
}

/// Incremental decoder for a byte stream carrying back-to-back frames.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_bytes: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(16 * 1024),
            max_frame_bytes,
        }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match Frame::decode(&self.buf, self.max_frame_bytes)? {
            Some((frame, consumed)) => {
                self.buf.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Bytes received but not yet forming a whole frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// The unconsumed bytes, starting at the next frame boundary.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Call once the stream has ended; leftover bytes mean a truncated frame.
    pub fn finish(&self) -> Result<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(Error::Incomplete)
        }
    }
}
