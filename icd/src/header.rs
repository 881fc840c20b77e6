//! Frame prefix handling
//!
//! [`FrameBuilder`] owns the offset and length arithmetic for outgoing
//! frames, and [`FrameReader`] validates an incoming frame before
//! handing out its fields in order.

use crate::{
    checksum, CodecError, Frame, MessageStatus, MessageType, HEADER_LEN, MIN_FRAME_LEN,
    TERMINATOR,
};
use core::convert::TryFrom;

/// The five byte prefix shared by every frame
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub preamble: u16,
    pub message_type: u8,
    pub message_status: u8,
    /// Bytes from offset 5 through the terminator, inclusive
    pub message_length: u8,
    pub message_checksum: u8,
}

impl Header {
    /// Read the prefix, without validating the rest of the frame
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::Length);
        }

        Ok(Header {
            preamble: u16::from_be_bytes([bytes[0], bytes[1]]),
            message_type: bytes[2] >> 4,
            message_status: bytes[2] & 0x0F,
            message_length: bytes[3],
            message_checksum: bytes[4],
        })
    }

    pub fn message_type(&self) -> Result<MessageType, CodecError> {
        MessageType::try_from(self.message_type)
    }

    pub fn status(&self) -> Result<MessageStatus, CodecError> {
        MessageStatus::try_from(self.message_status)
    }

    /// Length of the whole frame this header describes
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + usize::from(self.message_length)
    }
}

/// Builds a single outgoing frame
///
/// The length and checksum are backpatched by [`FrameBuilder::finish`],
/// which also appends the terminator.
pub struct FrameBuilder {
    buf: Frame,
}

impl FrameBuilder {
    pub fn new(ty: MessageType, status: MessageStatus) -> Result<Self, CodecError> {
        let preamble = ty.preamble().ok_or(CodecError::MessageType)?;
        let [hi, lo] = preamble.to_be_bytes();

        let mut builder = FrameBuilder { buf: Frame::new() };
        builder.put_slice(&[hi, lo, ((ty as u8) << 4) | (status as u8), 0, 0])?;
        Ok(builder)
    }

    pub fn put_u8(&mut self, val: u8) -> Result<&mut Self, CodecError> {
        self.buf.push(val).map_err(|_| CodecError::BufferFull)?;
        Ok(self)
    }

    /// Multi-byte fields are little endian on the wire
    pub fn put_u16(&mut self, val: u16) -> Result<&mut Self, CodecError> {
        self.put_slice(&val.to_le_bytes())
    }

    pub fn put_slice(&mut self, data: &[u8]) -> Result<&mut Self, CodecError> {
        self.buf
            .extend_from_slice(data)
            .map_err(|_| CodecError::BufferFull)?;
        Ok(self)
    }

    /// Bytes that can still be added before the terminator
    pub fn remaining(&self) -> usize {
        (self.buf.capacity() - self.buf.len()).saturating_sub(TERMINATOR.len())
    }

    pub fn finish(mut self) -> Result<Frame, CodecError> {
        self.put_slice(&TERMINATOR)?;

        let total = self.buf.len();
        let length = u8::try_from(total - HEADER_LEN).map_err(|_| CodecError::BufferFull)?;
        self.buf[3] = length;
        self.buf[4] = checksum(&self.buf, HEADER_LEN, total);

        Ok(self.buf)
    }
}

/// Validates an incoming frame and walks its fields
pub struct FrameReader<'a> {
    header: Header,
    body: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    /// Check the preamble, type, length, terminator and checksum of `bytes`
    ///
    /// Bytes past the declared length are ignored.
    pub fn new(bytes: &'a [u8], expected: MessageType) -> Result<Self, CodecError> {
        let header = Header::parse(bytes)?;

        if Some(header.preamble) != expected.preamble() {
            return Err(CodecError::Preamble);
        }
        if header.message_type != expected as u8 {
            return Err(CodecError::MessageType);
        }

        let total = header.frame_len();
        if total < MIN_FRAME_LEN || total > bytes.len() {
            return Err(CodecError::Length);
        }
        if bytes[total - TERMINATOR.len()..total] != TERMINATOR {
            return Err(CodecError::Terminator);
        }
        if header.message_checksum != checksum(bytes, HEADER_LEN, total) {
            return Err(CodecError::Checksum);
        }

        Ok(FrameReader {
            header,
            body: &bytes[HEADER_LEN..total - TERMINATOR.len()],
            pos: 0,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        let [b] = self.array::<1>()?;
        Ok(b)
    }

    pub fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.array::<2>()?))
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let end = self.pos + N;
        let src = self.body.get(self.pos..end).ok_or(CodecError::Length)?;
        let mut out = [0u8; N];
        out.copy_from_slice(src);
        self.pos = end;
        Ok(out)
    }

    /// Everything between the fixed fields and the terminator
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.body[self.pos..];
        self.pos = self.body.len();
        rest
    }
}
