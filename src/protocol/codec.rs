//! Byte-level helpers shared by the message parsers and writers.
//!
//! Every integer on the wire is big-endian. Readers take a payload slice and
//! return the decoded value with the unread tail; a short payload is a
//! [`Error::Protocol`], never a panic.

use zerocopy::FromBytes;
use zerocopy::byteorder::big_endian::{I16, I32, U16, U32};

use crate::error::{Error, Result};

fn short(what: &str, need: usize, have: usize) -> Error {
    Error::Protocol(format!("{what}: need {need} bytes, have {have}"))
}

/// Split a fixed-size big-endian value off the front of `data`.
fn take<'a, T: FromBytes>(data: &'a [u8], what: &str) -> Result<(T, &'a [u8])> {
    T::read_from_prefix(data).map_err(|_| short(what, size_of::<T>(), data.len()))
}

pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((&byte, rest)) => Ok((byte, rest)),
        None => Err(short("u8", 1, 0)),
    }
}

pub fn read_i16(data: &[u8]) -> Result<(i16, &[u8])> {
    take::<I16>(data, "i16").map(|(v, rest)| (v.get(), rest))
}

pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    take::<U16>(data, "u16").map(|(v, rest)| (v.get(), rest))
}

pub fn read_i32(data: &[u8]) -> Result<(i32, &[u8])> {
    take::<I32>(data, "i32").map(|(v, rest)| (v.get(), rest))
}

pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    take::<U32>(data, "u32").map(|(v, rest)| (v.get(), rest))
}

/// Split `len` raw bytes off the front of `data`.
pub fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if data.len() < len {
        return Err(short("bytes", len, data.len()));
    }
    Ok(data.split_at(len))
}

/// A NUL-terminated UTF-8 string; the terminator is consumed.
pub fn read_cstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let end = memchr::memchr(0, data)
        .ok_or_else(|| Error::Protocol("string is missing its NUL terminator".into()))?;
    let (bytes, rest) = data.split_at(end);
    let s = simdutf8::compat::from_utf8(bytes)
        .map_err(|e| Error::Protocol(format!("string is not UTF-8: {e}")))?;
    Ok((s, &rest[1..]))
}

/// Appends one frame to a buffer and patches its length on [`finish`](Self::finish).
///
/// The length field counts itself and the payload but not the type byte.
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    len_at: usize,
}

impl<'a> MessageBuilder<'a> {
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        Self::new_startup(buf)
    }

    /// A frame without a type byte (Startup, SSLRequest, CancelRequest).
    pub fn new_startup(buf: &'a mut Vec<u8>) -> Self {
        let len_at = buf.len();
        buf.extend_from_slice(&[0; 4]);
        Self { buf, len_at }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Callers validate that `s` has no interior NUL before encoding.
    pub fn write_cstr(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    pub fn finish(self) {
        let len = (self.buf.len() - self.len_at) as i32;
        self.buf[self.len_at..self.len_at + 4].copy_from_slice(&len.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cstr_splits_at_terminator() {
        let (s, rest) = read_cstr(b"SCRAM-SHA-256\0\0").unwrap();
        assert_eq!(s, "SCRAM-SHA-256");
        assert_eq!(rest, b"\0");
    }

    #[test]
    fn cstr_without_terminator_is_protocol_error() {
        assert!(matches!(read_cstr(b"abc"), Err(Error::Protocol(_))));
        assert!(matches!(read_cstr(b"\xff\0"), Err(Error::Protocol(_))));
    }

    #[test]
    fn integers_are_big_endian() {
        let data = [0x01, 0x02, 0xff, 0xfe, 0, 0, 0, 26, 9];
        let (a, rest) = read_u16(&data).unwrap();
        let (b, rest) = read_i16(rest).unwrap();
        let (c, rest) = read_u32(rest).unwrap();
        assert_eq!((a, b, c), (0x0102, -2, 26));
        assert_eq!(rest, [9]);
        assert_eq!(read_i32(&(-1_i32).to_be_bytes()).unwrap().0, -1);
    }

    #[test]
    fn short_reads_fail() {
        assert!(read_u8(&[]).is_err());
        assert!(read_i16(&[1]).is_err());
        assert!(read_u32(&[1, 2, 3]).is_err());
        assert!(read_bytes(&[1, 2], 3).is_err());
    }

    #[test]
    fn builder_patches_length() {
        let mut buf = Vec::new();
        let mut msg = MessageBuilder::new(&mut buf, b'Q');
        msg.write_cstr("SELECT 1");
        msg.finish();

        assert_eq!(buf[0], b'Q');
        assert_eq!(&buf[1..5], &13_i32.to_be_bytes());

        let mut buf = Vec::new();
        let mut msg = MessageBuilder::new_startup(&mut buf);
        msg.write_i32(80877103);
        msg.finish();
        assert_eq!(&buf[..4], &8_i32.to_be_bytes());
    }
}
