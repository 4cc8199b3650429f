//! Binary record encoding shared by every message.
//!
//! All integers are big-endian. A `buffer` is an `i32` length followed by the
//! bytes, with `-1` standing for null; strings are UTF-8 buffers and vectors
//! are an `i32` count followed by the items.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Largest frame accepted from or sent to a server.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Failure to decode a record from the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
	#[error("truncated {what}: needed {needed} bytes, {available} available")]
	Truncated { what: &'static str, needed: usize, available: usize },
	#[error("negative length {0}")]
	NegativeLength(i32),
	#[error("invalid utf-8 in string field")]
	InvalidUtf8,
	#[error("invalid boolean byte {0:#04x}")]
	InvalidBool(u8),
	#[error("frame of {0} bytes exceeds the {max}-byte limit", max = MAX_FRAME_LEN)]
	FrameTooLarge(usize),
}

/// A record that can be written to the wire.
pub trait Encode {
	fn encode(&self, buf: &mut BytesMut);
}

/// A record that can be read from the wire.
pub trait Decode: Sized {
	fn decode(reader: &mut Reader) -> Result<Self, DecodeError>;
}

/// Empty body, as sent with pings and close-session requests.
impl Encode for () {
	fn encode(&self, _buf: &mut BytesMut) {}
}

impl<A: Encode, B: Encode> Encode for (A, B) {
	fn encode(&self, buf: &mut BytesMut) {
		self.0.encode(buf);
		self.1.encode(buf);
	}
}

impl<T: Encode + ?Sized> Encode for &T {
	fn encode(&self, buf: &mut BytesMut) {
		(**self).encode(buf);
	}
}

/// Encodes `record` behind a 4-byte length prefix.
pub fn encode_frame<T: Encode + ?Sized>(record: &T) -> Bytes {
	let mut buf = BytesMut::with_capacity(64);
	buf.put_i32(0);
	record.encode(&mut buf);
	let len = (buf.len() - 4) as i32;
	buf[..4].copy_from_slice(&len.to_be_bytes());
	buf.freeze()
}

/// Validates a frame length prefix read from the wire.
pub fn frame_len(prefix: [u8; 4]) -> Result<usize, DecodeError> {
	let len = i32::from_be_bytes(prefix);
	if len < 0 {
		return Err(DecodeError::NegativeLength(len));
	}
	let len = len as usize;
	if len > MAX_FRAME_LEN {
		return Err(DecodeError::FrameTooLarge(len));
	}
	Ok(len)
}

pub fn put_bool(buf: &mut BytesMut, value: bool) {
	buf.put_u8(u8::from(value));
}

pub fn put_buffer(buf: &mut BytesMut, value: Option<&[u8]>) {
	match value {
		Some(bytes) => {
			buf.put_i32(bytes.len() as i32);
			buf.put_slice(bytes);
		}
		None => buf.put_i32(-1),
	}
}

pub fn put_string(buf: &mut BytesMut, value: &str) {
	put_buffer(buf, Some(value.as_bytes()));
}

/// Checked cursor over a received payload.
///
/// Every read verifies the remaining length first, so malformed input turns
/// into a [`DecodeError`] instead of a panic inside `bytes`.
#[derive(Debug, Clone)]
pub struct Reader {
	buf: Bytes,
}

impl Reader {
	pub fn new(buf: Bytes) -> Self {
		Self { buf }
	}

	pub fn remaining(&self) -> usize {
		self.buf.remaining()
	}

	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}

	/// Returns the unread tail, consuming the reader.
	pub fn into_rest(self) -> Bytes {
		self.buf
	}

	fn need(&self, needed: usize, what: &'static str) -> Result<(), DecodeError> {
		let available = self.buf.remaining();
		if available < needed {
			return Err(DecodeError::Truncated { what, needed, available });
		}
		Ok(())
	}

	pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
		self.need(4, "int")?;
		Ok(self.buf.get_i32())
	}

	pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
		self.need(8, "long")?;
		Ok(self.buf.get_i64())
	}

	pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
		self.need(1, "bool")?;
		match self.buf.get_u8() {
			0 => Ok(false),
			1 => Ok(true),
			other => Err(DecodeError::InvalidBool(other)),
		}
	}

	/// Reads a length-prefixed buffer; `None` for the null encoding.
	pub fn read_buffer(&mut self) -> Result<Option<Bytes>, DecodeError> {
		let len = self.read_i32()?;
		if len == -1 {
			return Ok(None);
		}
		if len < 0 {
			return Err(DecodeError::NegativeLength(len));
		}
		self.need(len as usize, "buffer")?;
		Ok(Some(self.buf.split_to(len as usize)))
	}

	/// Reads a string, mapping the null encoding to an empty string.
	pub fn read_string(&mut self) -> Result<String, DecodeError> {
		match self.read_buffer()? {
			Some(bytes) => String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8),
			None => Ok(String::new()),
		}
	}

	/// Reads a vector count; null vectors decode as empty.
	pub fn read_len(&mut self) -> Result<usize, DecodeError> {
		let len = self.read_i32()?;
		match len {
			-1 => Ok(0),
			n if n < 0 => Err(DecodeError::NegativeLength(n)),
			n => Ok(n as usize),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn frame_prefix_counts_payload_only() {
		struct Pair(i32, i64);
		impl Encode for Pair {
			fn encode(&self, buf: &mut BytesMut) {
				buf.put_i32(self.0);
				buf.put_i64(self.1);
			}
		}

		let frame = encode_frame(&Pair(7, -2));
		assert_eq!(frame.len(), 16);
		assert_eq!(&frame[..4], &12i32.to_be_bytes());
		assert_eq!(&frame[4..8], &7i32.to_be_bytes());
	}

	#[test]
	fn frame_len_rejects_oversized_and_negative() {
		assert_eq!(frame_len(16i32.to_be_bytes()), Ok(16));
		assert_eq!(frame_len((-3i32).to_be_bytes()), Err(DecodeError::NegativeLength(-3)));
		let huge = (MAX_FRAME_LEN as i32 + 1).to_be_bytes();
		assert!(matches!(frame_len(huge), Err(DecodeError::FrameTooLarge(_))));
	}

	#[test]
	fn null_buffer_and_string() {
		let mut buf = BytesMut::new();
		put_buffer(&mut buf, None);
		put_buffer(&mut buf, None);
		let mut reader = Reader::new(buf.freeze());
		assert_eq!(reader.read_buffer().unwrap(), None);
		assert_eq!(reader.read_string().unwrap(), "");
		assert!(reader.is_empty());
	}

	#[test]
	fn truncated_buffer_reports_sizes() {
		let mut buf = BytesMut::new();
		buf.put_i32(10);
		buf.put_slice(b"abc");
		let mut reader = Reader::new(buf.freeze());
		assert_eq!(
			reader.read_buffer(),
			Err(DecodeError::Truncated {
				what: "buffer",
				needed: 10,
				available: 3
			})
		);
	}

	#[test]
	fn bool_must_be_zero_or_one() {
		let mut reader = Reader::new(Bytes::from_static(&[1, 0, 2]));
		assert_eq!(reader.read_bool(), Ok(true));
		assert_eq!(reader.read_bool(), Ok(false));
		assert_eq!(reader.read_bool(), Err(DecodeError::InvalidBool(2)));
	}

	#[test]
	fn invalid_utf8_string() {
		let mut buf = BytesMut::new();
		put_buffer(&mut buf, Some(&[0xff, 0xfe]));
		let mut reader = Reader::new(buf.freeze());
		assert_eq!(reader.read_string(), Err(DecodeError::InvalidUtf8));
	}
}
