//! Request and reply records.
//!
//! Each record implements both [`Encode`] and [`Decode`]: the client writes
//! requests and reads replies, the in-process test ensemble does the reverse.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{Decode, DecodeError, Encode, Reader, put_bool, put_buffer, put_string};
use crate::types::{Acl, CreateMode, PASSWORD_LEN};

/// First frame sent on a new connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
	pub protocol_version: i32,
	pub last_zxid_seen: i64,
	/// Requested session timeout in milliseconds.
	pub timeout_ms: i32,
	/// Zero for a new session, otherwise the session being resumed.
	pub session_id: i64,
	pub password: Bytes,
	pub read_only: bool,
}

impl ConnectRequest {
	/// Handshake for a brand-new session.
	pub fn new_session(timeout_ms: i32) -> Self {
		Self {
			protocol_version: 0,
			last_zxid_seen: 0,
			timeout_ms,
			session_id: 0,
			password: Bytes::from_static(&[0u8; PASSWORD_LEN]),
			read_only: false,
		}
	}
}

impl Encode for ConnectRequest {
	fn encode(&self, buf: &mut BytesMut) {
		buf.put_i32(self.protocol_version);
		buf.put_i64(self.last_zxid_seen);
		buf.put_i32(self.timeout_ms);
		buf.put_i64(self.session_id);
		put_buffer(buf, Some(&self.password));
		put_bool(buf, self.read_only);
	}
}

impl Decode for ConnectRequest {
	fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
		let protocol_version = reader.read_i32()?;
		let last_zxid_seen = reader.read_i64()?;
		let timeout_ms = reader.read_i32()?;
		let session_id = reader.read_i64()?;
		let password = reader.read_buffer()?.unwrap_or_default();
		// Older clients omit the trailing read-only flag.
		let read_only = if reader.is_empty() { false } else { reader.read_bool()? };
		Ok(Self {
			protocol_version,
			last_zxid_seen,
			timeout_ms,
			session_id,
			password,
			read_only,
		})
	}
}

/// Server answer to [`ConnectRequest`].
///
/// A non-positive `timeout_ms` means the requested session has expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
	pub protocol_version: i32,
	pub timeout_ms: i32,
	pub session_id: i64,
	pub password: Bytes,
	pub read_only: bool,
}

impl ConnectResponse {
	pub fn is_expired(&self) -> bool {
		self.timeout_ms <= 0
	}
}

impl Encode for ConnectResponse {
	fn encode(&self, buf: &mut BytesMut) {
		buf.put_i32(self.protocol_version);
		buf.put_i32(self.timeout_ms);
		buf.put_i64(self.session_id);
		put_buffer(buf, Some(&self.password));
		put_bool(buf, self.read_only);
	}
}

impl Decode for ConnectResponse {
	fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
		let protocol_version = reader.read_i32()?;
		let timeout_ms = reader.read_i32()?;
		let session_id = reader.read_i64()?;
		let password = reader.read_buffer()?.unwrap_or_default();
		let read_only = if reader.is_empty() { false } else { reader.read_bool()? };
		Ok(Self {
			protocol_version,
			timeout_ms,
			session_id,
			password,
			read_only,
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
	pub xid: i32,
	pub op: i32,
}

impl Encode for RequestHeader {
	fn encode(&self, buf: &mut BytesMut) {
		buf.put_i32(self.xid);
		buf.put_i32(self.op);
	}
}

impl Decode for RequestHeader {
	fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
		Ok(Self {
			xid: reader.read_i32()?,
			op: reader.read_i32()?,
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
	pub xid: i32,
	pub zxid: i64,
	pub err: i32,
}

impl Encode for ReplyHeader {
	fn encode(&self, buf: &mut BytesMut) {
		buf.put_i32(self.xid);
		buf.put_i64(self.zxid);
		buf.put_i32(self.err);
	}
}

impl Decode for ReplyHeader {
	fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
		Ok(Self {
			xid: reader.read_i32()?,
			zxid: reader.read_i64()?,
			err: reader.read_i32()?,
		})
	}
}

/// Body of an `exists` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistsRequest {
	pub path: String,
	pub watch: bool,
}

impl Encode for ExistsRequest {
	fn encode(&self, buf: &mut BytesMut) {
		put_string(buf, &self.path);
		put_bool(buf, self.watch);
	}
}

impl Decode for ExistsRequest {
	fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
		Ok(Self {
			path: reader.read_string()?,
			watch: reader.read_bool()?,
		})
	}
}

/// Body of a `create` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
	pub path: String,
	pub data: Bytes,
	pub acl: Vec<Acl>,
	pub flags: i32,
}

impl CreateRequest {
	pub fn new(path: impl Into<String>, data: Bytes, acl: Vec<Acl>, mode: CreateMode) -> Self {
		Self {
			path: path.into(),
			data,
			acl,
			flags: mode.flags(),
		}
	}
}

impl Encode for CreateRequest {
	fn encode(&self, buf: &mut BytesMut) {
		put_string(buf, &self.path);
		put_buffer(buf, Some(&self.data));
		buf.put_i32(self.acl.len() as i32);
		for entry in &self.acl {
			entry.encode(buf);
		}
		buf.put_i32(self.flags);
	}
}

impl Decode for CreateRequest {
	fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
		let path = reader.read_string()?;
		let data = reader.read_buffer()?.unwrap_or_default();
		let count = reader.read_len()?;
		let mut acl = Vec::with_capacity(count.min(16));
		for _ in 0..count {
			acl.push(Acl::decode(reader)?);
		}
		let flags = reader.read_i32()?;
		Ok(Self { path, data, acl, flags })
	}
}

/// Body of a successful `create` reply: the path actually created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResponse {
	pub path: String,
}

impl Encode for CreateResponse {
	fn encode(&self, buf: &mut BytesMut) {
		put_string(buf, &self.path);
	}
}

impl Decode for CreateResponse {
	fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
		Ok(Self { path: reader.read_string()? })
	}
}

/// Body of a `delete` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
	pub path: String,
	pub version: i32,
}

impl Encode for DeleteRequest {
	fn encode(&self, buf: &mut BytesMut) {
		put_string(buf, &self.path);
		buf.put_i32(self.version);
	}
}

impl Decode for DeleteRequest {
	fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
		Ok(Self {
			path: reader.read_string()?,
			version: reader.read_i32()?,
		})
	}
}

/// Watch notification delivered with xid `-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherEvent {
	pub event_type: i32,
	pub state: i32,
	pub path: String,
}

impl Encode for WatcherEvent {
	fn encode(&self, buf: &mut BytesMut) {
		buf.put_i32(self.event_type);
		buf.put_i32(self.state);
		put_string(buf, &self.path);
	}
}

impl Decode for WatcherEvent {
	fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
		Ok(Self {
			event_type: reader.read_i32()?,
			state: reader.read_i32()?,
			path: reader.read_string()?,
		})
	}
}
