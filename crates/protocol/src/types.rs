//! Protocol constants and the small records embedded in requests and replies.

use std::fmt;

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::{Decode, DecodeError, Encode, Reader, put_string};

/// Reply xid carrying a watch notification.
pub const WATCH_XID: i32 = -1;
/// Xid reserved for keep-alive pings.
pub const PING_XID: i32 = -2;
/// Xid reserved for authentication packets.
pub const AUTH_XID: i32 = -4;
/// Xid reserved for watch re-registration after reconnect.
pub const SET_WATCHES_XID: i32 = -8;

/// Version argument that matches any node version on delete.
pub const ANY_VERSION: i32 = -1;

/// Length of the session password negotiated at connect time.
pub const PASSWORD_LEN: usize = 16;

/// Request type carried in the request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OpCode {
	Notification = 0,
	Create = 1,
	Delete = 2,
	Exists = 3,
	GetData = 4,
	SetData = 5,
	GetAcl = 6,
	SetAcl = 7,
	GetChildren = 8,
	Sync = 9,
	Ping = 11,
	GetChildren2 = 12,
	Check = 13,
	Multi = 14,
	Create2 = 15,
	Auth = 100,
	SetWatches = 101,
	CloseSession = -11,
}

impl OpCode {
	pub fn from_i32(value: i32) -> Option<Self> {
		let op = match value {
			0 => Self::Notification,
			1 => Self::Create,
			2 => Self::Delete,
			3 => Self::Exists,
			4 => Self::GetData,
			5 => Self::SetData,
			6 => Self::GetAcl,
			7 => Self::SetAcl,
			8 => Self::GetChildren,
			9 => Self::Sync,
			11 => Self::Ping,
			12 => Self::GetChildren2,
			13 => Self::Check,
			14 => Self::Multi,
			15 => Self::Create2,
			100 => Self::Auth,
			101 => Self::SetWatches,
			-11 => Self::CloseSession,
			_ => return None,
		};
		Some(op)
	}

	pub fn as_i32(self) -> i32 {
		self as i32
	}

	pub fn name(self) -> &'static str {
		match self {
			Self::Notification => "notification",
			Self::Create => "create",
			Self::Delete => "delete",
			Self::Exists => "exists",
			Self::GetData => "getData",
			Self::SetData => "setData",
			Self::GetAcl => "getACL",
			Self::SetAcl => "setACL",
			Self::GetChildren => "getChildren",
			Self::Sync => "sync",
			Self::Ping => "ping",
			Self::GetChildren2 => "getChildren2",
			Self::Check => "check",
			Self::Multi => "multi",
			Self::Create2 => "create2",
			Self::Auth => "auth",
			Self::SetWatches => "setWatches",
			Self::CloseSession => "closeSession",
		}
	}
}

impl fmt::Display for OpCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Server result code from the reply header.
///
/// Unrecognized codes are preserved in [`ErrorCode::Unknown`] so they can be
/// reported verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
	Ok,
	SystemError,
	RuntimeInconsistency,
	DataInconsistency,
	ConnectionLoss,
	MarshallingError,
	Unimplemented,
	OperationTimeout,
	BadArguments,
	ApiError,
	NoNode,
	NoAuth,
	BadVersion,
	NoChildrenForEphemerals,
	NodeExists,
	NotEmpty,
	SessionExpired,
	InvalidCallback,
	InvalidAcl,
	AuthFailed,
	SessionMoved,
	NotReadOnly,
	Unknown(i32),
}

impl ErrorCode {
	pub fn from_i32(value: i32) -> Self {
		match value {
			0 => Self::Ok,
			-1 => Self::SystemError,
			-2 => Self::RuntimeInconsistency,
			-3 => Self::DataInconsistency,
			-4 => Self::ConnectionLoss,
			-5 => Self::MarshallingError,
			-6 => Self::Unimplemented,
			-7 => Self::OperationTimeout,
			-8 => Self::BadArguments,
			-100 => Self::ApiError,
			-101 => Self::NoNode,
			-102 => Self::NoAuth,
			-103 => Self::BadVersion,
			-108 => Self::NoChildrenForEphemerals,
			-110 => Self::NodeExists,
			-111 => Self::NotEmpty,
			-112 => Self::SessionExpired,
			-113 => Self::InvalidCallback,
			-114 => Self::InvalidAcl,
			-115 => Self::AuthFailed,
			-118 => Self::SessionMoved,
			-119 => Self::NotReadOnly,
			other => Self::Unknown(other),
		}
	}

	pub fn as_i32(self) -> i32 {
		match self {
			Self::Ok => 0,
			Self::SystemError => -1,
			Self::RuntimeInconsistency => -2,
			Self::DataInconsistency => -3,
			Self::ConnectionLoss => -4,
			Self::MarshallingError => -5,
			Self::Unimplemented => -6,
			Self::OperationTimeout => -7,
			Self::BadArguments => -8,
			Self::ApiError => -100,
			Self::NoNode => -101,
			Self::NoAuth => -102,
			Self::BadVersion => -103,
			Self::NoChildrenForEphemerals => -108,
			Self::NodeExists => -110,
			Self::NotEmpty => -111,
			Self::SessionExpired => -112,
			Self::InvalidCallback => -113,
			Self::InvalidAcl => -114,
			Self::AuthFailed => -115,
			Self::SessionMoved => -118,
			Self::NotReadOnly => -119,
			Self::Unknown(code) => code,
		}
	}

	pub fn is_ok(self) -> bool {
		self == Self::Ok
	}

	pub fn description(self) -> &'static str {
		match self {
			Self::Ok => "ok",
			Self::SystemError => "system error",
			Self::RuntimeInconsistency => "runtime inconsistency",
			Self::DataInconsistency => "data inconsistency",
			Self::ConnectionLoss => "connection loss",
			Self::MarshallingError => "marshalling error",
			Self::Unimplemented => "unimplemented",
			Self::OperationTimeout => "operation timeout",
			Self::BadArguments => "bad arguments",
			Self::ApiError => "api error",
			Self::NoNode => "node does not exist",
			Self::NoAuth => "not authenticated",
			Self::BadVersion => "version conflict",
			Self::NoChildrenForEphemerals => "ephemeral nodes may not have children",
			Self::NodeExists => "node already exists",
			Self::NotEmpty => "node has children",
			Self::SessionExpired => "session has been expired by the server",
			Self::InvalidCallback => "invalid callback",
			Self::InvalidAcl => "invalid ACL specified",
			Self::AuthFailed => "client authentication failed",
			Self::SessionMoved => "session moved to another server",
			Self::NotReadOnly => "state-changing request passed to read-only server",
			Self::Unknown(_) => "unknown error",
		}
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.description(), self.as_i32())
	}
}

/// Node lifetime requested at create time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
	#[default]
	Persistent,
	Ephemeral,
	PersistentSequential,
	EphemeralSequential,
}

impl CreateMode {
	pub fn flags(self) -> i32 {
		match self {
			Self::Persistent => 0,
			Self::Ephemeral => 1,
			Self::PersistentSequential => 2,
			Self::EphemeralSequential => 3,
		}
	}

	pub fn from_flags(flags: i32) -> Option<Self> {
		match flags {
			0 => Some(Self::Persistent),
			1 => Some(Self::Ephemeral),
			2 => Some(Self::PersistentSequential),
			3 => Some(Self::EphemeralSequential),
			_ => None,
		}
	}

	pub fn is_ephemeral(self) -> bool {
		matches!(self, Self::Ephemeral | Self::EphemeralSequential)
	}
}

/// ACL permission bits.
pub mod perms {
	pub const READ: i32 = 1 << 0;
	pub const WRITE: i32 = 1 << 1;
	pub const CREATE: i32 = 1 << 2;
	pub const DELETE: i32 = 1 << 3;
	pub const ADMIN: i32 = 1 << 4;
	pub const ALL: i32 = READ | WRITE | CREATE | DELETE | ADMIN;
}

/// Identity an ACL entry applies to, e.g. `world:anyone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Id {
	pub scheme: String,
	pub id: String,
}

/// One access-control entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
	pub perms: i32,
	pub id: Id,
}

impl Acl {
	/// `world:anyone` with every permission.
	pub fn world_all() -> Self {
		Self {
			perms: perms::ALL,
			id: Id {
				scheme: "world".to_string(),
				id: "anyone".to_string(),
			},
		}
	}
}

/// The fully-open ACL list used for every node this client creates.
pub fn open_acl() -> Vec<Acl> {
	vec![Acl::world_all()]
}

impl Encode for Acl {
	fn encode(&self, buf: &mut BytesMut) {
		buf.put_i32(self.perms);
		put_string(buf, &self.id.scheme);
		put_string(buf, &self.id.id);
	}
}

impl Decode for Acl {
	fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
		let perms = reader.read_i32()?;
		let scheme = reader.read_string()?;
		let id = reader.read_string()?;
		Ok(Self {
			perms,
			id: Id { scheme, id },
		})
	}
}

/// Server-side metadata for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
	pub czxid: i64,
	pub mzxid: i64,
	pub ctime: i64,
	pub mtime: i64,
	pub version: i32,
	pub cversion: i32,
	pub aversion: i32,
	/// Session id owning the node; zero for persistent nodes.
	pub ephemeral_owner: i64,
	pub data_length: i32,
	pub num_children: i32,
	pub pzxid: i64,
}

impl Stat {
	pub fn is_ephemeral(&self) -> bool {
		self.ephemeral_owner != 0
	}
}

impl Encode for Stat {
	fn encode(&self, buf: &mut BytesMut) {
		buf.put_i64(self.czxid);
		buf.put_i64(self.mzxid);
		buf.put_i64(self.ctime);
		buf.put_i64(self.mtime);
		buf.put_i32(self.version);
		buf.put_i32(self.cversion);
		buf.put_i32(self.aversion);
		buf.put_i64(self.ephemeral_owner);
		buf.put_i32(self.data_length);
		buf.put_i32(self.num_children);
		buf.put_i64(self.pzxid);
	}
}

impl Decode for Stat {
	fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
		Ok(Self {
			czxid: reader.read_i64()?,
			mzxid: reader.read_i64()?,
			ctime: reader.read_i64()?,
			mtime: reader.read_i64()?,
			version: reader.read_i32()?,
			cversion: reader.read_i32()?,
			aversion: reader.read_i32()?,
			ephemeral_owner: reader.read_i64()?,
			data_length: reader.read_i32()?,
			num_children: reader.read_i32()?,
			pzxid: reader.read_i64()?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn opcode_values_match_server() {
		assert_eq!(OpCode::Create.as_i32(), 1);
		assert_eq!(OpCode::Exists.as_i32(), 3);
		assert_eq!(OpCode::CloseSession.as_i32(), -11);
		assert_eq!(OpCode::from_i32(11), Some(OpCode::Ping));
		assert_eq!(OpCode::from_i32(10), None);
	}

	#[test]
	fn error_codes_keep_unknown_values() {
		assert_eq!(ErrorCode::from_i32(-110), ErrorCode::NodeExists);
		assert_eq!(ErrorCode::from_i32(-999), ErrorCode::Unknown(-999));
		assert_eq!(ErrorCode::Unknown(-999).as_i32(), -999);
		assert_eq!(ErrorCode::NoNode.to_string(), "node does not exist (-101)");
	}

	#[test]
	fn open_acl_grants_everything_to_anyone() {
		let acl = open_acl();
		assert_eq!(acl.len(), 1);
		assert_eq!(acl[0].perms, 31);
		assert_eq!(acl[0].id.scheme, "world");
		assert_eq!(acl[0].id.id, "anyone");
	}

	#[test]
	fn create_mode_flags() {
		assert_eq!(CreateMode::Persistent.flags(), 0);
		assert_eq!(CreateMode::Ephemeral.flags(), 1);
		assert_eq!(CreateMode::from_flags(3), Some(CreateMode::EphemeralSequential));
		assert!(CreateMode::EphemeralSequential.is_ephemeral());
		assert!(!CreateMode::PersistentSequential.is_ephemeral());
	}

	#[test]
	fn stat_is_68_bytes_on_the_wire() {
		let stat = Stat {
			ephemeral_owner: 0x77,
			num_children: 2,
			..Default::default()
		};
		let mut buf = BytesMut::new();
		stat.encode(&mut buf);
		assert_eq!(buf.len(), 68);

		let decoded = Stat::decode(&mut Reader::new(buf.freeze())).unwrap();
		assert!(decoded.is_ephemeral());
		assert_eq!(decoded.num_children, 2);
	}

	#[test]
	fn stat_serializes_camel_case() {
		let json = serde_json::to_value(Stat::default()).unwrap();
		assert_eq!(json["ephemeralOwner"], 0);
		assert_eq!(json["numChildren"], 0);
	}
}
