//! In-process coordination server for tests.
//!
//! [`MemoryEnsemble`] listens on `127.0.0.1:0` and speaks the same framed wire
//! protocol as a real server, so a [`Session`](crate::Session) talks to it
//! exactly as it would to a cluster. It supports the requests this client
//! issues (exists, create, delete, ping, close-session) and answers anything
//! else with `Unimplemented`.
//!
//! Sessions never time out on their own; tests end them explicitly with
//! [`MemoryEnsemble::expire_session`] or sever just the connection with
//! [`MemoryEnsemble::drop_connection`].
//!
//! # Example
//!
//! ```ignore
//! let ensemble = MemoryEnsemble::start().await?;
//! let session = Session::connect(&ensemble.servers(), Duration::from_secs(5)).await?;
//! session.create("/a", Bytes::new(), open_acl(), CreateMode::Ephemeral).await?;
//! ensemble.expire_session(session.session_id());
//! assert!(!ensemble.exists("/a"));
//! ```

mod tree;

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::{debug, info};
use zkreg_protocol::{
	ConnectRequest, ConnectResponse, CreateMode, CreateRequest, CreateResponse, Decode, DeleteRequest, Encode, ErrorCode, ExistsRequest,
	OpCode, PASSWORD_LEN, Reader, ReplyHeader, RequestHeader, Stat, encode_frame,
};

use self::tree::Tree;
use crate::error::{Error, Result};
use crate::transport::{self, FrameWriter};

struct SessionEntry {
	password: Bytes,
	/// Fires to sever the session's current connection.
	kill: Arc<Notify>,
}

#[derive(Default)]
struct EnsembleState {
	tree: Mutex<Tree>,
	sessions: Mutex<HashMap<i64, SessionEntry>>,
	ops: Mutex<HashMap<OpCode, usize>>,
	injected: Mutex<HashMap<OpCode, VecDeque<ErrorCode>>>,
	tasks: Mutex<Vec<AbortHandle>>,
	next_session: AtomicI64,
}

/// A single-node coordination server backed by an in-memory tree.
pub struct MemoryEnsemble {
	addr: SocketAddr,
	state: Arc<EnsembleState>,
}

impl MemoryEnsemble {
	/// Binds a loopback listener and starts accepting clients.
	pub async fn start() -> Result<Self> {
		let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
		let addr = listener.local_addr()?;
		let state = Arc::new(EnsembleState {
			next_session: AtomicI64::new(0x100),
			..Default::default()
		});

		let accept = tokio::spawn(accept_loop(listener, Arc::clone(&state)));
		state.tasks.lock().push(accept.abort_handle());
		info!(target: "zkreg.ensemble", %addr, "ensemble listening");
		Ok(Self { addr, state })
	}

	pub fn address(&self) -> String {
		self.addr.to_string()
	}

	/// Server list suitable for [`Session::connect`](crate::Session::connect).
	pub fn servers(&self) -> Vec<String> {
		vec![self.address()]
	}

	pub fn exists(&self, path: &str) -> bool {
		self.state.tree.lock().stat(path).is_some()
	}

	pub fn stat(&self, path: &str) -> Option<Stat> {
		self.state.tree.lock().stat(path)
	}

	pub fn data(&self, path: &str) -> Option<Bytes> {
		self.state.tree.lock().data(path)
	}

	pub fn children(&self, path: &str) -> Vec<String> {
		self.state.tree.lock().children(path)
	}

	/// Creates a node directly, bypassing any client session.
	///
	/// `owner` is the ephemeral owner for ephemeral modes.
	pub fn seed(&self, path: &str, mode: CreateMode, owner: i64) -> std::result::Result<String, ErrorCode> {
		self.state.tree.lock().create(path, Bytes::new(), mode, owner)
	}

	/// Number of requests of `op` received so far.
	pub fn op_count(&self, op: OpCode) -> usize {
		self.state.ops.lock().get(&op).copied().unwrap_or(0)
	}

	pub fn reset_op_counts(&self) {
		self.state.ops.lock().clear();
	}

	/// Makes the next request of `op` fail with `code`; calls queue up.
	pub fn inject_error(&self, op: OpCode, code: ErrorCode) {
		self.state.injected.lock().entry(op).or_default().push_back(code);
	}

	/// Ids of sessions the server currently considers alive.
	pub fn session_ids(&self) -> Vec<i64> {
		let mut ids: Vec<i64> = self.state.sessions.lock().keys().copied().collect();
		ids.sort_unstable();
		ids
	}

	/// Ends `session_id` as if its timeout lapsed: its ephemeral nodes are
	/// deleted, its connection is dropped, and resume attempts are refused.
	pub fn expire_session(&self, session_id: i64) -> Vec<String> {
		let entry = self.state.sessions.lock().remove(&session_id);
		let removed = self.state.tree.lock().remove_ephemerals(session_id);
		if let Some(entry) = entry {
			entry.kill.notify_one();
		}
		info!(target: "zkreg.ensemble", session_id, removed = removed.len(), "session expired");
		removed
	}

	/// Drops the session's current connection while keeping the session alive.
	pub fn drop_connection(&self, session_id: i64) -> bool {
		match self.state.sessions.lock().get(&session_id) {
			Some(entry) => {
				entry.kill.notify_one();
				true
			}
			None => false,
		}
	}
}

impl Drop for MemoryEnsemble {
	fn drop(&mut self) {
		for task in self.state.tasks.lock().drain(..) {
			task.abort();
		}
	}
}

async fn accept_loop(listener: TcpListener, state: Arc<EnsembleState>) {
	loop {
		let stream = match listener.accept().await {
			Ok((stream, _)) => stream,
			Err(err) => {
				debug!(target: "zkreg.ensemble", error = %err, "accept failed");
				continue;
			}
		};
		let client = tokio::spawn(serve_client(stream, Arc::clone(&state)));
		state.tasks.lock().push(client.abort_handle());
	}
}

async fn serve_client(stream: TcpStream, state: Arc<EnsembleState>) {
	if let Err(err) = serve_client_inner(stream, &state).await {
		debug!(target: "zkreg.ensemble", error = %err, "client connection ended");
	}
}

async fn serve_client_inner(stream: TcpStream, state: &EnsembleState) -> Result<()> {
	let (mut reader, mut writer) = transport::split(stream);
	let Some(frame) = reader.recv().await? else {
		return Ok(());
	};
	let request = ConnectRequest::decode(&mut Reader::new(frame))?;

	let Some((session_id, kill)) = accept_session(state, &request) else {
		let refused = ConnectResponse {
			protocol_version: 0,
			timeout_ms: 0,
			session_id: 0,
			password: Bytes::from_static(&[0u8; PASSWORD_LEN]),
			read_only: false,
		};
		writer.send(encode_frame(&refused)).await?;
		return writer.shutdown().await;
	};

	let password = state.sessions.lock().get(&session_id).map(|entry| entry.password.clone()).unwrap_or_default();
	let response = ConnectResponse {
		protocol_version: 0,
		timeout_ms: request.timeout_ms,
		session_id,
		password,
		read_only: false,
	};
	writer.send(encode_frame(&response)).await?;

	loop {
		let frame = tokio::select! {
			_ = kill.notified() => return writer.shutdown().await,
			frame = reader.recv() => frame?,
		};
		let Some(frame) = frame else {
			return Ok(());
		};
		if !handle_request(state, session_id, frame, &mut writer).await? {
			return writer.shutdown().await;
		}
	}
}

/// Registers a new session or resumes an existing one.
fn accept_session(state: &EnsembleState, request: &ConnectRequest) -> Option<(i64, Arc<Notify>)> {
	let mut sessions = state.sessions.lock();
	if request.session_id == 0 {
		let session_id = state.next_session.fetch_add(1, Ordering::Relaxed);
		let mut password = [0u8; PASSWORD_LEN];
		password[..8].copy_from_slice(&session_id.to_be_bytes());
		let kill = Arc::new(Notify::new());
		sessions.insert(
			session_id,
			SessionEntry {
				password: Bytes::copy_from_slice(&password),
				kill: Arc::clone(&kill),
			},
		);
		return Some((session_id, kill));
	}

	let entry = sessions.get_mut(&request.session_id)?;
	if entry.password != request.password {
		return None;
	}
	// A resumed session moves to the new connection; sever the old one.
	entry.kill.notify_one();
	let kill = Arc::new(Notify::new());
	entry.kill = Arc::clone(&kill);
	Some((request.session_id, kill))
}

/// Serves one request; returns `false` once the session was closed.
async fn handle_request<W>(state: &EnsembleState, session_id: i64, frame: Bytes, writer: &mut FrameWriter<W>) -> Result<bool>
where
	W: tokio::io::AsyncWrite + Unpin,
{
	let mut reader = Reader::new(frame);
	let header = RequestHeader::decode(&mut reader)?;
	let op = OpCode::from_i32(header.op).ok_or_else(|| Error::Protocol(format!("unknown opcode {}", header.op)))?;
	*state.ops.lock().entry(op).or_insert(0) += 1;

	if op == OpCode::CloseSession {
		state.sessions.lock().remove(&session_id);
		let removed = state.tree.lock().remove_ephemerals(session_id);
		debug!(target: "zkreg.ensemble", session_id, removed = removed.len(), "session closed by client");
		reply(state, writer, header.xid, Ok(Bytes::new())).await?;
		return Ok(false);
	}

	let outcome = apply(state, session_id, op, &mut reader)?;
	reply(state, writer, header.xid, outcome).await?;
	Ok(true)
}

/// Executes a request against the tree and encodes the reply body.
fn apply(state: &EnsembleState, session_id: i64, op: OpCode, reader: &mut Reader) -> Result<std::result::Result<Bytes, ErrorCode>> {
	if op != OpCode::Ping {
		let injected = state.injected.lock().get_mut(&op).and_then(VecDeque::pop_front);
		if let Some(code) = injected {
			return Ok(Err(code));
		}
	}

	let outcome = match op {
		OpCode::Ping => Ok(Bytes::new()),
		OpCode::Exists => {
			let request = ExistsRequest::decode(reader)?;
			let stat = state.tree.lock().stat(&request.path);
			stat.map(|stat| encode_body(&stat)).ok_or(ErrorCode::NoNode)
		}
		OpCode::Create => {
			let request = CreateRequest::decode(reader)?;
			match CreateMode::from_flags(request.flags) {
				Some(mode) => {
					let created = state.tree.lock().create(&request.path, request.data, mode, session_id);
					created.map(|path| encode_body(&CreateResponse { path }))
				}
				None => Err(ErrorCode::BadArguments),
			}
		}
		OpCode::Delete => {
			let request = DeleteRequest::decode(reader)?;
			let deleted = state.tree.lock().delete(&request.path, request.version);
			deleted.map(|()| Bytes::new())
		}
		_ => Err(ErrorCode::Unimplemented),
	};
	Ok(outcome)
}

fn encode_body<T: Encode>(record: &T) -> Bytes {
	encode_frame(record).slice(4..)
}

async fn reply<W>(state: &EnsembleState, writer: &mut FrameWriter<W>, xid: i32, outcome: std::result::Result<Bytes, ErrorCode>) -> Result<()>
where
	W: tokio::io::AsyncWrite + Unpin,
{
	let zxid = state.tree.lock().zxid();
	let (err, body) = match outcome {
		Ok(body) => (ErrorCode::Ok, body),
		Err(code) => (code, Bytes::new()),
	};
	let header = ReplyHeader { xid, zxid, err: err.as_i32() };
	writer.send(encode_frame(&(header, RawBody(body)))).await
}

/// Pre-encoded reply body appended after the header.
struct RawBody(Bytes);

impl Encode for RawBody {
	fn encode(&self, buf: &mut BytesMut) {
		buf.extend_from_slice(&self.0);
	}
}
