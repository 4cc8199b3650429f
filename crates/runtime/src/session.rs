//! Session lifecycle: handshake, keep-alive, reconnect, and close.
//!
//! A [`Session`] is established against the first reachable server of the
//! configured list. A background supervisor then owns the connection's read
//! loop and pings every third of the negotiated timeout. When the connection
//! is lost the session becomes [`SessionState::Disconnected`] and the
//! supervisor re-handshakes with the same session id until the negotiated
//! timeout runs out; a server that reports the session expired, or the
//! deadline passing, moves it to [`SessionState::Expired`] for good.
//!
//! Ephemeral nodes belong to the session, not the connection: they survive a
//! reconnect and are removed by the server once the session ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zkreg_protocol::{
	ANY_VERSION, Acl, ConnectRequest, ConnectResponse, CreateMode, CreateRequest, CreateResponse, Decode, DeleteRequest, ExistsRequest, OpCode,
	Reader, Stat, encode_frame,
};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::transport::{self, FrameReader, FrameWriter};

type Link = Arc<Connection<OwnedWriteHalf>>;

/// Pause between reconnect rounds over the server list.
const RECONNECT_BACKOFF: Duration = Duration::from_millis(100);

/// Client port assumed for servers listed without one.
pub const DEFAULT_PORT: u16 = 2181;

/// Liveness of a session as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
	Connected,
	/// Connection lost; reconnecting with the same session id.
	Disconnected,
	/// The server discarded the session and its ephemeral nodes.
	Expired,
	/// Closed by the client.
	Closed,
}

impl SessionState {
	/// Expired and closed sessions never become usable again.
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Expired | Self::Closed)
	}
}

#[derive(Debug, Clone)]
struct Credentials {
	session_id: i64,
	password: Bytes,
	timeout: Duration,
}

struct Shared {
	servers: Vec<String>,
	requested_timeout: Duration,
	credentials: Mutex<Credentials>,
	link: RwLock<Option<Link>>,
	state: watch::Sender<SessionState>,
	shutdown: Notify,
	next_server: AtomicUsize,
}

struct Inner {
	shared: Arc<Shared>,
	supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
	fn drop(&mut self) {
		if let Some(handle) = self.supervisor.lock().take() {
			handle.abort();
		}
	}
}

/// Handle to a live session with the coordination service.
///
/// Clones share the same session. Dropping the last clone stops the
/// supervisor without sending close-session, leaving the server to expire it.
#[derive(Clone)]
pub struct Session {
	inner: Arc<Inner>,
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("session_id", &hex_id(self.session_id()))
			.field("state", &self.state())
			.finish()
	}
}

impl Session {
	/// Opens a new session against the first server in `servers` that completes
	/// the handshake within `timeout`.
	///
	/// `timeout` is both the per-server connect deadline and the requested
	/// session timeout; the server may negotiate a different session timeout.
	pub async fn connect(servers: &[String], timeout: Duration) -> Result<Self> {
		if servers.is_empty() {
			return Err(Error::NoServerReachable {
				servers: String::new(),
				last: "no servers configured".to_string(),
			});
		}

		let (state, _) = watch::channel(SessionState::Connected);
		let shared = Arc::new(Shared {
			servers: servers.iter().map(|server| with_default_port(server)).collect(),
			requested_timeout: timeout,
			credentials: Mutex::new(Credentials {
				session_id: 0,
				password: Bytes::new(),
				timeout,
			}),
			link: RwLock::new(None),
			state,
			shutdown: Notify::new(),
			next_server: AtomicUsize::new(0),
		});

		let request = ConnectRequest::new_session(millis(timeout));
		let (link, reader) = shared.establish(&request, 0).await?;
		*shared.link.write() = Some(Arc::clone(&link));

		let credentials = shared.credentials.lock().clone();
		info!(
			target: "zkreg.session",
			session_id = %hex_id(credentials.session_id),
			timeout_ms = credentials.timeout.as_millis() as u64,
			"session established"
		);

		let supervisor = tokio::spawn(supervise(Arc::clone(&shared), link, reader));
		Ok(Self {
			inner: Arc::new(Inner {
				shared,
				supervisor: Mutex::new(Some(supervisor)),
			}),
		})
	}

	fn shared(&self) -> &Shared {
		&self.inner.shared
	}

	pub fn state(&self) -> SessionState {
		*self.shared().state.borrow()
	}

	/// Subscribes to state transitions.
	pub fn subscribe(&self) -> watch::Receiver<SessionState> {
		self.shared().state.subscribe()
	}

	/// Server-assigned session id.
	pub fn session_id(&self) -> i64 {
		self.shared().credentials.lock().session_id
	}

	/// Session timeout negotiated with the server.
	pub fn negotiated_timeout(&self) -> Duration {
		self.shared().credentials.lock().timeout
	}

	pub fn servers(&self) -> &[String] {
		&self.shared().servers
	}

	/// Metadata of the node at `path`, or `None` when it does not exist.
	pub async fn exists(&self, path: &str) -> Result<Option<Stat>> {
		let link = self.shared().current_link()?;
		let request = ExistsRequest {
			path: path.to_string(),
			watch: false,
		};
		match link.request(OpCode::Exists, &request).await {
			Ok(body) => Ok(Some(Stat::decode(&mut Reader::new(body))?)),
			Err(err) if err.is_no_node() => Ok(None),
			Err(err) => Err(err),
		}
	}

	/// Creates a node and returns the path the server actually created.
	pub async fn create(&self, path: &str, data: Bytes, acl: Vec<Acl>, mode: CreateMode) -> Result<String> {
		let link = self.shared().current_link()?;
		let request = CreateRequest::new(path, data, acl, mode);
		let body = link.request(OpCode::Create, &request).await?;
		let created = CreateResponse::decode(&mut Reader::new(body))?;
		debug!(target: "zkreg.session", path = %created.path, mode = ?mode, "node created");
		Ok(created.path)
	}

	/// Deletes the node at `path`; `None` matches any version.
	pub async fn delete(&self, path: &str, version: Option<i32>) -> Result<()> {
		let link = self.shared().current_link()?;
		let request = DeleteRequest {
			path: path.to_string(),
			version: version.unwrap_or(ANY_VERSION),
		};
		link.request(OpCode::Delete, &request).await?;
		debug!(target: "zkreg.session", path, "node deleted");
		Ok(())
	}

	/// Ends the session: sends close-session when connected, then drops the
	/// connection. Every later call fails with [`Error::NotConnected`].
	///
	/// An expired session stays [`SessionState::Expired`]; closing it only
	/// releases what the client still holds.
	pub async fn close(&self) {
		let shared = self.shared();
		let mut previous = SessionState::Closed;
		shared.state.send_if_modified(|state| {
			previous = *state;
			if state.is_terminal() {
				return false;
			}
			*state = SessionState::Closed;
			true
		});
		if previous.is_terminal() {
			debug!(target: "zkreg.session", state = ?previous, "session already ended");
			if let Some(link) = shared.link.write().take() {
				link.fail_pending();
			}
			if let Some(handle) = self.inner.supervisor.lock().take() {
				handle.abort();
			}
			return;
		}

		let link = shared.link.write().take();
		if let Some(link) = link {
			if previous == SessionState::Connected {
				let timeout = self.negotiated_timeout();
				match tokio::time::timeout(timeout, link.request(OpCode::CloseSession, &())).await {
					Ok(Ok(_)) => {}
					Ok(Err(err)) => warn!(target: "zkreg.session", error = %err, "close-session request failed"),
					Err(_) => warn!(target: "zkreg.session", ?timeout, "close-session request timed out"),
				}
			}
			link.shutdown().await;
		}

		shared.shutdown.notify_one();
		if let Some(handle) = self.inner.supervisor.lock().take() {
			handle.abort();
		}
		info!(
			target: "zkreg.session",
			session_id = %hex_id(self.session_id()),
			"session closed"
		);
	}
}

impl Shared {
	fn current_link(&self) -> Result<Link> {
		match *self.state.borrow() {
			SessionState::Connected => {}
			SessionState::Expired => return Err(Error::SessionExpired),
			SessionState::Disconnected | SessionState::Closed => return Err(Error::NotConnected),
		}
		self.link.read().clone().ok_or(Error::NotConnected)
	}

	/// Moves to `next` unless the session already reached a terminal state.
	fn transition(&self, next: SessionState) -> bool {
		self.state.send_if_modified(|state| {
			if state.is_terminal() || *state == next {
				return false;
			}
			*state = next;
			true
		})
	}

	/// Tries each server once, starting after the last one that worked.
	async fn establish(&self, request: &ConnectRequest, last_zxid: i64) -> Result<(Link, FrameReader<OwnedReadHalf>)> {
		let mut request = request.clone();
		request.last_zxid_seen = last_zxid;

		let start = self.next_server.load(Ordering::Relaxed);
		let mut last = None;
		for offset in 0..self.servers.len() {
			let index = (start + offset) % self.servers.len();
			let addr = &self.servers[index];
			match handshake(addr, &request, self.requested_timeout).await {
				Ok((reader, writer, response)) => {
					if response.is_expired() {
						return Err(Error::SessionExpired);
					}
					self.next_server.store(index, Ordering::Relaxed);
					{
						let mut credentials = self.credentials.lock();
						credentials.session_id = response.session_id;
						credentials.password = response.password;
						credentials.timeout = Duration::from_millis(response.timeout_ms as u64);
					}
					debug!(target: "zkreg.session", server = %addr, "handshake complete");
					return Ok((Arc::new(Connection::new(writer)), reader));
				}
				Err(err) => {
					debug!(target: "zkreg.session", server = %addr, error = %err, "handshake failed");
					last = Some(err);
				}
			}
		}

		Err(Error::NoServerReachable {
			servers: self.servers.join(","),
			last: last.map(|err| err.to_string()).unwrap_or_default(),
		})
	}

	fn resume_request(&self) -> ConnectRequest {
		let credentials = self.credentials.lock();
		ConnectRequest {
			protocol_version: 0,
			last_zxid_seen: 0,
			timeout_ms: millis(credentials.timeout),
			session_id: credentials.session_id,
			password: credentials.password.clone(),
			read_only: false,
		}
	}

	/// Re-handshakes until success, expiry, or the session timeout elapses.
	async fn reconnect(&self, last_zxid: i64) -> Result<(Link, FrameReader<OwnedReadHalf>)> {
		let deadline = Instant::now() + self.credentials.lock().timeout;
		let mut attempt = 0u32;
		loop {
			match self.establish(&self.resume_request(), last_zxid).await {
				Ok(established) => return Ok(established),
				Err(Error::SessionExpired) => return Err(Error::SessionExpired),
				Err(err) => {
					attempt += 1;
					let now = Instant::now();
					if now >= deadline {
						return Err(Error::SessionExpired);
					}
					warn!(target: "zkreg.session", attempt, error = %err, "reconnect attempt failed");
					tokio::time::sleep(RECONNECT_BACKOFF.min(deadline - now)).await;
				}
			}
		}
	}

	/// Drives one connection until it is lost or the session shuts down.
	///
	/// Returns `None` on shutdown, otherwise the reason the connection ended.
	async fn serve(&self, link: &Link, reader: FrameReader<OwnedReadHalf>) -> Option<String> {
		let timeout = self.credentials.lock().timeout;
		let ping_every = (timeout / 3).max(Duration::from_millis(10));
		let read_timeout = timeout * 2 / 3;

		let run = link.run(reader);
		tokio::pin!(run);
		let mut ticker = tokio::time::interval_at(Instant::now() + ping_every, ping_every);

		loop {
			tokio::select! {
				_ = self.shutdown.notified() => return None,
				result = &mut run => {
					return Some(match result {
						Ok(()) => "server closed the connection".to_string(),
						Err(err) => err.to_string(),
					});
				}
				_ = ticker.tick() => {
					if link.idle_for() > read_timeout {
						return Some(format!("no reply from server within {read_timeout:?}"));
					}
					if let Err(err) = link.ping().await {
						return Some(err.to_string());
					}
				}
			}
		}
	}
}

async fn supervise(shared: Arc<Shared>, mut link: Link, mut reader: FrameReader<OwnedReadHalf>) {
	loop {
		let Some(reason) = shared.serve(&link, reader).await else {
			return;
		};
		link.fail_pending();
		if shared.state.borrow().is_terminal() {
			return;
		}

		shared.link.write().take();
		shared.transition(SessionState::Disconnected);
		warn!(target: "zkreg.session", reason = %reason, "connection lost; reconnecting");

		let reconnected = tokio::select! {
			_ = shared.shutdown.notified() => return,
			result = shared.reconnect(link.last_zxid()) => result,
		};

		match reconnected {
			Ok((next_link, next_reader)) => {
				*shared.link.write() = Some(Arc::clone(&next_link));
				if !shared.transition(SessionState::Connected) {
					// Closed while the handshake was in flight.
					shared.link.write().take();
					next_link.shutdown().await;
					return;
				}
				info!(target: "zkreg.session", "session reconnected");
				link = next_link;
				reader = next_reader;
			}
			Err(err) => {
				shared.transition(SessionState::Expired);
				warn!(target: "zkreg.session", error = %err, "session expired");
				return;
			}
		}
	}
}

async fn handshake(
	addr: &str,
	request: &ConnectRequest,
	timeout: Duration,
) -> Result<(FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>, ConnectResponse)> {
	let attempt = async {
		let stream = TcpStream::connect(addr).await?;
		stream.set_nodelay(true)?;
		let (mut reader, mut writer) = transport::split(stream);
		writer.send(encode_frame(request)).await?;
		let frame = reader.recv().await?.ok_or(Error::ConnectionLoss)?;
		let response = ConnectResponse::decode(&mut Reader::new(frame))?;
		Ok::<_, Error>((reader, writer, response))
	};

	tokio::time::timeout(timeout, attempt)
		.await
		.map_err(|_| Error::Timeout(format!("handshake with {addr} after {timeout:?}")))?
}

/// Appends [`DEFAULT_PORT`] to a server given as a bare host.
pub fn with_default_port(server: &str) -> String {
	if server.contains(':') {
		server.to_string()
	} else {
		format!("{server}:{DEFAULT_PORT}")
	}
}

/// Session ids are conventionally shown in hex.
pub fn hex_id(session_id: i64) -> String {
	format!("{session_id:#x}")
}

fn millis(duration: Duration) -> i32 {
	duration.as_millis().min(i32::MAX as u128) as i32
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn terminal_states() {
		assert!(SessionState::Expired.is_terminal());
		assert!(SessionState::Closed.is_terminal());
		assert!(!SessionState::Disconnected.is_terminal());
		assert!(!SessionState::Connected.is_terminal());
	}

	#[test]
	fn bare_hosts_get_the_default_port() {
		assert_eq!(with_default_port("zk1"), "zk1:2181");
		assert_eq!(with_default_port("zk1:2888"), "zk1:2888");
		assert_eq!(with_default_port("10.0.0.7:2181"), "10.0.0.7:2181");
	}

	#[test]
	fn state_serializes_lowercase() {
		assert_eq!(serde_json::to_string(&SessionState::Disconnected).unwrap(), "\"disconnected\"");
	}

	#[test]
	fn millis_saturates() {
		assert_eq!(millis(Duration::from_secs(1)), 1000);
		assert_eq!(millis(Duration::from_secs(u64::MAX)), i32::MAX);
	}

	#[tokio::test]
	async fn empty_server_list_is_rejected() {
		let err = Session::connect(&[], Duration::from_secs(1)).await.unwrap_err();
		assert!(matches!(err, Error::NoServerReachable { .. }));
	}

	#[tokio::test]
	async fn unreachable_servers_report_the_last_failure() {
		let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
		let addr = listener.local_addr().unwrap().to_string();
		drop(listener);

		let err = Session::connect(&[addr.clone()], Duration::from_millis(500)).await.unwrap_err();
		match err {
			Error::NoServerReachable { servers, last } => {
				assert_eq!(servers, addr);
				assert!(!last.is_empty());
			}
			other => panic!("expected NoServerReachable, got {other:?}"),
		}
	}
}
