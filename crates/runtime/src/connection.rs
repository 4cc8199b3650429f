//! Request/reply correlation for one server connection.
//!
//! The server answers requests of a session in order, but replies are still
//! matched by xid so pipelined callers each receive their own result:
//!
//! 1. `request()` allocates an xid and parks a oneshot sender under it
//! 2. The request header and body are framed and written
//! 3. `run()` reads reply frames and decodes the reply header
//! 4. The parked sender for that xid receives the body or the server error
//!
//! Pings (xid `-2`) and watch notifications (xid `-1`) are consumed by the read
//! loop without a parked sender. When the read loop ends, every parked request
//! fails with [`Error::ConnectionLoss`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, trace, warn};
use zkreg_protocol::{
	AUTH_XID, Decode, Encode, ErrorCode, OpCode, PING_XID, Reader, ReplyHeader, RequestHeader, SET_WATCHES_XID, WATCH_XID, WatcherEvent,
	encode_frame,
};

use crate::error::{Error, Result};
use crate::transport::{FrameReader, FrameWriter};

struct Pending {
	op: OpCode,
	tx: oneshot::Sender<Result<Bytes>>,
}

/// Parked requests; once `closed` is set nothing new is parked.
#[derive(Default)]
struct InFlight {
	closed: bool,
	requests: HashMap<i32, Pending>,
}

/// One live connection to a coordination server.
pub struct Connection<W> {
	last_xid: AtomicI32,
	pending: Mutex<InFlight>,
	writer: AsyncMutex<FrameWriter<W>>,
	last_zxid: AtomicI64,
	last_recv: Mutex<Instant>,
}

impl<W> Connection<W>
where
	W: AsyncWrite + Unpin + Send,
{
	pub fn new(writer: FrameWriter<W>) -> Self {
		Self {
			last_xid: AtomicI32::new(0),
			pending: Mutex::new(InFlight::default()),
			writer: AsyncMutex::new(writer),
			last_zxid: AtomicI64::new(0),
			last_recv: Mutex::new(Instant::now()),
		}
	}

	fn next_xid(&self) -> i32 {
		// Wraps back to 1 so the reserved negative xids are never handed out.
		let xid = self.last_xid.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
		if xid <= 0 {
			self.last_xid.store(1, Ordering::Relaxed);
			return 1;
		}
		xid
	}

	/// Sends `op` with `body` and waits for the matching reply body.
	///
	/// A non-zero result code in the reply header becomes [`Error::Server`].
	pub async fn request<B>(&self, op: OpCode, body: &B) -> Result<Bytes>
	where
		B: Encode + ?Sized,
	{
		let xid = self.next_xid();
		let (tx, rx) = oneshot::channel();
		{
			let mut pending = self.pending.lock();
			if pending.closed {
				return Err(Error::ConnectionLoss);
			}
			pending.requests.insert(xid, Pending { op, tx });
		}

		let frame = encode_frame(&(RequestHeader { xid, op: op.as_i32() }, body));
		trace!(target: "zkreg.connection", xid, %op, len = frame.len(), "sending request");
		if let Err(err) = self.writer.lock().await.send(frame).await {
			self.pending.lock().requests.remove(&xid);
			return Err(err);
		}

		rx.await.map_err(|_| Error::ConnectionLoss).and_then(|result| result)
	}

	/// Writes a keep-alive ping; its reply is consumed by the read loop.
	pub async fn ping(&self) -> Result<()> {
		let frame = encode_frame(&RequestHeader {
			xid: PING_XID,
			op: OpCode::Ping.as_i32(),
		});
		self.writer.lock().await.send(frame).await
	}

	/// Reads replies until the server closes the stream or a read fails.
	pub async fn run<R>(&self, mut reader: FrameReader<R>) -> Result<()>
	where
		R: AsyncRead + Unpin,
	{
		let outcome = loop {
			match reader.recv().await {
				Ok(Some(frame)) => {
					*self.last_recv.lock() = Instant::now();
					if let Err(err) = self.dispatch(frame) {
						warn!(target: "zkreg.connection", error = %err, "dropping unreadable reply");
					}
				}
				Ok(None) => break Ok(()),
				Err(err) => break Err(err),
			}
		};

		self.fail_pending();
		debug!(target: "zkreg.connection", "read loop ended");
		outcome
	}

	fn dispatch(&self, frame: Bytes) -> Result<()> {
		let mut reader = Reader::new(frame);
		let header = ReplyHeader::decode(&mut reader)?;
		if header.zxid > 0 {
			self.last_zxid.fetch_max(header.zxid, Ordering::AcqRel);
		}

		match header.xid {
			PING_XID => {
				trace!(target: "zkreg.connection", "ping reply");
				Ok(())
			}
			WATCH_XID => {
				let event = WatcherEvent::decode(&mut reader)?;
				debug!(
					target: "zkreg.connection",
					event_type = event.event_type,
					state = event.state,
					path = %event.path,
					"watch notification"
				);
				Ok(())
			}
			AUTH_XID | SET_WATCHES_XID => {
				debug!(target: "zkreg.connection", xid = header.xid, err = header.err, "control reply");
				Ok(())
			}
			xid => {
				let pending = self
					.pending
					.lock()
					.requests
					.remove(&xid)
					.ok_or_else(|| Error::Protocol(format!("no pending request for xid {xid}")))?;

				let code = ErrorCode::from_i32(header.err);
				let result = if code.is_ok() {
					Ok(reader.into_rest())
				} else {
					Err(Error::Server { op: pending.op, code })
				};
				trace!(target: "zkreg.connection", xid, op = %pending.op, err = header.err, "reply");

				// The caller may have given up waiting.
				let _ = pending.tx.send(result);
				Ok(())
			}
		}
	}

	/// Fails every in-flight request and refuses new ones.
	pub fn fail_pending(&self) {
		let drained: Vec<Pending> = {
			let mut pending = self.pending.lock();
			pending.closed = true;
			pending.requests.drain().map(|(_, pending)| pending).collect()
		};
		for pending in drained {
			let _ = pending.tx.send(Err(Error::ConnectionLoss));
		}
	}

	/// Closes the write half after failing in-flight requests.
	pub async fn shutdown(&self) {
		self.fail_pending();
		if let Err(err) = self.writer.lock().await.shutdown().await {
			debug!(target: "zkreg.connection", error = %err, "shutdown of write half failed");
		}
	}

	/// Time since the last frame arrived from the server.
	pub fn idle_for(&self) -> Duration {
		self.last_recv.lock().elapsed()
	}

	/// Highest transaction id observed in any reply.
	pub fn last_zxid(&self) -> i64 {
		self.last_zxid.load(Ordering::Acquire)
	}

	pub fn pending_count(&self) -> usize {
		self.pending.lock().requests.len()
	}
}
