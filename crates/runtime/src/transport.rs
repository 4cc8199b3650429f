//! Length-prefixed framing over a byte stream.
//!
//! Every message to and from the server is a 4-byte big-endian length followed
//! by the payload. The reader and writer halves are split so the connection can
//! keep one task blocked on reads while requests are written concurrently.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use zkreg_protocol::codec::frame_len;

use crate::error::Result;

/// Read half: yields one payload per frame.
pub struct FrameReader<R> {
	inner: R,
}

impl<R> FrameReader<R>
where
	R: AsyncRead + Unpin,
{
	pub fn new(inner: R) -> Self {
		Self { inner }
	}

	/// Reads the next frame payload.
	///
	/// Returns `Ok(None)` when the peer closes the stream on a frame boundary;
	/// a close in the middle of a frame is an `UnexpectedEof` io error.
	pub async fn recv(&mut self) -> Result<Option<Bytes>> {
		let mut prefix = [0u8; 4];
		let first = self.inner.read(&mut prefix).await?;
		if first == 0 {
			return Ok(None);
		}
		if first < prefix.len() {
			self.inner.read_exact(&mut prefix[first..]).await?;
		}

		let len = frame_len(prefix)?;
		let mut payload = BytesMut::zeroed(len);
		self.inner.read_exact(&mut payload).await?;
		Ok(Some(payload.freeze()))
	}
}

/// Write half: sends pre-encoded frames.
pub struct FrameWriter<W> {
	inner: W,
}

impl<W> FrameWriter<W>
where
	W: AsyncWrite + Unpin,
{
	pub fn new(inner: W) -> Self {
		Self { inner }
	}

	/// Writes a complete frame (length prefix included) and flushes it.
	pub async fn send(&mut self, frame: Bytes) -> Result<()> {
		self.inner.write_all(&frame).await?;
		self.inner.flush().await?;
		Ok(())
	}

	/// Shuts down the write direction, signalling EOF to the peer.
	pub async fn shutdown(&mut self) -> Result<()> {
		self.inner.shutdown().await?;
		Ok(())
	}
}

/// Splits a TCP stream into framed halves.
pub fn split(stream: TcpStream) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
	let (read, write) = stream.into_split();
	(FrameReader::new(read), FrameWriter::new(write))
}
