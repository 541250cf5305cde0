//! Byte-stream transport between the driver and a responder
//!
//! The protocol is half-duplex in practice: each side blocks reading from
//! the other at a fixed point. Every write is therefore flushed before the
//! call returns.

use async_trait::async_trait;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{
	AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream,
	ReadHalf, WriteHalf,
};
use tokio::process::{ChildStdin, ChildStdout};

use super::error::ProtocolError;
use super::messages::{EOL, MAX_LINE_LEN};

/// Result type for transport operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Line and raw-byte operations over a bidirectional stream
#[async_trait]
pub trait Transport: Send {
	/// Write `line` followed by the line terminator and flush
	async fn send_line(&mut self, line: &str) -> ProtocolResult<()>;

	/// Read one line with its terminator and surrounding whitespace stripped.
	/// Returns `None` when the peer closed the stream.
	async fn read_line(&mut self) -> ProtocolResult<Option<String>>;

	/// Write raw bytes and flush
	async fn send_bytes(&mut self, data: &[u8]) -> ProtocolResult<()>;

	/// Read exactly `len` raw bytes
	async fn read_bytes(&mut self, len: usize) -> ProtocolResult<Vec<u8>>;
}

/// [`Transport`] over any buffered reader / writer pair
pub struct StreamTransport<R, W> {
	reader: R,
	writer: W,
	timeout: Option<Duration>,
}

/// Driver side of a spawned endpoint process
pub type ChildTransport = StreamTransport<BufReader<ChildStdout>, ChildStdin>;

/// Responder side, speaking over the process's own stdio
pub type StdioTransport = StreamTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

/// One end of an in-process loopback
pub type MemoryTransport = StreamTransport<BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>>;

impl<R, W> StreamTransport<R, W>
where
	R: AsyncBufRead + Unpin + Send,
	W: AsyncWrite + Unpin + Send,
{
	pub fn new(reader: R, writer: W) -> Self {
		Self { reader, writer, timeout: None }
	}

	/// Bound every read and write by `timeout` (`None` waits forever)
	pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn into_inner(self) -> (R, W) {
		(self.reader, self.writer)
	}
}

impl StdioTransport {
	pub fn stdio() -> Self {
		StreamTransport::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
	}
}

/// Two connected in-process transports, for tests and embedding
pub fn memory_pair(buffer: usize) -> (MemoryTransport, MemoryTransport) {
	let (a, b) = tokio::io::duplex(buffer);
	let (a_read, a_write) = tokio::io::split(a);
	let (b_read, b_write) = tokio::io::split(b);
	(
		StreamTransport::new(BufReader::new(a_read), a_write),
		StreamTransport::new(BufReader::new(b_read), b_write),
	)
}

async fn limited<F, T>(timeout: Option<Duration>, fut: F) -> ProtocolResult<T>
where
	F: Future<Output = io::Result<T>>,
{
	match timeout {
		Some(after) => match tokio::time::timeout(after, fut).await {
			Ok(res) => Ok(res?),
			Err(_) => Err(ProtocolError::Timeout(after)),
		},
		None => Ok(fut.await?),
	}
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
	R: AsyncBufRead + Unpin + Send,
	W: AsyncWrite + Unpin + Send,
{
	async fn send_line(&mut self, line: &str) -> ProtocolResult<()> {
		let mut buf = Vec::with_capacity(line.len() + EOL.len());
		buf.extend_from_slice(line.as_bytes());
		buf.extend_from_slice(EOL.as_bytes());

		let writer = &mut self.writer;
		limited(self.timeout, async move {
			writer.write_all(&buf).await?;
			writer.flush().await
		})
		.await
	}

	async fn read_line(&mut self) -> ProtocolResult<Option<String>> {
		let mut buf = Vec::new();
		let reader = &mut self.reader;
		let n = limited(self.timeout, async {
			(&mut *reader).take(MAX_LINE_LEN as u64).read_until(b'\n', &mut buf).await
		})
		.await?;

		if n == 0 {
			return Ok(None);
		}
		if buf.last() != Some(&b'\n') {
			if n >= MAX_LINE_LEN {
				return Err(ProtocolError::Malformed {
					expected: "line terminator",
					line: String::from_utf8_lossy(&buf).into_owned(),
				});
			}
			// Peer went away in the middle of a line
			return Err(ProtocolError::UnexpectedEof { expected: "line terminator" });
		}

		let line = String::from_utf8(buf).map_err(|e| ProtocolError::Malformed {
			expected: "ASCII line",
			line: String::from_utf8_lossy(e.as_bytes()).into_owned(),
		})?;
		Ok(Some(line.trim().to_string()))
	}

	async fn send_bytes(&mut self, data: &[u8]) -> ProtocolResult<()> {
		let writer = &mut self.writer;
		limited(self.timeout, async move {
			writer.write_all(data).await?;
			writer.flush().await
		})
		.await
	}

	async fn read_bytes(&mut self, len: usize) -> ProtocolResult<Vec<u8>> {
		let mut buf = vec![0u8; len];
		let reader = &mut self.reader;
		let res = limited(self.timeout, async { reader.read_exact(&mut buf).await }).await;
		match res {
			Ok(_) => Ok(buf),
			Err(ProtocolError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
				Err(ProtocolError::UnexpectedEof { expected: "block data" })
			}
			Err(e) => Err(e),
		}
	}
}


// vim: ts=4
