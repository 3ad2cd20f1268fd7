//! Blocking byte relay between a child's output pipe and its log writer.
//!
//! One control task owns the buffer. The writer pushes chunks without ever
//! waiting; the reader asks for up to `capacity` bytes and is parked until
//! data shows up or the writer signals end-of-stream. All buffer access goes
//! through that task, so there is no lock around the bytes.

use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};

/// Result of one [`RelayReader::read`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Chunk {
	pub bytes: Vec<u8>,
	/// Set only when the writer has closed and every byte has been handed out.
	pub eof: bool,
}

enum WriteMsg {
	Data(Vec<u8>),
	Close,
}

struct ReadRequest {
	capacity: usize,
	reply: oneshot::Sender<Chunk>,
}

/// Producer half. Not `Clone`: there is exactly one writer per relay.
/// Closing consumes the writer, so nothing can be written after end-of-stream.
pub struct RelayWriter {
	tx: mpsc::UnboundedSender<WriteMsg>,
}

/// Consumer half. Reads take `&mut self`, so at most one read is pending.
pub struct RelayReader {
	tx: mpsc::Sender<ReadRequest>,
}

/// Create a relay and spawn its control task on the current runtime.
pub fn channel() -> (RelayWriter, RelayReader) {
	let (write_tx, write_rx) = mpsc::unbounded_channel();
	let (read_tx, read_rx) = mpsc::channel(1);
	tokio::spawn(control_loop(write_rx, read_rx));
	(RelayWriter { tx: write_tx }, RelayReader { tx: read_tx })
}

impl RelayWriter {
	/// Queue `data` for the reader. Always accepts every byte.
	pub fn write(&self, data: &[u8]) -> usize {
		if data.is_empty() {
			return 0;
		}
		if self.tx.send(WriteMsg::Data(data.to_vec())).is_err() {
			tracing::trace!("relay reader gone, dropping {} bytes", data.len());
		}
		data.len()
	}

	/// Signal end-of-stream.
	pub fn close(self) {
		// Drop sends Close.
	}
}

impl Drop for RelayWriter {
	fn drop(&mut self) {
		let _ = self.tx.send(WriteMsg::Close);
	}
}

impl RelayReader {
	/// Take up to `capacity` buffered bytes, waiting if none are buffered.
	/// Returns an empty chunk with `eof` once the writer has closed and
	/// everything written has been handed out.
	pub async fn read(&mut self, capacity: usize) -> Chunk {
		let (reply, rx) = oneshot::channel();
		let request = ReadRequest { capacity, reply };
		if self.tx.send(request).await.is_err() {
			return Chunk {
				bytes: Vec::new(),
				eof: true,
			};
		}
		rx.await.unwrap_or(Chunk {
			bytes: Vec::new(),
			eof: true,
		})
	}

	/// Read until end-of-stream, concatenating everything.
	pub async fn read_to_end(&mut self, capacity: usize) -> Vec<u8> {
		let mut out = Vec::new();
		loop {
			let chunk = self.read(capacity).await;
			out.extend_from_slice(&chunk.bytes);
			if chunk.eof {
				return out;
			}
		}
	}
}

async fn control_loop(
	mut write_rx: mpsc::UnboundedReceiver<WriteMsg>,
	mut read_rx: mpsc::Receiver<ReadRequest>,
) {
	let mut buf: VecDeque<u8> = VecDeque::new();
	let mut closed = false;

	loop {
		tokio::select! {
			req = read_rx.recv() => {
				let Some(req) = req else {
					return;
				};
				// Park the reader until the buffer fills or the writer closes.
				while buf.is_empty() && !closed {
					match write_rx.recv().await {
						Some(WriteMsg::Data(data)) => buf.extend(data),
						Some(WriteMsg::Close) | None => closed = true,
					}
				}
				let n = req.capacity.min(buf.len());
				let bytes: Vec<u8> = buf.drain(..n).collect();
				// End-of-stream only once every written byte has been handed out.
				let eof = bytes.is_empty() && buf.is_empty() && closed;
				// A cancelled read hands its bytes back to the front of the buffer.
				if let Err(unsent) = req.reply.send(Chunk { bytes, eof }) {
					for byte in unsent.bytes.into_iter().rev() {
						buf.push_front(byte);
					}
				}
			}
			msg = write_rx.recv(), if !closed => {
				match msg {
					Some(WriteMsg::Data(data)) => buf.extend(data),
					Some(WriteMsg::Close) | None => closed = true,
				}
			}
		}
	}
}
