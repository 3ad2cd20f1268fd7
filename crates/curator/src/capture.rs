use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;

use crate::error::SupervisorError;
use crate::relay::{self, RelayReader, RelayWriter};

const PIPE_CHUNK: usize = 4096;

/// What happens to an existing log file when an attempt opens it.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogMode {
	#[default]
	Append,
	Truncate,
}

/// Resolve a relative log path against the configured log directory.
pub fn resolve_log_path(log_dir: Option<&Path>, expanded: &str) -> PathBuf {
	let path = PathBuf::from(expanded);
	match log_dir {
		Some(dir) if path.is_relative() => dir.join(path),
		_ => path,
	}
}

pub async fn open_log(path: &Path, mode: LogMode) -> Result<File, SupervisorError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		tokio::fs::create_dir_all(parent)
			.await
			.map_err(|source| SupervisorError::LogOpen {
				path: path.to_path_buf(),
				source,
			})?;
	}

	let mut options = OpenOptions::new();
	options.create(true).write(true);
	match mode {
		LogMode::Append => options.append(true),
		LogMode::Truncate => options.truncate(true),
	};
	options.open(path).await.map_err(|source| SupervisorError::LogOpen {
		path: path.to_path_buf(),
		source,
	})
}

/// Wire one output pipe to one log file through a relay. Returns the flush
/// task; it finishes once the pipe hits end-of-file and everything is written.
pub fn capture_stream<R>(pipe: R, file: File, path: PathBuf, read_chunk: usize) -> JoinHandle<()>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	let (writer, reader) = relay::channel();
	tokio::spawn(pump(pipe, writer));
	tokio::spawn(flush_stream(reader, file, path, read_chunk.max(1)))
}

async fn pump<R: AsyncRead + Unpin>(mut pipe: R, writer: RelayWriter) {
	let mut buf = [0u8; PIPE_CHUNK];
	loop {
		match pipe.read(&mut buf).await {
			Ok(0) => break,
			Ok(n) => {
				writer.write(&buf[..n]);
			}
			Err(e) => {
				tracing::debug!("pipe read error: {}", e);
				break;
			}
		}
	}
	writer.close();
}

async fn flush_stream(mut reader: RelayReader, mut file: File, path: PathBuf, read_chunk: usize) {
	let mut failed = false;
	loop {
		let chunk = reader.read(read_chunk).await;
		if !chunk.bytes.is_empty() && !failed {
			let written = async {
				file.write_all(&chunk.bytes).await?;
				file.flush().await
			}
			.await;
			if let Err(e) = written {
				// Keep draining so the pipe never backs up into the child.
				tracing::warn!("writing {} failed: {}", path.display(), e);
				failed = true;
			}
		}
		if chunk.eof {
			return;
		}
	}
}

/// Wait for flush tasks, giving up after `timeout`. A grandchild that kept a
/// pipe open must not pin the monitor forever.
pub async fn drain(tasks: Vec<JoinHandle<()>>, timeout: Duration) {
	for task in tasks {
		match tokio::time::timeout(timeout, task).await {
			Ok(_) => {}
			Err(_) => tracing::warn!("log flush still running after {:?}, detaching", timeout),
		}
	}
}
