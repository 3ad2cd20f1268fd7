//! OS process control: spawn with piped output, wait, kill.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::process::Command;

use crate::types::{Exit, ProgramDefinition};

pub type OutputPipe = Box<dyn AsyncRead + Send + Unpin>;
pub type ExitFuture = Pin<Box<dyn Future<Output = io::Result<Exit>> + Send>>;

/// What the monitor hands to the launcher for one attempt.
pub struct LaunchRequest<'a> {
	pub title: &'a str,
	pub command: &'a str,
	pub definition: &'a ProgramDefinition,
}

/// A started process. `exit` resolves once the process is gone.
pub struct Launched {
	pub handle: Arc<dyn ProcessHandle>,
	pub stdout: Option<OutputPipe>,
	pub stderr: Option<OutputPipe>,
	pub exit: ExitFuture,
}

/// The part of a running process a record keeps: enough to report and kill it.
pub trait ProcessHandle: Send + Sync {
	fn pid(&self) -> Option<u32>;
	fn kill(&self) -> io::Result<()>;
}

pub trait Launcher: Send + Sync + 'static {
	fn launch(&self, request: &LaunchRequest<'_>) -> io::Result<Launched>;
}

/// Runs commands through `sh -c` in their own process group.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLauncher;

impl Launcher for OsLauncher {
	fn launch(&self, request: &LaunchRequest<'_>) -> io::Result<Launched> {
		let def = request.definition;
		let mut cmd = Command::new("sh");
		cmd.args(["-c", request.command])
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.process_group(0);

		if let Some(dir) = &def.directory {
			cmd.current_dir(dir);
		}
		for (key, val) in &def.environment {
			cmd.env(key, val);
		}

		let mut child = cmd.spawn().map_err(|e| {
			tracing::warn!("{}: spawn of `{}` failed: {}", request.title, request.command, e);
			e
		})?;
		let pid = child.id();
		tracing::debug!("{}: spawned sh -c `{}` (pid {:?})", request.title, request.command, pid);
		let stdout = child.stdout.take().map(|s| Box::new(s) as OutputPipe);
		let stderr = child.stderr.take().map(|s| Box::new(s) as OutputPipe);
		let exit = Box::pin(async move { child.wait().await.map(Exit::from) });

		Ok(Launched {
			handle: Arc::new(OsProcess { pid }),
			stdout,
			stderr,
			exit,
		})
	}
}

struct OsProcess {
	pid: Option<u32>,
}

impl ProcessHandle for OsProcess {
	fn pid(&self) -> Option<u32> {
		self.pid
	}

	fn kill(&self) -> io::Result<()> {
		use nix::sys::signal::{killpg, Signal};
		use nix::unistd::Pid;
		let Some(pid) = self.pid else {
			return Ok(());
		};
		killpg(Pid::from_raw(pid as i32), Signal::SIGKILL).map_err(io::Error::from)
	}
}
