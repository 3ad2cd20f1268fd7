use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use crate::launcher::ProcessHandle;
use crate::types::{Exit, ProcessSnapshot, ProcessState};

/// Runtime state of one supervised instance. Lives inside the process table
/// and is only changed through the table's API.
pub struct ProcessRecord {
	pub title: String,
	pub program_name: String,
	pub command: String,
	pub stdout_log_path: PathBuf,
	pub stderr_log_path: PathBuf,
	pub state: ProcessState,
	pub start_count: u32,
	pub terminated: bool,
	pub os_handle: Option<Arc<dyn ProcessHandle>>,
	pub last_exit: Option<Exit>,
	pub last_error: Option<String>,
	/// Bumped by every `start`; a monitor only writes while its cycle is current.
	pub cycle: u64,
	pub(crate) cancel: Option<watch::Sender<bool>>,
}

impl ProcessRecord {
	pub fn new(
		title: String,
		program_name: String,
		command: String,
		stdout_log_path: PathBuf,
		stderr_log_path: PathBuf,
	) -> Self {
		Self {
			title,
			program_name,
			command,
			stdout_log_path,
			stderr_log_path,
			state: ProcessState::Stopped,
			start_count: 0,
			terminated: false,
			os_handle: None,
			last_exit: None,
			last_error: None,
			cycle: 0,
			cancel: None,
		}
	}

	/// Open a new supervision cycle and return its number and cancel flag.
	pub(crate) fn begin_cycle(&mut self) -> (u64, watch::Receiver<bool>) {
		let (tx, rx) = watch::channel(false);
		if let Some(previous) = self.cancel.take() {
			previous.send_replace(true);
		}
		self.cycle += 1;
		self.start_count = 0;
		self.terminated = false;
		self.last_error = None;
		self.cancel = Some(tx);
		(self.cycle, rx)
	}

	/// A monitor task is working this record and has not been told to stop.
	pub fn has_active_cycle(&self) -> bool {
		self.cancel.as_ref().is_some_and(|c| !*c.borrow())
	}

	/// Flag the current cycle as terminated and take the OS handle.
	pub(crate) fn terminate(&mut self) -> Option<Arc<dyn ProcessHandle>> {
		self.terminated = true;
		self.state = ProcessState::Stopped;
		if let Some(cancel) = &self.cancel {
			cancel.send_replace(true);
		}
		self.os_handle.take()
	}

	pub fn snapshot(&self) -> ProcessSnapshot {
		ProcessSnapshot {
			title: self.title.clone(),
			program: self.program_name.clone(),
			command: self.command.clone(),
			stdout_log: self.stdout_log_path.clone(),
			stderr_log: self.stderr_log_path.clone(),
			state: self.state,
			start_count: self.start_count,
			terminated: self.terminated,
			pid: self.os_handle.as_ref().and_then(|h| h.pid()),
			last_exit: self.last_exit,
			last_error: self.last_error.clone(),
		}
	}
}

impl std::fmt::Debug for ProcessRecord {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ProcessRecord")
			.field("title", &self.title)
			.field("program_name", &self.program_name)
			.field("state", &self.state)
			.field("start_count", &self.start_count)
			.field("terminated", &self.terminated)
			.field("cycle", &self.cycle)
			.finish_non_exhaustive()
	}
}
