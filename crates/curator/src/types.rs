use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Declarative description of one program, expanded into one or more
/// supervised instances. Never mutated after load; a reload hands the
/// supervisor a fresh value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgramDefinition {
	pub name: String,
	pub command: String,
	#[serde(default = "default_process_name", rename = "process_name")]
	pub process_name_template: String,
	#[serde(default = "default_num_instances", rename = "numprocs")]
	pub num_instances: u32,
	#[serde(default, rename = "numprocs_start")]
	pub start_index: u32,
	#[serde(default = "default_true")]
	pub autostart: bool,
	#[serde(default = "default_start_retries")]
	pub start_retries: u32,
	#[serde(default)]
	pub restart_delay_secs: u64,
	#[serde(default = "default_stdout_log", rename = "stdout_logfile")]
	pub stdout_log_path_template: String,
	#[serde(default = "default_stderr_log", rename = "stderr_logfile")]
	pub stderr_log_path_template: String,

	// Carried to the launcher untouched.
	#[serde(default)]
	pub user: Option<String>,
	#[serde(default)]
	pub environment: HashMap<String, String>,
	#[serde(default)]
	pub directory: Option<PathBuf>,
	#[serde(default)]
	pub priority: i32,
	#[serde(default)]
	pub stop_signal: Option<String>,
	#[serde(default)]
	pub stop_wait_secs: u64,
	#[serde(default)]
	pub autorestart: bool,
	#[serde(default)]
	pub start_secs: u64,
	#[serde(default)]
	pub exit_codes: Vec<i32>,
	#[serde(default)]
	pub redirect_stderr: bool,
}

fn default_process_name() -> String {
	"{{base_name}}".into()
}
fn default_num_instances() -> u32 {
	1
}
fn default_true() -> bool {
	true
}
fn default_start_retries() -> u32 {
	3
}
fn default_stdout_log() -> String {
	"{{base_name}}-{{instance_index}}.out.log".into()
}
fn default_stderr_log() -> String {
	"{{base_name}}-{{instance_index}}.err.log".into()
}

impl ProgramDefinition {
	/// A definition with every optional field at its default.
	pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			command: command.into(),
			process_name_template: default_process_name(),
			num_instances: default_num_instances(),
			start_index: 0,
			autostart: true,
			start_retries: default_start_retries(),
			restart_delay_secs: 0,
			stdout_log_path_template: default_stdout_log(),
			stderr_log_path_template: default_stderr_log(),
			user: None,
			environment: HashMap::new(),
			directory: None,
			priority: 0,
			stop_signal: None,
			stop_wait_secs: 0,
			autorestart: false,
			start_secs: 0,
			exit_codes: Vec::new(),
			redirect_stderr: false,
		}
	}

	/// Metadata for every instance this definition asks for, in index order.
	pub fn instances(&self) -> impl Iterator<Item = InstanceMetadata> + '_ {
		(0..self.num_instances).map(move |offset| InstanceMetadata {
			instance_index: self.start_index + offset,
			base_name: self.name.clone(),
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceMetadata {
	pub instance_index: u32,
	pub base_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
	Stopped,
	Starting,
	Running,
	/// Never entered by the hard-kill stop path; kept so status consumers
	/// see the full state set.
	Stopping,
	Failed,
}

impl ProcessState {
	/// A monitor task may still own the record.
	pub fn is_live(&self) -> bool {
		matches!(self, ProcessState::Starting | ProcessState::Running | ProcessState::Stopping)
	}
}

impl std::fmt::Display for ProcessState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			ProcessState::Stopped => "STOPPED",
			ProcessState::Starting => "STARTING",
			ProcessState::Running => "RUNNING",
			ProcessState::Stopping => "STOPPING",
			ProcessState::Failed => "FAILED",
		};
		f.write_str(s)
	}
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Exit {
	Code(i32),
	Signal(i32),
}

impl Exit {
	pub fn success(&self) -> bool {
		matches!(self, Exit::Code(0))
	}
}

impl From<std::process::ExitStatus> for Exit {
	fn from(status: std::process::ExitStatus) -> Self {
		use std::os::unix::process::ExitStatusExt;
		match status.code() {
			Some(code) => Exit::Code(code),
			None => Exit::Signal(status.signal().unwrap_or(0)),
		}
	}
}

impl std::fmt::Display for Exit {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Exit::Code(code) => write!(f, "exit {}", code),
			Exit::Signal(sig) => write!(f, "signal {}", sig),
		}
	}
}

/// Point-in-time copy of a record, safe to hand to status consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessSnapshot {
	pub title: String,
	pub program: String,
	pub command: String,
	pub stdout_log: PathBuf,
	pub stderr_log: PathBuf,
	pub state: ProcessState,
	pub start_count: u32,
	pub terminated: bool,
	pub pid: Option<u32>,
	pub last_exit: Option<Exit>,
	pub last_error: Option<String>,
}
