use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

use crate::capture;
use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::launcher::{LaunchRequest, Launched, Launcher, OsLauncher};
use crate::record::ProcessRecord;
use crate::table::ProcessTable;
use crate::template::{TemplateError, TemplateExpander};
use crate::types::*;

pub struct Supervisor {
	table: ProcessTable,
	programs: RwLock<HashMap<String, Arc<ProgramDefinition>>>,
	launcher: Arc<dyn Launcher>,
	expander: TemplateExpander,
	config: SupervisorConfig,
}

/// What one `load` did, per instance.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadReport {
	/// Titles that got a new record.
	pub instantiated: Vec<String>,
	/// Titles that were already in the table and were left alone.
	pub existing: Vec<String>,
	/// Instance indexes whose templates did not expand.
	pub failed: Vec<(u32, TemplateError)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
	Started,
	AlreadyRunning,
	NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
	Stopped,
	AlreadyStopped,
	NotFound,
}

/// Fixed inputs of one supervision cycle.
struct CycleInputs {
	title: String,
	cycle: u64,
	command: String,
	stdout_log: PathBuf,
	stderr_log: PathBuf,
	def: Arc<ProgramDefinition>,
}

impl Supervisor {
	pub fn new(config: SupervisorConfig) -> Arc<Self> {
		Self::with_launcher(config, Arc::new(OsLauncher))
	}

	pub fn with_launcher(config: SupervisorConfig, launcher: Arc<dyn Launcher>) -> Arc<Self> {
		Arc::new(Self {
			table: ProcessTable::new(),
			programs: RwLock::new(HashMap::new()),
			launcher,
			expander: TemplateExpander::new(config.unknown_placeholders),
			config,
		})
	}

	/// Register a definition and instantiate every instance whose title is
	/// not in the table yet. New instances are started when `autostart` is set;
	/// existing ones are never touched.
	pub async fn load(self: &Arc<Self>, definition: ProgramDefinition) -> LoadReport {
		let def = Arc::new(definition);
		self.programs
			.write()
			.await
			.insert(def.name.clone(), Arc::clone(&def));

		let mut report = LoadReport::default();
		for meta in def.instances() {
			let record = match self.instantiate(&def, &meta) {
				Ok(r) => r,
				Err(e) => {
					tracing::warn!(
						"{}[{}]: not instantiated: {}",
						def.name,
						meta.instance_index,
						e
					);
					report.failed.push((meta.instance_index, e));
					continue;
				}
			};

			let title = record.title.clone();
			if !self.table.insert_if_absent(record).await {
				tracing::info!("{}: already loaded, leaving as is", title);
				report.existing.push(title);
				continue;
			}

			tracing::info!("{}: loaded from program {}", title, def.name);
			if def.autostart {
				self.start(&title).await;
			}
			report.instantiated.push(title);
		}
		report
	}

	/// Load every definition again. Only titles that are new get records.
	pub async fn reload(
		self: &Arc<Self>,
		definitions: Vec<ProgramDefinition>,
	) -> Vec<(String, LoadReport)> {
		let mut reports = Vec::with_capacity(definitions.len());
		for def in definitions {
			let name = def.name.clone();
			let report = self.load(def).await;
			reports.push((name, report));
		}
		reports
	}

	fn instantiate(
		&self,
		def: &ProgramDefinition,
		meta: &InstanceMetadata,
	) -> Result<ProcessRecord, TemplateError> {
		let title = self.expander.expand(&def.process_name_template, meta)?;
		let command = self.expander.expand(&def.command, meta)?;
		let stdout = self.expander.expand(&def.stdout_log_path_template, meta)?;
		let stderr = self.expander.expand(&def.stderr_log_path_template, meta)?;
		let log_dir = self.config.log_dir.as_deref();
		Ok(ProcessRecord::new(
			title,
			def.name.clone(),
			command,
			capture::resolve_log_path(log_dir, &stdout),
			capture::resolve_log_path(log_dir, &stderr),
		))
	}

	/// Begin a new supervision cycle for `title` and return at once.
	/// A record that still has a live process is left alone.
	pub async fn start(self: &Arc<Self>, title: &str) -> StartOutcome {
		let begun = self
			.table
			.update(title, |r| {
				if r.state.is_live() {
					None
				} else {
					Some(r.begin_cycle())
				}
			})
			.await;

		match begun {
			None => {
				tracing::debug!("start {}: no such process", title);
				StartOutcome::NotFound
			}
			Some(None) => {
				tracing::info!("{}: already running", title);
				StartOutcome::AlreadyRunning
			}
			Some(Some((cycle, cancel))) => {
				let sup = Arc::clone(self);
				let title = title.to_string();
				tokio::spawn(async move {
					sup.supervise(title, cycle, cancel).await;
				});
				StartOutcome::Started
			}
		}
	}

	/// Stop `title`: flag its cycle as terminated, mark it stopped and
	/// hard-kill the process if one is up.
	pub async fn stop(&self, title: &str) -> StopOutcome {
		let taken = self
			.table
			.update(title, |r| {
				if r.state == ProcessState::Stopped && !r.has_active_cycle() {
					None
				} else {
					Some(r.terminate())
				}
			})
			.await;

		match taken {
			None => {
				tracing::debug!("stop {}: no such process", title);
				StopOutcome::NotFound
			}
			Some(None) => {
				tracing::info!("{}: already stopped", title);
				StopOutcome::AlreadyStopped
			}
			Some(Some(handle)) => {
				if let Some(handle) = handle {
					if let Err(e) = handle.kill() {
						tracing::warn!("{}: kill failed: {}", title, e);
					}
				}
				tracing::info!("{}: stopped", title);
				StopOutcome::Stopped
			}
		}
	}

	pub async fn stop_all(&self) {
		for title in self.table.titles().await {
			self.stop(&title).await;
		}
	}

	pub async fn get(&self, title: &str) -> Option<ProcessSnapshot> {
		self.table.get(title).await
	}

	pub async fn list(&self) -> Vec<ProcessSnapshot> {
		self.table.list().await
	}

	pub async fn list_status(&self) -> BTreeMap<String, ProcessState> {
		self.table
			.list()
			.await
			.into_iter()
			.map(|s| (s.title, s.state))
			.collect()
	}

	pub async fn program(&self, name: &str) -> Option<Arc<ProgramDefinition>> {
		self.programs.read().await.get(name).cloned()
	}

	/// Evict a record that has no active supervision cycle.
	pub async fn remove(&self, title: &str) -> Result<ProcessSnapshot, String> {
		let busy = self
			.table
			.update(title, |r| r.state.is_live() || r.has_active_cycle())
			.await
			.ok_or_else(|| format!("{}: not found", title))?;
		if busy {
			return Err(format!("{}: still supervised, stop it first", title));
		}
		self.table
			.remove(title)
			.await
			.map(|r| r.snapshot())
			.ok_or_else(|| format!("{}: not found", title))
	}

	async fn supervise(self: Arc<Self>, title: String, cycle: u64, mut cancel: watch::Receiver<bool>) {
		let fixed = self
			.table
			.update_cycle(&title, cycle, |r| {
				(
					r.program_name.clone(),
					r.command.clone(),
					r.stdout_log_path.clone(),
					r.stderr_log_path.clone(),
				)
			})
			.await;
		let Some((program, command, stdout_log, stderr_log)) = fixed else {
			return;
		};

		let def = self.program(&program).await;
		let Some(def) = def else {
			self.finish(&title, cycle, 0, 0, Some(SupervisorError::UnknownProgram(program)))
				.await;
			return;
		};

		let inputs = CycleInputs {
			title,
			cycle,
			command,
			stdout_log,
			stderr_log,
			def,
		};
		let retries = inputs.def.start_retries;
		let mut attempts = 0;
		let mut failure = None;

		while attempts < retries && !is_cancelled(&cancel) {
			attempts += 1;
			if let Err(e) = self.attempt(&inputs, attempts, &cancel).await {
				tracing::error!("{}: {}", inputs.title, e);
				failure = Some(e);
				break;
			}

			let delay = inputs.def.restart_delay_secs;
			if attempts < retries && delay > 0 && !is_cancelled(&cancel) {
				tokio::select! {
					_ = tokio::time::sleep(Duration::from_secs(delay)) => {}
					_ = cancel.changed() => {}
				}
			}
		}

		self.finish(&inputs.title, cycle, attempts, retries, failure).await;
	}

	/// One spawn attempt: open logs, launch, capture output, wait for exit.
	async fn attempt(
		&self,
		inputs: &CycleInputs,
		attempt: u32,
		cancel: &watch::Receiver<bool>,
	) -> Result<(), SupervisorError> {
		let title = inputs.title.as_str();
		self.table
			.update_cycle(title, inputs.cycle, |r| {
				r.start_count = attempt;
				if !r.terminated {
					r.state = ProcessState::Starting;
				}
			})
			.await;
		tracing::info!(
			"{}: starting (attempt {}/{})",
			title,
			attempt,
			inputs.def.start_retries
		);

		let mode = self.config.log_mode;
		let stdout_file = capture::open_log(&inputs.stdout_log, mode).await?;
		let stderr_file = capture::open_log(&inputs.stderr_log, mode).await?;

		let request = LaunchRequest {
			title,
			command: &inputs.command,
			definition: &inputs.def,
		};
		let Launched {
			handle,
			stdout,
			stderr,
			exit,
		} = self.launcher.launch(&request).map_err(SupervisorError::Launch)?;

		let chunk = self.config.read_chunk_bytes;
		let mut flushers = Vec::with_capacity(2);
		if let Some(pipe) = stdout {
			flushers.push(capture::capture_stream(pipe, stdout_file, inputs.stdout_log.clone(), chunk));
		}
		if let Some(pipe) = stderr {
			flushers.push(capture::capture_stream(pipe, stderr_file, inputs.stderr_log.clone(), chunk));
		}

		let published = self
			.table
			.update_cycle(title, inputs.cycle, |r| {
				if r.terminated {
					return false;
				}
				r.state = ProcessState::Running;
				r.os_handle = Some(Arc::clone(&handle));
				true
			})
			.await
			.unwrap_or(false);
		match handle.pid() {
			Some(pid) => tracing::info!("{}: running (pid {})", title, pid),
			None => tracing::info!("{}: running", title),
		}

		// Stopped or superseded while the process was coming up.
		if !published || is_cancelled(cancel) {
			if let Err(e) = handle.kill() {
				tracing::warn!("{}: kill failed: {}", title, e);
			}
		}

		// The process is reaped once `exit` resolves; publish that before
		// waiting on the flush tasks, which a grandchild may hold open.
		let status = exit.await;
		self.table
			.update_cycle(title, inputs.cycle, |r| {
				r.os_handle = None;
				r.state = ProcessState::Stopped;
				if let Ok(exit) = &status {
					r.last_exit = Some(*exit);
				}
			})
			.await;
		match &status {
			Ok(exit) if exit.success() => tracing::info!("{}: exited cleanly", title),
			Ok(exit) => tracing::warn!("{}: exited with {}", title, exit),
			Err(_) => {}
		}

		// Drained before the next attempt reopens the logs.
		capture::drain(flushers, self.config.drain_timeout()).await;
		status.map(|_| ()).map_err(SupervisorError::Wait)
	}

	/// Settle the record's state once the retry loop is over.
	async fn finish(
		&self,
		title: &str,
		cycle: u64,
		attempts: u32,
		retries: u32,
		failure: Option<SupervisorError>,
	) {
		let settled = self
			.table
			.update_cycle(title, cycle, |r| {
				r.os_handle = None;
				r.cancel = None;
				if let Some(e) = &failure {
					r.state = ProcessState::Failed;
					r.last_error = Some(e.to_string());
				}
				if attempts >= retries {
					r.state = ProcessState::Failed;
				}
				if r.terminated {
					r.state = ProcessState::Stopped;
				}
				r.state
			})
			.await;

		match settled {
			Some(ProcessState::Failed) if failure.is_none() => {
				tracing::warn!("{}: failed after {} attempts", title, attempts)
			}
			Some(ProcessState::Failed) => tracing::warn!("{}: failed", title),
			Some(state) => tracing::info!("{}: supervision ended ({})", title, state),
			None => tracing::debug!("{}: cycle {} superseded", title, cycle),
		}
	}
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
	*cancel.borrow()
}
