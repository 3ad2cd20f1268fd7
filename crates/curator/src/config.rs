use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::LogMode;
use crate::template::UnknownPlaceholders;
use crate::types::ProgramDefinition;

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
	/// Base directory for relative log paths.
	pub log_dir: Option<PathBuf>,
	#[serde(default)]
	pub log_mode: LogMode,
	#[serde(default)]
	pub unknown_placeholders: UnknownPlaceholders,
	#[serde(default = "default_read_chunk")]
	pub read_chunk_bytes: usize,
	#[serde(default = "default_drain_timeout")]
	pub drain_timeout_ms: u64,
}

impl Default for SupervisorConfig {
	fn default() -> Self {
		Self {
			log_dir: None,
			log_mode: LogMode::default(),
			unknown_placeholders: UnknownPlaceholders::default(),
			read_chunk_bytes: default_read_chunk(),
			drain_timeout_ms: default_drain_timeout(),
		}
	}
}

impl SupervisorConfig {
	pub fn drain_timeout(&self) -> Duration {
		Duration::from_millis(self.drain_timeout_ms)
	}
}

fn default_read_chunk() -> usize {
	4096
}
fn default_drain_timeout() -> u64 {
	2000
}

/// The `curator` binary's config file: supervisor settings plus programs.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FleetConfig {
	#[serde(default)]
	pub supervisor: SupervisorConfig,
	#[serde(default, rename = "program")]
	pub programs: Vec<ProgramDefinition>,
}

pub fn parse_config(content: &str) -> Result<FleetConfig, String> {
	let config: FleetConfig = toml::from_str(content).map_err(|e| e.to_string())?;
	if config.supervisor.read_chunk_bytes == 0 {
		return Err("supervisor.read_chunk_bytes must be at least 1".into());
	}
	Ok(config)
}

pub fn read_config(path: &Path) -> Result<FleetConfig, String> {
	let content = std::fs::read_to_string(path)
		.map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
	parse_config(&content).map_err(|e| format!("failed to parse {}: {}", path.display(), e))
}

/// Like [`read_config`], but warns and falls back to an empty fleet.
pub fn load_config(path: &Path) -> FleetConfig {
	match read_config(path) {
		Ok(config) => config,
		Err(e) => {
			tracing::warn!("{}", e);
			FleetConfig::default()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_full_config() {
		let config = parse_config(
			r#"
[supervisor]
log_dir = "/var/log/fleet"
log_mode = "truncate"
unknown_placeholders = "error"

[[program]]
name = "worker"
command = "run-worker --id {{instance_index}}"
process_name = "worker-{{instance_index}}"
numprocs = 3
numprocs_start = 1
start_retries = 5
environment = { RUST_LOG = "debug" }

[[program]]
name = "cron"
command = "tick"
autostart = false
"#,
		)
		.unwrap();

		assert_eq!(config.supervisor.log_dir, Some(PathBuf::from("/var/log/fleet")));
		assert_eq!(config.supervisor.log_mode, LogMode::Truncate);
		assert_eq!(config.supervisor.unknown_placeholders, UnknownPlaceholders::Error);
		assert_eq!(config.supervisor.read_chunk_bytes, 4096);

		assert_eq!(config.programs.len(), 2);
		let worker = &config.programs[0];
		assert_eq!(worker.num_instances, 3);
		assert_eq!(worker.start_index, 1);
		assert_eq!(worker.start_retries, 5);
		assert_eq!(worker.environment.get("RUST_LOG").map(String::as_str), Some("debug"));

		let cron = &config.programs[1];
		assert!(!cron.autostart);
		assert_eq!(cron.num_instances, 1);
		assert_eq!(cron.start_retries, 3);
		assert_eq!(cron.process_name_template, "{{base_name}}");
	}

	#[test]
	fn test_defaults_when_empty() {
		let config = parse_config("").unwrap();
		assert!(config.programs.is_empty());
		assert_eq!(config.supervisor.log_mode, LogMode::Append);
		assert_eq!(config.supervisor.drain_timeout(), Duration::from_secs(2));
	}

	#[test]
	fn test_missing_required_field() {
		let err = parse_config("[[program]]\nname = \"x\"\n").unwrap_err();
		assert!(err.contains("command"), "error was: {}", err);
	}

	#[test]
	fn test_zero_read_chunk_rejected() {
		let err = parse_config("[supervisor]\nread_chunk_bytes = 0\n").unwrap_err();
		assert!(err.contains("read_chunk_bytes"), "error was: {}", err);
	}

	#[test]
	fn test_original_schema_keys_are_carried() {
		let config = parse_config(
			r#"
[[program]]
name = "api"
command = "serve"
autorestart = true
start_secs = 5
exit_codes = [0, 2]
redirect_stderr = true
"#,
		)
		.unwrap();

		let api = &config.programs[0];
		assert!(api.autorestart);
		assert_eq!(api.start_secs, 5);
		assert_eq!(api.exit_codes, vec![0, 2]);
		assert!(api.redirect_stderr);
	}

	#[test]
	fn test_load_missing_file_falls_back() {
		let config = load_config(Path::new("/nonexistent/curator/fleet.toml"));
		assert!(config.programs.is_empty());
	}
}
