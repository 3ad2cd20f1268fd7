use std::io;
use std::path::PathBuf;

use crate::template::TemplateError;

/// Failures the supervisor reports. Infrastructure variants are confined to
/// the record that hit them: the record goes `FAILED` and keeps the message.
#[derive(Debug)]
pub enum SupervisorError {
	/// A title, command or log path template did not expand.
	Template(TemplateError),
	/// A log destination could not be opened for writing.
	LogOpen { path: PathBuf, source: io::Error },
	/// The OS refused to start the command.
	Launch(io::Error),
	/// Waiting on a started process failed for a reason other than its exit.
	Wait(io::Error),
	/// A record points at a program that is no longer loaded.
	UnknownProgram(String),
}

impl std::fmt::Display for SupervisorError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SupervisorError::Template(e) => write!(f, "template error: {}", e),
			SupervisorError::LogOpen { path, source } => {
				write!(f, "cannot open log {}: {}", path.display(), source)
			}
			SupervisorError::Launch(e) => write!(f, "launch failed: {}", e),
			SupervisorError::Wait(e) => write!(f, "wait failed: {}", e),
			SupervisorError::UnknownProgram(name) => write!(f, "unknown program: {}", name),
		}
	}
}

impl std::error::Error for SupervisorError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			SupervisorError::Template(e) => Some(e),
			SupervisorError::LogOpen { source, .. } => Some(source),
			SupervisorError::Launch(e) | SupervisorError::Wait(e) => Some(e),
			SupervisorError::UnknownProgram(_) => None,
		}
	}
}

impl From<TemplateError> for SupervisorError {
	fn from(e: TemplateError) -> Self {
		SupervisorError::Template(e)
	}
}
