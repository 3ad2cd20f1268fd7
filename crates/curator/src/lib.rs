//! # curator
//!
//! Process supervision engine.
//!
//! Instantiates declarative program definitions into titled process records,
//! spawns them, retries them up to `start_retries` times, captures stdout and
//! stderr into log files through a blocking relay, and reports lifecycle
//! state through a small control API.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use curator::{ProgramDefinition, Supervisor, SupervisorConfig};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sup = Supervisor::new(SupervisorConfig {
//!     log_dir: Some("/tmp/curator/logs".into()),
//!     ..Default::default()
//! });
//!
//! let mut worker = ProgramDefinition::new("worker", "echo hello from {{instance_index}}");
//! worker.process_name_template = "worker-{{instance_index}}".into();
//! worker.num_instances = 2;
//!
//! let report = sup.load(worker).await;
//! assert_eq!(report.instantiated, ["worker-0", "worker-1"]);
//!
//! for (title, state) in sup.list_status().await {
//!     println!("{}: {}", title, state);
//! }
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod launcher;
pub mod record;
pub mod relay;
pub mod supervisor;
pub mod table;
pub mod template;
pub mod types;

pub use capture::LogMode;
pub use config::{FleetConfig, SupervisorConfig};
pub use error::SupervisorError;
pub use launcher::{Launcher, OsLauncher, ProcessHandle};
pub use relay::{RelayReader, RelayWriter};
pub use supervisor::{LoadReport, StartOutcome, StopOutcome, Supervisor};
pub use table::ProcessTable;
pub use template::{TemplateError, TemplateExpander, UnknownPlaceholders};
pub use types::*;
