use std::path::{Path, PathBuf};
use std::sync::Arc;

use curator::{config, Supervisor};
use tokio::signal::unix::{signal, SignalKind};

const USAGE: &str = "usage: curator <config.toml>

Signals:
  SIGHUP   re-read the config and load new programs
  SIGUSR1  print process status as JSON lines
  Ctrl-C   stop every process and exit";

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt().init();

	let args: Vec<String> = std::env::args().skip(1).collect();
	let path = match args.as_slice() {
		[arg] if arg != "-h" && arg != "--help" => PathBuf::from(arg),
		_ => {
			eprintln!("{}", USAGE);
			std::process::exit(2);
		}
	};

	let fleet = match config::read_config(&path) {
		Ok(f) => f,
		Err(e) => {
			eprintln!("error: {}", e);
			std::process::exit(1);
		}
	};

	let supervisor = Supervisor::new(fleet.supervisor);
	for (name, report) in supervisor.reload(fleet.programs).await {
		tracing::info!(
			"program {}: {} instantiated, {} failed",
			name,
			report.instantiated.len(),
			report.failed.len()
		);
	}
	tracing::info!("curator started (pid {})", std::process::id());

	if let Err(e) = serve_signals(&supervisor, &path).await {
		tracing::error!("signal handling failed: {}", e);
	}

	supervisor.stop_all().await;
	tracing::info!("shutting down");
}

async fn serve_signals(supervisor: &Arc<Supervisor>, path: &Path) -> std::io::Result<()> {
	let mut hangup = signal(SignalKind::hangup())?;
	let mut usr1 = signal(SignalKind::user_defined1())?;

	loop {
		tokio::select! {
			_ = hangup.recv() => {
				tracing::info!("reloading {}", path.display());
				let fleet = config::load_config(path);
				for (name, report) in supervisor.reload(fleet.programs).await {
					if !report.instantiated.is_empty() {
						tracing::info!("program {}: added {}", name, report.instantiated.join(", "));
					}
				}
			}
			_ = usr1.recv() => {
				for snapshot in supervisor.list().await {
					match serde_json::to_string(&snapshot) {
						Ok(line) => println!("{}", line),
						Err(e) => tracing::error!("failed to serialize status: {}", e),
					}
				}
			}
			_ = tokio::signal::ctrl_c() => return Ok(()),
		}
	}
}
