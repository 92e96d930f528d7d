//! Signal handlers for graceful termination

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use crate::logging::*;

/// Flip `shutdown` to `true` on the first SIGTERM or SIGINT.
///
/// The sync loop then lets any running transfer finish before it stops. A
/// second signal exits immediately with the conventional 128 + signal code.
pub fn spawn_shutdown_listener(shutdown: watch::Sender<bool>) {
	tokio::spawn(async move {
		let mut sigterm = match signal(SignalKind::terminate()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGTERM handler: {}. Process will not handle SIGTERM gracefully.", e);
				hold_open(shutdown).await;
				return;
			}
		};

		let mut sigint = match signal(SignalKind::interrupt()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGINT handler: {}. Process will not handle SIGINT gracefully.", e);
				hold_open(shutdown).await;
				return;
			}
		};

		let name = tokio::select! {
			_ = sigterm.recv() => "SIGTERM",
			_ = sigint.recv() => "SIGINT",
		};
		info!("Received {}, stopping after the current sync (repeat to force)", name);
		let _ = shutdown.send(true);

		let code = tokio::select! {
			_ = sigterm.recv() => 143, // 128 + SIGTERM(15)
			_ = sigint.recv() => 130,  // 128 + SIGINT(2)
		};
		warn!("Second signal received, exiting without waiting for transfers");
		std::process::exit(code);
	});
}

/// Keep `shutdown` alive without ever sending on it. Receivers treat a
/// dropped sender as a stop request.
async fn hold_open(shutdown: watch::Sender<bool>) {
	std::future::pending::<()>().await;
	drop(shutdown);
}


// vim: ts=4
