//! Signal handlers for graceful termination

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, warn};

/// Exit code of the first signal received, 0 if none
static SIGNAL_EXIT_CODE: AtomicI32 = AtomicI32::new(0);

/// Exit code for the signal that raised the abort flag (130 for SIGINT,
/// 143 for SIGTERM), if any
pub fn received_exit_code() -> Option<i32> {
	match SIGNAL_EXIT_CODE.load(Ordering::SeqCst) {
		0 => None,
		code => Some(code),
	}
}

/// Raise `abort` on the first SIGINT/SIGTERM so the session stops between
/// blocks and tells its peers. A second signal exits immediately.
///
/// Handlers are installed before this returns. Must be called from within
/// a tokio runtime.
pub fn setup_signal_handlers(abort: Arc<AtomicBool>) {
	let mut sigterm = match signal(SignalKind::terminate()) {
		Ok(stream) => stream,
		Err(e) => {
			warn!("Failed to setup SIGTERM handler: {}. Process will not handle SIGTERM gracefully.", e);
			return;
		}
	};

	let mut sigint = match signal(SignalKind::interrupt()) {
		Ok(stream) => stream,
		Err(e) => {
			warn!("Failed to setup SIGINT handler: {}. Process will not handle SIGINT gracefully.", e);
			return;
		}
	};

	tokio::spawn(async move {
		loop {
			let code = tokio::select! {
				_ = sigterm.recv() => 143, // 128 + SIGTERM(15)
				_ = sigint.recv() => 130,  // 128 + SIGINT(2)
			};
			if abort.swap(true, Ordering::SeqCst) {
				debug!("Second signal, exiting with {}", code);
				std::process::exit(code);
			}
			SIGNAL_EXIT_CODE.store(code, Ordering::SeqCst);
			warn!("Interrupted, stopping after the current block (signal again to exit now)");
		}
	});
}

/// Swallow SIGINT in a responder.
///
/// A Ctrl-C on the terminal reaches the whole process group. The responder
/// keeps serving so the driver can end the session with `abort`; it still
/// exits when its input closes.
pub fn ignore_interrupts() {
	let mut sigint = match signal(SignalKind::interrupt()) {
		Ok(stream) => stream,
		Err(e) => {
			warn!("Failed to setup SIGINT handler: {}", e);
			return;
		}
	};
	tokio::spawn(async move {
		while sigint.recv().await.is_some() {
			debug!("Ignoring SIGINT, waiting for the driver to end the session");
		}
	});
}

// vim: ts=4
