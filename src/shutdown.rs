use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;
use tracing::warn;

/// Exit status for a run killed by a repeated interrupt.
const FORCED_EXIT_CODE: i32 = 130;

/// Raises `stop` on the first SIGINT or SIGTERM so the pipeline can finish
/// the batch in flight. A second signal exits the process immediately.
pub fn install_stop_handler(stop: Arc<AtomicBool>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    let mut signals = ShutdownSignals::register(&runtime)?;

    thread::Builder::new()
        .name("vecsync-signals".to_string())
        .spawn(move || {
            runtime.block_on(async {
                loop {
                    let signal = signals.next().await;
                    if !request_stop(&stop, signal) {
                        warn!(signal, "second stop signal received; exiting now");
                        process::exit(FORCED_EXIT_CODE);
                    }
                }
            });
        })
        .context("failed to spawn signal thread")?;

    Ok(())
}

/// Returns `false` when a stop had already been requested.
pub fn request_stop(stop: &AtomicBool, signal: &str) -> bool {
    let first = !stop.swap(true, Ordering::SeqCst);
    if first {
        warn!(signal, "stop requested; finishing the current batch");
    }
    first
}

#[cfg(unix)]
struct ShutdownSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn register(runtime: &Runtime) -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let _guard = runtime.enter();
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?,
            terminate: signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?,
        })
    }

    async fn next(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn register(_runtime: &Runtime) -> Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> &'static str {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "ctrl-c listener failed");
            std::future::pending::<()>().await;
        }
        "ctrl-c"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_stop_raises_flag_once() {
        let stop = AtomicBool::new(false);

        assert!(request_stop(&stop, "SIGINT"));
        assert!(stop.load(Ordering::SeqCst));
        assert!(!request_stop(&stop, "SIGTERM"));
        assert!(stop.load(Ordering::SeqCst));
    }

    #[test]
    fn stop_handler_installs_without_raising_flag() {
        let stop = Arc::new(AtomicBool::new(false));

        install_stop_handler(Arc::clone(&stop)).expect("signal handler should install");
        assert!(!stop.load(Ordering::SeqCst));
    }
}
