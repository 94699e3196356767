//! Signal-driven cleanup
//!
//! A dedicated thread waits for SIGINT, SIGTERM, SIGHUP or SIGQUIT. When one
//! arrives it restores the terminal, drains the cleanup registry and exits
//! with 128 + the signal number. Handlers are registered before `install`
//! returns, so nothing staged afterwards can miss them.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

use crate::cleanup::CleanupRegistry;
use crate::terminal::TerminalState;

/// Exit status for a process terminated by `signo`
pub fn exit_status(signo: i32) -> i32 {
    128 + signo
}

/// Install handlers and start the signal thread
pub fn install(registry: Arc<CleanupRegistry>, terminal: Arc<TerminalState>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;

    let (mut int, mut term, mut hup, mut quit) = runtime
        .block_on(async {
            Ok::<_, std::io::Error>((
                signal(SignalKind::interrupt())?,
                signal(SignalKind::terminate())?,
                signal(SignalKind::hangup())?,
                signal(SignalKind::quit())?,
            ))
        })
        .context("Failed to register signal handlers")?;

    std::thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            let signo = runtime.block_on(async {
                tokio::select! {
                    _ = int.recv() => libc::SIGINT,
                    _ = term.recv() => libc::SIGTERM,
                    _ = hup.recv() => libc::SIGHUP,
                    _ = quit.recv() => libc::SIGQUIT,
                }
            });

            tracing::info!(signal = signo, "interrupted, cleaning up");
            terminal.restore();
            registry.drain_and_delete();
            eprintln!();
            std::process::exit(exit_status(signo));
        })
        .context("Failed to start signal thread")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::process::{Command, Stdio};
    use std::time::Duration;

    /// Set when the test binary is re-run as the process to be signalled
    const CHILD_FILE_VAR: &str = "OTPVPN_SIGNAL_CHILD_FILE";

    #[test]
    fn test_exit_status() {
        assert_eq!(exit_status(libc::SIGINT), 130);
        assert_eq!(exit_status(libc::SIGTERM), 143);
    }

    #[test]
    fn test_sigterm_child_process() {
        let Some(staged) = std::env::var_os(CHILD_FILE_VAR) else {
            return;
        };

        let registry = Arc::new(CleanupRegistry::new());
        registry.register(PathBuf::from(staged));
        let terminal = Arc::new(TerminalState::new());
        let _echo = terminal.guard();
        install(Arc::clone(&registry), Arc::clone(&terminal)).expect("handlers installed");

        unsafe { libc::kill(libc::getpid(), libc::SIGTERM) };
        std::thread::sleep(Duration::from_secs(10));
        panic!("signal thread did not exit the process");
    }

    #[test]
    fn test_sigterm_drains_and_exits() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let staged = dir.path().join("credentials");
        fs::write(&staged, "alice\nsecret123\n")?;

        let status = Command::new(std::env::current_exe()?)
            .args([
                "signals::tests::test_sigterm_child_process",
                "--exact",
                "--test-threads=1",
            ])
            .env(CHILD_FILE_VAR, &staged)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;

        assert_eq!(status.code(), Some(exit_status(libc::SIGTERM)));
        assert!(!staged.exists());
        Ok(())
    }
}
