//! Interactive prompts and terminal state
//!
//! Hidden prompts switch echo off on the controlling terminal. If the user
//! interrupts one, the signal thread exits the process from outside the
//! prompt, so the attributes are snapshotted here first and restored either
//! by [`EchoGuard`] or by [`TerminalState::restore`] from the signal path.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::os::unix::io::AsRawFd;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Saved attributes of the controlling terminal
#[derive(Default)]
pub struct TerminalState {
    saved: Mutex<Option<(File, libc::termios)>>,
}

impl TerminalState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<(File, libc::termios)>> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot the current terminal attributes until the guard drops
    pub fn guard(&self) -> EchoGuard<'_> {
        match snapshot() {
            Ok(saved) => *self.lock() = Some(saved),
            Err(e) => tracing::debug!(error = %e, "no terminal to snapshot"),
        }
        EchoGuard { state: self }
    }

    /// Whether a snapshot is currently held
    pub fn is_captured(&self) -> bool {
        self.lock().is_some()
    }

    /// Put the terminal back the way it was and forget the snapshot
    pub fn restore(&self) {
        if let Some((tty, attrs)) = self.lock().take() {
            let rc = unsafe { libc::tcsetattr(tty.as_raw_fd(), libc::TCSANOW, &attrs) };
            if rc != 0 {
                tracing::warn!(error = %io::Error::last_os_error(), "failed to restore terminal");
            }
        }
    }
}

fn snapshot() -> io::Result<(File, libc::termios)> {
    let tty = File::options().read(true).write(true).open("/dev/tty")?;
    let mut attrs: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(tty.as_raw_fd(), &mut attrs) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((tty, attrs))
}

/// Restores the snapshot taken by [`TerminalState::guard`] on drop
#[must_use = "the terminal is restored when the guard is dropped"]
pub struct EchoGuard<'a> {
    state: &'a TerminalState,
}

impl Drop for EchoGuard<'_> {
    fn drop(&mut self) {
        self.state.restore();
    }
}

/// Prompt without echo
pub fn prompt_hidden(state: &TerminalState, prompt: &str) -> Result<String> {
    let _guard = state.guard();
    rpassword::prompt_password(prompt).context("Failed to read hidden input")
}

/// Prompt with echo, reading one line from stdin
pub fn prompt_visible(prompt: &str) -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{}", prompt)?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}
