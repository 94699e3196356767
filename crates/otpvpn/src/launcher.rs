//! Session launcher - hand the process over to the VPN client
//!
//! Before exec'ing the client a detached watchdog (`otpvpn reap`) is left
//! behind. Threads die with the process image, so the delayed cleanup has to
//! live in a process of its own.

use anyhow::{bail, Context, Result};
use std::convert::Infallible;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use crate::error::LaunchError;

/// Hidden subcommand the watchdog runs
pub const REAP_COMMAND: &str = "reap";

pub struct SessionLauncher {
    client: PathBuf,
    client_name: String,
    extra_args: Vec<String>,
    grace: Duration,
}

impl SessionLauncher {
    /// Resolve the client binary on PATH
    pub fn locate(client: &str, extra_args: &[String], grace: Duration) -> Result<Self> {
        let Some(path) = otpvpn_core::process::find_tool(client) else {
            bail!(LaunchError::ClientBinaryNotFound(client.to_string()));
        };

        Ok(Self {
            client: path,
            client_name: client.to_string(),
            extra_args: extra_args.to_vec(),
            grace,
        })
    }

    pub fn client(&self) -> &Path {
        &self.client
    }

    /// `<client> --config <session> [extra args]`
    pub fn client_command(&self, session_config: &Path) -> Command {
        let mut cmd = Command::new(&self.client);
        cmd.arg("--config").arg(session_config).args(&self.extra_args);
        cmd
    }

    /// Start the detached cleanup helper for `paths`
    ///
    /// The helper forks itself into the background and its first process
    /// exits at once; that process is waited for here so the client we exec
    /// into never inherits an unreaped child.
    pub fn spawn_watchdog(&self, exe: &Path, paths: &[PathBuf]) -> std::io::Result<ExitStatus> {
        watchdog_command(exe, self.grace, paths).spawn()?.wait()
    }

    /// Exec the client with `session_config`
    ///
    /// Never returns on success; the watchdog removes `staged` once the grace
    /// period is over.
    pub fn launch(&self, session_config: &Path, staged: &[PathBuf]) -> Result<Infallible> {
        match std::env::current_exe().context("Failed to resolve own executable") {
            Ok(exe) => match self.spawn_watchdog(&exe, staged) {
                Ok(status) if status.success() => tracing::debug!("watchdog started"),
                Ok(status) => tracing::warn!(status = ?status.code(), "cleanup watchdog failed to detach"),
                Err(e) => tracing::warn!(error = %e, "failed to start cleanup watchdog"),
            },
            Err(e) => tracing::warn!(error = %e, "failed to start cleanup watchdog"),
        }

        tracing::info!(client = %self.client.display(), config = %session_config.display(), "launching VPN client");

        let err = self.client_command(session_config).exec();
        Err(LaunchError::LaunchFailed {
            program: self.client_name.clone(),
            source: err,
        }
        .into())
    }
}

/// `<exe> reap --delay <secs> <paths...>` in its own process group
pub fn watchdog_command(exe: &Path, grace: Duration, paths: &[PathBuf]) -> Command {
    let mut cmd = Command::new(exe);
    cmd.arg(REAP_COMMAND)
        .arg("--delay")
        .arg(grace.as_secs().to_string())
        .arg("--")
        .args(paths)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        // Ctrl+C aimed at the client must not take the watchdog with it
        .process_group(0);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn test_missing_client() {
        let err = SessionLauncher::locate("definitely-not-openvpn", &[], Duration::from_secs(5))
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<LaunchError>(),
            Some(LaunchError::ClientBinaryNotFound(name)) if name == "definitely-not-openvpn"
        ));
    }

    #[test]
    fn test_client_command() -> Result<()> {
        let launcher = SessionLauncher::locate("sh", &["--verb".to_string(), "4".to_string()], Duration::from_secs(5))?;
        let cmd = launcher.client_command(Path::new("/run/otpvpn-a/session-b.conf"));

        assert_eq!(cmd.get_program(), launcher.client().as_os_str());
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["--config", "/run/otpvpn-a/session-b.conf", "--verb", "4"]);
        Ok(())
    }

    #[test]
    fn test_watchdog_parent_is_reaped() -> Result<()> {
        let launcher = SessionLauncher::locate("sh", &[], Duration::from_secs(0))?;
        let Some(exe) = otpvpn_core::process::find_tool("true") else {
            return Ok(());
        };

        // Returns only after the spawned process has been waited for
        let status = launcher.spawn_watchdog(&exe, &[PathBuf::from("/nonexistent/otpvpn-a")])?;
        assert!(status.success());
        Ok(())
    }

    #[test]
    fn test_watchdog_command() {
        let cmd = watchdog_command(
            Path::new("/usr/bin/otpvpn"),
            Duration::from_secs(7),
            &[PathBuf::from("/run/otpvpn-a"), PathBuf::from("/run/otpvpn-a/credentials-c")],
        );

        assert_eq!(cmd.get_program(), OsStr::new("/usr/bin/otpvpn"));
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(
            args,
            vec!["reap", "--delay", "7", "--", "/run/otpvpn-a", "/run/otpvpn-a/credentials-c"]
        );
    }
}
