//! Privilege escalation by re-executing through sudo
//!
//! Runs before anything is decrypted so credentials are only ever staged by
//! the process that will hand them to the client.

use anyhow::{bail, Context, Result};
use std::convert::Infallible;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

use crate::cleanup::CleanupRegistry;
use crate::error::LaunchError;

/// Build `<tool> <exe> [-v] start <profile> <config_dir>`
pub fn elevation_command(tool: &Path, exe: &Path, profile: &str, config_dir: &Path, verbose: bool) -> Command {
    let mut cmd = Command::new(tool);
    cmd.arg(exe);
    if verbose {
        cmd.arg("--verbose");
    }
    cmd.arg("start").arg(profile).arg(config_dir);
    cmd
}

/// Replace this process with an elevated copy of itself
///
/// Never returns on success.
pub fn reexec_elevated(
    tool: &str,
    profile: &str,
    config_dir: &Path,
    verbose: bool,
    registry: &CleanupRegistry,
) -> Result<Infallible> {
    let Some(tool_path) = otpvpn_core::process::find_tool(tool) else {
        bail!(LaunchError::ElevationToolNotFound(tool.to_string()));
    };

    let exe = std::env::current_exe()
        .and_then(|p| p.canonicalize())
        .context("Failed to resolve own executable")?;
    let config_dir = config_dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {:?}", config_dir))?;

    tracing::info!(tool = %tool_path.display(), profile, "re-executing with elevated privileges");

    // Nothing staged survives into the elevated run
    registry.drain_and_delete();

    let err = elevation_command(&tool_path, &exe, profile, &config_dir, verbose).exec();
    Err(LaunchError::LaunchFailed {
        program: tool.to_string(),
        source: err,
    }
    .into())
}

/// Make sure we run as root, re-executing through `tool` if we don't
pub fn ensure_elevated(
    tool: &str,
    profile: &str,
    config_dir: &Path,
    verbose: bool,
    registry: &CleanupRegistry,
) -> Result<()> {
    if otpvpn_core::process::is_elevated() {
        tracing::debug!("already running elevated");
        return Ok(());
    }

    match reexec_elevated(tool, profile, config_dir, verbose, registry)? {}
}
