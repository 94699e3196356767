//! Private staging area for plaintext material
//!
//! One owner-only directory per invocation with a random name, holding
//! owner-only files with random names. Nothing in here is ever created under
//! a predictable path, and everything is registered for cleanup before the
//! first byte is written.

use anyhow::{Context, Result};
use std::fs::{self, File, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::cleanup::{CleanupRegistry, STAGING_PREFIX};

/// Per-invocation private directory
pub struct StagingArea<'a> {
    dir: PathBuf,
    registry: &'a CleanupRegistry,
}

impl<'a> StagingArea<'a> {
    /// Create a fresh `otpvpn-XXXXXX` directory (mode 700) under `base`
    pub fn create(base: &Path, registry: &'a CleanupRegistry) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(base)
            .with_context(|| format!("Failed to create staging directory in {:?}", base))?
            .keep();
        registry.register(&dir);

        fs::set_permissions(&dir, Permissions::from_mode(0o700))?;
        tracing::debug!(dir = %dir.display(), "created staging area");

        Ok(Self { dir, registry })
    }

    /// The staging directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a new, empty, owner-only file with a unique name
    pub fn reserve(&self, prefix: &str, suffix: &str) -> Result<(File, PathBuf)> {
        let temp = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.dir)
            .with_context(|| format!("Failed to create staging file in {:?}", self.dir))?;

        let (file, path) = temp
            .keep()
            .with_context(|| format!("Failed to keep staging file in {:?}", self.dir))?;
        self.registry.register(&path);

        fs::set_permissions(&path, Permissions::from_mode(0o600))?;

        Ok((file, path))
    }
}
