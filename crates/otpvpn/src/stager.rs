//! Credential stager
//!
//! Decrypt the bundle into the staging area, swap the placeholder for the
//! one-time code, write the result to the credential file the session config
//! points at and drop the intermediate plaintext straight away.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::bundle::{self, CredentialWarning};
use crate::staging::StagingArea;
use crate::store::{Cipher, SecretStore};

/// A credential file ready for the VPN client
#[derive(Debug)]
pub struct StagedCredential {
    pub path: PathBuf,
    pub warnings: Vec<CredentialWarning>,
}

pub struct CredentialStager<'a, C: Cipher> {
    store: &'a SecretStore<C>,
    staging: &'a StagingArea<'a>,
    min_password_length: usize,
}

impl<'a, C: Cipher> CredentialStager<'a, C> {
    pub fn new(store: &'a SecretStore<C>, staging: &'a StagingArea<'a>, min_password_length: usize) -> Self {
        Self {
            store,
            staging,
            min_password_length,
        }
    }

    /// Stage `bundle` with `otp` injected into `destination`
    ///
    /// `destination` stays registered for cleanup; the decrypted
    /// intermediate is registered before decryption starts and removed as
    /// soon as the staged copy is on disk.
    pub fn stage(&self, bundle: &Path, otp: &str, destination: &Path) -> Result<StagedCredential> {
        let (file, decrypted) = self.staging.reserve("decrypted-", "")?;
        self.store.decrypt(bundle, file, &decrypted)?;

        let bytes = fs::read(&decrypted)
            .with_context(|| format!("Failed to read decrypted bundle {:?}", decrypted))?;
        let content = String::from_utf8_lossy(&bytes);

        let mut warnings = bundle::inspect(&content, self.min_password_length);
        if bundle::sanitize_otp(otp).is_empty() {
            warnings.push(CredentialWarning::EmptyOtp);
        }

        let staged = bundle::inject_otp(&content, otp);
        write_private(destination, staged.as_bytes())?;

        if let Err(e) = fs::remove_file(&decrypted) {
            // Still registered, the final drain gets another go
            tracing::warn!(path = %decrypted.display(), error = %e, "failed to remove decrypted bundle");
        }

        tracing::debug!(path = %destination.display(), warnings = warnings.len(), "staged credential");

        Ok(StagedCredential {
            path: destination.to_path_buf(),
            warnings,
        })
    }
}

/// Write `data` to `path`, owner read/write only
fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .with_context(|| format!("Failed to open credential file {:?}", path))?;

    // mode() only applies on creation; the file is usually pre-reserved
    fs::set_permissions(path, Permissions::from_mode(0o600))?;

    file.write_all(data)
        .with_context(|| format!("Failed to write credential file {:?}", path))?;
    file.sync_all()?;
    Ok(())
}
