//! Secret store - encrypted credential bundles on disk
//!
//! Bundles are symmetric gpg files (`<name>.gpg`). The cipher itself is an
//! external tool behind the [`Cipher`] trait; the store only decides where
//! plaintext may go and what counts as failure.

use anyhow::{bail, Context, Result};
use std::fs::{self, File, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::LaunchError;

/// Extension of encrypted bundles
pub const BUNDLE_EXTENSION: &str = "gpg";

/// Symmetric encryption of bundle files
pub trait Cipher {
    /// Decrypt `bundle`, writing the plaintext into `output`
    fn decrypt(&self, bundle: &Path, output: File) -> Result<()>;

    /// Encrypt `plaintext` into `bundle`, prompting for a passphrase
    fn encrypt(&self, plaintext: &Path, bundle: &Path) -> Result<()>;
}

/// GnuPG in symmetric mode
pub struct GpgCipher {
    binary: PathBuf,
}

impl GpgCipher {
    /// Resolve the gpg binary on PATH before any file is touched
    pub fn locate(name: &str) -> Result<Self> {
        match otpvpn_core::process::find_tool(name) {
            Some(binary) => Ok(Self { binary }),
            None => bail!(LaunchError::ToolNotFound(name.to_string())),
        }
    }
}

impl Cipher for GpgCipher {
    fn decrypt(&self, bundle: &Path, output: File) -> Result<()> {
        tracing::debug!(bundle = %bundle.display(), "decrypting bundle");

        // Plaintext goes straight into the caller's owner-only file, never
        // through a path gpg picks itself
        let status = Command::new(&self.binary)
            .args(["--quiet", "--decrypt"])
            .arg(bundle)
            .stdout(Stdio::from(output))
            .status()
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;

        if !status.success() {
            tracing::debug!(status = ?status.code(), "gpg decrypt failed");
            bail!(LaunchError::DecryptionFailed {
                bundle: bundle.to_path_buf(),
                status: status.code(),
            });
        }

        Ok(())
    }

    fn encrypt(&self, plaintext: &Path, bundle: &Path) -> Result<()> {
        tracing::debug!(bundle = %bundle.display(), "encrypting bundle");

        let status = Command::new(&self.binary)
            .args(["--symmetric", "--cipher-algo", "AES256", "--yes", "--output"])
            .arg(bundle)
            .arg(plaintext)
            .status()
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;

        if !status.success() {
            tracing::debug!(status = ?status.code(), "gpg encrypt failed");
            bail!(LaunchError::EncryptionFailed {
                bundle: bundle.to_path_buf(),
                status: status.code(),
            });
        }

        Ok(())
    }
}

/// Reads and writes encrypted bundles
pub struct SecretStore<C: Cipher> {
    cipher: C,
}

impl<C: Cipher> SecretStore<C> {
    pub fn new(cipher: C) -> Self {
        Self { cipher }
    }

    /// Decrypt `bundle` into an already created, owner-only file
    pub fn decrypt(&self, bundle: &Path, output: File, output_path: &Path) -> Result<()> {
        if !bundle.is_file() {
            bail!(LaunchError::BundleNotFound(bundle.to_path_buf()));
        }

        // Re-assert owner-only even if the caller's umask was generous
        fs::set_permissions(output_path, Permissions::from_mode(0o600))?;
        self.cipher.decrypt(bundle, output)
    }

    /// Encrypt `plaintext` into `bundle` (mode 600)
    pub fn encrypt(&self, plaintext: &Path, bundle: &Path) -> Result<()> {
        self.cipher.encrypt(plaintext, bundle)?;
        fs::set_permissions(bundle, Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict permissions on {:?}", bundle))?;
        Ok(())
    }
}

/// Path of the encrypted file behind a bundle reference
pub fn bundle_file(reference: &Path) -> PathBuf {
    if reference.extension().and_then(|e| e.to_str()) == Some(BUNDLE_EXTENSION) {
        reference.to_path_buf()
    } else {
        let mut name = reference.as_os_str().to_os_string();
        name.push(".");
        name.push(BUNDLE_EXTENSION);
        PathBuf::from(name)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::PlainCipher;
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_bundle_file() {
        assert_eq!(bundle_file(Path::new("/home/a/.ovpn/work")), PathBuf::from("/home/a/.ovpn/work.gpg"));
        assert_eq!(bundle_file(Path::new("work.gpg")), PathBuf::from("work.gpg"));
        assert_eq!(bundle_file(Path::new("work.v2")), PathBuf::from("work.v2.gpg"));
    }

    #[test]
    fn test_missing_tool() {
        let err = GpgCipher::locate("definitely-not-gpg-otpvpn").err().unwrap();
        assert!(matches!(
            err.downcast_ref::<LaunchError>(),
            Some(LaunchError::ToolNotFound(name)) if name == "definitely-not-gpg-otpvpn"
        ));
    }

    #[test]
    fn test_missing_bundle() -> Result<()> {
        let dir = tempdir()?;
        let store = SecretStore::new(PlainCipher);
        let out_path = dir.path().join("out");
        let out = File::create(&out_path)?;

        let err = store.decrypt(&dir.path().join("absent.gpg"), out, &out_path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LaunchError>(),
            Some(LaunchError::BundleNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_encrypt_restricts_bundle() -> Result<()> {
        let dir = tempdir()?;
        let plain = dir.path().join("plain");
        let mut file = File::create(&plain)?;
        file.write_all(b"alice\npw%{OTP}\n")?;

        let bundle = dir.path().join("work.gpg");
        SecretStore::new(PlainCipher).encrypt(&plain, &bundle)?;

        let mode = fs::metadata(&bundle)?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }

    #[test]
    fn test_gpg_failure_propagates_status() -> Result<()> {
        // `false` stands in for a gpg that rejects the passphrase
        let Ok(cipher) = GpgCipher::locate("false") else {
            return Ok(());
        };
        let dir = tempdir()?;
        let bundle = dir.path().join("work.gpg");
        fs::write(&bundle, "ciphertext")?;
        let out_path = dir.path().join("out");
        let out = File::create(&out_path)?;

        let err = SecretStore::new(cipher).decrypt(&bundle, out, &out_path).unwrap_err();
        match err.downcast_ref::<LaunchError>() {
            Some(LaunchError::DecryptionFailed { status, .. }) => assert_eq!(*status, Some(1)),
            other => panic!("Expected DecryptionFailed, got {:?}", other),
        }
        Ok(())
    }
}
