//! Settings for otpvpn
//!
//! Optional file: ~/.config/otpvpn/config.yaml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// otpvpn settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// VPN client binary
    #[serde(default = "default_client")]
    pub client: String,

    /// Extra arguments appended to the client invocation
    #[serde(default)]
    pub client_args: Vec<String>,

    /// Cipher tool used for credential bundles
    #[serde(default = "default_cipher")]
    pub cipher: String,

    /// Privilege escalation tool
    #[serde(default = "default_elevation")]
    pub elevation: String,

    /// Default profile directory (overrides ~/.ovpn)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_dir: Option<PathBuf>,

    /// Grace period before the watchdog removes staged files
    #[serde(default = "default_cleanup_delay")]
    pub cleanup_delay_secs: u64,

    /// Passwords shorter than this trigger a warning
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

fn default_client() -> String {
    "openvpn".to_string()
}

fn default_cipher() -> String {
    "gpg".to_string()
}

fn default_elevation() -> String {
    "sudo".to_string()
}

fn default_cleanup_delay() -> u64 {
    5
}

fn default_min_password_length() -> usize {
    8
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client: default_client(),
            client_args: Vec::new(),
            cipher: default_cipher(),
            elevation: default_elevation(),
            profile_dir: None,
            cleanup_delay_secs: default_cleanup_delay(),
            min_password_length: default_min_password_length(),
        }
    }
}

impl Config {
    /// Load settings from a file, falling back to defaults if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;

        // An empty file parses as YAML null
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_defaults() -> Result<()> {
        let dir = tempdir()?;
        let config = Config::load(&dir.path().join("config.yaml"))?;

        assert_eq!(config.client, "openvpn");
        assert_eq!(config.cipher, "gpg");
        assert_eq!(config.elevation, "sudo");
        assert_eq!(config.cleanup_delay_secs, 5);
        assert_eq!(config.min_password_length, 8);
        assert!(config.client_args.is_empty());
        assert!(config.profile_dir.is_none());

        Ok(())
    }

    #[test]
    fn test_partial_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "client: /usr/local/sbin/openvpn\nclient_args: [\"--verb\", \"4\"]\ncleanup_delay_secs: 10\n",
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.client, "/usr/local/sbin/openvpn");
        assert_eq!(config.client_args, vec!["--verb", "4"]);
        assert_eq!(config.cleanup_delay_secs, 10);
        assert_eq!(config.cipher, "gpg");

        Ok(())
    }

    #[test]
    fn test_empty_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "\n")?;

        let config = Config::load(&path)?;
        assert_eq!(config.elevation, "sudo");

        Ok(())
    }

    #[test]
    fn test_invalid_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "cleanup_delay_secs: soon\n")?;

        assert!(Config::load(&path).is_err());

        Ok(())
    }
}
