//! Standard paths used by otpvpn
//!
//! Every per-user path hangs off the *invoking* user's home, so a run that
//! was re-executed through sudo still finds the profiles of the person who
//! typed the command rather than root's.

use std::path::{Path, PathBuf};

use crate::process;

/// Standard otpvpn paths
pub struct Paths {
    /// Home directory of the invoking user
    pub home: PathBuf,
    /// Profile templates and credential bundles (~/.ovpn)
    pub profiles: PathBuf,
    /// Settings directory (~/.config/otpvpn)
    pub config: PathBuf,
    /// Base for private staging directories ($XDG_RUNTIME_DIR or /tmp)
    pub runtime: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let home = process::invoking_user()
            .and_then(|user| process::home_of(&user))
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("~"));

        let runtime = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .filter(|dir| dir.is_dir())
            .unwrap_or_else(std::env::temp_dir);

        Self::with_home(&home, runtime)
    }

    /// Paths rooted at an explicit home directory
    pub fn with_home(home: &Path, runtime: PathBuf) -> Self {
        Self {
            home: home.to_path_buf(),
            profiles: home.join(".ovpn"),
            config: home.join(".config").join("otpvpn"),
            runtime,
        }
    }

    /// Path of the settings file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.yaml")
    }

    /// Expand a leading `~` against the invoking user's home
    pub fn expand(&self, path: &str) -> PathBuf {
        expand_tilde(path, &self.home)
    }
}

/// Expand a leading `~` against `home`
pub fn expand_tilde(path: &str, home: &Path) -> PathBuf {
    let home = home.to_string_lossy().into_owned();
    PathBuf::from(shellexpand::tilde_with_context(path, || Some(home)).into_owned())
}
