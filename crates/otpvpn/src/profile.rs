//! Profile discovery and selection
//!
//! A profile is an OpenVPN template `<name>.ovpn` sitting directly in the
//! configuration directory.

use anyhow::{bail, Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::LaunchError;

/// File extension of profile templates
pub const PROFILE_EXTENSION: &str = "ovpn";

/// A connection profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Profile identifier (template file stem)
    pub name: String,
    /// Path to the template
    pub template: PathBuf,
}

impl Profile {
    /// Refuse templates anyone can edit, warn about ones others can read
    ///
    /// The session config derived from the template is handed to a client
    /// running as root, so a world-writable template is an error.
    pub fn check_permissions(&self) -> Result<Option<String>> {
        let mode = fs::metadata(&self.template)
            .with_context(|| format!("Failed to read profile template {:?}", self.template))?
            .permissions()
            .mode();

        if mode & 0o002 != 0 {
            bail!(LaunchError::InsecureProfile {
                template: self.template.clone(),
                mode: mode & 0o777,
            });
        }

        if mode & 0o077 != 0 {
            Ok(Some(format!(
                "{} is accessible by other users (mode {:o}); consider chmod 600",
                self.template.display(),
                mode & 0o777
            )))
        } else {
            Ok(None)
        }
    }
}

/// List the profiles available in a configuration directory, sorted by name
pub fn list(config_dir: &Path) -> Result<Vec<Profile>> {
    let entries = fs::read_dir(config_dir)
        .with_context(|| format!("Failed to read configuration directory {:?}", config_dir))?;

    let mut profiles = vec![];
    for entry in entries {
        let entry = entry?;
        let path = entry.path();

        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(PROFILE_EXTENSION) {
            continue;
        }

        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if name.is_empty() || name.starts_with('.') {
            continue;
        }

        profiles.push(Profile {
            name: name.to_string(),
            template: path.clone(),
        });
    }

    profiles.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(profiles)
}

/// Pick the profile to start
///
/// Without a requested name the selection only succeeds when exactly one
/// profile exists.
pub fn resolve(config_dir: &Path, requested: Option<&str>) -> Result<Profile> {
    let mut candidates = list(config_dir)?;

    match requested {
        None => {
            if candidates.len() == 1 {
                return Ok(candidates.remove(0));
            }
            bail!(LaunchError::AmbiguousProfile {
                candidates: names(&candidates),
            });
        }
        Some(name) => {
            if let Some(index) = candidates.iter().position(|p| p.name == name) {
                return Ok(candidates.remove(index));
            }
            bail!(LaunchError::UnknownProfile {
                name: name.to_string(),
                candidates: names(&candidates),
            });
        }
    }
}

fn names(profiles: &[Profile]) -> Vec<String> {
    profiles.iter().map(|p| p.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_profiles(dir: &Path, names: &[&str]) -> Result<()> {
        for name in names {
            fs::write(dir.join(name), "remote vpn.example.com\nauth-user-pass\n")?;
        }
        Ok(())
    }

    #[test]
    fn test_list_filters_and_sorts() -> Result<()> {
        let dir = tempdir()?;
        write_profiles(dir.path(), &["work.ovpn", "home.ovpn", "notes.txt", "work.gpg", ".hidden.ovpn"])?;
        fs::create_dir(dir.path().join("lab.ovpn"))?;

        let names: Vec<_> = list(dir.path())?.into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["home", "work"]);

        Ok(())
    }

    #[test]
    fn test_single_profile_is_default() -> Result<()> {
        let dir = tempdir()?;
        write_profiles(dir.path(), &["work.ovpn"])?;

        let profile = resolve(dir.path(), None)?;
        assert_eq!(profile.name, "work");
        assert_eq!(profile.template, dir.path().join("work.ovpn"));

        Ok(())
    }

    #[test]
    fn test_ambiguous_without_name() -> Result<()> {
        let dir = tempdir()?;
        write_profiles(dir.path(), &["work.ovpn", "home.ovpn"])?;

        let err = resolve(dir.path(), None).unwrap_err();
        match err.downcast_ref::<LaunchError>() {
            Some(LaunchError::AmbiguousProfile { candidates }) => {
                assert_eq!(candidates, &vec!["home".to_string(), "work".to_string()]);
            }
            other => panic!("Expected AmbiguousProfile, got {:?}", other),
        }

        // Nothing was created
        assert_eq!(fs::read_dir(dir.path())?.count(), 2);

        Ok(())
    }

    #[test]
    fn test_empty_directory_is_ambiguous() -> Result<()> {
        let dir = tempdir()?;
        let err = resolve(dir.path(), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LaunchError>(),
            Some(LaunchError::AmbiguousProfile { candidates }) if candidates.is_empty()
        ));
        Ok(())
    }

    #[test]
    fn test_unknown_profile() -> Result<()> {
        let dir = tempdir()?;
        write_profiles(dir.path(), &["work.ovpn", "home.ovpn"])?;

        assert_eq!(resolve(dir.path(), Some("home"))?.name, "home");

        for name in ["lab", "../work", "work.ovpn"] {
            let err = resolve(dir.path(), Some(name)).unwrap_err();
            match err.downcast_ref::<LaunchError>() {
                Some(LaunchError::UnknownProfile { name: got, candidates }) => {
                    assert_eq!(got, name);
                    assert_eq!(candidates.len(), 2);
                }
                other => panic!("Expected UnknownProfile, got {:?}", other),
            }
        }

        Ok(())
    }

    #[test]
    fn test_missing_directory() {
        assert!(resolve(Path::new("/nonexistent/otpvpn"), None).is_err());
    }

    #[test]
    fn test_permission_warning() -> Result<()> {
        let dir = tempdir()?;
        write_profiles(dir.path(), &["work.ovpn"])?;
        let profile = resolve(dir.path(), None)?;

        fs::set_permissions(&profile.template, fs::Permissions::from_mode(0o644))?;
        assert!(profile.check_permissions()?.is_some());

        fs::set_permissions(&profile.template, fs::Permissions::from_mode(0o660))?;
        assert!(profile.check_permissions()?.is_some());

        fs::set_permissions(&profile.template, fs::Permissions::from_mode(0o600))?;
        assert!(profile.check_permissions()?.is_none());

        Ok(())
    }

    #[test]
    fn test_world_writable_template_rejected() -> Result<()> {
        let dir = tempdir()?;
        write_profiles(dir.path(), &["work.ovpn"])?;
        let profile = resolve(dir.path(), None)?;

        fs::set_permissions(&profile.template, fs::Permissions::from_mode(0o666))?;
        let err = profile.check_permissions().unwrap_err();
        match err.downcast_ref::<LaunchError>() {
            Some(LaunchError::InsecureProfile { template, mode }) => {
                assert_eq!(template, &profile.template);
                assert_eq!(*mode, 0o666);
            }
            other => panic!("Expected InsecureProfile, got {:?}", other),
        }

        Ok(())
    }
}
