//! Cleanup registry - paths that must not outlive the process
//!
//! Every staged file and directory is registered here the moment it is
//! created. The registry is drained exactly once: by [`CleanupGuard`] when
//! `main` unwinds or returns, by the signal thread on interruption, or by the
//! detached watchdog after the client has taken over. Deleting a path that is
//! already gone is a no-op, and a drain that races another one waits for it
//! to finish.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Process-wide list of paths to remove on exit
#[derive(Debug, Default)]
pub struct CleanupRegistry {
    paths: Mutex<Vec<PathBuf>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with paths (used by the watchdog)
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: Mutex::new(paths),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PathBuf>> {
        // A panic while holding the lock must not stop us deleting secrets
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule a path for deletion
    pub fn register(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        tracing::debug!(path = %path.display(), "registered for cleanup");
        self.lock().push(path);
    }

    /// Snapshot of the registered paths, in registration order
    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Delete every registered path, in registration order
    ///
    /// Failures are logged and skipped. Returns the number of paths that
    /// actually existed and were removed. The lock is held until the last
    /// deletion finishes, so a concurrent drain (the signal thread) returns
    /// only once nothing registered is left on disk.
    pub fn drain_and_delete(&self) -> usize {
        let mut paths = self.lock();
        let mut removed = 0;

        for path in paths.drain(..) {
            match remove_path(&path) {
                Ok(true) => {
                    tracing::debug!(path = %path.display(), "removed");
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cleanup failed");
                }
            }
        }

        removed
    }

    /// Guard that drains this registry when dropped
    pub fn guard(self: &Arc<Self>) -> CleanupGuard {
        CleanupGuard {
            registry: Arc::clone(self),
        }
    }
}

/// Drains the registry when it goes out of scope, including during unwinding
#[must_use = "the registry is drained when the guard is dropped"]
pub struct CleanupGuard {
    registry: Arc<CleanupRegistry>,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.registry.drain_and_delete();
    }
}

/// Remove a file or directory tree. `Ok(false)` if it was already gone.
fn remove_path(path: &Path) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Prefix of every staging directory name
pub const STAGING_PREFIX: &str = "otpvpn-";

/// Whether the watchdog may delete `path`
///
/// Only a staging directory directly under `runtime`, or an entry directly
/// inside one, qualifies. The staging directory must be a real directory
/// owned by the current effective user with mode 700.
pub fn is_reapable(path: &Path, runtime: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(runtime) else {
        return false;
    };

    let mut components = relative.components();
    let staging = match components.next() {
        Some(Component::Normal(name)) => name,
        _ => return false,
    };
    if !staging.to_string_lossy().starts_with(STAGING_PREFIX) {
        return false;
    }
    match components.next() {
        None | Some(Component::Normal(_)) => {}
        _ => return false,
    }
    if components.next().is_some() {
        return false;
    }

    let Ok(metadata) = fs::symlink_metadata(runtime.join(staging)) else {
        return false;
    };
    metadata.is_dir()
        && metadata.uid() == otpvpn_core::process::effective_uid()
        && metadata.mode() & 0o777 == 0o700
}

/// Wait out the grace period, then remove the staging paths among `paths`
///
/// Body of the watchdog process the launcher leaves behind when it hands the
/// process image over to the VPN client. Anything outside a staging
/// directory under `runtime` is refused and left alone.
pub fn reap_after(delay: Duration, runtime: &Path, paths: Vec<PathBuf>) -> usize {
    std::thread::sleep(delay);

    let (allowed, refused): (Vec<_>, Vec<_>) = paths
        .into_iter()
        .partition(|path| is_reapable(path, runtime));
    for path in &refused {
        tracing::warn!(path = %path.display(), "refusing to remove path outside the staging area");
    }

    CleanupRegistry::with_paths(allowed).drain_and_delete()
}
