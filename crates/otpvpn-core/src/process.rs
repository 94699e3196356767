//! Process and privilege utilities

use std::ffi::{CStr, CString, OsStr};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::ptr;

/// Environment variables an elevation tool sets to name the user it was invoked by
const INVOKING_USER_VARS: &[&str] = &["SUDO_USER", "DOAS_USER"];

/// Locate an executable on PATH (or verify an explicit path)
pub fn find_tool(name: &str) -> Option<PathBuf> {
    match which::which(name) {
        Ok(path) => {
            tracing::debug!(tool = name, path = %path.display(), "resolved tool");
            Some(path)
        }
        Err(e) => {
            tracing::debug!(tool = name, error = %e, "tool not found");
            None
        }
    }
}

/// Effective uid of this process
pub fn effective_uid() -> u32 {
    unsafe { libc::geteuid() }
}

/// Check if the process runs with an effective uid of root
pub fn is_elevated() -> bool {
    effective_uid() == 0
}

/// Fork into a new session and let the parent exit
///
/// Only the child returns. Whoever spawned us reaps the parent straight
/// away and init adopts the child, so nothing is left as a zombie under a
/// process that never waits. Must be called before any thread is started.
pub fn detach() -> io::Result<()> {
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => {
            if unsafe { libc::setsid() } == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
        _ => unsafe { libc::_exit(0) },
    }
}

/// The unprivileged user who invoked us through sudo/doas, if any
pub fn invoking_user() -> Option<String> {
    if !is_elevated() {
        return None;
    }

    INVOKING_USER_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|user| !user.is_empty() && user != "root")
}

/// Look up a user's home directory in the password database
pub fn home_of(user: &str) -> Option<PathBuf> {
    let name = CString::new(user).ok()?;
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0 as libc::c_char; 16 * 1024];
    let mut result: *mut libc::passwd = ptr::null_mut();

    let rc = unsafe {
        libc::getpwnam_r(
            name.as_ptr(),
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        )
    };

    if rc != 0 || result.is_null() || pwd.pw_dir.is_null() {
        return None;
    }

    let dir = unsafe { CStr::from_ptr(pwd.pw_dir) };
    Some(PathBuf::from(OsStr::from_bytes(dir.to_bytes())))
}
