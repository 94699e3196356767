//! Error taxonomy for the launch pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by otpvpn components
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("{0}")]
    Usage(String),

    #[error("No profile given and more than one available: {}", list(.candidates))]
    AmbiguousProfile { candidates: Vec<String> },

    #[error("Unknown profile '{name}' (available: {})", list(.candidates))]
    UnknownProfile { name: String, candidates: Vec<String> },

    #[error("Required tool not found on PATH: {0}")]
    ToolNotFound(String),

    #[error("Credential bundle not found: {} - create it with 'otpvpn auth'", .0.display())]
    BundleNotFound(PathBuf),

    #[error("Failed to decrypt {}: {}", .bundle.display(), describe(.status))]
    DecryptionFailed { bundle: PathBuf, status: Option<i32> },

    #[error("Failed to encrypt {}: {}", .bundle.display(), describe(.status))]
    EncryptionFailed { bundle: PathBuf, status: Option<i32> },

    #[error("Profile template {} is writable by other users (mode {mode:o}); run chmod 600", .template.display())]
    InsecureProfile { template: PathBuf, mode: u32 },

    #[error("No auth-user-pass directive found in {}", .template.display())]
    MissingCredentialDirective { template: PathBuf },

    #[error("Privilege escalation tool not found on PATH: {0}")]
    ElevationToolNotFound(String),

    #[error("VPN client not found on PATH: {0}")]
    ClientBinaryNotFound(String),

    #[error("Failed to execute {program}: {source}")]
    LaunchFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Whether the usage summary should follow the diagnostic
    pub fn shows_usage(&self) -> bool {
        matches!(
            self,
            Self::Usage(_) | Self::AmbiguousProfile { .. } | Self::UnknownProfile { .. }
        )
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) | Self::AmbiguousProfile { .. } | Self::UnknownProfile { .. } => 2,
            Self::DecryptionFailed { status, .. } | Self::EncryptionFailed { status, .. } => {
                match status {
                    Some(code) if (1..=255).contains(code) => *code as u8,
                    _ => 1,
                }
            }
            _ => 1,
        }
    }
}

fn list(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

fn describe(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("tool exited with status {}", code),
        None => "tool was terminated by a signal".to_string(),
    }
}
