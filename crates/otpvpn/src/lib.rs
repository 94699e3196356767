//! otpvpn - Launch OpenVPN with encrypted, OTP-augmented credentials
//!
//! "Plaintext credentials should live for seconds, not sessions."
//!
//! A profile template names a credential bundle. The bundle is decrypted
//! into a private staging area, the one-time code is spliced into the
//! password, the template is rewritten to point at the staged copy and the
//! process becomes the VPN client. Every staged file is registered with the
//! [`CleanupRegistry`] the moment it exists and is removed on every exit
//! path, including signals and the detached watchdog after handoff.

pub mod bundle;
pub mod cleanup;
pub mod error;
pub mod launcher;
pub mod pipeline;
pub mod privilege;
pub mod profile;
pub mod session;
pub mod signals;
pub mod stager;
pub mod staging;
pub mod store;
pub mod terminal;

pub use cleanup::{CleanupGuard, CleanupRegistry};
pub use error::LaunchError;
pub use launcher::SessionLauncher;
pub use profile::Profile;
pub use session::{SessionConfig, SessionConfigBuilder};
pub use stager::{CredentialStager, StagedCredential};
pub use staging::StagingArea;
pub use store::{Cipher, GpgCipher, SecretStore};
pub use terminal::TerminalState;
