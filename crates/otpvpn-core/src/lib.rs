//! otpvpn core - Shared functionality for the otpvpn launcher
//!
//! Standard paths, the settings file and the process helpers every
//! command needs before it touches a credential.

pub mod config;
pub mod paths;
pub mod process;

pub use config::Config;
pub use paths::Paths;
