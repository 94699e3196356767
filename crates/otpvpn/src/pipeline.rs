//! Session preparation: everything `start` does between elevation and exec

use anyhow::Result;
use std::path::Path;

use crate::profile::Profile;
use crate::session::{SessionConfig, SessionConfigBuilder};
use crate::stager::{CredentialStager, StagedCredential};
use crate::staging::StagingArea;
use crate::store::{Cipher, SecretStore};

/// A session config and the credential it points at
#[derive(Debug)]
pub struct PreparedSession {
    pub session: SessionConfig,
    pub credential: StagedCredential,
}

/// Options that shape a session
pub struct SessionOptions<'p> {
    pub config_dir: &'p Path,
    pub home: &'p Path,
    pub min_password_length: usize,
}

/// Build the session config, ask for the one-time code, stage the credential
///
/// The session config exists (and is registered) before `read_otp` runs and
/// before anything is decrypted.
pub fn prepare<C, F>(
    profile: &Profile,
    staging: &StagingArea<'_>,
    store: &SecretStore<C>,
    options: &SessionOptions<'_>,
    read_otp: F,
) -> Result<PreparedSession>
where
    C: Cipher,
    F: FnOnce() -> Result<String>,
{
    let session = SessionConfigBuilder::new(staging, options.config_dir, options.home).build(profile)?;

    let otp = read_otp()?;
    let credential = CredentialStager::new(store, staging, options.min_password_length).stage(
        &session.bundle,
        &otp,
        &session.credentials,
    )?;

    Ok(PreparedSession {
        session,
        credential,
    })
}
