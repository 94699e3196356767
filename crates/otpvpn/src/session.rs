//! Session config builder
//!
//! Copies a profile template into the staging area, pointing its first
//! `auth-user-pass` directive at a freshly reserved credential file. Every
//! other line, including later directives, is copied byte for byte.

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use otpvpn_core::paths::expand_tilde;

use crate::error::LaunchError;
use crate::profile::Profile;
use crate::staging::StagingArea;
use crate::store;

/// Directive whose argument names the credential file
pub const CREDENTIAL_DIRECTIVE: &str = "auth-user-pass";

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(\s*)auth-user-pass(?:\s+("[^"]*"|'[^']*'|\S+))?\s*$"#)
            .expect("directive pattern is valid")
    })
}

/// First credential directive in a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Zero-based line index
    pub line: usize,
    /// Leading whitespace of the line
    pub indent: String,
    /// Argument with quotes removed, if any
    pub argument: Option<String>,
}

/// Find the first `auth-user-pass` line
pub fn find_directive(template: &str) -> Option<Directive> {
    template.lines().enumerate().find_map(|(line, text)| {
        let caps = directive_regex().captures(text)?;
        Some(Directive {
            line,
            indent: caps.get(1).map_or("", |m| m.as_str()).to_string(),
            argument: caps.get(2).map(|m| unquote(m.as_str()).to_string()),
        })
    })
}

fn unquote(arg: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = arg.strip_prefix(quote).and_then(|a| a.strip_suffix(quote)) {
            return inner;
        }
    }
    arg
}

/// Copy `template`, replacing the directive line with one naming `credentials`
pub fn rewrite(template: &str, directive: &Directive, credentials: &Path) -> String {
    let path = credentials.to_string_lossy();
    let argument = if path.chars().any(char::is_whitespace) {
        format!("\"{}\"", path)
    } else {
        path.into_owned()
    };

    let mut out = String::with_capacity(template.len() + argument.len());
    for (index, line) in template.split_inclusive('\n').enumerate() {
        if index != directive.line {
            out.push_str(line);
            continue;
        }

        let content = line.trim_end_matches(['\n', '\r']);
        let ending = &line[content.len()..];
        out.push_str(&directive.indent);
        out.push_str(CREDENTIAL_DIRECTIVE);
        out.push(' ');
        out.push_str(&argument);
        out.push_str(ending);
    }
    out
}

/// Output of [`SessionConfigBuilder::build`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Rewritten config handed to the VPN client
    pub config: PathBuf,
    /// Reserved (empty) file the credential will be staged into
    pub credentials: PathBuf,
    /// Encrypted bundle the template referred to
    pub bundle: PathBuf,
}

/// Builds per-invocation session configs
pub struct SessionConfigBuilder<'a> {
    staging: &'a StagingArea<'a>,
    config_dir: PathBuf,
    home: PathBuf,
}

impl<'a> SessionConfigBuilder<'a> {
    pub fn new(staging: &'a StagingArea<'a>, config_dir: &Path, home: &Path) -> Self {
        Self {
            staging,
            config_dir: config_dir.to_path_buf(),
            home: home.to_path_buf(),
        }
    }

    /// Resolve the bundle a directive points at
    ///
    /// `~` expands to the invoking user's home, relative paths are taken
    /// from the configuration directory, and no argument means the bundle
    /// named after the profile.
    pub fn bundle_path(&self, profile: &Profile, argument: Option<&str>) -> PathBuf {
        let reference = match argument {
            Some(arg) => {
                let expanded = expand_tilde(arg, &self.home);
                if expanded.is_absolute() {
                    expanded
                } else {
                    self.config_dir.join(expanded)
                }
            }
            None => self.config_dir.join(&profile.name),
        };
        store::bundle_file(&reference)
    }

    /// Write the session config for `profile`
    ///
    /// The template is scanned before anything is created, so a template
    /// without a directive leaves no files behind.
    pub fn build(&self, profile: &Profile) -> Result<SessionConfig> {
        let template = fs::read_to_string(&profile.template)
            .with_context(|| format!("Failed to read profile template {:?}", profile.template))?;

        let Some(directive) = find_directive(&template) else {
            bail!(LaunchError::MissingCredentialDirective {
                template: profile.template.clone(),
            });
        };
        let bundle = self.bundle_path(profile, directive.argument.as_deref());

        let (mut file, config) = self.staging.reserve("session-", ".conf")?;
        let (_, credentials) = self.staging.reserve("credentials-", "")?;

        let rendered = rewrite(&template, &directive, &credentials);
        file.write_all(rendered.as_bytes())
            .with_context(|| format!("Failed to write session config {:?}", config))?;
        file.sync_all()?;

        tracing::debug!(
            profile = %profile.name,
            config = %config.display(),
            bundle = %bundle.display(),
            "built session config"
        );

        Ok(SessionConfig {
            config,
            credentials,
            bundle,
        })
    }
}
