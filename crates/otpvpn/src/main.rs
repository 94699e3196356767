//! otpvpn - Launch OpenVPN with encrypted OTP credentials
//!
//! Commands:
//! - start [PROFILE] [CONFIG_DIR]: Stage credentials and become openvpn
//! - auth <BUNDLE> [CONFIG_DIR]: Create or replace an encrypted credential bundle
//! - list [CONFIG_DIR]: List available profiles

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use otpvpn::bundle;
use otpvpn::pipeline::{self, SessionOptions};
use otpvpn::store;
use otpvpn::{
    cleanup, privilege, profile, signals, terminal, CleanupRegistry, GpgCipher, LaunchError,
    SecretStore, SessionLauncher, StagingArea, TerminalState,
};
use otpvpn_core::{Config, Paths};
use std::fs;
use std::io::Write;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "otpvpn")]
#[command(about = "Launch OpenVPN with encrypted credentials and a one-time code")]
#[command(version)]
#[command(after_help = r#"FILES:
    ~/.ovpn/<profile>.ovpn           Profile template (must contain auth-user-pass)
    ~/.ovpn/<bundle>.gpg             Encrypted credential bundle
    ~/.config/otpvpn/config.yaml     Optional settings

SECURITY:
    - Bundles are symmetric gpg files holding the username and the
      password followed by the %{OTP} placeholder
    - Decrypted material only exists in a private directory (mode 700)
      and is removed on exit, on error, on interrupt and after handoff
    - Credentials are decrypted only after re-executing through sudo"#)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage credentials for a profile and launch the VPN client
    Start {
        /// Profile name (optional when only one profile exists)
        profile: Option<String>,
        /// Directory holding profiles and bundles (default: ~/.ovpn)
        config_dir: Option<PathBuf>,
    },

    /// Create or replace an encrypted credential bundle
    Auth {
        /// Bundle name (stored as <CONFIG_DIR>/<BUNDLE>.gpg)
        bundle: String,
        /// Directory holding profiles and bundles (default: ~/.ovpn)
        config_dir: Option<PathBuf>,
    },

    /// List available profiles
    List {
        /// Directory holding profiles and bundles (default: ~/.ovpn)
        config_dir: Option<PathBuf>,
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Remove staged files after a delay (started by `start`)
    #[command(name = "reap", hide = true)]
    Reap {
        /// Seconds to wait before deleting
        #[arg(long, default_value_t = 5)]
        delay: u64,
        /// Paths to delete
        #[arg(last = true)]
        paths: Vec<PathBuf>,
    },
}

/// Shared state for every command
struct App {
    paths: Paths,
    config: Config,
    registry: Arc<CleanupRegistry>,
    terminal: Arc<TerminalState>,
    verbose: bool,
}

impl App {
    /// Explicit directory, then settings, then ~/.ovpn
    fn config_dir(&self, explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| {
                self.config
                    .profile_dir
                    .as_ref()
                    .map(|dir| self.paths.expand(&dir.to_string_lossy()))
            })
            .unwrap_or_else(|| self.paths.profiles.clone())
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Commands::Reap { delay, paths } = &cli.command {
        // Reaping in the foreground would delete the credentials before the
        // launcher stops waiting and execs the client
        if let Err(e) = otpvpn_core::process::detach() {
            tracing::warn!(error = %e, "watchdog failed to detach");
            return ExitCode::FAILURE;
        }
        cleanup::reap_after(Duration::from_secs(*delay), &Paths::new().runtime, paths.clone());
        return ExitCode::SUCCESS;
    }

    let registry = Arc::new(CleanupRegistry::new());
    let terminal = Arc::new(TerminalState::new());
    if let Err(e) = signals::install(Arc::clone(&registry), Arc::clone(&terminal)) {
        tracing::warn!(error = %e, "signal handlers not installed");
    }

    finish(&registry, || run(cli, &registry, &terminal), report)
}

/// Run `body` under a cleanup guard, reporting any error before the drain
fn finish(
    registry: &Arc<CleanupRegistry>,
    body: impl FnOnce() -> Result<()>,
    on_error: impl FnOnce(&anyhow::Error) -> ExitCode,
) -> ExitCode {
    let _cleanup = registry.guard();
    match body() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => on_error(&e),
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli, registry: &Arc<CleanupRegistry>, terminal: &Arc<TerminalState>) -> Result<()> {
    let paths = Paths::new();
    let config = Config::load(&paths.config_file())?;
    let ctx = App {
        paths,
        config,
        registry: Arc::clone(registry),
        terminal: Arc::clone(terminal),
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Start { profile, config_dir } => cmd_start(&ctx, profile.as_deref(), config_dir),
        Commands::Auth { bundle, config_dir } => cmd_auth(&ctx, &bundle, config_dir),
        Commands::List { config_dir, json } => cmd_list(&ctx, config_dir, json),
        Commands::Reap { .. } => Ok(()),
    }
}

/// Print the diagnostic (and usage where it helps) and pick the exit status
fn report(err: &anyhow::Error) -> ExitCode {
    eprintln!("error: {:#}", err);

    match err.downcast_ref::<LaunchError>() {
        Some(launch) => {
            if launch.shows_usage() {
                eprintln!();
                eprintln!("{}", Cli::command().render_usage());
            }
            ExitCode::from(launch.exit_code())
        }
        None => ExitCode::FAILURE,
    }
}

fn require_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        bail!(LaunchError::Usage(format!(
            "Configuration directory not found: {}",
            dir.display()
        )));
    }
    Ok(())
}

/// Stage credentials and become the VPN client
fn cmd_start(ctx: &App, requested: Option<&str>, config_dir: Option<PathBuf>) -> Result<()> {
    let config_dir = ctx.config_dir(config_dir);
    require_dir(&config_dir)?;

    let profile = profile::resolve(&config_dir, requested)?;
    if let Some(warning) = profile.check_permissions()? {
        eprintln!("warning: {}", warning);
    }

    privilege::ensure_elevated(
        &ctx.config.elevation,
        &profile.name,
        &config_dir,
        ctx.verbose,
        &ctx.registry,
    )?;

    // Fail on missing tools before anything is written
    let store = SecretStore::new(GpgCipher::locate(&ctx.config.cipher)?);
    let launcher = SessionLauncher::locate(
        &ctx.config.client,
        &ctx.config.client_args,
        Duration::from_secs(ctx.config.cleanup_delay_secs),
    )?;

    let staging = StagingArea::create(&ctx.paths.runtime, &ctx.registry)?;
    let options = SessionOptions {
        config_dir: &config_dir,
        home: &ctx.paths.home,
        min_password_length: ctx.config.min_password_length,
    };
    let prepared = pipeline::prepare(&profile, &staging, &store, &options, || {
        terminal::prompt_hidden(&ctx.terminal, "OTP code: ")
    })?;

    for warning in &prepared.credential.warnings {
        eprintln!("warning: {}", warning);
    }

    println!("info: Connecting with profile: {}", profile.name);
    std::io::stdout().flush()?;

    match launcher.launch(&prepared.session.config, &ctx.registry.paths())? {}
}

/// Create or replace an encrypted credential bundle
fn cmd_auth(ctx: &App, name: &str, config_dir: Option<PathBuf>) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        bail!(LaunchError::Usage(format!("Invalid bundle name: {}", name)));
    }

    let store = SecretStore::new(GpgCipher::locate(&ctx.config.cipher)?);

    let config_dir = ctx.config_dir(config_dir);
    if !config_dir.exists() {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&config_dir)
            .with_context(|| format!("Failed to create {:?}", config_dir))?;
        println!("info: Created {}", config_dir.display());
    }
    let bundle_path = store::bundle_file(&config_dir.join(name));

    let username = terminal::prompt_visible("Username: ")?;
    let password = terminal::prompt_hidden(&ctx.terminal, "Password: ")?;
    let confirm = terminal::prompt_hidden(&ctx.terminal, "Confirm password: ")?;
    if password != confirm {
        bail!(LaunchError::Usage("Passwords do not match".to_string()));
    }
    if password.is_empty() {
        bail!(LaunchError::Usage("Empty password not allowed".to_string()));
    }

    let staging = StagingArea::create(&ctx.paths.runtime, &ctx.registry)?;
    let (mut file, plaintext) = staging.reserve("bundle-", "")?;
    file.write_all(bundle::compose(&username, &password).as_bytes())?;
    file.sync_all()?;
    drop(file);

    println!("info: Encrypting with {} (you will be asked for a passphrase)", ctx.config.cipher);
    store.encrypt(&plaintext, &bundle_path)?;
    fs::remove_file(&plaintext)?;

    println!("success: Credential bundle stored: {}", bundle_path.display());
    println!("Reference it from a profile with: auth-user-pass {}", config_dir.join(name).display());

    Ok(())
}

/// List available profiles
fn cmd_list(ctx: &App, config_dir: Option<PathBuf>, json: bool) -> Result<()> {
    let config_dir = ctx.config_dir(config_dir);
    require_dir(&config_dir)?;

    let profiles = profile::list(&config_dir)?;

    if json {
        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        println!("{}", serde_json::to_string_pretty(&names)?);
        return Ok(());
    }

    if profiles.is_empty() {
        println!("No profiles in {}", config_dir.display());
        println!("Add one as <name>.ovpn containing an auth-user-pass line");
        return Ok(());
    }

    println!("Profiles in {}", config_dir.display());
    println!();
    for profile in &profiles {
        println!("  {}", profile.name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_start() {
        let cli = Cli::try_parse_from(["otpvpn", "start"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Start { profile: None, config_dir: None }
        ));

        let cli = Cli::try_parse_from(["otpvpn", "start", "work", "/etc/ovpn"]).unwrap();
        if let Commands::Start { profile, config_dir } = cli.command {
            assert_eq!(profile.as_deref(), Some("work"));
            assert_eq!(config_dir, Some(PathBuf::from("/etc/ovpn")));
        } else {
            panic!("Expected Start command");
        }

        let cli = Cli::try_parse_from(["otpvpn", "--verbose", "start", "work"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_parse_auth() {
        let cli = Cli::try_parse_from(["otpvpn", "auth", "work"]).unwrap();
        if let Commands::Auth { bundle, config_dir } = cli.command {
            assert_eq!(bundle, "work");
            assert!(config_dir.is_none());
        } else {
            panic!("Expected Auth command");
        }

        assert!(Cli::try_parse_from(["otpvpn", "auth"]).is_err());
    }

    #[test]
    fn test_cli_rejects_bad_usage() {
        assert!(Cli::try_parse_from(["otpvpn"]).is_err());
        assert!(Cli::try_parse_from(["otpvpn", "connect"]).is_err());
        assert!(Cli::try_parse_from(["otpvpn", "start", "a", "b", "c"]).is_err());
    }

    #[test]
    fn test_cli_reap_matches_watchdog() {
        let watchdog = otpvpn::launcher::watchdog_command(
            Path::new("otpvpn"),
            Duration::from_secs(3),
            &[PathBuf::from("/run/otpvpn-a")],
        );
        let mut argv = vec!["otpvpn".to_string()];
        argv.extend(watchdog.get_args().map(|a| a.to_string_lossy().into_owned()));

        let cli = Cli::try_parse_from(argv).unwrap();
        if let Commands::Reap { delay, paths } = cli.command {
            assert_eq!(delay, 3);
            assert_eq!(paths, vec![PathBuf::from("/run/otpvpn-a")]);
        } else {
            panic!("Expected Reap command");
        }
    }

    #[test]
    fn test_error_reported_before_cleanup() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let staged = dir.path().join("credentials");
        fs::write(&staged, "alice\nsecret123\n")?;

        let registry = Arc::new(CleanupRegistry::new());
        registry.register(&staged);

        // (exit code, staged file still present) as seen by the reporter
        let mut seen = None;
        finish(
            &registry,
            || bail!(LaunchError::Usage("bad".to_string())),
            |err| {
                let code = err.downcast_ref::<LaunchError>().map_or(1, LaunchError::exit_code);
                seen = Some((code, staged.exists()));
                ExitCode::from(code)
            },
        );

        assert_eq!(seen, Some((2, true)));
        assert!(!staged.exists());
        Ok(())
    }

    #[test]
    fn test_success_drains() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let staged = dir.path().join("session.conf");
        fs::write(&staged, "remote a")?;

        let registry = Arc::new(CleanupRegistry::new());
        registry.register(&staged);

        let mut reported = false;
        finish(&registry, || Ok(()), |_| {
            reported = true;
            ExitCode::FAILURE
        });
        assert!(!reported);
        assert!(!staged.exists());
        Ok(())
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }
}
