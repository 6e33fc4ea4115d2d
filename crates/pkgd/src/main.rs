//! `pkgd`: the package distribution daemon's entry point. Loads a TOML
//! config (overridable from the command line), initializes structured
//! logging, wires together the root catalog, its inode allocator, the
//! package loader cache, the updater, and (opt-in) unsigned staging, then
//! runs until interrupted.
//!
//! The out-of-scope kernel filesystem adapter (spec.md §1) is not part of
//! this workspace; this binary exposes the same `Daemon::resolve`/
//! `Daemon::read_verified` surface such an adapter would call into, and a
//! `lookup` subcommand that exercises it directly for diagnostics without
//! requiring a mounted filesystem.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pkgd::config::PkgdConfig;
use pkgd::daemon::Daemon;
use pkgd::notifier::LoggingNotifier;

#[derive(Parser, Debug)]
#[command(name = "pkgd", version, about = "Signed-package distribution daemon")]
struct Cli {
    /// Path to a TOML config file; a missing file falls back to defaults.
    #[arg(long, default_value = "/etc/pkgd/pkgd.toml")]
    config: PathBuf,

    /// Overrides `storage_root` from the config file.
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// Overrides `repo_prefix` from the config file.
    #[arg(long)]
    prefix: Option<String>,

    /// Overrides `unsigned_staging` to `true` regardless of the config file.
    #[arg(long)]
    unsigned_staging: bool,

    /// Overrides the `tracing_subscriber::EnvFilter` directive.
    #[arg(long)]
    log: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolves one name against the catalog and prints what it found,
    /// without starting the updater or unsigned-staging watcher.
    Lookup {
        /// Dotted package name, e.g. `sys.widget.lib.1.2.3.linux.amd64`
        /// or a version-less prefix like `sys.widget.lib`.
        name: String,
    },
    /// Runs the daemon until interrupted (the default when no subcommand
    /// is given).
    Run,
}

fn apply_overrides(mut config: PkgdConfig, cli: &Cli) -> PkgdConfig {
    if let Some(storage_root) = &cli.storage_root {
        config.storage_root = storage_root.clone();
    }
    if let Some(prefix) = &cli.prefix {
        config.repo_prefix = prefix.clone();
    }
    if cli.unsigned_staging {
        config.unsigned_staging = true;
    }
    if let Some(log) = &cli.log {
        config.log = log.clone();
    }
    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = apply_overrides(PkgdConfig::load(&cli.config)?, &cli);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(
        name = %config.name,
        os = %config.os,
        arch = %config.arch,
        storage_root = %config.storage_root.display(),
        unsigned_staging = config.unsigned_staging,
        "starting pkgd"
    );

    let client = reqwest::Client::builder()
        .user_agent(concat!("pkgd/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let daemon = Daemon::new(&config, client)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Lookup { name } => run_lookup(&daemon, &name),
        Command::Run => run(daemon).await,
    }
}

fn run_lookup(daemon: &Arc<Daemon>, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    match daemon.resolve(name) {
        Ok(resolved) => {
            println!("{name}: {resolved:?}");
            Ok(())
        }
        Err(err) => {
            eprintln!("{name}: lookup failed: {err}");
            Err(Box::new(err) as Box<dyn std::error::Error>)
        }
    }
}

async fn run(daemon: Arc<Daemon>) -> Result<(), Box<dyn std::error::Error>> {
    let notifier: Arc<dyn pkgd_fskit::KernelNotifier> = Arc::new(LoggingNotifier);

    daemon.spawn_updater(daemon.root.clone(), notifier.clone());
    daemon.spawn_cache_sweeper();

    if let Some(staging) = daemon.unsigned_staging() {
        tokio::spawn(async move {
            if let Err(err) = staging.run().await {
                tracing::error!(error = %err, "unsigned staging watcher exited");
            }
        });
    }

    tracing::info!("pkgd running; waiting for shutdown signal");
    tokio::signal::ctrl_c().await?;
    daemon.shutdown();
    tracing::info!(
        cached_loaders = daemon.package_cache_len(),
        "shutdown signal received, exiting"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_only_the_fields_given_on_the_command_line() {
        let cli = Cli::parse_from(["pkgd", "--prefix", "https://override.example/"]);
        let config = apply_overrides(PkgdConfig::default(), &cli);
        assert_eq!(config.repo_prefix, "https://override.example/");
        assert_eq!(config.name, PkgdConfig::default().name);
    }

    #[test]
    fn unsigned_staging_flag_only_ever_turns_it_on() {
        let cli = Cli::parse_from(["pkgd"]);
        let mut base = PkgdConfig::default();
        base.unsigned_staging = true;
        let config = apply_overrides(base, &cli);
        assert!(config.unsigned_staging, "absent flag must not clear a config-enabled value");
    }
}
