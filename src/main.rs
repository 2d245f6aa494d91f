use std::{
    io::Write,
    path::{Path, PathBuf},
};

use clap::Parser;
use docprune::{
    PruneError, RunConfig,
    config::PruneConfig,
    datastore::{self, Datastore},
    observability::{TracingGuard, init_tracing},
    policy,
    prune::{self, LineSink, PruneSummary},
};

const DEFAULT_CONFIG_FILE: &str = "docprune.toml";

/// CLI arguments for docprune
#[derive(Parser, Debug)]
#[command(version, about = "Retention pruner for document datastores", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./docprune.toml if it exists,
    /// otherwise built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Count and delete expired records (default)
    Prune(PruneArgs),
    /// List collections with the retention policy each one resolves to
    Collections,
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to ./docprune.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::Args, Debug, Default)]
struct PruneArgs {
    /// Days of history to keep (overrides retention.days)
    #[arg(long)]
    days: Option<i64>,
    /// Only report what would be deleted
    #[arg(long, conflicts_with = "execute")]
    dry_run: bool,
    /// Delete expired records and compact the datastore
    #[arg(long)]
    execute: bool,
}

impl PruneArgs {
    /// Apply command-line overrides on top of the file configuration.
    fn run_config(&self, config: &PruneConfig) -> Result<RunConfig, PruneError> {
        let days = self.days.unwrap_or(config.retention.days);
        let dry_run = if self.execute {
            false
        } else if self.dry_run {
            true
        } else {
            config.retention.dry_run
        };
        RunConfig::new(days, dry_run)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    let command = args
        .command
        .unwrap_or_else(|| Command::Prune(PruneArgs::default()));

    let result = match command {
        Command::Init { output, force } => {
            match run_init_default(output, force) {
                Ok(output_path) => {
                    println!("Created config file: {}", output_path.display());
                    println!();
                    println!("To see what would be pruned, run:");
                    println!("  docprune prune --config {}", output_path.display());
                }
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            }
            return;
        }
        Command::Prune(prune_args) => {
            let (config, _tracing_guard) = setup(args.config.as_deref());
            prune_command(&config, &prune_args).await
        }
        Command::Collections => {
            let (config, _tracing_guard) = setup(args.config.as_deref());
            collections_command(&config).await
        }
    };

    let code = exit_code(result);
    if code != 0 {
        std::process::exit(code);
    }
}

/// Print a failed run's error to stderr and return the process exit status.
fn exit_code(result: Result<(), PruneError>) -> i32 {
    let Err(e) = result else {
        return 0;
    };
    match e.datastore_error() {
        Some(source) if source.is_connectivity() => {
            eprintln!("Error: datastore unavailable: {}", e)
        }
        _ => eprintln!("Error: {}", e),
    }
    1
}

/// Load configuration and initialize logging, exiting on failure.
fn setup(config_path: Option<&str>) -> (PruneConfig, TracingGuard) {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match init_tracing(&config.observability) {
        Ok(guard) => (config, guard),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn connect(config: &PruneConfig) -> Result<Box<dyn Datastore>, PruneError> {
    let store = datastore::connect(&config.database).await?;
    tracing::debug!("Connected to datastore");
    Ok(store)
}

async fn prune_command(config: &PruneConfig, args: &PruneArgs) -> Result<(), PruneError> {
    let run_config = args.run_config(config)?;
    let store = connect(config).await?;
    let mut stdout = std::io::stdout().lock();
    run_prune(store.as_ref(), run_config, &mut stdout).await?;
    Ok(())
}

async fn collections_command(config: &PruneConfig) -> Result<(), PruneError> {
    let store = connect(config).await?;
    let mut stdout = std::io::stdout().lock();
    run_collections(store.as_ref(), &mut stdout).await
}

/// Run a prune pass, writing one report line per policy collection to `out`.
async fn run_prune(
    store: &dyn Datastore,
    run_config: RunConfig,
    out: &mut impl Write,
) -> Result<PruneSummary, PruneError> {
    let mut sink = LineSink::new(out);
    let summary = prune::prune(store, run_config, &mut sink).await?;

    tracing::debug!(
        reports = summary.reports.len(),
        matched = summary.total_matched(),
        deleted = summary.deleted,
        compacted = summary.compacted,
        "Done"
    );
    Ok(summary)
}

/// Write every collection and the policy it resolves to. Read-only.
async fn run_collections(store: &dyn Datastore, out: &mut impl Write) -> Result<(), PruneError> {
    let names = store.list_collections().await?;

    for name in names {
        match policy::resolve(&name) {
            Some(policy) => writeln!(out, "{}\t{}", name, policy)?,
            None => writeln!(out, "{}\tskipped", name)?,
        }
    }
    out.flush()?;
    Ok(())
}

/// Resolve the config path and load it.
///
/// An explicit `--config` must exist. Otherwise `./docprune.toml` is used if
/// present, falling back to built-in defaults.
fn load_config(explicit: Option<&str>) -> Result<PruneConfig, PruneError> {
    let path = match explicit {
        Some(path) => {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(PruneError::Configuration(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Some(path)
        }
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
    };

    match path {
        Some(path) => load_config_file(&path),
        None => Ok(PruneConfig::default()),
    }
}

fn load_config_file(path: &Path) -> Result<PruneConfig, PruneError> {
    PruneConfig::from_file(path).map_err(|e| PruneError::Configuration(e.to_string()))
}

fn default_config_toml() -> &'static str {
    r#"# docprune configuration

# Datastore holding the collections to prune
[database]
type = "sqlite"
path = "ace.db"

# PostgreSQL instead of SQLite
# [database]
# type = "postgres"
# url = "${DATABASE_URL}"

[retention]
# Records older than this many days are pruned
days = 30
# Report only. Set to false (or pass --execute) to delete and compact.
dry_run = true

[observability.logging]
level = "info"
format = "compact"
"#
}

/// Create a default configuration file, returning the path written.
fn run_init_default(output: Option<String>, force: bool) -> Result<PathBuf, String> {
    let output_path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if output_path.exists() && !force {
        return Err(format!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        ));
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create directory {}: {}", parent.display(), e))?;
    }

    std::fs::write(&output_path, default_config_toml())
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(output_path)
}
