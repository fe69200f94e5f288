//! Baseliner: apply a pipeline file, README and CI/CD variables to every
//! project in a GitLab group, with credentials pulled from Vault.
//!
//! # Usage
//!
//! ```text
//! baseliner [--config conf/config.yaml] [--conf overlay.toml ...]
//!           [--product-line prd|stg] [--cluster-name NAME] [--auth-type token|approle]
//!           [--workers N] [--timeout-secs S] [--log-json]
//!           run [--json] | projects [--json] | validate [--project NAME] [--show-readme]
//! ```
//!
//! Environment: `vault_token` or `role_id` + `secret_id`, and `gitlab_url`.

mod commands;
mod exit;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use baseliner_core::config::{Overrides, DEFAULT_CONFIG_PATH};
use commands::{projects::ProjectsArgs, run::RunArgs, validate::ValidateArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "baseliner",
    version,
    about = "Reconcile GitLab projects against a baseline using Vault-issued credentials",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Acquire credentials, list projects and apply the baseline to each.
    Run(RunArgs),

    /// Acquire credentials and list the target projects without changing anything.
    Projects(ProjectsArgs),

    /// Resolve configuration and render the README offline.
    Validate(ValidateArgs),
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Base YAML configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// TOML overlay merged over the base file; repeatable, applied in order.
    #[arg(long = "conf", global = true)]
    pub overlays: Vec<PathBuf>,

    /// Product line: prd or stg.
    #[arg(long, global = true)]
    pub product_line: Option<String>,

    /// Cluster name written into plain variables.
    #[arg(long, global = true)]
    pub cluster_name: Option<String>,

    /// Secret-store authentication: token or approle.
    #[arg(long, global = true)]
    pub auth_type: Option<String>,

    /// Concurrent reconciliation workers.
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Cancel the run after this many seconds.
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
}

impl GlobalArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            product_line: self.product_line.clone(),
            cluster_name: self.cluster_name.clone(),
            auth_type: self.auth_type.clone(),
            workers: self.workers,
            timeout_secs: self.timeout_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.log_json);

    let result = match cli.command {
        Commands::Run(args) => args.run(&cli.global),
        Commands::Projects(args) => args.run(&cli.global),
        Commands::Validate(args) => args.run(&cli.global),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            match exit::phase_of(&err) {
                Some(phase) => eprintln!("{} [{phase}] {err:#}", "error:".red().bold()),
                None => eprintln!("{} {err:#}", "error:".red().bold()),
            }
            exit::code_for(&err)
        }
    }
}

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
