use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use log::{debug, error};
use simple_logger::SimpleLogger;

use crate::config::{Config, FileConfig, RawInputs};
use crate::error::Result;
use crate::outputs::{workflow_error, Outputs};
use crate::prune::Pruner;
use crate::runner::SystemRunner;
use crate::sdk::{ensure_ready, CloudSdk, Gcloud};

mod config;
mod error;
mod intent;
mod outputs;
mod prune;
mod runner;
mod sdk;
mod versions;

/// Prunes old non-serving App Engine versions
#[derive(Parser)]
#[clap(name = "gae-prune")]
#[clap(about = "Prunes old non-serving App Engine versions", long_about = None)]
struct Cli {
    /// YAML file with default inputs
    #[clap(short, long)]
    config: Option<PathBuf>,
    #[clap(flatten)]
    inputs: InputArgs,
    /// Print the outputs as a JSON object on stdout
    #[clap(long)]
    json: bool,
    #[clap(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Commands {
    /// Deletes the oldest non-serving versions above the limit (default)
    Prune,
    /// Prints which versions would be kept and deleted
    Dryrun,
}

#[derive(Args)]
struct InputArgs {
    /// Project to prune; defaults to the project configured in gcloud
    #[clap(long, env = "INPUT_PROJECT_ID")]
    project_id: Option<String>,
    /// App Engine service to prune
    #[clap(long, env = "INPUT_SERVICE_NAME")]
    service_name: Option<String>,
    /// Maximum number of non-serving versions to keep
    #[clap(long, env = "INPUT_LIMIT", allow_hyphen_values = true)]
    limit: Option<String>,
    /// Only consider versions deployed more than this many days ago
    #[clap(long, env = "INPUT_APPLY_LIMIT_AFTER_DAYS", allow_hyphen_values = true)]
    apply_limit_after_days: Option<String>,
    /// Service account key JSON
    #[clap(long, env = "INPUT_CREDENTIALS", hide_env_values = true)]
    credentials: Option<String>,
    /// Credential file written by an earlier auth step; wins over --credentials
    #[clap(long, env = "GOOGLE_GHA_CREDS_PATH")]
    credentials_file: Option<PathBuf>,
    /// gcloud executable
    #[clap(long, env = "CLOUDSDK_GCLOUD_PATH")]
    gcloud_path: Option<String>,
    /// File the step outputs are appended to
    #[clap(long, env = "GITHUB_OUTPUT")]
    github_output: Option<PathBuf>,
}

impl From<InputArgs> for RawInputs {
    fn from(args: InputArgs) -> Self {
        RawInputs {
            project_id: args.project_id,
            service_name: args.service_name,
            limit: args.limit,
            apply_limit_after_days: args.apply_limit_after_days,
            credentials: args.credentials,
            credentials_file: args.credentials_file,
            gcloud_path: args.gcloud_path,
            github_output: args.github_output,
        }
    }
}

fn run(args: Cli) -> Result<()> {
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let mut config = Config::resolve(args.inputs.into(), file)?;
    debug!("{:?}", config);

    let runner = SystemRunner;
    let gcloud = Gcloud::new(&runner, config.gcloud_path.clone());
    config.target.project_id = ensure_ready(&gcloud, &config)?;

    let command = args.command.unwrap_or(Commands::Prune);
    let pruner = Pruner::new(&runner, gcloud.tool_command());
    let report = pruner.prune(&config.target, command == Commands::Dryrun)?;

    if command == Commands::Dryrun {
        return Ok(());
    }

    let outputs = Outputs::from_report(&report);
    outputs.log();
    if let Some(path) = &config.github_output {
        outputs.write_github_output(path)?;
    }
    if args.json {
        println!("{}", outputs.to_json()?);
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Cli::parse();

    if let Err(e) = SimpleLogger::new()
        .with_level(args.verbose.log_level_filter())
        .with_utc_timestamps()
        .init()
    {
        eprintln!("unable to initialize logging: {}", e);
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            if env::var_os("GITHUB_ACTIONS").is_some() {
                println!("{}", workflow_error(&e.to_string()));
            }
            ExitCode::FAILURE
        }
    }
}
