//! porter
//!
//! In-container agent that runs one job document.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use porter_cli::{Format, RunOptions};
use porter_template::SecretSet;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "porter=info";

#[derive(Parser)]
#[command(name = "porter")]
#[command(about = "Run a job document with connector-staged inputs and outputs", long_about = None)]
#[command(version)]
struct Cli {
    /// Write logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage inputs, run the job and deliver its outputs
    Run(RunArgs),
    /// List template placeholders and whether they are protected
    Inspect {
        /// Job document as local PATH, path:PATH or http(s) URL
        job: String,
        /// Output format
        #[arg(long, value_enum, default_value_t)]
        format: Format,
    },
    /// Print the command a job would run, without staging anything
    Command {
        /// Job document as local PATH, path:PATH or http(s) URL
        job: String,
        /// Batch index, required if the document has batches
        #[arg(short, long)]
        batch: Option<usize>,
        /// Template values as a flat mapping of strings
        #[arg(short, long)]
        variables: Option<String>,
        /// Output format
        #[arg(long, value_enum, default_value_t)]
        format: Format,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Job document as local PATH, path:PATH or http(s) URL
    job: String,
    /// Batch index, required if the document has batches
    #[arg(short, long)]
    batch: Option<usize>,
    /// Send outputs through the connectors of the outputs section
    #[arg(short, long)]
    outputs: bool,
    /// Template values as a flat mapping of strings
    #[arg(short, long)]
    variables: Option<String>,
    /// Staging root for inputs
    #[arg(long)]
    inputs_dir: Option<PathBuf>,
    /// Working directory of the job process, must be empty
    #[arg(long)]
    work_dir: Option<PathBuf>,
    /// Destination of outputs that are not sent
    #[arg(long)]
    outdir: Option<PathBuf>,
    /// Keep temporary inputs and working directories
    #[arg(long)]
    leave_directories: bool,
    /// Print the run report to stdout
    #[arg(short, long)]
    debug: bool,
    /// Report format
    #[arg(long, value_enum, default_value_t)]
    format: Format,
}

impl From<&RunArgs> for RunOptions {
    fn from(args: &RunArgs) -> Self {
        Self {
            job: args.job.clone(),
            batch: args.batch,
            outputs: args.outputs,
            variables: args.variables.clone(),
            inputs_dir: args.inputs_dir.clone(),
            work_dir: args.work_dir.clone(),
            outdir: args.outdir.clone(),
            leave_directories: args.leave_directories,
        }
    }
}

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| eyre!(e))
}

fn run(args: &RunArgs) -> Result<ExitCode> {
    let (report, secrets) = porter_cli::run(&RunOptions::from(args));

    if let Some(lines) = &report.debug_info {
        for line in lines {
            eprintln!("{}", line);
        }
        eprintln!();
    }
    if args.debug {
        println!("{}", report.render(args.format, &secrets)?);
    }
    Ok(ExitCode::from(report.exit_code()))
}

fn print_failure(err: &porter_core::AgentError, secrets: &SecretSet) -> ExitCode {
    for line in porter_cli::report::debug_lines(std::slice::from_ref(err), secrets) {
        eprintln!("{}", line);
    }
    ExitCode::FAILURE
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    match &cli.command {
        Commands::Run(args) => run(args),
        Commands::Inspect { job, format } => match porter_cli::inspect(job) {
            Ok(keys) => {
                println!("{}", format.render(&keys)?);
                Ok(ExitCode::SUCCESS)
            }
            // template errors name document paths only
            Err(e) => Ok(print_failure(&e, &SecretSet::new())),
        },
        Commands::Command {
            job,
            batch,
            variables,
            format,
        } => {
            let (argv, secrets) = porter_cli::command(job, *batch, variables.as_deref());
            match argv {
                Ok(argv) => {
                    println!("{}", secrets.redact(&format.render(&argv)?));
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => Ok(print_failure(&e, &secrets)),
            }
        }
    }
}
