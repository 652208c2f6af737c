#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_raw_string_hashes)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "demokit")]
#[command(author, version, about = "Plan, inspect and serve a multi-page component playground", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the project root
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Config file (default: demokit.json in the project root)
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Validate the configuration and print the build plan
    Plan,

    /// Show which transform rule handles each module
    Resolve {
        /// Module paths, relative to the project root
        paths: Vec<PathBuf>,

        /// Resolve every file under the project root
        #[arg(long, conflicts_with = "paths")]
        all: bool,
    },

    /// Write the rendered pages and the build manifest
    Emit {
        /// Output directory
        #[arg(long, short = 'o', default_value = "dist")]
        out: PathBuf,
    },

    /// Start the development server
    Dev {
        /// Host to bind to [env: HOST]
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on [env: PORT]
        #[arg(long, short = 'p')]
        port: Option<u16>,

        /// Disable live reload
        #[arg(long)]
        no_hot: bool,

        /// Disable gzip compression
        #[arg(long)]
        no_compress: bool,

        /// Use the polling file watcher
        #[arg(long)]
        poll: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let cwd = dunce::canonicalize(&cwd).unwrap_or(cwd);

    // JSON-producing commands keep stdout clean; logs always go to stderr.
    logging::init(cli.verbose, cli.json);

    let _span = tracing::info_span!("demokit", cwd = %cwd.display()).entered();

    match cli.command {
        Commands::Version => commands::version::run(cli.json),
        Commands::Plan => commands::plan::run(&cwd, cli.config.as_deref(), cli.json),
        Commands::Resolve { paths, all } => commands::resolve::run(
            &cwd,
            cli.config.as_deref(),
            commands::resolve::ResolveAction { paths, all },
            cli.json,
        ),
        Commands::Emit { out } => commands::emit::run(&cwd, cli.config.as_deref(), &out, cli.json),
        Commands::Dev {
            host,
            port,
            no_hot,
            no_compress,
            poll,
        } => {
            let action = commands::dev::DevAction {
                cwd,
                config: cli.config,
                overrides: demokit_core::dev::ServerOverrides {
                    host,
                    port,
                    no_hot,
                    no_compress,
                },
                poll,
            };
            let rt = tokio::runtime::Runtime::new().into_diagnostic()?;
            rt.block_on(commands::dev::run(action))
        }
    }
}
