//! Main entry point for plinth
//!
//! Parses the command line, layers configuration (file or environment,
//! then flags), and dispatches to the prediction server or the one-shot
//! batch runner.

use clap::{Parser, Subcommand};
use colored::Colorize;
use plinth::{
    batch::{self, BatchJob},
    config::{Config, TargetType},
    error::Result,
    server,
    stats::memory_info,
    utils::init_logging,
    LoaderRegistry, VERSION,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "plinth",
    version,
    about = "Model packaging and prediction serving runtime"
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the model artifact and any custom code
    #[arg(long, global = true)]
    code_dir: Option<PathBuf>,

    /// Target type served by the package
    #[arg(long, global = true)]
    target_type: Option<TargetType>,

    /// Positive class label, required for binary targets
    #[arg(long, global = true)]
    positive_class_label: Option<String>,

    /// Negative class label, required for binary targets
    #[arg(long, global = true)]
    negative_class_label: Option<String>,

    /// Raise log verbosity to debug
    #[arg(long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Lower log verbosity to warnings only
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the prediction server
    Serve {
        /// Interface to bind, overriding configuration
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, overriding configuration
        #[arg(long)]
        port: Option<u16>,
    },
    /// Score one input file and exit
    Score {
        /// Input file to score
        #[arg(long)]
        input: PathBuf,

        /// Output file; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,

        /// Declared content type for unstructured inputs
        #[arg(long)]
        content_type: Option<String>,

        /// Column to split out and pass as the target series (transform targets)
        #[arg(long)]
        target: Option<String>,
    },
}

#[actix_web::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    apply_overrides(&mut config, &cli);
    if let Command::Serve { host, port } = &cli.command {
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
    }
    config.validate()?;

    init_logging(&config.logging.level, &config.logging.format)?;

    match cli.command {
        Command::Serve { .. } => {
            print_banner();
            info!("Starting plinth with configuration:");
            info!("  Server: {}", config.server_address());
            info!("  Code dir: {}", config.model.code_dir.display());
            info!("  Target type: {}", config.model.target_type);
            if !config.url_prefix().is_empty() {
                info!("  URL prefix: {}", config.url_prefix());
            }

            if let Ok(memory) = memory_info() {
                info!("System memory: {}", memory.format());
            }

            server::start_server(config, LoaderRegistry::with_defaults(), None).await
        }
        Command::Score {
            input,
            output,
            content_type,
            target,
        } => {
            info!(
                "Scoring {} against {}",
                input.display(),
                config.model.code_dir.display()
            );
            let job = BatchJob {
                input,
                output,
                content_type,
                target_column: target,
            };
            batch::run(&config, &job, LoaderRegistry::with_defaults(), None)
        }
    }
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(code_dir) = &cli.code_dir {
        config.model.code_dir = code_dir.clone();
    }
    if let Some(target_type) = cli.target_type {
        config.model.target_type = target_type;
    }
    if let Some(label) = &cli.positive_class_label {
        config.model.positive_class_label = Some(label.clone());
    }
    if let Some(label) = &cli.negative_class_label {
        config.model.negative_class_label = Some(label.clone());
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    } else if cli.quiet {
        config.logging.level = "warn".to_string();
    }
}

/// Print the startup banner
fn print_banner() {
    println!();
    println!("  {} v{}", "plinth".bold(), VERSION);
    println!("  Model packaging and prediction serving runtime");
    println!();
}
