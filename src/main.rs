//! pagewise CLI entry point

use clap::builder::BoolishValueParser;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use pagewise::{
    commands::{
        cmd_init, cmd_list_sources, cmd_process, cmd_run, cmd_scan, cmd_status,
        print_batch_report, print_init, print_run_report, print_scan_stats, print_sources,
        print_status, InitOptions, RunOptions,
    },
    config::Config,
    error::Result,
    meta::MetaDb,
    progress::LogWriterFactory,
};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pagewise")]
#[command(version, about = "Resumable page-by-page OCR ingestion of PDF documents", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize pagewise configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Detect new and changed documents and queue them
    Scan,

    /// Process one batch of the ingestion queue
    Process {
        /// Maximum documents to claim (defaults to queue.batch_limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Scan and/or process, as configured for startup
    Run {
        /// Scan the documents directory (overrides pipeline.scan_on_start)
        #[arg(long, env = "PAGEWISE_SCAN", value_parser = BoolishValueParser::new())]
        scan: Option<bool>,

        /// Process the queue (overrides pipeline.process_on_start)
        #[arg(long, env = "PAGEWISE_PROCESS", value_parser = BoolishValueParser::new())]
        process: Option<bool>,
    },

    /// Show system status
    Status,

    /// List registered sources
    Sources,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force } = cli.command {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(Config::default_config_path);
        let base_dir = config_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_base_dir);

        let config = cmd_init(InitOptions {
            base_dir,
            config_path,
            force,
        })
        .await?;
        if cli.json {
            let summary = serde_json::json!({
                "status": "ok",
                "config": config.paths.config_file.display().to_string(),
                "database": config.paths.db_file.display().to_string(),
                "documents": config.documents_dir().display().to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_init(&config);
        }
        return Ok(());
    }

    // Handle completions command (doesn't need config/db)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "pagewise", &mut std::io::stdout());
        return Ok(());
    }

    // Load configuration
    let config = load_config(cli.config.as_deref()).await?;
    let db = MetaDb::connect(&config).await?;
    let show_progress = !cli.json;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Scan => {
            let stats = cmd_scan(&config, &db).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_scan_stats(&stats);
            }
        }

        Commands::Process { limit } => {
            let report = cmd_process(&config, &db, limit, show_progress).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_batch_report(&report);
            }
        }

        Commands::Run { scan, process } => {
            let options = RunOptions::resolve(&config, scan, process);
            let report = cmd_run(&config, &db, options, show_progress).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_run_report(&report);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &db).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Sources => {
            let sources = cmd_list_sources(&db).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
            } else {
                print_sources(&sources);
            }
        }
    }

    Ok(())
}

async fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'pagewise init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
