// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use codeshelf::constants::{self, storage};
use codeshelf::{CodeFormat, CodeId, Config, EcLevel};
use std::path::{Path, PathBuf};

mod cli;

#[derive(Parser)]
#[command(name = "codeshelf")]
#[command(about = "Scan, keep and generate barcodes and QR codes")]
#[command(version = constants::app_version())]
struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overrides the config
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan image files and save every decoded code
    Scan {
        /// Images to scan
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Only print decoded codes
        #[arg(long)]
        no_save: bool,
    },

    /// Scan new images dropped into a directory until Ctrl+C
    Watch {
        dir: PathBuf,

        /// Also scan images already in the directory
        #[arg(long)]
        include_existing: bool,
    },

    /// List saved codes, newest first
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one saved code
    Show { id: CodeId },

    /// Delete a saved code
    Delete { id: CodeId },

    /// Generate a code from text
    Generate {
        text: String,

        /// QR or EAN_13 (default from config)
        #[arg(short, long)]
        format: Option<CodeFormat>,

        /// Write a PNG image
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also save the code to the database
        #[arg(long)]
        save: bool,

        /// QR error correction level: L, M, Q or H
        #[arg(long)]
        ec_level: Option<EcLevel>,

        /// Do not print the code to the terminal
        #[arg(short, long)]
        quiet: bool,
    },

    /// Run the terminal UI
    Tui,

    /// Print the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The terminal UI owns the screen, so its logs go to a file
    if matches!(cli.command, Commands::Tui) {
        init_file_logging(&codeshelf::config::data_dir().join(storage::LOG_FILE))?;
    } else {
        // Set RUST_LOG environment variable to control log level
        // Examples: RUST_LOG=debug, RUST_LOG=codeshelf=debug, RUST_LOG=info
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_default(&config_path);
    if let Some(database) = cli.database {
        config.database_path = Some(database);
    }

    match cli.command {
        Commands::Scan { paths, no_save } => cli::scan(&config, paths, !no_save),
        Commands::Watch {
            dir,
            include_existing,
        } => cli::watch(&config, dir, include_existing),
        Commands::List { json } => cli::list(&config, json),
        Commands::Show { id } => cli::show(&config, id),
        Commands::Delete { id } => cli::delete(&config, id),
        Commands::Generate {
            text,
            format,
            output,
            save,
            ec_level,
            quiet,
        } => cli::generate(
            &config,
            cli::GenerateArgs {
                text,
                format,
                output,
                save,
                ec_level,
                quiet,
            },
        ),
        Commands::Tui => codeshelf::terminal::run(config),
        Commands::Config { write } => cli::show_config(&config, &config_path, write),
    }
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
}

fn init_file_logging(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
    Ok(())
}
