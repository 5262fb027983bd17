use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ConfigLoader;
use crate::storage;

pub mod commands;

use self::commands::{AddArgs, FavoriteArgs, ImportArgs, SearchArgs, ShowArgs, ViewArgs};

#[derive(Parser, Debug)]
#[command(
    name = "memoir",
    version,
    about = "Personal archive viewer that reconstructs a diary timeline"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over MEMOIR_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over MEMOIR_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import text documents from files or directories
    Import(ImportArgs),
    /// Capture a single document from an inline body or stdin
    Add(AddArgs),
    /// Render the month-grouped timeline (default)
    Timeline(ViewArgs),
    /// List the active reading pool
    List(ViewArgs),
    /// Print one document in full
    Show(ShowArgs),
    /// Substring search over titles, snippets, bodies, names, and dates
    Search(SearchArgs),
    /// Pick a uniformly random entry from the active pool
    Random(ViewArgs),
    /// Manage the persisted favorite set
    Favorite(FavoriteArgs),
    /// Print total, filtered, and favorite counts
    Counts(ViewArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("MEMOIR_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("MEMOIR_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let storage = storage::init(&paths, &config.storage)?;

    let config = Arc::new(config);
    let command = cli
        .command
        .unwrap_or_else(|| Commands::Timeline(ViewArgs::default()));
    match command {
        Commands::Import(args) => commands::import_documents(storage, args),
        Commands::Add(args) => commands::add_document(storage, args),
        Commands::Timeline(args) => commands::show_timeline(config, storage, args),
        Commands::List(args) => commands::list_entries(config, storage, args),
        Commands::Show(args) => commands::show_entry(config, storage, args),
        Commands::Search(args) => commands::search_entries(config, storage, args),
        Commands::Random(args) => commands::random_entry(config, storage, args),
        Commands::Favorite(args) => commands::handle_favorite_command(config, storage, args),
        Commands::Counts(args) => commands::show_counts(config, storage, args),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
