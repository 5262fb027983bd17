use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use time::OffsetDateTime;

use crate::config::AppConfig;
use crate::engine::Engine;
use crate::parse::ParsedEntry;
use crate::search::FilterKind;
use crate::storage::StorageHandle;
use crate::timeline::{month_heading, SortDirection, TimelineRow};

const UNDATED_MARKER: &str = "????-??-??";

#[derive(Args, Debug, Clone)]
pub struct ViewArgs {
    /// Category filter: all, favorites, or undated
    #[arg(long, default_value = "all")]
    pub filter: String,
    /// Free-text query matched as a substring
    #[arg(long)]
    pub query: Option<String>,
    /// Sort newest first instead of oldest first
    #[arg(long)]
    pub reverse: bool,
}

impl Default for ViewArgs {
    fn default() -> Self {
        Self {
            filter: "all".to_string(),
            query: None,
            reverse: false,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Files or directories to import (.txt/.md as plain text, .html as rich)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Unique document name, e.g. "2023-08-15 evening.txt"
    pub name: String,
    /// Provide the body inline. If omitted, reads from stdin.
    #[arg(long)]
    pub body: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Document name
    pub name: String,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Query terms, joined with spaces before matching
    #[arg(required = true)]
    pub terms: Vec<String>,
    /// Category filter: all, favorites, or undated
    #[arg(long, default_value = "all")]
    pub filter: String,
    /// Sort newest first instead of oldest first
    #[arg(long)]
    pub reverse: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum FavoriteCommand {
    /// Mark a document as a favorite
    Add { name: String },
    /// Remove a document from the favorites
    Remove { name: String },
    /// List favorite names in insertion order
    List,
}

#[derive(Args, Debug, Clone)]
pub struct FavoriteArgs {
    #[command(subcommand)]
    pub command: FavoriteCommand,
}

fn build_engine(
    config: Arc<AppConfig>,
    storage: StorageHandle,
    args: &ViewArgs,
) -> Result<Engine> {
    let filter = FilterKind::from_str(args.filter.trim())
        .map_err(|_| anyhow::anyhow!("unknown filter '{}'", args.filter))?;
    let mut engine = Engine::open(config, storage).context("starting engine")?;
    if args.reverse {
        engine.set_direction(SortDirection::Descending);
    }
    engine.set_filter(filter);
    if let Some(query) = &args.query {
        engine.set_query(query.clone());
    }
    Ok(engine)
}

pub fn show_timeline(config: Arc<AppConfig>, storage: StorageHandle, args: ViewArgs) -> Result<()> {
    let engine = build_engine(config, storage, &args)?;
    print!("{}", render_timeline(&engine));
    Ok(())
}

fn render_timeline(engine: &Engine) -> String {
    let mut out = String::new();
    for row in engine.timeline_rows() {
        write_timeline_row(&mut out, row);
    }
    let undated = &engine.filtered().undated;
    if !undated.is_empty() {
        let _ = writeln!(&mut out, "== undated ==");
        for entry in undated {
            let _ = writeln!(&mut out, "{UNDATED_MARKER}  {}  {}", entry.title, entry.snippet);
        }
    }
    if out.is_empty() {
        out.push_str("No entries to show.\n");
    }
    out
}

fn write_timeline_row(out: &mut String, row: &TimelineRow) {
    let entry = &row.entry;
    if row.month_header_before {
        if let Some(date) = entry.parsed_date {
            let _ = writeln!(out, "== {} ==", month_heading(date));
        }
    }
    let mut line = format!(
        "{}  {}  {}",
        entry.day_key().unwrap_or(UNDATED_MARKER),
        entry.title,
        entry.snippet
    );
    if row.same_day_ordinal > 1 {
        let _ = write!(line, "  (same day, entry {})", row.same_day_ordinal);
    }
    let _ = writeln!(out, "{line}");
    if row.gap_days_after > 0 {
        let _ = writeln!(out, "    -- {} day(s) later --", row.gap_days_after);
    }
}

pub fn list_entries(config: Arc<AppConfig>, storage: StorageHandle, args: ViewArgs) -> Result<()> {
    let engine = build_engine(config, storage, &args)?;
    print!("{}", render_pool(&engine));
    Ok(())
}

fn render_pool(engine: &Engine) -> String {
    if engine.active_pool().is_empty() {
        return "No entries to show.\n".to_string();
    }
    let mut out = String::new();
    for entry in engine.active_pool() {
        let _ = writeln!(&mut out, "{}", format_entry_line(engine, entry));
    }
    out
}

fn format_entry_line(engine: &Engine, entry: &ParsedEntry) -> String {
    let star = if engine.is_favorite(&entry.name) { "*" } else { " " };
    format!(
        "{star} {}  {}  {}  [{}]",
        entry.day_key().unwrap_or(UNDATED_MARKER),
        entry.title,
        entry.snippet,
        entry.name
    )
}

pub fn show_entry(config: Arc<AppConfig>, storage: StorageHandle, args: ShowArgs) -> Result<()> {
    let engine = Engine::open(config, storage).context("starting engine")?;
    let Some(entry) = engine.reading_entry(&args.name) else {
        bail!("no entry named '{}'", args.name);
    };
    println!("{}", entry.title);
    println!("{}  {}", entry.day_key().unwrap_or(UNDATED_MARKER), entry.snippet);
    println!();
    println!("{}", entry.body_text);
    Ok(())
}

pub fn search_entries(
    config: Arc<AppConfig>,
    storage: StorageHandle,
    args: SearchArgs,
) -> Result<()> {
    let raw_query = args.terms.join(" ");
    let trimmed = raw_query.trim();
    if trimmed.is_empty() {
        bail!("search query cannot be empty");
    }
    let view = ViewArgs {
        filter: args.filter,
        query: Some(trimmed.to_string()),
        reverse: args.reverse,
    };
    let engine = build_engine(config, storage, &view)?;

    let filtered = engine.filtered();
    if filtered.total() == 0 {
        println!("No matches found.");
        return Ok(());
    }
    for entry in filtered.known.iter().chain(filtered.undated.iter()) {
        println!("{}", format_entry_line(&engine, entry));
    }
    Ok(())
}

pub fn random_entry(config: Arc<AppConfig>, storage: StorageHandle, args: ViewArgs) -> Result<()> {
    let engine = build_engine(config, storage, &args)?;
    match engine.pick_random() {
        Some(entry) => println!("{}", format_entry_line(&engine, entry)),
        None => println!("No entries available."),
    }
    Ok(())
}

pub fn handle_favorite_command(
    config: Arc<AppConfig>,
    storage: StorageHandle,
    args: FavoriteArgs,
) -> Result<()> {
    let mut engine = Engine::open(config, storage).context("starting engine")?;
    match args.command {
        FavoriteCommand::Add { name } => {
            if engine.is_favorite(&name) {
                println!("'{name}' is already a favorite");
                return Ok(());
            }
            engine
                .toggle_favorite(&name)
                .with_context(|| format!("favoriting '{name}'"))?;
            println!("Added '{name}' to favorites");
        }
        FavoriteCommand::Remove { name } => {
            if !engine.is_favorite(&name) {
                println!("'{name}' is not a favorite");
                return Ok(());
            }
            engine
                .toggle_favorite(&name)
                .with_context(|| format!("unfavoriting '{name}'"))?;
            println!("Removed '{name}' from favorites");
        }
        FavoriteCommand::List => {
            if engine.favorites().is_empty() {
                println!("(no favorites)");
            }
            for name in engine.favorites() {
                println!("{name}");
            }
        }
    }
    Ok(())
}

pub fn show_counts(config: Arc<AppConfig>, storage: StorageHandle, args: ViewArgs) -> Result<()> {
    let engine = build_engine(config, storage, &args)?;
    let counts = engine.counts();
    println!("total     {}", counts.total);
    println!("filtered  {}", counts.filtered);
    println!("favorites {}", counts.favorites);
    Ok(())
}

pub fn import_documents(storage: StorageHandle, args: ImportArgs) -> Result<()> {
    let mut imported = 0usize;
    let mut skipped = 0usize;
    for path in &args.paths {
        if path.is_dir() {
            let dir = fs::read_dir(path)
                .with_context(|| format!("reading directory {}", path.display()))?;
            for child in dir {
                let child = child?.path();
                if child.is_file() {
                    import_one(&storage, &child, &mut imported, &mut skipped)?;
                }
            }
        } else {
            import_one(&storage, path, &mut imported, &mut skipped)?;
        }
    }
    println!("Imported {imported} document(s), skipped {skipped}");
    Ok(())
}

fn import_one(
    storage: &StorageHandle,
    path: &Path,
    imported: &mut usize,
    skipped: &mut usize,
) -> Result<()> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let rich = match extension.as_str() {
        "txt" | "md" => false,
        "html" | "htm" => true,
        _ => {
            tracing::debug!(path = %path.display(), "skipping unsupported file type");
            *skipped += 1;
            return Ok(());
        }
    };

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.is_empty() {
        *skipped += 1;
        return Ok(());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let imported_at = file_modified_ms(path).unwrap_or_else(now_ms);
    let (plain, rich_text) = if rich {
        (String::new(), content)
    } else {
        (content, String::new())
    };
    storage
        .upsert_document(&name, "", &plain, &rich_text, imported_at)
        .with_context(|| format!("storing {name}"))?;
    *imported += 1;
    Ok(())
}

pub fn add_document(storage: StorageHandle, args: AddArgs) -> Result<()> {
    let name = args.name.trim().to_owned();
    if name.is_empty() {
        bail!("document name cannot be empty");
    }
    let body = match args.body {
        Some(body) => body,
        None => match read_stdin()? {
            Some(body) => body,
            None => bail!("no body provided; pass --body or pipe text on stdin"),
        },
    };
    storage
        .upsert_document(&name, "", &body, "", now_ms())
        .with_context(|| format!("storing {name}"))?;
    println!("Added '{name}'");
    Ok(())
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

fn file_modified_ms(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let elapsed = modified.duration_since(UNIX_EPOCH).ok()?;
    i64::try_from(elapsed.as_millis()).ok()
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
