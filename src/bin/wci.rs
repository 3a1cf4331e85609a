//! wci CLI
//!
//! Lists Factorio saves and injects Lua snippets into them.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use wci::store::DEFAULT_INDEX_FILE;
use wci::{snippets, InjectOutcome, SaveIndex};

#[derive(Parser, Debug)]
#[command(name = "wci")]
#[command(author = "KnightRider2070")]
#[command(version)]
#[command(about = "Inject Lua scripts into Factorio savegames")]
struct Cli {
    /// Savegame directory (default: the platform's Factorio saves folder)
    #[arg(long, global = true, env = "WCI_SAVES_DIR")]
    saves_dir: Option<PathBuf>,

    /// File holding the numbered savegame list
    #[arg(long, global = true, env = "WCI_INDEX", default_value = DEFAULT_INDEX_FILE)]
    index: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List savegames, sorted by modification date
    List,

    /// Append a snippet to a savegame listed by `wci list`
    #[command(visible_alias = "add-biter-killer")]
    Inject {
        /// Savegame number from `wci list`
        number: u32,

        #[command(flatten)]
        source: SnippetSource,
    },

    /// Report whether a savegame already contains a snippet
    Check {
        /// Savegame number from `wci list`
        number: u32,

        #[command(flatten)]
        source: SnippetSource,
    },

    /// Remove the savegame list file
    Clean,

    /// Show application information
    Info,
}

#[derive(Args, Debug)]
struct SnippetSource {
    /// Built-in snippet to use
    #[arg(long, default_value = "biter-killer", conflicts_with = "snippet_file")]
    snippet: String,

    /// Read the snippet from a file instead
    #[arg(long, requires = "target")]
    snippet_file: Option<PathBuf>,

    /// Entry the snippet file is appended to, matched by suffix
    #[arg(long)]
    target: Option<String>,
}

impl SnippetSource {
    /// Returns (target suffix, code)
    fn resolve(&self) -> Result<(String, String)> {
        if let Some(path) = &self.snippet_file {
            let code = fs::read_to_string(path)
                .with_context(|| format!("Failed to read snippet: {}", path.display()))?;
            let target = self.target.clone().unwrap_or_default();
            return Ok((target, code));
        }

        let snippet = snippets::find(&self.snippet).with_context(|| {
            format!(
                "Unknown snippet '{}'. Run 'wci info' to see built-in snippets.",
                self.snippet
            )
        })?;
        let target = self.target.clone().unwrap_or_else(|| snippet.target.to_string());
        Ok((target, snippet.code.to_string()))
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("WCI_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => list_saves(cli.saves_dir, &cli.index)?,
        Commands::Inject { number, source } => inject_snippet(&cli.index, number, &source)?,
        Commands::Check { number, source } => check_snippet(&cli.index, number, &source)?,
        Commands::Clean => clean_index(&cli.index)?,
        Commands::Info => print_info(),
    }

    Ok(())
}

fn list_saves(saves_dir: Option<PathBuf>, index_path: &Path) -> Result<()> {
    let dir = match saves_dir {
        Some(dir) => dir,
        None => wci::default_save_dir()?,
    };

    let saves = wci::list_saves(&dir).context("Error listing savegames")?;
    let index = SaveIndex::from_saves(&saves);
    index.save(index_path)?;

    println!("Available savegames (sorted by date):");
    for ((number, _), save) in index.iter().zip(&saves) {
        println!("{}. {}", number, save.display_name());
    }

    Ok(())
}

/// Path of save `number` from the index written by `wci list`
fn selected_save(index_path: &Path, number: u32) -> Result<PathBuf> {
    let index = SaveIndex::load(index_path)?;
    if index.is_empty() {
        bail!("No savegames listed. Run 'wci list' first.");
    }

    index.get(number).map(Path::to_path_buf).with_context(|| {
        format!(
            "Savegame number '{}' not found. Run 'wci list' to see available savegames.",
            number
        )
    })
}

fn inject_snippet(index_path: &Path, number: u32, source: &SnippetSource) -> Result<()> {
    let save = selected_save(index_path, number)?;
    let (target, code) = source.resolve()?;

    let outcome = wci::inject(&save, &target, &code)
        .with_context(|| format!("Error adding code to '{}'", save.display()))?;

    match outcome {
        InjectOutcome::Injected { entry } => {
            println!("Successfully added code to '{}' ({}).", save.display(), entry);
        }
        InjectOutcome::AlreadyPresent { entry } => {
            println!("Code already present in '{}' ({}), nothing to do.", save.display(), entry);
        }
    }

    Ok(())
}

fn check_snippet(index_path: &Path, number: u32, source: &SnippetSource) -> Result<()> {
    let save = selected_save(index_path, number)?;
    let (target, code) = source.resolve()?;

    let present = wci::is_injected(&save, &target, &code)
        .with_context(|| format!("Error checking '{}'", save.display()))?;

    if present {
        println!("'{}' already contains the code.", save.display());
    } else {
        println!("'{}' does not contain the code.", save.display());
    }

    Ok(())
}

fn clean_index(index_path: &Path) -> Result<()> {
    if SaveIndex::remove(index_path)? {
        println!("The {} file has been successfully removed.", index_path.display());
    } else {
        println!("The {} file does not exist. Nothing to clean up.", index_path.display());
    }

    Ok(())
}

fn print_info() {
    println!("Application Information:");
    println!("-------------------------");
    println!("Name          : {}", env!("CARGO_PKG_NAME"));
    println!("Version       : {}", env!("CARGO_PKG_VERSION"));
    println!("Description   : {}", env!("CARGO_PKG_DESCRIPTION"));
    println!("Repository    : {}", env!("CARGO_PKG_REPOSITORY"));
    println!("-------------------------");
    println!("Built-in snippets:");
    for snippet in snippets::all() {
        println!("  {}  -> {}", snippet.name, snippet.target);
    }
}
