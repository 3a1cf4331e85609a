//! Save game discovery
//!
//! Resolves the platform's default Factorio saves directory and lists the
//! `.zip` saves inside it, oldest first.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use thiserror::Error;
use walkdir::WalkDir;

/// Extension of save archives
pub const SAVE_EXTENSION: &str = ".zip";

/// Why the saves directory could not be resolved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaveDirError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("unsupported operating system: {0}")]
    UnsupportedOs(String),

    #[error("savegame directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),
}

/// A save archive found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveGame {
    /// File name, including the extension
    pub name: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl SaveGame {
    /// File name without the `.zip` extension
    pub fn display_name(&self) -> &str {
        self.name.strip_suffix(SAVE_EXTENSION).unwrap_or(&self.name)
    }
}

/// Saves directory for `os` (as in `std::env::consts::OS`), reading variables through `env`
pub fn save_dir_for<F>(os: &str, env: F) -> Result<PathBuf, SaveDirError>
where
    F: Fn(&str) -> Option<OsString>,
{
    let var = |name: &'static str| {
        env(name)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .ok_or(SaveDirError::MissingEnv(name))
    };

    let dir = match os {
        "windows" => var("APPDATA")?.join("Factorio").join("saves"),
        "macos" | "darwin" => var("HOME")?
            .join("Library")
            .join("Application Support")
            .join("Factorio")
            .join("saves"),
        "linux" => var("HOME")?.join(".factorio").join("saves"),
        other => return Err(SaveDirError::UnsupportedOs(other.to_string())),
    };

    if !dir.is_dir() {
        tracing::warn!(directory = %dir.display(), "savegame directory does not exist");
        return Err(SaveDirError::MissingDirectory(dir));
    }

    tracing::debug!(directory = %dir.display(), "savegame directory found");
    Ok(dir)
}

/// Saves directory for the running platform
pub fn default_save_dir() -> Result<PathBuf, SaveDirError> {
    save_dir_for(std::env::consts::OS, |name| std::env::var_os(name))
}

/// Regular `.zip` files directly inside `dir`, oldest first
pub fn list_saves(dir: &Path) -> Result<Vec<SaveGame>> {
    tracing::info!(directory = %dir.display(), "reading savegame directory");

    let mut saves = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry
            .with_context(|| format!("failed to read savegame directory: {}", dir.display()))?;

        let name = entry.file_name().to_string_lossy().into_owned();
        if !entry.file_type().is_file() || !name.ends_with(SAVE_EXTENSION) {
            continue;
        }

        let modified = entry
            .metadata()
            .map_err(anyhow::Error::from)
            .and_then(|meta| Ok(meta.modified()?));
        let modified = match modified {
            Ok(modified) => modified,
            Err(err) => {
                tracing::warn!(file = %name, error = %err, "skipping file, metadata unreadable");
                continue;
            }
        };

        saves.push(SaveGame {
            path: entry.into_path(),
            name,
            modified,
        });
    }

    if saves.is_empty() {
        bail!("no savegames found in the directory: {}", dir.display());
    }

    saves.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
    tracing::debug!(count = saves.len(), "savegames listed");
    Ok(saves)
}
