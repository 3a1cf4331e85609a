//! Numbered save index persisted between runs
//!
//! `wci list` numbers the saves it finds and writes them here, later
//! commands pick a save by that number. The file is a JSON object mapping
//! the number (as a string key) to the save path.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::saves::SaveGame;

/// Default file name of the index, relative to the working directory
pub const DEFAULT_INDEX_FILE: &str = "savegames.json";

/// Saves keyed by the number shown to the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaveIndex {
    saves: BTreeMap<u32, PathBuf>,
}

impl SaveIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Number `saves` from 1 in the order given
    pub fn from_saves(saves: &[SaveGame]) -> Self {
        let saves = (1..)
            .zip(saves)
            .map(|(number, save)| (number, save.path.clone()))
            .collect();
        Self { saves }
    }

    /// Read the index at `path`; a missing file gives an empty index
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(file = %path.display(), "no save index yet");
                return Ok(Self::new());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to open savegames file: {}", path.display()))
            }
        };

        serde_json::from_str(&raw)
            .with_context(|| format!("failed to decode savegames data: {}", path.display()))
    }

    /// Write the index to `path` as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to encode savegames data")?;
        fs::write(path, json)
            .with_context(|| format!("failed to create savegames file: {}", path.display()))?;
        tracing::debug!(file = %path.display(), saves = self.len(), "save index written");
        Ok(())
    }

    /// Delete the index file at `path`, returning whether there was one
    pub fn remove(path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err)
                .with_context(|| format!("failed to remove savegames file: {}", path.display())),
        }
    }

    pub fn get(&self, number: u32) -> Option<&Path> {
        self.saves.get(&number).map(PathBuf::as_path)
    }

    /// Entries in ascending number order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Path)> {
        self.saves.iter().map(|(number, path)| (*number, path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.saves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saves.is_empty()
    }
}
