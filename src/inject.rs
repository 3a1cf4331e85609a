//! Check-then-append injection of a snippet into a save archive

use std::path::Path;

use crate::error::Result;
use crate::patcher;

/// What [`inject`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectOutcome {
    /// The snippet was appended to `entry`
    Injected { entry: String },
    /// `entry` already held the snippet, archive left alone
    AlreadyPresent { entry: String },
}

impl InjectOutcome {
    /// Name of the entry that was checked or patched
    pub fn entry(&self) -> &str {
        match self {
            InjectOutcome::Injected { entry } | InjectOutcome::AlreadyPresent { entry } => entry,
        }
    }
}

/// Whether the entry ending in `target_suffix` already contains `snippet`
pub fn is_injected(
    archive_path: impl AsRef<Path>,
    target_suffix: &str,
    snippet: &str,
) -> Result<bool> {
    let archive_path = archive_path.as_ref();
    let entry = patcher::locate(archive_path, target_suffix)?;
    patcher::contains_text(archive_path, &entry, snippet)
}

/// Append `snippet` to the entry ending in `target_suffix`, in place,
/// unless it is already there.
///
/// Running this again on the same archive is a no-op.
pub fn inject(
    archive_path: impl AsRef<Path>,
    target_suffix: &str,
    snippet: &str,
) -> Result<InjectOutcome> {
    let archive_path = archive_path.as_ref();
    tracing::info!(
        archive = %archive_path.display(),
        target = target_suffix,
        "injecting snippet"
    );

    let entry = patcher::locate(archive_path, target_suffix)?;

    if patcher::contains_text(archive_path, &entry, snippet)? {
        tracing::warn!(entry = %entry, "snippet already present in target entry");
        return Ok(InjectOutcome::AlreadyPresent { entry });
    }

    patcher::append_text(archive_path, &entry, snippet, archive_path)?;
    tracing::info!(entry = %entry, "snippet injected");
    Ok(InjectOutcome::Injected { entry })
}
