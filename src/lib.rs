//! # wci
//!
//! Warp Code Injector: appends Lua snippets to the scripts stored inside
//! Factorio save archives.
//!
//! A Factorio save is a ZIP container. Its `control.lua` (usually nested
//! under a directory named after the save) runs whenever the save is loaded,
//! so code appended there becomes part of the game.
//!
//! ## Patching
//!
//! [`patcher`] rewrites one or more entries of an archive and copies every
//! other entry through untouched:
//!
//! - [`patcher::locate`] finds an entry by suffix (first match in archive order)
//! - [`patcher::contains_text`] checks an entry for a byte substring
//! - [`patcher::append_text`] appends `"\n" + text + "\n"` to one entry
//! - [`patcher::replace_entries`] swaps the content of a set of entries
//!
//! Rewrites are all-or-nothing: the new archive is built in memory and only
//! then written over the output path.
//!
//! ## Injection
//!
//! Appending is not idempotent on its own. [`inject::inject`] checks for the
//! snippet first and only appends when it is missing:
//!
//! ```no_run
//! use wci::{inject, snippets};
//!
//! let snippet = snippets::BITER_KILLER;
//! let outcome = inject("saves/MyWorld.zip", snippet.target, snippet.code)?;
//! println!("{}", outcome.entry());
//! # Ok::<(), wci::PatchError>(())
//! ```

pub mod archive;
pub mod error;
pub mod inject;
pub mod patcher;
pub mod saves;
pub mod snippets;
pub mod store;

pub use archive::{normalize_name, Archive, Entry};
pub use error::PatchError;
pub use inject::{inject, is_injected, InjectOutcome};
pub use patcher::{append_text, contains_text, locate, replace_entries, PatchSummary};
pub use saves::{default_save_dir, list_saves, save_dir_for, SaveDirError, SaveGame};
pub use snippets::Snippet;
pub use store::SaveIndex;
