//! Copy-and-patch operations on ZIP archives
//!
//! Every rewrite rebuilds the whole archive in memory: untouched entries are
//! raw-copied (no recompression) and the targeted entries are written with
//! their new content, in their original position. The result reaches disk
//! only once every entry has been processed, through [`crate::archive`]'s
//! atomic persist, so a failure leaves the original file as it was.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use zip::result::ZipError;
use zip::ZipWriter;

use crate::archive::{persist, write_entry, Archive};
use crate::error::{PatchError, Result};

/// Outcome of a successful rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSummary {
    /// Entries copied over unchanged
    pub entries_copied: usize,
    /// Names of the entries that received new content, in archive order
    pub entries_rewritten: Vec<String>,
}

/// How a single entry changes during a rebuild
enum Rewrite<'a> {
    Replace(&'a [u8]),
    Append(&'a [u8]),
}

/// Name of the first entry whose full name ends with `suffix`
pub fn locate(archive_path: impl AsRef<Path>, suffix: &str) -> Result<String> {
    let archive_path = archive_path.as_ref();
    tracing::info!(archive = %archive_path.display(), suffix, "searching for entry");

    let archive = Archive::open(archive_path)?;
    match archive.locate(suffix) {
        Some(name) => {
            tracing::debug!(entry = name, "entry found");
            Ok(name.to_string())
        }
        None => {
            tracing::warn!(suffix, "no entry matches suffix");
            Err(PatchError::EntryNotFound {
                path: archive_path.to_path_buf(),
                name: suffix.to_string(),
            })
        }
    }
}

/// Whether `needle` occurs anywhere in the content of `entry_name`.
///
/// The name is matched after normalization and without regard to case.
/// A missing entry is an error, not `false`.
pub fn contains_text(
    archive_path: impl AsRef<Path>,
    entry_name: &str,
    needle: impl AsRef<[u8]>,
) -> Result<bool> {
    let archive_path = archive_path.as_ref();
    tracing::info!(
        archive = %archive_path.display(),
        entry = entry_name,
        "checking entry for text"
    );

    let mut archive = Archive::open(archive_path)?;
    let Some(index) = archive.find(entry_name) else {
        tracing::warn!(entry = entry_name, "entry not found in archive");
        return Err(PatchError::EntryNotFound {
            path: archive_path.to_path_buf(),
            name: entry_name.to_string(),
        });
    };

    let content = archive.read(index)?;
    let found = contains_bytes(&content, needle.as_ref());
    tracing::debug!(entry = %archive.names()[index], found, "text search finished");
    Ok(found)
}

/// Append `"\n" + text + "\n"` to the entry named exactly `entry_name`.
///
/// Does not check whether the text is already there; calling this twice
/// appends twice. Writes `output_path` (which may be `archive_path`) only
/// when the entry exists.
pub fn append_text(
    archive_path: impl AsRef<Path>,
    entry_name: &str,
    text: &str,
    output_path: impl AsRef<Path>,
) -> Result<PatchSummary> {
    let archive_path = archive_path.as_ref();
    let output_path = output_path.as_ref();
    tracing::info!(
        archive = %archive_path.display(),
        entry = entry_name,
        "appending text to entry"
    );

    let addition = format!("\n{text}\n");
    let (bytes, summary) = rebuild(archive_path, |name| {
        (name == entry_name).then_some(Rewrite::Append(addition.as_bytes()))
    })?;

    if summary.entries_rewritten.is_empty() {
        tracing::warn!(entry = entry_name, "entry not found in archive, nothing written");
        return Err(PatchError::EntryNotFound {
            path: archive_path.to_path_buf(),
            name: entry_name.to_string(),
        });
    }

    persist(output_path, &bytes)?;
    tracing::info!(output = %output_path.display(), "appended text to entry");
    Ok(summary)
}

/// Replace the full content of every entry named in `replacements`.
///
/// Names are matched exactly. Each key must name an existing entry, else
/// nothing is written and the first missing key is reported.
pub fn replace_entries(
    archive_path: impl AsRef<Path>,
    replacements: &BTreeMap<String, Vec<u8>>,
    output_path: impl AsRef<Path>,
) -> Result<PatchSummary> {
    let archive_path = archive_path.as_ref();
    let output_path = output_path.as_ref();
    tracing::info!(
        archive = %archive_path.display(),
        replacements = replacements.len(),
        "replacing entries"
    );

    let (bytes, summary) = rebuild(archive_path, |name| {
        replacements
            .get(name)
            .map(|content| Rewrite::Replace(content.as_slice()))
    })?;

    if let Some(missing) = replacements
        .keys()
        .find(|key| !summary.entries_rewritten.contains(*key))
    {
        tracing::warn!(entry = %missing, "entry not found in archive, nothing written");
        return Err(PatchError::EntryNotFound {
            path: archive_path.to_path_buf(),
            name: missing.clone(),
        });
    }

    persist(output_path, &bytes)?;
    tracing::info!(
        output = %output_path.display(),
        rewritten = summary.entries_rewritten.len(),
        "replaced entries"
    );
    Ok(summary)
}

/// Rebuild the archive in memory, asking `plan` what to do with each entry
fn rebuild<'a, F>(archive_path: &Path, mut plan: F) -> Result<(Vec<u8>, PatchSummary)>
where
    F: FnMut(&str) -> Option<Rewrite<'a>>,
{
    let write_err = |source: ZipError| PatchError::ArchiveWrite {
        path: archive_path.to_path_buf(),
        source,
    };

    let mut archive = Archive::open(archive_path)?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(archive.byte_len())));
    let mut summary = PatchSummary::default();

    for index in 0..archive.len() {
        let name = archive.names()[index].clone();

        let Some(rewrite) = plan(&name) else {
            tracing::trace!(entry = %name, "copying entry unchanged");
            archive.copy_raw(index, &mut writer)?;
            summary.entries_copied += 1;
            continue;
        };

        let content = match rewrite {
            Rewrite::Replace(data) => data.to_vec(),
            Rewrite::Append(extra) => {
                let mut data = archive.read(index)?;
                data.extend_from_slice(extra);
                data
            }
        };
        tracing::debug!(entry = %name, bytes = content.len(), "rewriting entry");

        let options = archive
            .rewrite_options(index)?
            .large_file(content.len() as u64 >= u64::from(u32::MAX));
        write_entry(&mut writer, archive_path, &name, options, &content)?;
        summary.entries_rewritten.push(name);
    }

    let bytes = writer.finish().map_err(write_err)?.into_inner();
    Ok((bytes, summary))
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::{fixed_time, write_stored};
    use crate::archive::Entry;
    use std::fs;
    use std::path::PathBuf;
    use zip::{CompressionMethod, ZipArchive};

    fn build(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join(name);
        let entries: Vec<Entry> = entries
            .iter()
            .map(|(name, data)| Entry::new(*name, *data))
            .collect();
        Archive::create(&path, &entries).unwrap();
        path
    }

    fn read_entries(path: &Path) -> Vec<Entry> {
        Archive::open(path).unwrap().entries().unwrap()
    }

    /// Uncompressed archive whose `control.lua` payload fails its CRC check
    fn build_corrupt(dir: &Path) -> PathBuf {
        let path = dir.join("corrupt.zip");
        write_stored(
            &path,
            &[("level.dat", b"level"), ("control.lua", b"original content")],
        );

        let mut bytes = fs::read(&path).unwrap();
        let pos = bytes
            .windows(b"original content".len())
            .position(|window| window == b"original content")
            .unwrap();
        bytes[pos] ^= 0x20;
        fs::write(&path, bytes).unwrap();
        path
    }

    fn entry_data(path: &Path, name: &str) -> Vec<u8> {
        read_entries(path)
            .into_iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.data)
            .unwrap()
    }

    #[test]
    fn test_contains_bytes() {
        assert!(contains_bytes(b"hello world", b"lo wo"));
        assert!(contains_bytes(b"hello", b""));
        assert!(!contains_bytes(b"hello", b"hello!"));
        assert!(!contains_bytes(b"", b"a"));
    }

    #[test]
    fn test_locate_prefers_first_in_archive_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(
            dir.path(),
            "a.zip",
            &[("dir1/file1.txt", b"one"), ("dir2/file1.txt", b"two")],
        );

        assert_eq!(locate(&path, "file1.txt").unwrap(), "dir1/file1.txt");
    }

    #[test]
    fn test_locate_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(dir.path(), "a.zip", &[("file1.txt", b"one")]);

        let err = locate(&path, "control.lua").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_locate_matches_plain_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(
            dir.path(),
            "a.zip",
            &[("mods/xcontrol.lua", b"x"), ("save/control.lua", b"c")],
        );

        assert_eq!(locate(&path, "control.lua").unwrap(), "mods/xcontrol.lua");
        assert_eq!(locate(&path, "/control.lua").unwrap(), "save/control.lua");
    }

    #[test]
    fn test_contains_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(
            dir.path(),
            "check.zip",
            &[
                ("file1.txt", b"This is file 1."),
                ("file2.txt", b"Special code snippet."),
            ],
        );

        assert!(contains_text(&path, "file2.txt", "Special code snippet.").unwrap());
        assert!(contains_text(&path, "file2.txt", "code").unwrap());
        assert!(!contains_text(&path, "file1.txt", "Special code snippet.").unwrap());
    }

    #[test]
    fn test_contains_text_missing_entry_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(dir.path(), "check.zip", &[("file1.txt", b"content")]);

        let err = contains_text(&path, "file3.txt", "content").unwrap_err();
        assert!(matches!(err, PatchError::EntryNotFound { ref name, .. } if name == "file3.txt"));
    }

    #[test]
    fn test_contains_text_normalizes_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(dir.path(), "check.zip", &[("Save/Control.lua", b"-- marker")]);

        assert!(contains_text(&path, "./save//CONTROL.LUA", "-- marker").unwrap());
        assert!(contains_text(&path, "save/tmp/../control.lua", "marker").unwrap());
    }

    #[test]
    fn test_contains_text_binary_needle() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(dir.path(), "bin.zip", &[("data.bin", &[0, 159, 146, 150, 0])]);

        assert!(contains_text(&path, "data.bin", [159u8, 146]).unwrap());
        assert!(!contains_text(&path, "data.bin", [146u8, 159]).unwrap());
    }

    #[test]
    fn test_contains_text_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let err = contains_text(dir.path().join("none.zip"), "a.txt", "x").unwrap_err();
        assert!(matches!(err, PatchError::ArchiveOpen { .. }));
    }

    #[test]
    fn test_contains_text_corrupt_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_corrupt(dir.path());

        let err = contains_text(&path, "control.lua", "content").unwrap_err();
        assert!(
            matches!(err, PatchError::EntryRead { ref name, .. } if name == "control.lua"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_append_corrupt_entry_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_corrupt(dir.path());
        let before = fs::read(&path).unwrap();
        let output = dir.path().join("out.zip");

        let err = append_text(&path, "control.lua", "X", &output).unwrap_err();
        assert!(matches!(err, PatchError::EntryRead { ref name, .. } if name == "control.lua"));
        assert!(!output.exists());

        let err = append_text(&path, "control.lua", "X", &path).unwrap_err();
        assert!(matches!(err, PatchError::EntryRead { .. }));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_append_keeps_stored_entries_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stored.zip");
        write_stored(
            &path,
            &[("level.dat", b"level"), ("control.lua", b"-- script")],
        );
        let output = dir.path().join("out.zip");

        append_text(&path, "control.lua", "-- added", &output).unwrap();

        let mut zip = ZipArchive::new(fs::File::open(&output).unwrap()).unwrap();
        let untouched = zip.by_name("level.dat").unwrap();
        assert_eq!(untouched.compression(), CompressionMethod::Stored);
        drop(untouched);

        let patched = zip.by_name("control.lua").unwrap();
        assert_eq!(patched.compression(), CompressionMethod::Stored);
        assert_eq!(patched.unix_mode().unwrap() & 0o777, 0o755);
        let modified = patched.last_modified().unwrap();
        let expected = fixed_time();
        assert_eq!(
            (modified.year(), modified.month(), modified.day(), modified.hour()),
            (expected.year(), expected.month(), expected.day(), expected.hour())
        );
        drop(patched);

        assert_eq!(entry_data(&output, "control.lua"), b"-- script\n-- added\n");
    }

    #[test]
    fn test_append_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(dir.path(), "src.zip", &[("control.lua", b"base")]);
        let before = fs::read(&path).unwrap();
        let output = dir.path().join("no/such/dir/out.zip");

        let err = append_text(&path, "control.lua", "X", &output).unwrap_err();
        assert!(matches!(err, PatchError::ArchiveWrite { .. }));
        assert!(!output.exists());
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_append_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(dir.path(), "append.zip", &[("a.txt", b"original content")]);
        let output = dir.path().join("out.zip");

        let summary = append_text(&path, "a.txt", "X", &output).unwrap();

        assert_eq!(summary.entries_rewritten, vec!["a.txt".to_string()]);
        assert_eq!(summary.entries_copied, 0);
        assert_eq!(entry_data(&output, "a.txt"), b"original content\nX\n");
        assert_eq!(entry_data(&path, "a.txt"), b"original content");
    }

    #[test]
    fn test_append_twice_appends_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(dir.path(), "twice.zip", &[("a.txt", b"base")]);

        append_text(&path, "a.txt", "X", &path).unwrap();
        append_text(&path, "a.txt", "X", &path).unwrap();

        assert_eq!(entry_data(&path, "a.txt"), b"base\nX\n\nX\n");
    }

    #[test]
    fn test_append_name_must_match_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(dir.path(), "exact.zip", &[("Dir/A.txt", b"base")]);
        let before = fs::read(&path).unwrap();

        let err = append_text(&path, "dir/a.txt", "X", &path).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_append_missing_entry_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(
            dir.path(),
            "missing.zip",
            &[("file1.txt", b"one"), ("file2.txt", b"two")],
        );
        let before = fs::read(&path).unwrap();
        let output = dir.path().join("out.zip");

        let err = append_text(&path, "nope.txt", "X", &output).unwrap_err();
        assert!(matches!(err, PatchError::EntryNotFound { ref name, .. } if name == "nope.txt"));
        assert!(!output.exists());

        let err = append_text(&path, "nope.txt", "X", &path).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_untouched_entries_survive_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let blob: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();
        let path = build(
            dir.path(),
            "mixed.zip",
            &[
                ("level.dat0", blob.as_slice()),
                ("script/control.lua", b"local x = 1"),
                ("info.json", br#"{"name":"save"}"#),
            ],
        );
        let output = dir.path().join("patched.zip");

        let summary = append_text(&path, "script/control.lua", "-- added", &output).unwrap();
        assert_eq!(summary.entries_copied, 2);

        let original = read_entries(&path);
        let patched = read_entries(&output);
        let names = |entries: &[Entry]| entries.iter().map(|e| e.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&original), names(&patched));

        for (before, after) in original.iter().zip(&patched) {
            if before.name == "script/control.lua" {
                assert_eq!(after.data, b"local x = 1\n-- added\n");
            } else {
                assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn test_replace_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(
            dir.path(),
            "modify.zip",
            &[
                ("file1.txt", b"This is file 1."),
                ("file2.txt", b"This is file 2."),
                ("file3.txt", b"This is file 3."),
            ],
        );
        let output = dir.path().join("out.zip");

        let mut replacements = BTreeMap::new();
        replacements.insert("file3.txt".to_string(), b"Three".to_vec());
        replacements.insert("file1.txt".to_string(), b"Modified content for file 1.".to_vec());

        let summary = replace_entries(&path, &replacements, &output).unwrap();
        assert_eq!(summary.entries_rewritten, vec!["file1.txt", "file3.txt"]);
        assert_eq!(summary.entries_copied, 1);

        let entries = read_entries(&output);
        assert_eq!(
            entries,
            vec![
                Entry::new("file1.txt", "Modified content for file 1."),
                Entry::new("file2.txt", "This is file 2."),
                Entry::new("file3.txt", "Three"),
            ]
        );
    }

    #[test]
    fn test_replace_entries_unknown_key_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(dir.path(), "modify.zip", &[("file1.txt", b"one")]);
        let before = fs::read(&path).unwrap();

        let mut replacements = BTreeMap::new();
        replacements.insert("file1.txt".to_string(), b"changed".to_vec());
        replacements.insert("ghost.txt".to_string(), b"boo".to_vec());

        let err = replace_entries(&path, &replacements, &path).unwrap_err();
        assert!(matches!(err, PatchError::EntryNotFound { ref name, .. } if name == "ghost.txt"));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_replace_entries_empty_map_copies_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = build(dir.path(), "copy.zip", &[("a", b"1"), ("b", b"2")]);
        let output = dir.path().join("copy-out.zip");

        let summary = replace_entries(&path, &BTreeMap::new(), &output).unwrap();
        assert_eq!(summary.entries_copied, 2);
        assert!(summary.entries_rewritten.is_empty());
        assert_eq!(read_entries(&output), read_entries(&path));
    }
}
