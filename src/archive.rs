//! Archive data structures
//!
//! An [`Archive`] is a transient, in-memory view of a ZIP container on disk.
//! Opening one reads the whole file and releases the handle right away, so the
//! same path can be overwritten later in the same operation.
//!
//! Archives whose central directory lists the same name twice are rejected on
//! open: the reader keeps only one of them, and a rebuild would silently drop
//! the other.

use std::fs;
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{PatchError, Result};

/// Mode given to archives that did not exist before they were written
#[cfg(unix)]
const NEW_ARCHIVE_MODE: u32 = 0o644;

const EOCD_SIGNATURE: &[u8] = b"PK\x05\x06";
const EOCD_LEN: usize = 22;

/// A single named entry with its decompressed contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Slash-separated path of the entry inside the archive
    pub name: String,
    /// Decompressed contents
    pub data: Vec<u8>,
}

impl Entry {
    /// Create a new entry with the given name and data
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// An opened ZIP archive, entries kept in central directory order
pub struct Archive {
    path: PathBuf,
    zip: ZipArchive<Cursor<Vec<u8>>>,
    names: Vec<String>,
    byte_len: usize,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("names", &self.names)
            .finish()
    }
}

impl Archive {
    /// Read the archive at `path` into memory and index its entries
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source: ZipError| PatchError::ArchiveOpen {
            path: path.clone(),
            source,
        };

        let bytes = fs::read(&path).map_err(|e| open_err(e.into()))?;
        let byte_len = bytes.len();
        let declared = declared_entries(&bytes);
        let mut zip = ZipArchive::new(Cursor::new(bytes)).map_err(open_err)?;

        // 0xFFFF defers the count to the zip64 record
        if let Some(declared) = declared.filter(|&count| count != u16::MAX) {
            if usize::from(declared) != zip.len() {
                tracing::warn!(
                    archive = %path.display(),
                    declared,
                    unique = zip.len(),
                    "archive lists duplicate entry names"
                );
                return Err(open_err(ZipError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "duplicate entry names",
                ))));
            }
        }

        let mut names = Vec::with_capacity(zip.len());
        for index in 0..zip.len() {
            let entry = zip.by_index_raw(index).map_err(open_err)?;
            names.push(entry.name().to_string());
        }

        tracing::trace!(archive = %path.display(), entries = names.len(), "opened archive");

        Ok(Self {
            path,
            zip,
            names,
            byte_len,
        })
    }

    /// Path the archive was read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Entry names in archive order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Size of the archive file in bytes
    pub(crate) fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// First entry whose full name ends with `suffix`.
    ///
    /// Plain string suffix, so `control.lua` also matches `mod/xcontrol.lua`.
    /// When several entries match, the earliest in archive order wins.
    pub fn locate(&self, suffix: &str) -> Option<&str> {
        self.names.iter().map(String::as_str).find(|name| {
            tracing::trace!(entry = name, "checking entry");
            name.ends_with(suffix)
        })
    }

    /// Index of the first entry whose normalized name equals `name`, ignoring case
    pub fn find(&self, name: &str) -> Option<usize> {
        let wanted = normalize_name(name).to_lowercase();
        self.names
            .iter()
            .position(|candidate| normalize_name(candidate).to_lowercase() == wanted)
    }

    /// Read and decompress the entry at `index`
    pub fn read(&mut self, index: usize) -> Result<Vec<u8>> {
        let name = self.names.get(index).cloned().unwrap_or_default();
        let read_err = |source: ZipError| PatchError::EntryRead {
            path: self.path.clone(),
            name: name.clone(),
            source,
        };

        let mut entry = self.zip.by_index(index).map_err(read_err)?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut data)
            .map_err(|e| read_err(e.into()))?;
        Ok(data)
    }

    /// Decompress every entry, in archive order
    pub fn entries(&mut self) -> Result<Vec<Entry>> {
        (0..self.len())
            .map(|index| {
                let data = self.read(index)?;
                Ok(Entry::new(self.names[index].clone(), data))
            })
            .collect()
    }

    /// Copy the entry at `index` into `writer` without recompressing it
    pub(crate) fn copy_raw<W: Write + Seek>(
        &mut self,
        index: usize,
        writer: &mut ZipWriter<W>,
    ) -> Result<()> {
        let read_err = |source: ZipError| PatchError::EntryRead {
            path: self.path.clone(),
            name: self.names.get(index).cloned().unwrap_or_default(),
            source,
        };

        let entry = self.zip.by_index_raw(index).map_err(read_err)?;
        writer.raw_copy_file(entry).map_err(read_err)
    }

    /// Options for rewriting the entry at `index` with new content.
    ///
    /// Stored entries stay stored, anything else is deflated. Unix
    /// permissions and the modification time carry over.
    pub(crate) fn rewrite_options(&mut self, index: usize) -> Result<SimpleFileOptions> {
        let entry = self
            .zip
            .by_index_raw(index)
            .map_err(|source| PatchError::EntryRead {
                path: self.path.clone(),
                name: self.names.get(index).cloned().unwrap_or_default(),
                source,
            })?;

        let method = match entry.compression() {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let mut options = SimpleFileOptions::default()
            .compression_method(method)
            .last_modified_time(entry.last_modified().unwrap_or_default());
        if let Some(mode) = entry.unix_mode() {
            options = options.unix_permissions(mode);
        }
        Ok(options)
    }

    /// Write a fresh archive holding `entries`, deflated, in the given order
    pub fn create(path: impl AsRef<Path>, entries: &[Entry]) -> Result<()> {
        let path = path.as_ref();
        let write_err = |source: ZipError| PatchError::ArchiveWrite {
            path: path.to_path_buf(),
            source,
        };

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for entry in entries {
            write_entry(&mut writer, path, &entry.name, options, &entry.data)?;
        }
        let bytes = writer.finish().map_err(write_err)?.into_inner();

        persist(path, &bytes)
    }
}

/// Add `name` with `content` to `writer`, errors tagged with the entry name
pub(crate) fn write_entry<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    archive_path: &Path,
    name: &str,
    options: SimpleFileOptions,
    content: &[u8],
) -> Result<()> {
    let write_err = |source: ZipError| PatchError::EntryWrite {
        path: archive_path.to_path_buf(),
        name: name.to_string(),
        source,
    };

    writer.start_file(name, options).map_err(write_err)?;
    writer.write_all(content).map_err(|e| write_err(e.into()))
}

/// Entry count from the end of central directory record
fn declared_entries(bytes: &[u8]) -> Option<u16> {
    let last = bytes.len().checked_sub(EOCD_LEN)?;
    (0..=last)
        .rev()
        .take(usize::from(u16::MAX) + 1)
        .find_map(|pos| {
            let record = &bytes[pos..];
            let comment_len = usize::from(u16::from_le_bytes([record[20], record[21]]));
            (record.starts_with(EOCD_SIGNATURE) && record.len() == EOCD_LEN + comment_len)
                .then(|| u16::from_le_bytes([record[10], record[11]]))
        })
}

/// Clean a slash-separated entry name.
///
/// Backslashes count as separators, empty and `.` segments are dropped and
/// `..` consumes the previous segment. An empty result becomes `.`.
pub fn normalize_name(name: &str) -> String {
    let unified = name.replace('\\', "/");
    let rooted = unified.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Write `bytes` to `path` in one step.
///
/// The data goes to a temporary file next to `path` which is then renamed
/// over it, so a failure never leaves a half-written archive behind.
pub(crate) fn persist(path: &Path, bytes: &[u8]) -> Result<()> {
    let write_err = |source: ZipError| PatchError::ArchiveWrite {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = NamedTempFile::new_in(dir).map_err(|e| write_err(e.into()))?;
    staged.write_all(bytes).map_err(|e| write_err(e.into()))?;
    staged.as_file().sync_all().map_err(|e| write_err(e.into()))?;

    match fs::metadata(path) {
        Ok(existing) => staged
            .as_file()
            .set_permissions(existing.permissions())
            .map_err(|e| write_err(e.into()))?,
        #[cfg(unix)]
        Err(_) => {
            use std::os::unix::fs::PermissionsExt;
            staged
                .as_file()
                .set_permissions(fs::Permissions::from_mode(NEW_ARCHIVE_MODE))
                .map_err(|e| write_err(e.into()))?;
        }
        #[cfg(not(unix))]
        Err(_) => {}
    }

    staged.persist(path).map_err(|e| write_err(e.error.into()))?;
    Ok(())
}
