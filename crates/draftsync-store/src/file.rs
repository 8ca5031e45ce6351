//! Directory-backed draft repository
//!
//! Layout: one `<key>.json` document per draft inside the store directory.
//! Writes go to a sibling temp file and are renamed into place, so a crash
//! leaves either the old or the new document, never a torn one. The
//! `last_modified_local` index is rebuilt once at open and then kept in memory.

use crate::error::StoreError;
use crate::repository::{sort_oldest_first, DraftRepository, IndexEntry};
use draftsync_core::{Draft, DraftId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const DRAFT_EXTENSION: &str = "json";
const TEMP_MARKER: &str = ".tmp-";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// How hard a write tries to reach the disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteDurability {
    /// Rename only; the OS flushes eventually
    #[default]
    Fast,
    /// Fsync the document and its directory before returning
    Durable,
}

/// One JSON document per draft
#[derive(Debug)]
pub struct FileDraftRepository {
    dir: PathBuf,
    durability: WriteDurability,
    index: Mutex<HashMap<DraftId, IndexEntry>>,
}

impl FileDraftRepository {
    /// Open (creating if needed) a store directory and index its drafts.
    ///
    /// Documents that fail to decode are skipped with a warning rather than
    /// blocking the whole store; stale temp files are removed.
    ///
    /// # Errors
    /// `StoreError::Io` if the directory cannot be created or listed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::io(&dir, source))?;

        let mut index = HashMap::new();
        let entries = fs::read_dir(&dir).map_err(|source| StoreError::io(&dir, source))?;
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::io(&dir, source))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if name.contains(TEMP_MARKER) {
                tracing::debug!("Removing stale temp file {:?}", path);
                let _ = fs::remove_file(&path);
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(DRAFT_EXTENSION) {
                continue;
            }

            match read_draft(&path) {
                Ok(Some(draft)) => {
                    index.insert(draft.id.clone(), IndexEntry::of(&draft));
                }
                Ok(None) => {}
                Err(err) => tracing::warn!("Skipping unreadable draft: {}", err),
            }
        }

        tracing::info!("Opened draft store at {:?} ({} drafts)", dir, index.len());

        Ok(Self {
            dir,
            durability: WriteDurability::default(),
            index: Mutex::new(index),
        })
    }

    /// With write durability
    #[inline]
    #[must_use]
    pub fn with_durability(mut self, durability: WriteDurability) -> Self {
        self.durability = durability;
        self
    }

    /// Store directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &DraftId) -> PathBuf {
        self.dir.join(format!("{}.{DRAFT_EXTENSION}", file_stem(id)))
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), StoreError> {
        let temp = path.with_extension(format!(
            "{DRAFT_EXTENSION}{TEMP_MARKER}{}-{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let result = (|| -> io::Result<()> {
            let mut file = fs::File::create(&temp)?;
            file.write_all(contents)?;
            if self.durability == WriteDurability::Durable {
                file.sync_all()?;
            }
            drop(file);
            fs::rename(&temp, path)?;
            if self.durability == WriteDurability::Durable {
                sync_dir(&self.dir)?;
            }
            Ok(())
        })();

        result.map_err(|source| {
            let _ = fs::remove_file(&temp);
            StoreError::io(path, source)
        })
    }
}

impl DraftRepository for FileDraftRepository {
    fn put(&self, draft: &Draft) -> Result<(), StoreError> {
        let path = self.path_for(&draft.id);
        let bytes = serde_json::to_vec_pretty(draft).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;

        let mut index = self.index.lock();
        self.write_atomic(&path, &bytes)?;
        index.insert(draft.id.clone(), IndexEntry::of(draft));
        Ok(())
    }

    fn get(&self, id: &DraftId) -> Result<Option<Draft>, StoreError> {
        read_draft(&self.path_for(id))
    }

    fn delete(&self, id: &DraftId) -> Result<bool, StoreError> {
        let path = self.path_for(id);
        let mut index = self.index.lock();
        let existed = match fs::remove_file(&path) {
            Ok(()) => true,
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(source) => return Err(StoreError::io(path, source)),
        };
        index.remove(id);
        Ok(existed)
    }

    fn by_last_modified(&self) -> Result<Vec<IndexEntry>, StoreError> {
        let mut entries: Vec<IndexEntry> = self.index.lock().values().cloned().collect();
        sort_oldest_first(&mut entries);
        Ok(entries)
    }
}

fn read_draft(path: &Path) -> Result<Option<Draft>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(StoreError::io(path, source)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// File stem for a draft key. Plain keys map to themselves; anything else is
/// hex-encoded so it cannot escape the directory. Keys that already start
/// with the `x-` escape prefix are encoded too, which keeps the mapping
/// one-to-one.
fn file_stem(id: &DraftId) -> String {
    let raw = id.as_str();
    let plain = !raw.is_empty()
        && !raw.get(..2).is_some_and(|prefix| prefix.eq_ignore_ascii_case("x-"))
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain {
        raw.to_string()
    } else {
        let hex: String = raw.bytes().map(|b| format!("{b:02x}")).collect();
        format!("x-{hex}")
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
