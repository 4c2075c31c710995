//! Instruction-set storage and administration.
//!
//! One flat `.txt` file per set under the sets directory. The file system is
//! the single source of truth: every operation re-reads the target file, and
//! mutations go through the parsed record sequence of [`SlotFile`] before an
//! atomic write back. Set names are sanitized to a safe alphabet, so a name
//! can never escape the sets directory.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use crate::core::ids::resolve_ids;
use crate::core::slots::SlotFile;

/// Content for a freshly created set: one empty slot to start from.
const NEW_SET_CONTENT: &str = "// slot 0\n\n";

/// Directory of instruction-set files.
#[derive(Debug, Clone)]
pub struct SetStore {
    sets_dir: PathBuf,
}

/// Outcome of a bulk slot creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkCreated {
    pub created: Vec<u32>,
    pub skipped: Vec<u32>,
}

/// Outcome of a bulk slot deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkDeleted {
    pub deleted: Vec<u32>,
    pub missing: Vec<u32>,
}

impl SetStore {
    pub fn new(sets_dir: impl Into<PathBuf>) -> Self {
        Self {
            sets_dir: sets_dir.into(),
        }
    }

    /// Create the sets directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.sets_dir)
            .with_context(|| format!("create sets dir {}", self.sets_dir.display()))
    }

    /// Sorted file names of every set in the store.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.sets_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let entries = fs::read_dir(&self.sets_dir)
            .with_context(|| format!("read sets dir {}", self.sets_dir.display()))?;
        for entry in entries {
            let entry = entry.context("read sets dir entry")?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".txt") && entry.path().is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read a set's text, or `None` when no such set exists.
    pub fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.set_path(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let text =
            fs::read_to_string(&path).with_context(|| format!("read set {}", path.display()))?;
        Ok(Some(text))
    }

    /// Read a set's text, failing when it does not exist.
    pub fn read_required(&self, name: &str) -> Result<String> {
        match self.read(name)? {
            Some(text) => Ok(text),
            None => bail!("set '{}' not found", name),
        }
    }

    /// Overwrite a set's text atomically (temp file + rename).
    pub fn write(&self, name: &str, text: &str) -> Result<()> {
        self.ensure_dir()?;
        let path = self.set_path(name)?;
        let tmp_path = path.with_extension("txt.tmp");
        fs::write(&tmp_path, text)
            .with_context(|| format!("write temp set {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("replace set {}", path.display()))?;
        Ok(())
    }

    /// Create a new set seeded with one empty slot.
    ///
    /// Returns the file name actually used (sanitized, `.txt` appended).
    #[instrument(skip(self))]
    pub fn create(&self, name: &str) -> Result<String> {
        self.ensure_dir()?;
        let file_name = set_file_name(name)?;
        let path = self.sets_dir.join(&file_name);
        if path.exists() {
            bail!("set '{}' already exists", file_name);
        }
        fs::write(&path, NEW_SET_CONTENT)
            .with_context(|| format!("create set {}", path.display()))?;
        info!(set = %file_name, "created set");
        Ok(file_name)
    }

    /// Delete a set file, failing when it does not exist.
    #[instrument(skip(self))]
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.set_path(name)?;
        if !path.exists() {
            bail!("set '{}' not found", name);
        }
        fs::remove_file(&path).with_context(|| format!("delete set {}", path.display()))?;
        info!(set = %name, "deleted set");
        Ok(())
    }

    /// Sorted ids of the slots present in a set.
    pub fn slot_ids(&self, name: &str) -> Result<Vec<u32>> {
        let text = self.read_required(name)?;
        Ok(SlotFile::parse(&text).ids())
    }

    /// Trimmed body of one slot, failing when set or slot is missing.
    pub fn load_slot(&self, name: &str, id: u32) -> Result<String> {
        let text = self.read_required(name)?;
        match SlotFile::parse(&text).extract(id) {
            Some(body) => Ok(body.to_string()),
            None => bail!("slot {} not found in set '{}'", id, name),
        }
    }

    /// Replace a slot's body, appending the slot when it is absent.
    #[instrument(skip(self, code))]
    pub fn save_slot(&self, name: &str, id: u32, code: &str) -> Result<()> {
        let text = self.read_required(name)?;
        let mut file = SlotFile::parse(&text);
        file.upsert(id, code);
        self.write(name, &file.serialize())?;
        debug!(set = %name, id, "saved slot");
        Ok(())
    }

    /// Append a new empty slot, failing when the id already exists.
    #[instrument(skip(self))]
    pub fn create_slot(&self, name: &str, id: u32) -> Result<()> {
        let text = self.read_required(name)?;
        let mut file = SlotFile::parse(&text);
        if !file.insert_empty(id) {
            bail!("slot {} already exists in set '{}'", id, name);
        }
        self.write(name, &file.serialize())
    }

    /// Remove one slot, failing when it does not exist.
    #[instrument(skip(self))]
    pub fn delete_slot(&self, name: &str, id: u32) -> Result<()> {
        let text = self.read_required(name)?;
        let mut file = SlotFile::parse(&text);
        if !file.remove(id) {
            bail!("slot {} not found in set '{}'", id, name);
        }
        self.write(name, &file.serialize())
    }

    /// Create every id an expression resolves to; existing ids are skipped.
    #[instrument(skip(self))]
    pub fn bulk_create_slots(&self, name: &str, expr: &str) -> Result<BulkCreated> {
        let ids = resolve_ids(expr);
        if ids.is_empty() {
            bail!("no valid slot ids in '{}'", expr);
        }
        let text = self.read_required(name)?;
        let mut file = SlotFile::parse(&text);
        let mut outcome = BulkCreated {
            created: Vec::new(),
            skipped: Vec::new(),
        };
        for id in ids {
            if file.insert_empty(id) {
                outcome.created.push(id);
            } else {
                outcome.skipped.push(id);
            }
        }
        if !outcome.created.is_empty() {
            self.write(name, &file.serialize())?;
        }
        info!(set = %name, created = outcome.created.len(), skipped = outcome.skipped.len(), "bulk created slots");
        Ok(outcome)
    }

    /// Delete every id an expression resolves to, duplicate records included.
    #[instrument(skip(self))]
    pub fn bulk_delete_slots(&self, name: &str, expr: &str) -> Result<BulkDeleted> {
        let ids = resolve_ids(expr);
        if ids.is_empty() {
            bail!("no valid slot ids in '{}'", expr);
        }
        let text = self.read_required(name)?;
        let mut file = SlotFile::parse(&text);
        let deleted = file.remove_all(&ids);
        let missing: Vec<u32> = ids.iter().copied().filter(|id| !deleted.contains(id)).collect();
        if !deleted.is_empty() {
            self.write(name, &file.serialize())?;
        }
        info!(set = %name, deleted = deleted.len(), missing = missing.len(), "bulk deleted slots");
        Ok(BulkDeleted { deleted, missing })
    }

    fn set_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.sets_dir.join(set_file_name(name)?))
    }
}

/// Sanitize a set name into its on-disk file name.
///
/// Characters outside `[A-Za-z0-9._-]` become `_` and a missing `.txt`
/// extension is appended. The resulting name contains no path separators.
pub fn set_file_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("set name is empty");
    }
    let mut sanitized: String = trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !sanitized.ends_with(".txt") {
        sanitized.push_str(".txt");
    }
    Ok(sanitized)
}
