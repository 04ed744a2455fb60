//! Saved query files
//!
//! A query file is a plain text file without extension holding one or more
//! query blocks separated by blank lines.

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

static FILE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-zA-Z_-]+$").unwrap());

/// Folder name under which the main query directory is offered
pub const DEFAULT_FOLDER: &str = "default";

/// Query files in one directory
#[derive(Debug, Clone)]
pub struct QueryFileStore {
    dir: PathBuf,
}

impl QueryFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File names in the directory, sorted. Creates the directory if missing.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)
                .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read {}", self.dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Check a new file name; `existing` is the current name when renaming
    pub fn validate_name(&self, name: &str, existing: Option<&str>) -> Result<()> {
        if !FILE_NAME.is_match(name) {
            bail!("Should be valid file name [0-9,a-z,A-Z,_,-]: '{}'", name);
        }
        if existing != Some(name) && self.list()?.iter().any(|used| used == name) {
            bail!("Name {} is already in use", name);
        }
        Ok(())
    }

    /// Create an empty query file
    pub fn create(&self, name: &str) -> Result<PathBuf> {
        self.validate_name(name, None)?;
        let path = self.dir.join(name);
        std::fs::write(&path, "")
            .with_context(|| format!("Failed to create {}", path.display()))?;
        info!("Created query file {}", path.display());
        Ok(path)
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<PathBuf> {
        self.validate_name(new, Some(old))?;
        let from = self.existing_path(old)?;
        let to = self.dir.join(new);
        std::fs::rename(&from, &to)
            .with_context(|| format!("Failed to rename {} to {}", from.display(), to.display()))?;
        info!("Renamed query file {} to {}", old, new);
        Ok(to)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.existing_path(name)?;
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to delete {}", path.display()))?;
        info!("Deleted query file {}", path.display());
        Ok(())
    }

    pub fn read(&self, name: &str) -> Result<String> {
        let path = self.existing_path(name)?;
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    fn existing_path(&self, name: &str) -> Result<PathBuf> {
        if !FILE_NAME.is_match(name) {
            bail!("Invalid query file name '{}'", name);
        }
        let path = self.dir.join(name);
        if !path.is_file() {
            bail!("No query file named {} in {}", name, self.dir.display());
        }
        Ok(path)
    }
}

/// Folders offered for new query files, keyed by directory base name.
///
/// The main directory is always present as [`DEFAULT_FOLDER`].
pub fn query_folders(default_dir: &Path, extra_dirs: &[PathBuf]) -> BTreeMap<String, PathBuf> {
    let mut folders: BTreeMap<String, PathBuf> = extra_dirs
        .iter()
        .filter_map(|dir| {
            dir.file_name()
                .map(|name| (name.to_string_lossy().into_owned(), dir.clone()))
        })
        .collect();
    folders.insert(DEFAULT_FOLDER.to_string(), default_dir.to_path_buf());
    folders
}
