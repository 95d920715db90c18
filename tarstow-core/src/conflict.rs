// tarstow-core/src/conflict.rs
//! Finds earlier installations that look like the one about to happen.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tarstow_aio::fs::{remove_artifact, RemovalOutcome};
use tarstow_common::config::Config;
use tarstow_common::error::{Result, TarstowError};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const SEARCH_DEPTH: usize = 2;
const DESKTOP_EXTENSION: &str = "desktop";

/// What the operator chose to do about conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Delete every match, then install.
    Replace,
    /// Leave matches alone; the new directory may get a suffix.
    InstallAnyway,
    Abort,
}

impl ConflictResolution {
    pub const ALL: [ConflictResolution; 3] = [
        ConflictResolution::Replace,
        ConflictResolution::InstallAnyway,
        ConflictResolution::Abort,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ConflictResolution::Replace => "Replace (delete the existing items, then install)",
            ConflictResolution::InstallAnyway => "Install anyway (keep the existing items)",
            ConflictResolution::Abort => "Abort installation",
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictResolution::Replace => "replace",
            ConflictResolution::InstallAnyway => "install-anyway",
            ConflictResolution::Abort => "abort",
        })
    }
}

impl FromStr for ConflictResolution {
    type Err = TarstowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(ConflictResolution::Replace),
            "install-anyway" | "anyway" | "keep" => Ok(ConflictResolution::InstallAnyway),
            "abort" => Ok(ConflictResolution::Abort),
            other => Err(TarstowError::Config(format!(
                "Unknown conflict resolution '{other}' (expected replace, install-anyway or abort)"
            ))),
        }
    }
}

/// Searches the configured locations for directories and desktop entries
/// whose names contain a search term.
#[derive(Debug, Clone)]
pub struct ConflictScanner {
    search_roots: Vec<PathBuf>,
    desktop_dir: PathBuf,
    protected: Vec<PathBuf>,
}

impl ConflictScanner {
    pub fn new(config: &Config) -> Self {
        Self {
            search_roots: config.search_roots.clone(),
            desktop_dir: config.desktop_dir.clone(),
            protected: config.protected_dirs(),
        }
    }

    /// Existing paths whose file name contains `term`, case-insensitively.
    /// Directories come first, in search-root order, then desktop entries.
    pub fn scan(&self, term: &str) -> Vec<PathBuf> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for root in &self.search_roots {
            if !root.is_dir() {
                debug!("Search root {} does not exist, skipping", root.display());
                continue;
            }
            let mut walker = WalkDir::new(root)
                .min_depth(1)
                .max_depth(SEARCH_DEPTH)
                .sort_by_file_name()
                .into_iter();
            while let Some(entry) = walker.next() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        debug!("Unreadable entry under {}: {}", root.display(), e);
                        continue;
                    }
                };
                if !entry.file_type().is_dir() {
                    continue;
                }
                let path = entry.path();
                if self.is_protected(path) {
                    continue;
                }
                if name_contains(path, &needle) {
                    if seen.insert(path.to_path_buf()) {
                        found.push(path.to_path_buf());
                    }
                    walker.skip_current_dir();
                }
            }
        }

        for entry in WalkDir::new(&self.desktop_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_dir()
                && name_contains(path, &needle)
                && seen.insert(path.to_path_buf())
            {
                found.push(path.to_path_buf());
            }
        }

        debug!("Conflict scan for '{}' found {} item(s)", term, found.len());
        found
    }

    fn is_protected(&self, path: &Path) -> bool {
        self.protected.iter().any(|p| p == path)
    }
}

/// Deletes every conflict, plus any desktop entry whose name contains a
/// conflict's name. The first failure stops the install.
pub fn remove_conflicts(conflicts: &[PathBuf], desktop_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();

    for conflict in conflicts {
        let stem = conflict_stem(conflict);
        remove_or_fail(conflict, &mut removed)?;

        let Some(stem) = stem else {
            continue;
        };
        for entry in WalkDir::new(desktop_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if is_desktop_entry(path) && name_contains(path, &stem) {
                remove_or_fail(path, &mut removed)?;
            }
        }
    }

    info!("Removed {} conflicting item(s)", removed.len());
    Ok(removed)
}

fn remove_or_fail(path: &Path, removed: &mut Vec<PathBuf>) -> Result<()> {
    match remove_artifact(path) {
        RemovalOutcome::Removed => {
            debug!("Removed conflict {}", path.display());
            removed.push(path.to_path_buf());
            Ok(())
        }
        RemovalOutcome::Missing => Ok(()),
        RemovalOutcome::Failed(reason) => {
            warn!("Could not remove conflict {}: {}", path.display(), reason);
            Err(TarstowError::InstallError(format!(
                "Failed to remove conflicting item {}: {}",
                path.display(),
                reason
            )))
        }
    }
}

/// The part of a conflict's name that related desktop entries would carry:
/// the directory name, or a desktop file's stem.
fn conflict_stem(path: &Path) -> Option<String> {
    let name = if is_desktop_entry(path) {
        path.file_stem()?
    } else {
        path.file_name()?
    };
    let name = name.to_string_lossy().to_lowercase();
    (!name.is_empty()).then_some(name)
}

fn is_desktop_entry(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(DESKTOP_EXTENSION))
}

fn name_contains(path: &Path, needle_lower: &str) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().to_lowercase().contains(needle_lower))
}
