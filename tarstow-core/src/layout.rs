// tarstow-core/src/layout.rs
//! Where the payload of an extracted archive lives, and whether it is
//! source code rather than a pre-built program.

use std::fs;
use std::path::{Path, PathBuf};

use tarstow_common::error::Result;
use tracing::{debug, warn};
use walkdir::WalkDir;

const SOURCE_SCAN_DEPTH: usize = 3;
const C_SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "h", "hh", "hpp", "hxx"];

/// Returns the single top-level directory of `extract_root` if that is all
/// the archive contained, otherwise `extract_root` itself.
pub fn resolve_logical_root(extract_root: &Path) -> Result<PathBuf> {
    let mut entries = fs::read_dir(extract_root)?.collect::<std::io::Result<Vec<_>>>()?;

    if entries.len() == 1 {
        let entry = entries.remove(0);
        if entry.file_type()?.is_dir() {
            debug!(
                "Single top-level directory, logical root is {}",
                entry.path().display()
            );
            return Ok(entry.path());
        }
    }
    debug!(
        "Flat archive layout, logical root is {}",
        extract_root.display()
    );
    Ok(extract_root.to_path_buf())
}

/// Build-system evidence under `root`, as paths relative to it. Empty means
/// the payload looks pre-built.
pub fn detect_source_indicators(root: &Path, markers: &[String]) -> Vec<String> {
    let mut indicators = Vec::new();
    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(SOURCE_SCAN_DEPTH)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry during source scan: {}", e);
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy();
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .display()
            .to_string();

        if entry.file_type().is_dir() {
            if name.eq_ignore_ascii_case("src") && contains_c_sources(entry.path()) {
                indicators.push(format!("{relative}/ (C/C++ sources)"));
                walker.skip_current_dir();
            }
        } else if markers.iter().any(|m| m.as_str() == name) {
            indicators.push(relative);
        }
    }

    if !indicators.is_empty() {
        debug!(
            "Source indicators under {}: {:?}",
            root.display(),
            indicators
        );
    }
    indicators
}

fn contains_c_sources(dir: &Path) -> bool {
    WalkDir::new(dir)
        .max_depth(SOURCE_SCAN_DEPTH)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .any(|e| {
            e.path()
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .is_some_and(|ext| C_SOURCE_EXTENSIONS.contains(&ext.as_str()))
        })
}
