// tarstow-core/src/index.rs
//! Reads the log store back: which installations are live, and which record
//! belongs to an identifier.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime};
use tarstow_aio::fs::is_symlink;
use tarstow_common::config::Config;
use tarstow_common::error::Result;
use tarstow_common::model::record::{ARCHIVED_RECORD_EXTENSION, RECORD_EXTENSION};
use tarstow_common::model::{InstallationRecord, LiveInstallation};
use tracing::{debug, warn};

/// A parsed record plus the time used to order it.
#[derive(Debug, Clone)]
pub struct IndexedRecord {
    pub record: InstallationRecord,
    pub recorded_at: Option<NaiveDateTime>,
}

impl IndexedRecord {
    fn file_name(&self) -> String {
        self.record
            .log_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Newest first: by the stamp embedded in the file name, or the file's
/// modification time when the name carries none. Names break ties.
fn newest_first(a: &IndexedRecord, b: &IndexedRecord) -> Ordering {
    b.recorded_at
        .cmp(&a.recorded_at)
        .then_with(|| b.file_name().cmp(&a.file_name()))
}

/// Every un-archived record in the log store, newest first. Unreadable
/// records are reported and skipped.
pub fn scan_records(log_dir: &Path) -> Result<Vec<IndexedRecord>> {
    let read_dir = match fs::read_dir(log_dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Log store {} does not exist yet", log_dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(RECORD_EXTENSION) || name.ends_with(ARCHIVED_RECORD_EXTENSION) {
            continue;
        }
        if !entry.file_type().is_ok_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        let record = match InstallationRecord::from_file(&path) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable record {}: {}", path.display(), e);
                continue;
            }
        };
        let recorded_at = record
            .file_name()
            .and_then(|n| n.stamp_time())
            .or_else(|| {
                entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .map(|t| DateTime::<Local>::from(t).naive_local())
            });
        records.push(IndexedRecord {
            record,
            recorded_at,
        });
    }

    records.sort_by(newest_first);
    debug!(
        "Indexed {} record(s) in {}",
        records.len(),
        log_dir.display()
    );
    Ok(records)
}

/// Live installations, newest first, one per identifier. Only an emitted
/// entry suppresses older ones, so a newer stale record never hides an
/// older live one.
pub fn list_live_installations(config: &Config) -> Result<Vec<LiveInstallation>> {
    let mut emitted = HashSet::new();
    let mut live = Vec::new();

    for indexed in scan_records(&config.log_dir)? {
        let record = indexed.record;
        if emitted.contains(&record.app_identifier) || !record.is_live() {
            continue;
        }
        let Some(install_dir) = record.final_install_dir.clone() else {
            continue;
        };
        let timestamp = record
            .timestamp
            .clone()
            .or_else(|| indexed.recorded_at.map(|t| t.to_string()))
            .unwrap_or_default();
        emitted.insert(record.app_identifier.clone());
        live.push(LiveInstallation {
            app_identifier: record.app_identifier,
            install_dir,
            log_path: record.log_path,
            timestamp,
        });
    }
    Ok(live)
}

/// The record to act on for `app_identifier` (case-insensitive): the newest
/// live one, else the newest un-archived one whose directory is gone but
/// whose symlink or desktop entry is still on disk.
pub fn find_record(config: &Config, app_identifier: &str) -> Result<Option<InstallationRecord>> {
    let wanted = app_identifier.trim().to_lowercase();
    let candidates: Vec<InstallationRecord> = scan_records(&config.log_dir)?
        .into_iter()
        .map(|i| i.record)
        .filter(|r| r.app_identifier.to_lowercase() == wanted)
        .collect();

    if let Some(live) = candidates.iter().find(|r| r.is_live()) {
        return Ok(Some(live.clone()));
    }
    let stale = candidates.into_iter().find(has_leftovers);
    if let Some(record) = &stale {
        debug!(
            "No live record for '{}', using stale record {}",
            app_identifier,
            record.log_path.display()
        );
    }
    Ok(stale)
}

fn has_leftovers(record: &InstallationRecord) -> bool {
    record.symlinks.iter().any(|pair| is_symlink(&pair.link))
        || record
            .desktop_file_path
            .as_deref()
            .is_some_and(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write_record(config: &Config, file_name: &str, id: &str, dir: Option<&Path>) {
        fs::create_dir_all(&config.log_dir).unwrap();
        let mut body = format!("Timestamp: {file_name}\nDerived app name: {id}\n");
        if let Some(dir) = dir {
            body.push_str(&format!("Final installation directory: {}\n", dir.display()));
        }
        fs::write(config.log_dir.join(file_name), body).unwrap();
    }

    #[test]
    fn newest_live_record_wins_per_identifier() {
        let temp = TempDir::new().unwrap();
        let config = Config::with_home(temp.path());
        let dir = config.install_base.join("app");
        fs::create_dir_all(&dir).unwrap();

        write_record(&config, "app-20260101_100000_000.log", "app", Some(&dir));
        write_record(&config, "app-20260201_100000_000.log", "app", Some(&dir));

        let live = list_live_installations(&config).unwrap();
        assert_eq!(live.len(), 1);
        assert!(live[0].log_path.ends_with("app-20260201_100000_000.log"));
        assert_eq!(live[0].install_dir, dir);
    }

    #[test]
    fn newer_stale_record_does_not_hide_older_live_one() {
        let temp = TempDir::new().unwrap();
        let config = Config::with_home(temp.path());
        let live_dir = config.install_base.join("app");
        fs::create_dir_all(&live_dir).unwrap();
        let gone = config.install_base.join("app_gone");

        write_record(&config, "app-20260101_100000_000.log", "app", Some(&live_dir));
        write_record(&config, "app-20260301_100000_000.log", "app", Some(&gone));

        let live = list_live_installations(&config).unwrap();
        assert_eq!(live.len(), 1);
        assert!(live[0].log_path.ends_with("app-20260101_100000_000.log"));
    }

    #[test]
    fn ordering_uses_embedded_stamp_not_name() {
        let temp = TempDir::new().unwrap();
        let config = Config::with_home(temp.path());
        let a = config.install_base.join("a");
        let b = config.install_base.join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();

        // "zeta" sorts after "alpha" by name but is older.
        write_record(&config, "zeta-20250101_000000_000.log", "zeta", Some(&a));
        write_record(&config, "alpha-20260101_000000_000.log", "alpha", Some(&b));

        let ids: Vec<String> = list_live_installations(&config)
            .unwrap()
            .into_iter()
            .map(|l| l.app_identifier)
            .collect();
        assert_eq!(ids, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn archived_and_unparseable_records_are_ignored() {
        let temp = TempDir::new().unwrap();
        let config = Config::with_home(temp.path());
        let dir = config.install_base.join("app");
        fs::create_dir_all(&dir).unwrap();

        write_record(&config, "app-20260101_100000_000.removed.log", "app", Some(&dir));
        fs::write(config.log_dir.join("junk.log"), "no metadata here\n").unwrap();
        fs::write(config.log_dir.join("notes.txt"), "").unwrap();

        assert!(list_live_installations(&config).unwrap().is_empty());
        assert!(find_record(&config, "app").unwrap().is_none());
    }

    #[test]
    fn find_record_falls_back_to_stale_with_leftovers() {
        let temp = TempDir::new().unwrap();
        let config = Config::with_home(temp.path());
        let gone = config.install_base.join("tool");
        write_record(&config, "tool-20260101_100000_000.log", "tool", Some(&gone));
        assert!(find_record(&config, "tool").unwrap().is_none());

        let desktop_file = config.desktop_file_path("tool");
        fs::create_dir_all(&config.desktop_dir).unwrap();
        fs::write(&desktop_file, "").unwrap();
        let path = config.log_dir.join("tool-20260101_100000_000.log");
        let mut body = fs::read_to_string(&path).unwrap();
        body.push_str(&format!("Desktop file installed: {}\n", desktop_file.display()));
        fs::write(&path, body).unwrap();

        let found = find_record(&config, "TOOL").unwrap().unwrap();
        assert_eq!(found.app_identifier, "tool");
        assert!(!found.is_live());
        assert!(find_record(&config, "other").unwrap().is_none());
    }

    #[test]
    fn missing_log_store_is_empty() {
        let temp = TempDir::new().unwrap();
        let config = Config::with_home(temp.path());
        assert!(scan_records(&config.log_dir).unwrap().is_empty());
    }
}
