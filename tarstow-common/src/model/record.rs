// tarstow-common/src/model/record.rs
//! Installation Record line format.
//!
//! One record file per install attempt, named `<app-identifier>-<stamp>.log`
//! and renamed to `<app-identifier>-<stamp>.removed.log` on uninstall.
//! Operational lines always carry a `[HH:MM:SS] ` prefix; metadata lines are
//! bare `Key: value` pairs and are the only lines read back.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TarstowError};

pub const RECORD_EXTENSION: &str = ".log";
pub const ARCHIVED_RECORD_EXTENSION: &str = ".removed.log";
/// chrono format of the stamp embedded in record file names.
pub const RECORD_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";
const SYMLINK_SEPARATOR: &str = " -> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    Timestamp,
    DerivedAppName,
    OriginalArchive,
    ArchiveFilename,
    ArchiveSha256,
    FinalInstallDir,
    DesktopFileInstalled,
    CreatedSymlink,
    InstalledFile,
}

impl MetadataKey {
    pub const ALL: [MetadataKey; 9] = [
        MetadataKey::Timestamp,
        MetadataKey::DerivedAppName,
        MetadataKey::OriginalArchive,
        MetadataKey::ArchiveFilename,
        MetadataKey::ArchiveSha256,
        MetadataKey::FinalInstallDir,
        MetadataKey::DesktopFileInstalled,
        MetadataKey::CreatedSymlink,
        MetadataKey::InstalledFile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetadataKey::Timestamp => "Timestamp",
            MetadataKey::DerivedAppName => "Derived app name",
            MetadataKey::OriginalArchive => "Original archive",
            MetadataKey::ArchiveFilename => "Archive filename",
            MetadataKey::ArchiveSha256 => "Archive SHA256",
            MetadataKey::FinalInstallDir => "Final installation directory",
            MetadataKey::DesktopFileInstalled => "Desktop file installed",
            MetadataKey::CreatedSymlink => "Created symlink",
            MetadataKey::InstalledFile => "Installed file",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == label)
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats a metadata line (no time prefix).
pub fn metadata_line(key: MetadataKey, value: &str) -> String {
    format!("{key}: {value}")
}

/// Formats an operational line with its time prefix.
pub fn operational_line(time: NaiveTime, text: &str) -> String {
    format!("[{}] {}", time.format("%H:%M:%S"), text)
}

/// Splits a metadata line into key and value. Lines with a time prefix,
/// unknown keys or no separator are not metadata.
pub fn parse_metadata_line(line: &str) -> Option<(MetadataKey, &str)> {
    if line.starts_with('[') {
        return None;
    }
    let (label, value) = line.split_once(": ")?;
    let key = MetadataKey::from_label(label)?;
    Some((key, value.trim_end()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymlinkPair {
    pub link: PathBuf,
    pub target: PathBuf,
}

impl SymlinkPair {
    pub fn parse(value: &str) -> Option<Self> {
        let (link, target) = value.split_once(SYMLINK_SEPARATOR)?;
        if link.is_empty() || target.is_empty() {
            return None;
        }
        Some(Self {
            link: PathBuf::from(link),
            target: PathBuf::from(target),
        })
    }
}

impl fmt::Display for SymlinkPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.link.display(),
            SYMLINK_SEPARATOR,
            self.target.display()
        )
    }
}

/// Parsed record file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFileName {
    pub app_identifier: String,
    pub stamp: String,
    pub archived: bool,
}

impl RecordFileName {
    /// Parses `<id>-<stamp>.log` or `<id>-<stamp>.removed.log`. The identifier
    /// may itself contain dashes; the stamp never does.
    pub fn parse(file_name: &str) -> Option<Self> {
        let (key, archived) = if let Some(key) = file_name.strip_suffix(ARCHIVED_RECORD_EXTENSION)
        {
            (key, true)
        } else {
            (file_name.strip_suffix(RECORD_EXTENSION)?, false)
        };
        let (app_identifier, stamp) = key.rsplit_once('-')?;
        if app_identifier.is_empty() || stamp.is_empty() {
            return None;
        }
        Some(Self {
            app_identifier: app_identifier.to_string(),
            stamp: stamp.to_string(),
            archived,
        })
    }

    pub fn key(&self) -> String {
        format!("{}-{}", self.app_identifier, self.stamp)
    }

    /// The embedded stamp as a date-time, if it has the expected shape.
    pub fn stamp_time(&self) -> Option<NaiveDateTime> {
        parse_stamp(&self.stamp)
    }
}

pub fn format_stamp(time: NaiveDateTime) -> String {
    time.format(RECORD_STAMP_FORMAT).to_string()
}

/// Parses `YYYYMMDD_HHMMSS[_mmm]`.
pub fn parse_stamp(stamp: &str) -> Option<NaiveDateTime> {
    let mut parts = stamp.split('_');
    let date = NaiveDate::parse_from_str(parts.next()?, "%Y%m%d").ok()?;
    let time = NaiveTime::parse_from_str(parts.next()?, "%H%M%S").ok()?;
    let millis = match parts.next() {
        Some(ms) if ms.len() == 3 => ms.parse::<i64>().ok()?,
        Some(_) => return None,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(date.and_time(time) + chrono::Duration::milliseconds(millis))
}

/// Everything one install attempt recorded, as read back from its file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationRecord {
    pub log_path: PathBuf,
    pub timestamp: Option<String>,
    pub original_archive_path: Option<PathBuf>,
    pub archive_filename: Option<String>,
    pub archive_sha256: Option<String>,
    pub app_identifier: String,
    pub final_install_dir: Option<PathBuf>,
    pub desktop_file_path: Option<PathBuf>,
    pub symlinks: Vec<SymlinkPair>,
    pub file_manifest: Vec<PathBuf>,
}

impl InstallationRecord {
    pub fn from_file(log_path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(log_path)?;
        Self::parse(log_path, &contents)
    }

    /// Reads the metadata lines of a record. Scalar keys keep their first
    /// occurrence; symlinks and manifest entries accumulate in order.
    pub fn parse(log_path: &Path, contents: &str) -> Result<Self> {
        let file_name = log_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut record = InstallationRecord {
            log_path: log_path.to_path_buf(),
            ..Default::default()
        };
        let mut derived_name: Option<String> = None;

        for line in contents.lines() {
            let Some((key, value)) = parse_metadata_line(line) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match key {
                MetadataKey::Timestamp => {
                    record.timestamp.get_or_insert_with(|| value.to_string());
                }
                MetadataKey::DerivedAppName => {
                    derived_name.get_or_insert_with(|| value.to_string());
                }
                MetadataKey::OriginalArchive => {
                    record
                        .original_archive_path
                        .get_or_insert_with(|| PathBuf::from(value));
                }
                MetadataKey::ArchiveFilename => {
                    record
                        .archive_filename
                        .get_or_insert_with(|| value.to_string());
                }
                MetadataKey::ArchiveSha256 => {
                    record.archive_sha256.get_or_insert_with(|| value.to_string());
                }
                MetadataKey::FinalInstallDir => {
                    record
                        .final_install_dir
                        .get_or_insert_with(|| PathBuf::from(value));
                }
                MetadataKey::DesktopFileInstalled => {
                    record
                        .desktop_file_path
                        .get_or_insert_with(|| PathBuf::from(value));
                }
                MetadataKey::CreatedSymlink => {
                    if let Some(pair) = SymlinkPair::parse(value) {
                        if !record.symlinks.contains(&pair) {
                            record.symlinks.push(pair);
                        }
                    }
                }
                MetadataKey::InstalledFile => record.file_manifest.push(PathBuf::from(value)),
            }
        }

        record.app_identifier = match derived_name {
            Some(name) => name,
            None => RecordFileName::parse(&file_name)
                .map(|f| f.app_identifier)
                .ok_or_else(|| {
                    TarstowError::ParseError(
                        "installation record",
                        format!("{file_name} has no app name and an unrecognized file name"),
                    )
                })?,
        };
        Ok(record)
    }

    /// Live iff the recorded install directory still exists on disk.
    pub fn is_live(&self) -> bool {
        self.final_install_dir
            .as_deref()
            .is_some_and(|dir| !dir.as_os_str().is_empty() && dir.exists())
    }

    pub fn file_name(&self) -> Option<RecordFileName> {
        self.log_path
            .file_name()
            .and_then(|n| RecordFileName::parse(&n.to_string_lossy()))
    }
}

/// One row of the live installation listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveInstallation {
    pub app_identifier: String,
    pub install_dir: PathBuf,
    pub log_path: PathBuf,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Timestamp: 2026-10-19 14:30:12
[14:30:12] Starting installation of firefox-128.0.tar.gz
Derived app name: firefox
Original archive: /home/u/Downloads/firefox-128.0.tar.gz
[14:30:13] Created symlink: this is prose, not metadata
Final installation directory: /home/u/Applications/firefox
Final installation directory: /somewhere/else
Desktop file installed: /home/u/.local/share/applications/firefox.desktop
Created symlink: /home/u/.local/bin/firefox -> /home/u/Applications/firefox/firefox
Created symlink: /home/u/.local/bin/firefox -> /home/u/Applications/firefox/firefox
Installed file: /home/u/Applications/firefox/firefox
Installed file: /home/u/Applications/firefox/libxul.so
";

    #[test]
    fn parse_reads_metadata_and_ignores_operational_lines() {
        let path = Path::new("/logs/firefox-20261019_143012_000.log");
        let record = InstallationRecord::parse(path, SAMPLE).unwrap();

        assert_eq!(record.app_identifier, "firefox");
        assert_eq!(record.timestamp.as_deref(), Some("2026-10-19 14:30:12"));
        assert_eq!(
            record.final_install_dir,
            Some(PathBuf::from("/home/u/Applications/firefox"))
        );
        assert_eq!(record.symlinks.len(), 1);
        assert_eq!(
            record.symlinks[0].target,
            PathBuf::from("/home/u/Applications/firefox/firefox")
        );
        assert_eq!(record.file_manifest.len(), 2);
        assert_eq!(record.log_path, path);
    }

    #[test]
    fn parse_falls_back_to_file_name_for_identifier() {
        let path = Path::new("/logs/my-tool-20261019_143012_000.log");
        let record = InstallationRecord::parse(path, "[10:00:00] nothing\n").unwrap();
        assert_eq!(record.app_identifier, "my-tool");
        assert!(record.final_install_dir.is_none());
        assert!(!record.is_live());
    }

    #[test]
    fn parse_rejects_unnamed_record() {
        let path = Path::new("/logs/garbage.txt");
        assert!(matches!(
            InstallationRecord::parse(path, ""),
            Err(TarstowError::ParseError(..))
        ));
    }

    #[test]
    fn record_file_names_round_trip_through_parse() {
        let live = RecordFileName::parse("my-app-20261019_143012_045.log").unwrap();
        assert_eq!(live.app_identifier, "my-app");
        assert_eq!(live.stamp, "20261019_143012_045");
        assert!(!live.archived);
        assert_eq!(live.key(), "my-app-20261019_143012_045");

        let archived = RecordFileName::parse("my-app-20261019_143012_045.removed.log").unwrap();
        assert!(archived.archived);
        assert_eq!(archived.app_identifier, "my-app");

        assert!(RecordFileName::parse("noextension").is_none());
        assert!(RecordFileName::parse("nodash.log").is_none());
    }

    #[test]
    fn stamps_order_chronologically() {
        let a = parse_stamp("20261019_143012_045").unwrap();
        let b = parse_stamp("20261019_143012_046").unwrap();
        let legacy = parse_stamp("20261019_143012").unwrap();
        assert!(a < b);
        assert!(legacy < a);
        assert_eq!(format_stamp(a), "20261019_143012_045");
        assert!(parse_stamp("2026-10-19").is_none());
    }

    #[test]
    fn metadata_line_detection_requires_known_key_without_time_prefix() {
        assert_eq!(
            parse_metadata_line("Derived app name: foo"),
            Some((MetadataKey::DerivedAppName, "foo"))
        );
        assert_eq!(parse_metadata_line("[12:00:00] Derived app name: foo"), None);
        assert_eq!(parse_metadata_line("Something else: foo"), None);

        let time = NaiveTime::from_hms_opt(9, 5, 1).unwrap();
        assert_eq!(operational_line(time, "hello"), "[09:05:01] hello");
    }
}
