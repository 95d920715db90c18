// tarstow-core/src/recorder.rs
//! Writes the Installation Record of one install attempt.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDateTime};
use tarstow_common::error::{Result, TarstowError};
use tarstow_common::model::record::{
    format_stamp, metadata_line, operational_line, MetadataKey, RECORD_EXTENSION,
};
use tracing::{debug, warn};

const HUMAN_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only handle on a freshly created record file.
#[derive(Debug)]
pub struct InstallRecorder {
    path: PathBuf,
    file: File,
}

impl InstallRecorder {
    /// Creates `<app_identifier>-<stamp>.log` under `log_dir` and writes the
    /// `Timestamp` line. An existing record is never reused: on a name clash
    /// the stamp moves forward a millisecond.
    pub fn open(log_dir: &Path, app_identifier: &str, now: NaiveDateTime) -> Result<Self> {
        std::fs::create_dir_all(log_dir)?;

        let mut stamp_time = now;
        let (path, file) = loop {
            let path = log_dir.join(format!(
                "{}-{}{}",
                app_identifier,
                format_stamp(stamp_time),
                RECORD_EXTENSION
            ));
            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    stamp_time += Duration::milliseconds(1);
                }
                Err(e) => return Err(e.into()),
            }
        };
        debug!("Opened installation record {}", path.display());

        let mut recorder = Self { path, file };
        recorder.append_metadata(
            MetadataKey::Timestamp,
            &now.format(HUMAN_TIMESTAMP_FORMAT).to_string(),
        )?;
        Ok(recorder)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds a time-stamped line for human readers. Never fails the install:
    /// a write error is only reported.
    pub fn append(&mut self, text: &str) {
        let flattened = text.replace(['\n', '\r'], " ");
        let line = operational_line(Local::now().time(), &flattened);
        if let Err(e) = writeln!(self.file, "{line}") {
            warn!(
                "Could not write to installation record {}: {}",
                self.path.display(),
                e
            );
        }
    }

    /// Adds a machine-read `Key: value` line.
    pub fn append_metadata(&mut self, key: MetadataKey, value: &str) -> Result<()> {
        if value.contains(['\n', '\r']) {
            return Err(TarstowError::InstallError(format!(
                "Refusing to record a multi-line value for '{key}'"
            )));
        }
        writeln!(self.file, "{}", metadata_line(key, value))?;
        self.file.flush()?;
        Ok(())
    }

    pub fn append_path(&mut self, key: MetadataKey, path: &Path) -> Result<()> {
        self.append_metadata(key, &path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::NaiveDate;
    use tarstow_common::model::InstallationRecord;
    use tempfile::TempDir;

    use super::*;

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_milli_opt(14, 30, 12, 45)
            .unwrap()
    }

    #[test]
    fn record_is_named_by_identifier_and_stamp() {
        let temp = TempDir::new().unwrap();
        let recorder = InstallRecorder::open(temp.path(), "my-app", fixed_time()).unwrap();
        assert_eq!(
            recorder.path().file_name().unwrap(),
            "my-app-20261019_143012_045.log"
        );
        let contents = fs::read_to_string(recorder.path()).unwrap();
        assert_eq!(contents, "Timestamp: 2026-10-19 14:30:12\n");
    }

    #[test]
    fn clashing_stamp_moves_forward() {
        let temp = TempDir::new().unwrap();
        let first = InstallRecorder::open(temp.path(), "app", fixed_time()).unwrap();
        let second = InstallRecorder::open(temp.path(), "app", fixed_time()).unwrap();
        assert_ne!(first.path(), second.path());
        assert_eq!(
            second.path().file_name().unwrap(),
            "app-20261019_143012_046.log"
        );
    }

    #[test]
    fn operational_text_never_reads_back_as_metadata() {
        let temp = TempDir::new().unwrap();
        let mut recorder = InstallRecorder::open(temp.path(), "app", fixed_time()).unwrap();
        recorder.append("Final installation directory: /not/real\nCreated symlink: a -> b");
        recorder
            .append_metadata(MetadataKey::DerivedAppName, "app")
            .unwrap();
        recorder
            .append_path(MetadataKey::FinalInstallDir, Path::new("/real/app"))
            .unwrap();

        let record = InstallationRecord::from_file(recorder.path()).unwrap();
        assert_eq!(record.final_install_dir, Some(PathBuf::from("/real/app")));
        assert!(record.symlinks.is_empty());

        let contents = fs::read_to_string(recorder.path()).unwrap();
        assert_eq!(contents.lines().count(), 4);
    }

    #[test]
    fn multi_line_metadata_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut recorder = InstallRecorder::open(temp.path(), "app", fixed_time()).unwrap();
        assert!(recorder
            .append_metadata(MetadataKey::InstalledFile, "a\nDerived app name: evil")
            .is_err());
    }
}
