// tarstow-core/src/uninstall.rs
//! Replays an Installation Record in reverse.

use std::fs;
use std::path::{Component, Path, PathBuf};

use glob::{glob_with, MatchOptions, Pattern};
use tarstow_aio::fs::{is_symlink, remove_artifact, RemovalOutcome};
use tarstow_common::config::Config;
use tarstow_common::error::{Result, TarstowError};
use tarstow_common::host::DesktopIntegration;
use tarstow_common::model::record::{ARCHIVED_RECORD_EXTENSION, RECORD_EXTENSION};
use tarstow_common::model::{InstallationRecord, RemovalSummary};
use tracing::{debug, error, info, warn};

use crate::index::find_record;

/// Uninstalls whatever the record at `log_path` created, then archives the
/// record. Every item is attempted; any failure makes the result a
/// `PartialFailure` carrying the full summary.
pub fn uninstall_record(
    log_path: &Path,
    config: &Config,
    desktop: &dyn DesktopIntegration,
) -> Result<RemovalSummary> {
    let record = read_unarchived_record(log_path)?;
    info!(
        "Uninstalling '{}' using record {}",
        record.app_identifier,
        log_path.display()
    );

    let mut summary = RemovalSummary::new(&record.app_identifier);
    remove_recorded_artifacts(&record, config, true, &mut summary);

    match archive_record(log_path) {
        Ok(archived) => summary.archived_log = Some(archived),
        Err(e) => {
            error!("Failed to archive record {}: {}", log_path.display(), e);
            summary.failed.push((log_path.to_path_buf(), e.to_string()));
        }
    }
    desktop.refresh_menu_cache(&config.desktop_dir);

    finish(summary)
}

/// Finds the record for `app_identifier` and uninstalls it.
pub fn uninstall_identifier(
    config: &Config,
    app_identifier: &str,
    desktop: &dyn DesktopIntegration,
) -> Result<RemovalSummary> {
    let record = find_record(config, app_identifier)?.ok_or_else(|| {
        TarstowError::NotFound(format!("No installation record for '{app_identifier}'"))
    })?;
    uninstall_record(&record.log_path, config, desktop)
}

/// Undoes the completed steps of a failed install. Desktop entries are not
/// swept by name, since conflicts the operator chose to keep may match it.
/// The record is archived only when everything it names was removed.
pub fn roll_back_record(
    log_path: &Path,
    config: &Config,
    desktop: &dyn DesktopIntegration,
) -> Result<RemovalSummary> {
    let record = read_unarchived_record(log_path)?;
    info!("Rolling back partial install of '{}'", record.app_identifier);

    let mut summary = RemovalSummary::new(&record.app_identifier);
    remove_recorded_artifacts(&record, config, false, &mut summary);
    if summary.is_complete() {
        summary.archived_log = Some(archive_record(log_path)?);
    }
    desktop.refresh_menu_cache(&config.desktop_dir);

    finish(summary)
}

fn finish(summary: RemovalSummary) -> Result<RemovalSummary> {
    if summary.is_complete() {
        info!(
            "Removed {} item(s) for '{}' ({} already gone)",
            summary.removed.len(),
            summary.app_identifier,
            summary.skipped.len()
        );
        Ok(summary)
    } else {
        warn!(
            "{} item(s) for '{}' could not be removed",
            summary.failed.len(),
            summary.app_identifier
        );
        Err(TarstowError::PartialFailure(summary))
    }
}

fn read_unarchived_record(log_path: &Path) -> Result<InstallationRecord> {
    let name = log_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.ends_with(ARCHIVED_RECORD_EXTENSION) || !log_path.is_file() {
        return Err(TarstowError::NotFound(format!(
            "No active installation record at {}",
            log_path.display()
        )));
    }
    InstallationRecord::from_file(log_path)
}

fn remove_recorded_artifacts(
    record: &InstallationRecord,
    config: &Config,
    sweep_desktop_entries: bool,
    summary: &mut RemovalSummary,
) {
    for pair in &record.symlinks {
        if is_symlink(&pair.link) {
            tally(summary, &pair.link, remove_artifact(&pair.link));
        } else {
            debug!("Recorded symlink {} is no longer a symlink", pair.link.display());
            summary.skipped.push(pair.link.clone());
        }
    }

    if let Some(desktop_file) = &record.desktop_file_path {
        tally(summary, desktop_file, remove_artifact(desktop_file));
    }

    if sweep_desktop_entries {
        for entry in matching_desktop_entries(&config.desktop_dir, &record.app_identifier) {
            if !summary.removed.contains(&entry) {
                tally(summary, &entry, remove_artifact(&entry));
            }
        }
    }

    if let Some(dir) = &record.final_install_dir {
        if !is_safe_removal_target(dir, config) {
            warn!("Refusing to remove {}", dir.display());
            summary.failed.push((
                dir.clone(),
                "refusing to remove a directory outside the install areas".to_string(),
            ));
        } else {
            tally(summary, dir, remove_artifact(dir));
        }
    }
}

fn tally(summary: &mut RemovalSummary, path: &Path, outcome: RemovalOutcome) {
    match outcome {
        RemovalOutcome::Removed => summary.removed.push(path.to_path_buf()),
        RemovalOutcome::Missing => summary.skipped.push(path.to_path_buf()),
        RemovalOutcome::Failed(reason) => summary.failed.push((path.to_path_buf(), reason)),
    }
}

/// Desktop entries whose file name contains `app_identifier`, any case.
fn matching_desktop_entries(desktop_dir: &Path, app_identifier: &str) -> Vec<PathBuf> {
    let Some(dir) = desktop_dir.to_str() else {
        warn!(
            "Desktop directory {} is not valid UTF-8, skipping sweep",
            desktop_dir.display()
        );
        return Vec::new();
    };
    let pattern = format!(
        "{}/*{}*.desktop",
        Pattern::escape(dir),
        Pattern::escape(app_identifier)
    );
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    match glob_with(&pattern, options) {
        Ok(paths) => paths.filter_map(|p| p.ok()).collect(),
        Err(e) => {
            warn!("Invalid desktop entry pattern {}: {}", pattern, e);
            Vec::new()
        }
    }
}

/// Recorded install directories are only removed when they cannot be one
/// of the tool's own directories, the home directory, or an ancestor of
/// either.
fn is_safe_removal_target(path: &Path, config: &Config) -> bool {
    if !path.is_absolute() || path.components().any(|c| matches!(c, Component::ParentDir)) {
        return false;
    }
    if path.parent().is_none() {
        return false;
    }
    let protected = config.protected_dirs();
    !protected.iter().any(|p| p.starts_with(path))
}

/// Renames `<key>.log` to `<key>.removed.log` beside it.
fn archive_record(log_path: &Path) -> Result<PathBuf> {
    let name = log_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let key = name.strip_suffix(RECORD_EXTENSION).ok_or_else(|| {
        TarstowError::Generic(format!("{} is not a record file", log_path.display()))
    })?;
    let archived = log_path.with_file_name(format!("{key}{ARCHIVED_RECORD_EXTENSION}"));
    fs::rename(log_path, &archived)?;
    debug!("Archived record as {}", archived.display());
    Ok(archived)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::os::unix::fs::symlink;

    use tempfile::TempDir;

    use super::*;

    #[derive(Default)]
    struct CountingDesktop {
        refreshes: Cell<usize>,
    }

    impl DesktopIntegration for CountingDesktop {
        fn refresh_menu_cache(&self, _desktop_dir: &Path) {
            self.refreshes.set(self.refreshes.get() + 1);
        }
        fn notify(&self, _summary: &str, _body: &str) {}
    }

    struct Fixture {
        _temp: TempDir,
        config: Config,
        log_path: PathBuf,
        install_dir: PathBuf,
        link: PathBuf,
        desktop_file: PathBuf,
    }

    fn installed_fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let config = Config::with_home(temp.path());
        let install_dir = config.install_base.join("tool");
        fs::create_dir_all(&install_dir).unwrap();
        fs::write(install_dir.join("tool"), "bin").unwrap();
        fs::create_dir_all(&config.bin_dir).unwrap();
        let link = config.bin_dir.join("tool");
        symlink(install_dir.join("tool"), &link).unwrap();
        fs::create_dir_all(&config.desktop_dir).unwrap();
        let desktop_file = config.desktop_dir.join("tool.desktop");
        fs::write(&desktop_file, "[Desktop Entry]\n").unwrap();
        fs::write(config.desktop_dir.join("Tool-extra.desktop"), "").unwrap();
        fs::write(config.desktop_dir.join("unrelated.desktop"), "").unwrap();

        fs::create_dir_all(&config.log_dir).unwrap();
        let log_path = config.log_dir.join("tool-20260101_100000_000.log");
        fs::write(
            &log_path,
            format!(
                "Timestamp: 2026-01-01 10:00:00\n\
                 Derived app name: tool\n\
                 Final installation directory: {}\n\
                 Created symlink: {} -> {}\n\
                 Desktop file installed: {}\n",
                install_dir.display(),
                link.display(),
                install_dir.join("tool").display(),
                desktop_file.display()
            ),
        )
        .unwrap();

        Fixture {
            _temp: temp,
            config,
            log_path,
            install_dir,
            link,
            desktop_file,
        }
    }

    #[test]
    fn removes_everything_and_archives_record() {
        let fx = installed_fixture();
        let desktop = CountingDesktop::default();
        let summary = uninstall_record(&fx.log_path, &fx.config, &desktop).unwrap();

        assert!(!fx.install_dir.exists());
        assert!(!is_symlink(&fx.link));
        assert!(!fx.desktop_file.exists());
        assert!(!fx.config.desktop_dir.join("Tool-extra.desktop").exists());
        assert!(fx.config.desktop_dir.join("unrelated.desktop").exists());
        assert!(!fx.log_path.exists());
        assert_eq!(
            summary.archived_log,
            Some(fx.config.log_dir.join("tool-20260101_100000_000.removed.log"))
        );
        assert_eq!(summary.removed.len(), 4);
        assert!(summary.skipped.is_empty());
        assert_eq!(desktop.refreshes.get(), 1);
    }

    #[test]
    fn second_uninstall_reports_not_found() {
        let fx = installed_fixture();
        let desktop = CountingDesktop::default();
        uninstall_identifier(&fx.config, "tool", &desktop).unwrap();

        let err = uninstall_identifier(&fx.config, "tool", &desktop).unwrap_err();
        assert!(matches!(err, TarstowError::NotFound(_)));
        let err = uninstall_record(&fx.log_path, &fx.config, &desktop).unwrap_err();
        assert!(matches!(err, TarstowError::NotFound(_)));
        assert_eq!(fs::read_dir(&fx.config.log_dir).unwrap().count(), 1);
    }

    #[test]
    fn missing_directory_is_skipped_not_failed() {
        let fx = installed_fixture();
        fs::remove_dir_all(&fx.install_dir).unwrap();

        let summary =
            uninstall_identifier(&fx.config, "tool", &CountingDesktop::default()).unwrap();
        assert!(summary.skipped.contains(&fx.install_dir));
        assert!(!is_symlink(&fx.link));
        assert!(!fx.desktop_file.exists());
        assert!(summary.archived_log.is_some());
    }

    #[test]
    fn replaced_symlink_target_is_left_alone() {
        let fx = installed_fixture();
        fs::remove_file(&fx.link).unwrap();
        fs::write(&fx.link, "someone else's script").unwrap();

        let summary =
            uninstall_record(&fx.log_path, &fx.config, &CountingDesktop::default()).unwrap();
        assert!(fx.link.is_file());
        assert!(summary.skipped.contains(&fx.link));
    }

    #[test]
    fn unsafe_install_dir_is_a_partial_failure() {
        let fx = installed_fixture();
        fs::write(
            &fx.log_path,
            format!(
                "Derived app name: tool\nFinal installation directory: {}\n",
                fx.config.home.display()
            ),
        )
        .unwrap();

        let err = uninstall_record(&fx.log_path, &fx.config, &CountingDesktop::default())
            .unwrap_err();
        match err {
            TarstowError::PartialFailure(summary) => {
                assert_eq!(summary.failed.len(), 1);
                assert!(summary.archived_log.is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(fx.config.home.exists());
    }

    #[test]
    fn rollback_leaves_name_matched_entries() {
        let fx = installed_fixture();
        let summary =
            roll_back_record(&fx.log_path, &fx.config, &CountingDesktop::default()).unwrap();
        assert!(!fx.install_dir.exists());
        assert!(fx.config.desktop_dir.join("Tool-extra.desktop").exists());
        assert!(summary.archived_log.is_some());
    }

    #[test]
    fn safe_target_rules() {
        let config = Config::with_home(Path::new("/home/u"));
        assert!(is_safe_removal_target(
            Path::new("/home/u/Applications/tool"),
            &config
        ));
        assert!(!is_safe_removal_target(Path::new("/home/u/Applications"), &config));
        assert!(!is_safe_removal_target(Path::new("/home"), &config));
        assert!(!is_safe_removal_target(Path::new("/"), &config));
        assert!(!is_safe_removal_target(Path::new("relative/dir"), &config));
        assert!(!is_safe_removal_target(
            Path::new("/home/u/Applications/../.ssh"),
            &config
        ));
    }
}
