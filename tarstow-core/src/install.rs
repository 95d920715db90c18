// tarstow-core/src/install.rs
//! Installs one archive: extract, gate, resolve conflicts, copy, link,
//! register a launcher, recording each side effect as it happens.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tarstow_aio::fs::{
    check_symlink_exists, copy_tree, create_dir_all, is_executable_file, make_executable,
    replace_symlink, set_permissions,
};
use tarstow_aio::{is_native_executable, sha256_file};
use tarstow_common::config::Config;
use tarstow_common::error::{Result, TarstowError};
use tarstow_common::host::{DesktopIntegration, Extractor, Prompter};
use tarstow_common::model::{InstallationRecord, MetadataKey, SymlinkPair};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::conflict::{remove_conflicts, ConflictResolution, ConflictScanner};
use crate::desktop_entry::{
    fabricate_desktop_entry, find_shipped_desktop_file, guess_icon, resolve_icon,
    rewrite_desktop_entry,
};
use crate::layout::{detect_source_indicators, resolve_logical_root};
use crate::naming::NameDeriver;
use crate::recorder::InstallRecorder;
use crate::uninstall::roll_back_record;

const DESKTOP_FILE_MODE: u32 = 0o755;
const WORKSPACE_PREFIX: &str = "tarstow-";

/// Answers given up front instead of through the prompter.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub search_term: Option<String>,
    pub on_conflict: Option<ConflictResolution>,
    /// Undo completed steps if the install fails part way.
    pub rollback_on_failure: bool,
}

pub struct Installer<'a> {
    config: &'a Config,
    extractor: &'a dyn Extractor,
    prompter: &'a dyn Prompter,
    desktop: &'a dyn DesktopIntegration,
    deriver: NameDeriver,
}

impl<'a> Installer<'a> {
    pub fn new(
        config: &'a Config,
        extractor: &'a dyn Extractor,
        prompter: &'a dyn Prompter,
        desktop: &'a dyn DesktopIntegration,
    ) -> Self {
        Self {
            config,
            extractor,
            prompter,
            desktop,
            deriver: NameDeriver::new(&config.name_rules),
        }
    }

    /// Installs `archive_path` and returns the record as written.
    pub fn install(
        &self,
        archive_path: &Path,
        options: &InstallOptions,
    ) -> Result<InstallationRecord> {
        let archive_filename = archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                TarstowError::Environment(format!(
                    "Not an archive path: {}",
                    archive_path.display()
                ))
            })?;
        let app_identifier = self.deriver.derive(&archive_filename);
        info!("Installing {} as '{}'", archive_filename, app_identifier);

        let mut recorder = InstallRecorder::open(
            &self.config.log_dir,
            &app_identifier,
            Local::now().naive_local(),
        )?;
        recorder.append(&format!("Starting installation of {archive_filename}"));
        recorder.append_metadata(MetadataKey::DerivedAppName, &app_identifier)?;
        recorder.append_metadata(MetadataKey::ArchiveFilename, &archive_filename)?;
        let original =
            fs::canonicalize(archive_path).unwrap_or_else(|_| archive_path.to_path_buf());
        recorder.append_path(MetadataKey::OriginalArchive, &original)?;

        match self.run(&mut recorder, archive_path, &app_identifier, options) {
            Ok(install_dir) => {
                recorder.append("Installation completed");
                let record = InstallationRecord::from_file(recorder.path())?;
                self.desktop.notify(
                    &format!("Installed {app_identifier}"),
                    &format!("Installed to {}", install_dir.display()),
                );
                Ok(record)
            }
            Err(e) if e.is_deliberate_stop() => {
                info!("Installation of '{}' stopped: {}", app_identifier, e);
                recorder.append(&format!("Installation stopped: {e}"));
                Err(e)
            }
            Err(e) => {
                error!("Installation of '{}' failed: {}", app_identifier, e);
                recorder.append(&format!("Installation failed: {e}"));
                if options.rollback_on_failure || self.config.rollback_on_failure {
                    self.roll_back(&mut recorder);
                }
                Err(e)
            }
        }
    }

    fn run(
        &self,
        recorder: &mut InstallRecorder,
        archive_path: &Path,
        app_identifier: &str,
        options: &InstallOptions,
    ) -> Result<PathBuf> {
        if !archive_path.is_file() {
            return Err(TarstowError::Environment(format!(
                "Archive not found or not a file: {}",
                archive_path.display()
            )));
        }
        let digest = sha256_file(archive_path)?;
        recorder.append_metadata(MetadataKey::ArchiveSha256, &digest)?;

        // Removed on every return path when dropped.
        let workspace = self.create_workspace()?;
        debug!("Extraction workspace: {}", workspace.path().display());
        recorder.append("Extracting archive into temporary workspace");
        self.extractor.extract(archive_path, workspace.path())?;

        let logical_root = resolve_logical_root(workspace.path())?;
        let indicators = detect_source_indicators(&logical_root, &self.config.source_markers);
        if !indicators.is_empty() {
            recorder.append(&format!(
                "Source code detected, not installing: {}",
                indicators.join(", ")
            ));
            return Err(TarstowError::SourceDetected(indicators));
        }

        let search_term = self.search_term(app_identifier, options)?;
        self.handle_conflicts(recorder, &search_term, options)?;

        let install_dir = self.final_install_dir(app_identifier);
        recorder.append_path(MetadataKey::FinalInstallDir, &install_dir)?;
        recorder.append(&format!("Copying files to {}", install_dir.display()));
        create_dir_all(&self.config.install_base)?;
        let copied = copy_tree(&logical_root, &install_dir)?;
        for file in &copied {
            recorder.append_path(MetadataKey::InstalledFile, file)?;
        }

        let main_executable = find_main_executable(&install_dir, app_identifier);
        match &main_executable {
            Some(exe) => {
                recorder.append(&format!("Main executable: {}", exe.display()));
                make_executable(exe)?;
                self.link_executable(recorder, exe)?;
            }
            None => {
                warn!("No native executable found in {}", install_dir.display());
                recorder.append("No native executable found; skipping symlink");
                self.prompter.message(&format!(
                    "No native executable was found in {}. The files were installed, \
                     but no command link was created.",
                    install_dir.display()
                ));
            }
        }

        self.install_desktop_entry(
            recorder,
            app_identifier,
            &install_dir,
            main_executable.as_deref(),
        )?;

        Ok(install_dir)
    }

    fn create_workspace(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let workspace = match &self.config.tmp_dir {
            Some(dir) => {
                create_dir_all(dir)?;
                builder.tempdir_in(dir)?
            }
            None => builder.tempdir()?,
        };
        Ok(workspace)
    }

    fn search_term(&self, app_identifier: &str, options: &InstallOptions) -> Result<String> {
        let term = match &options.search_term {
            Some(term) => term.clone(),
            None => self
                .prompter
                .input(
                    "Search term for existing installations",
                    app_identifier,
                )
                .ok_or_else(|| {
                    TarstowError::UserAbort("search term prompt dismissed".to_string())
                })?,
        };
        let term = term.trim();
        Ok(if term.is_empty() {
            app_identifier.to_string()
        } else {
            term.to_string()
        })
    }

    fn handle_conflicts(
        &self,
        recorder: &mut InstallRecorder,
        search_term: &str,
        options: &InstallOptions,
    ) -> Result<()> {
        let conflicts = ConflictScanner::new(self.config).scan(search_term);
        if conflicts.is_empty() {
            recorder.append(&format!("No existing items match '{search_term}'"));
            return Ok(());
        }
        recorder.append(&format!(
            "{} existing item(s) match '{}'",
            conflicts.len(),
            search_term
        ));
        for conflict in &conflicts {
            recorder.append(&format!("Conflict: {}", conflict.display()));
        }

        let resolution = match options.on_conflict {
            Some(choice) => choice,
            None => self.ask_resolution(search_term, &conflicts),
        };
        recorder.append(&format!("Conflict resolution: {resolution}"));

        match resolution {
            ConflictResolution::Abort => Err(TarstowError::UserAbort(format!(
                "existing installation(s) matching '{search_term}' left in place"
            ))),
            ConflictResolution::InstallAnyway => Ok(()),
            ConflictResolution::Replace => {
                for removed in remove_conflicts(&conflicts, &self.config.desktop_dir)? {
                    recorder.append(&format!("Removed {}", removed.display()));
                }
                Ok(())
            }
        }
    }

    fn ask_resolution(&self, search_term: &str, conflicts: &[PathBuf]) -> ConflictResolution {
        let listing = conflicts
            .iter()
            .map(|c| format!("  {}", c.display()))
            .collect::<Vec<_>>()
            .join("\n");
        self.prompter.message(&format!(
            "Found existing items matching '{search_term}':\n{listing}"
        ));
        let labels: Vec<String> = ConflictResolution::ALL
            .iter()
            .map(|r| r.label().to_string())
            .collect();
        self.prompter
            .select("How should the existing items be handled?", &labels)
            .and_then(|i| ConflictResolution::ALL.get(i).copied())
            .unwrap_or(ConflictResolution::Abort)
    }

    /// `<install_base>/<id>`, or a time-suffixed sibling if that is taken.
    fn final_install_dir(&self, app_identifier: &str) -> PathBuf {
        let canonical = self.config.app_install_dir(app_identifier);
        if !check_symlink_exists(&canonical) {
            return canonical;
        }
        let suffix = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut candidate = self
            .config
            .install_base
            .join(format!("{app_identifier}_{suffix}"));
        let mut n = 1;
        while check_symlink_exists(&candidate) {
            candidate = self
                .config
                .install_base
                .join(format!("{app_identifier}_{suffix}_{n}"));
            n += 1;
        }
        debug!(
            "{} exists, installing to {}",
            canonical.display(),
            candidate.display()
        );
        candidate
    }

    fn link_executable(&self, recorder: &mut InstallRecorder, exe: &Path) -> Result<()> {
        let Some(name) = exe.file_name() else {
            return Ok(());
        };
        let link = self.config.bin_dir.join(name);
        replace_symlink(exe, &link)?;
        let pair = SymlinkPair {
            link,
            target: exe.to_path_buf(),
        };
        recorder.append_metadata(MetadataKey::CreatedSymlink, &pair.to_string())?;
        info!("Linked {}", pair);
        Ok(())
    }

    fn install_desktop_entry(
        &self,
        recorder: &mut InstallRecorder,
        app_identifier: &str,
        install_dir: &Path,
        exe: Option<&Path>,
    ) -> Result<()> {
        let contents = match find_shipped_desktop_file(install_dir) {
            Some(shipped) => {
                recorder.append(&format!("Using shipped desktop file {}", shipped.display()));
                let raw = fs::read(&shipped)?;
                rewrite_desktop_entry(&String::from_utf8_lossy(&raw), exe, |name| {
                    resolve_icon(install_dir, name)
                })
            }
            None => {
                let Some(exe) = exe else {
                    recorder.append("No desktop file shipped and no executable; skipping launcher");
                    return Ok(());
                };
                let icon = guess_icon(install_dir, app_identifier)
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| self.config.fallback_icon.clone());
                fabricate_desktop_entry(app_identifier, exe, &icon)
            }
        };

        // Named after the install directory so suffixed installs keep their own entry.
        let entry_name = install_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| app_identifier.to_string());
        let desktop_path = self.config.desktop_file_path(&entry_name);
        create_dir_all(&self.config.desktop_dir)?;
        fs::write(&desktop_path, contents)?;
        set_permissions(&desktop_path, DESKTOP_FILE_MODE)?;
        recorder.append_path(MetadataKey::DesktopFileInstalled, &desktop_path)?;
        info!("Installed desktop entry {}", desktop_path.display());

        self.desktop.refresh_menu_cache(&self.config.desktop_dir);
        Ok(())
    }

    fn roll_back(&self, recorder: &mut InstallRecorder) {
        match InstallationRecord::from_file(recorder.path()) {
            Ok(record)
                if record.final_install_dir.is_none()
                    && record.symlinks.is_empty()
                    && record.desktop_file_path.is_none() =>
            {
                debug!("Nothing to roll back");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Cannot roll back, record unreadable: {}", e);
                return;
            }
        }
        recorder.append("Rolling back completed steps");
        match roll_back_record(recorder.path(), self.config, self.desktop) {
            Ok(summary) => info!(
                "Rolled back {} item(s) for '{}'",
                summary.removed.len(),
                summary.app_identifier
            ),
            Err(e) => warn!("Rollback incomplete: {}", e),
        }
    }
}

/// The installed program to link: a native executable named after the
/// application if there is one, otherwise the first in sorted walk order.
pub fn find_main_executable(install_dir: &Path, app_identifier: &str) -> Option<PathBuf> {
    let mut first = None;
    for entry in WalkDir::new(install_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if !is_executable_file(path) || !is_native_executable(path) {
            continue;
        }
        if entry
            .file_name()
            .to_string_lossy()
            .eq_ignore_ascii_case(app_identifier)
        {
            return Some(path.to_path_buf());
        }
        first.get_or_insert_with(|| path.to_path_buf());
    }
    first
}
