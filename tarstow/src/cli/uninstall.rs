// tarstow/src/cli/uninstall.rs
use std::collections::{HashMap, HashSet};
use std::path::Path;

use clap::Args;
use colored::Colorize;
use tarstow_aio::SystemDesktop;
use tarstow_common::config::Config;
use tarstow_common::error::{Result, TarstowError};
use tarstow_common::host::Prompter;
use tarstow_common::model::{InstallationRecord, RemovalSummary};
use tarstow_core::{find_record, list_live_installations, uninstall_record};
use tracing::{debug, error};

use crate::prompt::DialoguerPrompter;

#[derive(Args, Debug, Default)]
pub struct Uninstall {
    /// Names of the installations to remove. Without names, pick one from the
    /// list of live installations.
    pub names: Vec<String>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

impl Uninstall {
    pub fn run(&self, config: &Config) -> Result<()> {
        let prompter = DialoguerPrompter::default();
        if self.names.is_empty() {
            self.run_interactive(config, &prompter)
        } else {
            self.run_named(config, &prompter)
        }
    }

    fn run_interactive(&self, config: &Config, prompter: &dyn Prompter) -> Result<()> {
        let installations = list_live_installations(config)?;
        if installations.is_empty() {
            println!("{}", "No installations found".yellow());
            return Ok(());
        }

        let options: Vec<String> = installations
            .iter()
            .map(|live| {
                format!(
                    "{} ({}, {})",
                    live.app_identifier,
                    live.install_dir.display(),
                    live.timestamp
                )
            })
            .collect();
        let index = prompter
            .select("Select an application to uninstall", &options)
            .ok_or_else(|| TarstowError::UserAbort("No application selected".to_string()))?;
        let live = &installations[index];

        if !self.yes
            && !prompter.confirm(
                &format!(
                    "Remove {} from {}?",
                    live.app_identifier,
                    live.install_dir.display()
                ),
                false,
            )
        {
            return Err(TarstowError::UserAbort(format!(
                "Kept '{}'",
                live.app_identifier
            )));
        }

        let record = InstallationRecord::from_file(&live.log_path)?;
        remove(&record, config).map(|_| ()).map_err(|e| {
            report_failure(&live.app_identifier, &e);
            e
        })
    }

    fn run_named(&self, config: &Config, prompter: &dyn Prompter) -> Result<()> {
        let mut errors: Vec<(String, TarstowError)> = Vec::new();

        for name in &self.names {
            if name.contains('/') || name.contains("..") || name.trim().is_empty() {
                let msg = format!("Invalid application name '{name}'");
                error!("✖ {msg}");
                errors.push((name.to_string(), TarstowError::Config(msg)));
                continue;
            }

            let record = match find_record(config, name) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    let msg = format!("'{name}' is not installed");
                    error!("✖ {msg}");
                    errors.push((name.to_string(), TarstowError::NotFound(msg)));
                    continue;
                }
                Err(e) => {
                    error!("✖ Failed to look up '{}': {}", name.cyan(), e);
                    errors.push((name.to_string(), e));
                    continue;
                }
            };

            if !self.yes {
                let location = record
                    .final_install_dir
                    .as_ref()
                    .map(|d| d.display().to_string())
                    .unwrap_or_else(|| "an unknown location".to_string());
                if !prompter.confirm(&format!("Remove {name} from {location}?"), false) {
                    errors.push((
                        name.to_string(),
                        TarstowError::UserAbort(format!("Kept '{name}'")),
                    ));
                    continue;
                }
            }

            println!("Uninstalling {name}...");
            if let Err(e) = remove(&record, config) {
                report_failure(name, &e);
                errors.push((name.to_string(), e));
            }
        }

        if errors.is_empty() {
            return Ok(());
        }

        eprintln!("\n{}:", "Finished uninstalling with errors".yellow());
        let mut errors_by_name: HashMap<&str, Vec<String>> = HashMap::new();
        for (name, e) in &errors {
            errors_by_name
                .entry(name.as_str())
                .or_default()
                .push(e.to_string());
        }
        for (name, error_list) in errors_by_name {
            eprintln!("Application '{}':", name.cyan());
            let unique_errors: HashSet<_> = error_list.into_iter().collect();
            for error_str in unique_errors {
                eprintln!("- {}", error_str.red());
            }
        }
        match errors.into_iter().next() {
            Some((_, e)) => Err(e),
            None => Ok(()),
        }
    }
}

fn remove(record: &InstallationRecord, config: &Config) -> Result<RemovalSummary> {
    let (file_count, size_bytes) = record
        .final_install_dir
        .as_deref()
        .map(count_files_and_size)
        .unwrap_or((0, 0));
    debug!(
        "Removing '{}' via {}",
        record.app_identifier,
        record.log_path.display()
    );

    let summary = uninstall_record(&record.log_path, config, &SystemDesktop)?;
    println!(
        "✓ Uninstalled {} ({} files, {})",
        summary.app_identifier.green(),
        file_count,
        format_size(size_bytes)
    );
    for line in removal_report(&summary) {
        println!("{line}");
    }
    Ok(summary)
}

/// One indented line per recorded item, in removal order.
fn removal_report(summary: &RemovalSummary) -> Vec<String> {
    let mut lines = Vec::with_capacity(summary.removed.len() + summary.skipped.len() + 1);
    for path in &summary.removed {
        lines.push(format!("  removed {}", path.display()));
    }
    for path in &summary.skipped {
        lines.push(format!("  already gone {}", path.display()));
    }
    if let Some(archived) = &summary.archived_log {
        lines.push(format!("  record archived as {}", archived.display()));
    }
    lines
}

fn report_failure(name: &str, e: &TarstowError) {
    error!("✖ Failed to uninstall '{}': {}", name.cyan(), e);
    if let TarstowError::PartialFailure(summary) = e {
        for (path, reason) in &summary.failed {
            eprintln!("  {} {}: {}", "✖".red(), path.display(), reason);
        }
        if summary.archived_log.is_none() {
            eprintln!(
                "  {}",
                "The installation record was kept; run uninstall again after fixing the above."
                    .yellow()
            );
        }
    }
}

fn count_files_and_size(path: &Path) -> (usize, u64) {
    let mut file_count = 0;
    let mut total_size = 0;
    for entry in walkdir::WalkDir::new(path) {
        match entry {
            Ok(entry_data) => {
                if entry_data.file_type().is_file() || entry_data.file_type().is_symlink() {
                    match entry_data.metadata() {
                        Ok(metadata) => {
                            file_count += 1;
                            if entry_data.file_type().is_file() {
                                total_size += metadata.len();
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Could not get metadata for {}: {}",
                                entry_data.path().display(),
                                e
                            );
                        }
                    }
                }
            }
            Err(e) => {
                debug!("Error traversing directory {}: {}", path.display(), e);
            }
        }
    }
    (file_count, total_size)
}

fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if size >= GB {
        format!("{:.1}GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.1}MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.1}KB", size as f64 / KB as f64)
    } else {
        format!("{size}B")
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn sizes_use_binary_units() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(1536), "1.5KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0MB");
    }

    #[test]
    fn removal_report_lists_every_item() {
        let summary = RemovalSummary {
            app_identifier: "myapp".to_string(),
            removed: vec![
                PathBuf::from("/h/.local/bin/myapp"),
                PathBuf::from("/h/Applications/myapp"),
            ],
            skipped: vec![PathBuf::from("/h/.local/share/applications/myapp.desktop")],
            failed: vec![],
            archived_log: Some(PathBuf::from("/h/logs/myapp-1.removed.log")),
        };

        assert_eq!(
            removal_report(&summary),
            vec![
                "  removed /h/.local/bin/myapp".to_string(),
                "  removed /h/Applications/myapp".to_string(),
                "  already gone /h/.local/share/applications/myapp.desktop".to_string(),
                "  record archived as /h/logs/myapp-1.removed.log".to_string(),
            ]
        );
    }

    #[test]
    fn missing_directory_counts_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(count_files_and_size(&tmp.path().join("gone")), (0, 0));
    }
}
