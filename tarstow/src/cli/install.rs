// tarstow/src/cli/install.rs
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use colored::Colorize;
use tarstow_aio::{SystemDesktop, TarExtractor};
use tarstow_common::config::Config;
use tarstow_common::error::{Result, TarstowError};
use tarstow_core::{ConflictResolution, InstallOptions, Installer};
use tracing::debug;

use crate::prompt::DialoguerPrompter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConflictChoice {
    Replace,
    InstallAnyway,
    Abort,
}

impl From<ConflictChoice> for ConflictResolution {
    fn from(choice: ConflictChoice) -> Self {
        match choice {
            ConflictChoice::Replace => ConflictResolution::Replace,
            ConflictChoice::InstallAnyway => ConflictResolution::InstallAnyway,
            ConflictChoice::Abort => ConflictResolution::Abort,
        }
    }
}

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Archives to install (.tar.gz, .tgz, .tar.xz, .txz, .tar.bz2, .tbz2, .tar)
    #[arg(required = true)]
    pub archives: Vec<PathBuf>,

    /// Term used to look for existing installations, instead of asking
    #[arg(long)]
    pub search_term: Option<String>,

    /// What to do with existing installations, instead of asking
    #[arg(long, value_enum)]
    pub on_conflict: Option<ConflictChoice>,

    /// Undo completed steps when an install fails part way
    #[arg(long)]
    pub rollback: bool,
}

impl InstallArgs {
    pub fn run(&self, config: &Config) -> Result<()> {
        let prompter = DialoguerPrompter::default();
        let desktop = SystemDesktop;
        let installer = Installer::new(config, &TarExtractor, &prompter, &desktop);
        let options = InstallOptions {
            search_term: self.search_term.clone(),
            on_conflict: self.on_conflict.map(ConflictResolution::from),
            rollback_on_failure: self.rollback,
        };

        let mut errors: Vec<(String, TarstowError)> = Vec::new();
        for archive in &self.archives {
            let label = archive.display().to_string();
            println!("{}{}", "==> ".bold().blue(), format!("Installing {label}").bold());

            match installer.install(archive, &options) {
                Ok(record) => {
                    let location = record
                        .final_install_dir
                        .as_ref()
                        .map(|d| d.display().to_string())
                        .unwrap_or_default();
                    println!(
                        "✓ Installed {} to {}",
                        record.app_identifier.green(),
                        location
                    );
                    for pair in &record.symlinks {
                        println!("  command: {}", pair.link.display());
                    }
                    if let Some(desktop_file) = &record.desktop_file_path {
                        println!("  launcher: {}", desktop_file.display());
                    }
                    debug!("Record written to {}", record.log_path.display());
                }
                Err(e) if e.is_deliberate_stop() => {
                    eprintln!("{} {}: {}", "✖".yellow(), label.cyan(), e);
                    errors.push((label, e));
                }
                Err(e) => {
                    eprintln!("{} {}: {}", "✖".red(), label.cyan(), e);
                    errors.push((label, e));
                }
            }
        }

        if errors.len() > 1 {
            eprintln!("\n{}:", "Finished installing with errors".yellow());
            for (label, e) in &errors {
                eprintln!("- {}: {}", label.cyan(), e.to_string().red());
            }
        }
        match errors.into_iter().next() {
            Some((_, e)) => Err(e),
            None => Ok(()),
        }
    }
}
