// tarstow/src/cli.rs
//! Defines the command-line argument structure using clap.
use clap::{ArgAction, Parser, Subcommand};
use tarstow_common::error::Result;
use tarstow_common::Config;

pub mod install;
pub mod list;
pub mod uninstall;

use crate::cli::install::InstallArgs;
use crate::cli::list::List;
use crate::cli::uninstall::Uninstall;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "tarstow", bin_name = "tarstow")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Without a command, pick an installation to remove interactively
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install one or more application archives
    Install(InstallArgs),
    /// List live installations
    List(List),
    /// Remove installations by name
    Uninstall(Uninstall),
}

impl CliArgs {
    pub fn run(&self, config: &Config) -> Result<()> {
        match &self.command {
            Some(Command::Install(command)) => command.run(config),
            Some(Command::List(command)) => command.run(config),
            Some(Command::Uninstall(command)) => command.run(config),
            None => Uninstall::default().run(config),
        }
    }
}
