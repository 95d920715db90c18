// tarstow/src/cli/list.rs
use clap::Args;
use colored::Colorize;
use prettytable::{format, Cell, Row, Table};
use tarstow_common::config::Config;
use tarstow_common::error::Result;
use tarstow_core::list_live_installations;

#[derive(Args, Debug)]
pub struct List {
    /// Print the listing as JSON
    #[arg(long)]
    pub json: bool,
}

impl List {
    pub fn run(&self, config: &Config) -> Result<()> {
        let installations = list_live_installations(config)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&installations)?);
            return Ok(());
        }

        if installations.is_empty() {
            println!("{}", "No installations found".yellow());
            return Ok(());
        }

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        table.add_row(Row::new(vec![
            Cell::new("Name").style_spec("b"),
            Cell::new("Location").style_spec("b"),
            Cell::new("Installed").style_spec("b"),
            Cell::new("Record").style_spec("b"),
        ]));
        for live in &installations {
            let record_name = live
                .log_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            table.add_row(Row::new(vec![
                Cell::new(&live.app_identifier).style_spec("Fb"),
                Cell::new(&live.install_dir.display().to_string()),
                Cell::new(&live.timestamp),
                Cell::new(&record_name),
            ]));
        }
        table.printstd();
        println!("{}", format!("{} installed", installations.len()).bold());
        Ok(())
    }
}
