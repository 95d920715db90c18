// tarstow/src/prompt.rs
use colored::Colorize;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use tarstow_common::host::Prompter;
use tracing::debug;

/// Terminal prompts. Any dialoguer error (no TTY, Ctrl-C) counts as a
/// dismissed prompt.
#[derive(Default)]
pub struct DialoguerPrompter {
    theme: ColorfulTheme,
}

impl Prompter for DialoguerPrompter {
    fn message(&self, text: &str) {
        println!("{}{}", "==> ".bold().blue(), text);
    }

    fn confirm(&self, question: &str, default: bool) -> bool {
        match Confirm::with_theme(&self.theme)
            .with_prompt(question)
            .default(default)
            .interact_opt()
        {
            Ok(answer) => answer.unwrap_or(false),
            Err(e) => {
                debug!("Confirmation prompt failed: {}", e);
                false
            }
        }
    }

    fn select(&self, prompt: &str, options: &[String]) -> Option<usize> {
        Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(options)
            .default(0)
            .interact_opt()
            .unwrap_or_else(|e| {
                debug!("Selection prompt failed: {}", e);
                None
            })
    }

    fn input(&self, prompt: &str, default: &str) -> Option<String> {
        Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default.to_string())
            .interact_text()
            .map_err(|e| debug!("Input prompt failed: {}", e))
            .ok()
    }
}
