// tarstow-common/src/host.rs
//! Host facilities the core reaches through a trait object.

use std::path::Path;

use crate::error::Result;

/// Unpacks an archive into an existing directory.
pub trait Extractor {
    fn extract(&self, archive_path: &Path, target_dir: &Path) -> Result<()>;
}

/// Operator interaction. `None` means the prompt was dismissed.
pub trait Prompter {
    fn message(&self, text: &str);

    /// Yes/no question. A dismissed prompt counts as "no".
    fn confirm(&self, question: &str, default: bool) -> bool;

    /// Single choice among `options`, returning the chosen index.
    fn select(&self, prompt: &str, options: &[String]) -> Option<usize>;

    /// Free-text input pre-filled with `default`.
    fn input(&self, prompt: &str, default: &str) -> Option<String>;
}

/// Cosmetic desktop hooks. Failures are reported by the implementation and
/// never affect an install or uninstall outcome.
pub trait DesktopIntegration {
    fn refresh_menu_cache(&self, desktop_dir: &Path);
    fn notify(&self, summary: &str, body: &str);
}
