// tarstow-common/src/model/removal.rs
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Outcome of one uninstall, item by item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalSummary {
    pub app_identifier: String,
    pub removed: Vec<PathBuf>,
    /// Recorded items that were already gone (or no longer a symlink).
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    pub archived_log: Option<PathBuf>,
}

impl RemovalSummary {
    pub fn new(app_identifier: &str) -> Self {
        Self {
            app_identifier: app_identifier.to_string(),
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
