// tarstow-aio/src/desktop.rs
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Stdio};

use tarstow_common::host::DesktopIntegration;
use tracing::{debug, warn};

const MENU_CACHE_TOOL: &str = "update-desktop-database";
const NOTIFY_TOOL: &str = "notify-send";
const APP_NAME: &str = "tarstow";

/// Desktop hooks implemented with the freedesktop command line tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDesktop;

impl SystemDesktop {
    fn run_quiet(tool: &str, args: &[&OsStr]) {
        let Ok(path) = which::which(tool) else {
            debug!("{} not found on PATH, skipping", tool);
            return;
        };
        match Command::new(path)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
        {
            Ok(out) if out.status.success() => debug!("{} succeeded", tool),
            Ok(out) => warn!(
                "{} exited with {}: {}",
                tool,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            ),
            Err(e) => warn!("Failed to run {}: {}", tool, e),
        }
    }
}

impl DesktopIntegration for SystemDesktop {
    fn refresh_menu_cache(&self, desktop_dir: &Path) {
        Self::run_quiet(MENU_CACHE_TOOL, &[desktop_dir.as_os_str()]);
    }

    fn notify(&self, summary: &str, body: &str) {
        Self::run_quiet(
            NOTIFY_TOOL,
            &[
                OsStr::new("--app-name"),
                OsStr::new(APP_NAME),
                OsStr::new(summary),
                OsStr::new(body),
            ],
        );
    }
}
