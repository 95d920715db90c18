// tarstow-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};

use directories::UserDirs;
use tracing::debug;

use super::error::{Result, TarstowError};

const DEFAULT_FALLBACK_ICON: &str = "application-x-executable";

const DEFAULT_ARCHIVE_EXTENSIONS: &[&str] = &[
    ".tar.gz", ".tar.xz", ".tgz", ".tar", ".txz", ".tar.bz2", ".tbz2",
];

const DEFAULT_ARCH_TOKENS: &[&str] = &[
    "x86_64", "x86-64", "amd64", "x64", "i386", "i486", "i586", "i686", "x86", "aarch64",
    "arm64", "armv7l", "armv7", "armv6l", "armhf", "arm", "64bit", "32bit",
];

const DEFAULT_OS_TOKENS: &[&str] = &[
    "linux", "gnu", "musl", "unknown", "windows", "win64", "win32", "darwin", "macos", "osx",
    "freebsd",
];

const DEFAULT_RELEASE_TOKENS: &[&str] = &["release", "stable", "beta", "alpha", "rc"];

const DEFAULT_SOURCE_MARKERS: &[&str] = &[
    "configure",
    "configure.ac",
    "Makefile.in",
    "Makefile.am",
    "CMakeLists.txt",
    "meson.build",
    "setup.py",
    "Cargo.toml",
    "go.mod",
];

/// Token lists driving identifier derivation.
///
/// Release tokens are only stripped from the end of a name; `rc` also
/// matches with a trailing number (`rc1`, `rc12`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRules {
    pub archive_extensions: Vec<String>,
    pub arch_tokens: Vec<String>,
    pub os_tokens: Vec<String>,
    pub release_tokens: Vec<String>,
}

impl Default for NameRules {
    fn default() -> Self {
        Self {
            archive_extensions: owned(DEFAULT_ARCHIVE_EXTENSIONS),
            arch_tokens: owned(DEFAULT_ARCH_TOKENS),
            os_tokens: owned(DEFAULT_OS_TOKENS),
            release_tokens: owned(DEFAULT_RELEASE_TOKENS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub home: PathBuf,
    pub install_base: PathBuf,
    pub bin_dir: PathBuf,
    pub desktop_dir: PathBuf,
    pub log_dir: PathBuf,
    pub search_roots: Vec<PathBuf>,
    pub tmp_dir: Option<PathBuf>,
    pub name_rules: NameRules,
    pub source_markers: Vec<String>,
    pub fallback_icon: String,
    pub rollback_on_failure: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading tarstow configuration");

        let home = UserDirs::new()
            .map(|ud| ud.home_dir().to_path_buf())
            .ok_or_else(|| {
                TarstowError::Config("Could not determine the user's home directory".to_string())
            })?;
        let data_dir = dirs::data_dir().unwrap_or_else(|| home.join(".local/share"));
        let exec_dir = dirs::executable_dir().unwrap_or_else(|| home.join(".local/bin"));

        let mut config = Self::with_dirs(&home, &data_dir, &exec_dir);
        config.apply_overrides(&data_dir, env_path);

        debug!(
            "Effective install base: {}, log store: {}",
            config.install_base.display(),
            config.log_dir.display()
        );
        Ok(config)
    }

    /// Applies `TARSTOW_*` path overrides, then rebuilds the conflict search
    /// roots so they follow the effective install base and bin dir.
    fn apply_overrides(&mut self, data_dir: &Path, lookup: impl Fn(&str) -> Option<PathBuf>) {
        if let Some(path) = lookup("TARSTOW_INSTALL_BASE") {
            self.install_base = path;
        }
        if let Some(path) = lookup("TARSTOW_BIN_DIR") {
            self.bin_dir = path;
        }
        if let Some(path) = lookup("TARSTOW_DESKTOP_DIR") {
            self.desktop_dir = path;
        }
        if let Some(path) = lookup("TARSTOW_LOG_DIR") {
            self.log_dir = path;
        }
        self.tmp_dir = lookup("TARSTOW_TMPDIR");
        self.search_roots = search_roots(&self.home, data_dir, &self.install_base, &self.bin_dir);
    }

    /// Builds a configuration rooted entirely under `home`, ignoring the
    /// environment. Used for tests and for relocated setups.
    pub fn with_home(home: &Path) -> Self {
        Self::with_dirs(home, &home.join(".local/share"), &home.join(".local/bin"))
    }

    fn with_dirs(home: &Path, data_dir: &Path, exec_dir: &Path) -> Self {
        let install_base = home.join("Applications");
        Self {
            home: home.to_path_buf(),
            install_base: install_base.clone(),
            bin_dir: exec_dir.to_path_buf(),
            desktop_dir: data_dir.join("applications"),
            log_dir: data_dir.join("tarstow").join("logs"),
            search_roots: search_roots(home, data_dir, &install_base, exec_dir),
            tmp_dir: None,
            name_rules: NameRules::default(),
            source_markers: owned(DEFAULT_SOURCE_MARKERS),
            fallback_icon: DEFAULT_FALLBACK_ICON.to_string(),
            rollback_on_failure: false,
        }
    }

    pub fn app_install_dir(&self, app_identifier: &str) -> PathBuf {
        self.install_base.join(app_identifier)
    }

    pub fn desktop_file_path(&self, app_identifier: &str) -> PathBuf {
        self.desktop_dir.join(format!("{app_identifier}.desktop"))
    }

    /// Directory for tracing output, beside the log store.
    pub fn diagnostics_dir(&self) -> PathBuf {
        self.log_dir
            .parent()
            .map_or_else(|| self.log_dir.clone(), Path::to_path_buf)
    }

    /// Directories the conflict scanner must never report: the tool's own
    /// state and the shared integration directories.
    pub fn protected_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![
            self.home.clone(),
            self.install_base.clone(),
            self.bin_dir.clone(),
            self.desktop_dir.clone(),
            self.log_dir.clone(),
        ];
        let mut ancestor = self.log_dir.parent();
        while let Some(dir) = ancestor {
            if dir == self.home || !dir.starts_with(&self.home) {
                break;
            }
            dirs.push(dir.to_path_buf());
            ancestor = dir.parent();
        }
        dirs
    }
}

fn search_roots(home: &Path, data_dir: &Path, install_base: &Path, bin_dir: &Path) -> Vec<PathBuf> {
    vec![
        data_dir.to_path_buf(),
        install_base.to_path_buf(),
        bin_dir.to_path_buf(),
        home.join("bin"),
    ]
}

fn owned(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| (*t).to_string()).collect()
}

fn env_path(var: &str) -> Option<PathBuf> {
    env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_home_roots_every_path_under_home() {
        let home = Path::new("/tmp/fake-home");
        let config = Config::with_home(home);

        assert_eq!(config.install_base, home.join("Applications"));
        assert_eq!(config.bin_dir, home.join(".local/bin"));
        assert_eq!(config.desktop_dir, home.join(".local/share/applications"));
        assert_eq!(config.log_dir, home.join(".local/share/tarstow/logs"));
        assert!(config.search_roots.iter().all(|r| r.starts_with(home)));
        assert_eq!(config.search_roots[1], config.install_base);
        assert!(!config.rollback_on_failure);
    }

    #[test]
    fn overrides_move_search_roots_with_them() {
        let home = Path::new("/tmp/fake-home");
        let data_dir = home.join(".local/share");
        let mut config = Config::with_home(home);
        config.apply_overrides(&data_dir, |var| match var {
            "TARSTOW_INSTALL_BASE" => Some(PathBuf::from("/opt/apps")),
            "TARSTOW_BIN_DIR" => Some(PathBuf::from("/opt/bin")),
            _ => None,
        });

        assert_eq!(config.install_base, PathBuf::from("/opt/apps"));
        assert_eq!(config.bin_dir, PathBuf::from("/opt/bin"));
        assert!(config.search_roots.contains(&PathBuf::from("/opt/apps")));
        assert!(config.search_roots.contains(&PathBuf::from("/opt/bin")));
        assert!(!config.search_roots.contains(&home.join("Applications")));
        assert!(!config.search_roots.contains(&home.join(".local/bin")));
        assert_eq!(config.search_roots[0], data_dir);
        assert_eq!(config.tmp_dir, None);
    }

    #[test]
    fn protected_dirs_cover_log_store_ancestors() {
        let home = Path::new("/tmp/fake-home");
        let config = Config::with_home(home);
        let protected = config.protected_dirs();

        assert!(protected.contains(&home.join(".local/share/tarstow")));
        assert!(protected.contains(&home.join(".local/share")));
        assert!(protected.contains(&home.join(".local/share/tarstow/logs")));
    }

    #[test]
    fn desktop_file_is_named_after_identifier() {
        let config = Config::with_home(Path::new("/h"));
        assert_eq!(
            config.desktop_file_path("firefox"),
            PathBuf::from("/h/.local/share/applications/firefox.desktop")
        );
        assert_eq!(config.diagnostics_dir(), PathBuf::from("/h/.local/share/tarstow"));
    }
}
