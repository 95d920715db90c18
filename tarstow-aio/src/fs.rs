/*
File: tarstow-aio/src/fs.rs
Purpose: Primitive synchronous filesystem operations.
*/
use std::{
    fs::{self, Permissions},
    io,
    os::unix::fs::{symlink, PermissionsExt},
    path::{Path, PathBuf},
};

use tarstow_common::error::{Result, TarstowError};
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// Checks if a path exists without following symlinks.
pub fn check_symlink_exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Checks if a path is itself a symlink (dangling or not).
pub fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .is_ok_and(|m| m.file_type().is_symlink())
}

/// Regular file with at least one execute bit set.
pub fn is_executable_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

/// Creates a directory and all its parent components if they are missing.
pub fn create_dir_all(path: &Path) -> Result<()> {
    debug!("Creating directory recursively: {}", path.display());
    fs::create_dir_all(path).map_err(|e| {
        error!("Failed create dir {}: {}", path.display(), e);
        TarstowError::from(e)
    })
}

/// Creates a symbolic link, replacing whatever non-directory sits at `link`.
pub fn replace_symlink(target: &Path, link: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        create_dir_all(parent)?;
    }
    if let Ok(meta) = link.symlink_metadata() {
        if meta.is_dir() {
            return Err(TarstowError::InstallError(format!(
                "Refusing to replace directory {} with a symlink",
                link.display()
            )));
        }
        debug!("Removing existing item at symlink path {}", link.display());
        fs::remove_file(link)?;
    }
    debug!("Creating symlink {} -> {}", link.display(), target.display());
    symlink(target, link).map_err(|e| {
        error!(
            "Failed create symlink {} -> {}: {}",
            link.display(),
            target.display(),
            e
        );
        TarstowError::from(e)
    })
}

/// Sets file permissions. Mode is standard Unix octal mode.
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    debug!("Setting permissions on {}: {:o}", path.display(), mode);
    fs::set_permissions(path, Permissions::from_mode(mode)).map_err(|e| {
        error!("Failed set permissions on {}: {}", path.display(), e);
        TarstowError::from(e)
    })
}

/// Adds the execute bits matching the existing read bits (`chmod +x`).
pub fn make_executable(path: &Path) -> Result<()> {
    let mode = fs::metadata(path)?.permissions().mode();
    let with_exec = mode | ((mode & 0o444) >> 2) | 0o100;
    if with_exec != mode {
        set_permissions(path, with_exec)?;
    }
    Ok(())
}

/// Recursively copies the contents of `src` into `dst`, preserving modes and
/// recreating symlinks as symlinks. Returns every non-directory path created
/// under `dst`, in walk order.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<Vec<PathBuf>> {
    create_dir_all(dst)?;
    let mut copied = Vec::new();

    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).map_err(|_| {
            TarstowError::Generic(format!(
                "{} escaped copy root {}",
                entry.path().display(),
                src.display()
            ))
        })?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            let mode = entry.metadata()?.permissions().mode();
            fs::set_permissions(&target, Permissions::from_mode(mode | 0o700))?;
        } else if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            symlink(&link_target, &target)?;
            copied.push(target);
        } else {
            // fs::copy carries the permission bits over.
            fs::copy(entry.path(), &target).map_err(|e| {
                TarstowError::Io(std::sync::Arc::new(io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to copy {} to {}: {}",
                        entry.path().display(),
                        target.display(),
                        e
                    ),
                )))
            })?;
            copied.push(target);
        }
    }

    debug!(
        "Copied {} entries from {} to {}",
        copied.len(),
        src.display(),
        dst.display()
    );
    Ok(copied)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    /// Nothing was there to remove.
    Missing,
    Failed(String),
}

/// Removes a file, symlink or directory tree. Symlinks are removed as links,
/// never followed.
pub fn remove_artifact(path: &Path) -> RemovalOutcome {
    match path.symlink_metadata() {
        Ok(metadata) => {
            let is_real_dir = metadata.file_type().is_dir();
            debug!(
                "Removing {} at: {}",
                if is_real_dir {
                    "directory"
                } else if metadata.file_type().is_symlink() {
                    "symlink"
                } else {
                    "file"
                },
                path.display()
            );
            let result = if is_real_dir {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            };
            match result {
                Ok(()) => RemovalOutcome::Removed,
                Err(e) if e.kind() == io::ErrorKind::NotFound => RemovalOutcome::Missing,
                Err(e) => {
                    error!("Failed to remove {}: {}", path.display(), e);
                    RemovalOutcome::Failed(e.to_string())
                }
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Artifact not found (already removed?): {}", path.display());
            RemovalOutcome::Missing
        }
        Err(e) => {
            warn!("Failed to get metadata for {}: {}", path.display(), e);
            RemovalOutcome::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn copy_tree_preserves_modes_and_symlinks() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("lib")).unwrap();
        fs::write(src.join("app"), "bin").unwrap();
        set_permissions(&src.join("app"), 0o755).unwrap();
        fs::write(src.join("lib/data.txt"), "data").unwrap();
        symlink("app", src.join("app-link")).unwrap();

        let dst = temp.path().join("dst");
        let copied = copy_tree(&src, &dst).unwrap();

        assert_eq!(copied.len(), 3);
        assert!(is_executable_file(&dst.join("app")));
        assert!(!is_executable_file(&dst.join("lib/data.txt")));
        assert!(is_symlink(&dst.join("app-link")));
        assert_eq!(fs::read_link(dst.join("app-link")).unwrap(), PathBuf::from("app"));
    }

    #[test]
    fn replace_symlink_overwrites_existing_link_but_not_directories() {
        let temp = TempDir::new().unwrap();
        let link = temp.path().join("bin/tool");
        replace_symlink(Path::new("/old/target"), &link).unwrap();
        replace_symlink(Path::new("/new/target"), &link).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("/new/target"));

        let dir = temp.path().join("dir");
        fs::create_dir(&dir).unwrap();
        assert!(replace_symlink(Path::new("/x"), &dir).is_err());
        assert!(dir.is_dir());
    }

    #[test]
    fn make_executable_sets_exec_bits() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f");
        fs::write(&file, "x").unwrap();
        set_permissions(&file, 0o644).unwrap();
        make_executable(&file).unwrap();
        assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o755);
    }

    #[test]
    fn remove_artifact_reports_missing_and_does_not_follow_links() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("keep");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("f"), "x").unwrap();
        let link = temp.path().join("link");
        symlink(&dir, &link).unwrap();

        assert_eq!(remove_artifact(&link), RemovalOutcome::Removed);
        assert!(dir.join("f").is_file());
        assert_eq!(remove_artifact(&link), RemovalOutcome::Missing);
        assert_eq!(remove_artifact(&dir), RemovalOutcome::Removed);
        assert!(!dir.exists());
    }
}
