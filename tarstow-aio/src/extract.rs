// tarstow-aio/src/extract.rs
// Handles archive extraction.

use std::fs::{self, File, Permissions};
use std::io::{BufReader, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tar::Archive;
use tarstow_common::error::{Result, TarstowError};
use tarstow_common::host::Extractor;
use tracing::{debug, error, warn};
use xz2::read::XzDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    TarXz,
    TarBz2,
    Tar,
}

/// Infers the archive type from the file name suffix (case-insensitive).
pub fn archive_kind(archive_path: &Path) -> Option<ArchiveKind> {
    let name = archive_path.file_name()?.to_string_lossy().to_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveKind::TarGz)
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        Some(ArchiveKind::TarXz)
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
        Some(ArchiveKind::TarBz2)
    } else if name.ends_with(".tar") {
        Some(ArchiveKind::Tar)
    } else {
        None
    }
}

/// Tar-family extractor backed by `tar` and the matching decompressor.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarExtractor;

impl Extractor for TarExtractor {
    fn extract(&self, archive_path: &Path, target_dir: &Path) -> Result<()> {
        let kind = archive_kind(archive_path).ok_or_else(|| {
            TarstowError::UnsupportedArchive(archive_path.display().to_string())
        })?;

        debug!(
            "Extracting archive '{}' (type: {:?}) to '{}'",
            archive_path.display(),
            kind,
            target_dir.display()
        );

        if !archive_path.is_file() {
            return Err(TarstowError::Environment(format!(
                "Archive not found or not a file: {}",
                archive_path.display()
            )));
        }
        fs::create_dir_all(target_dir)?;

        let file = File::open(archive_path).map_err(|e| {
            TarstowError::Environment(format!(
                "Failed to open archive {}: {}",
                archive_path.display(),
                e
            ))
        })?;
        let reader = BufReader::new(file);

        match kind {
            ArchiveKind::TarGz => unpack_tar(GzDecoder::new(reader), target_dir, archive_path),
            ArchiveKind::TarXz => unpack_tar(XzDecoder::new(reader), target_dir, archive_path),
            ArchiveKind::TarBz2 => unpack_tar(BzDecoder::new(reader), target_dir, archive_path),
            ArchiveKind::Tar => unpack_tar(reader, target_dir, archive_path),
        }
    }
}

fn unpack_tar<R: Read>(reader: R, target_dir: &Path, archive_path_for_log: &Path) -> Result<()> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let entries = archive.entries().map_err(|e| {
        TarstowError::Extraction(format!(
            "Failed to read TAR entries from {}: {}",
            archive_path_for_log.display(),
            e
        ))
    })?;

    let mut unpacked = 0usize;
    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| {
            TarstowError::Extraction(format!(
                "Error reading TAR entry from {}: {}",
                archive_path_for_log.display(),
                e
            ))
        })?;
        let entry_path = entry
            .path()
            .map(|p| p.into_owned())
            .map_err(|e| {
                TarstowError::Extraction(format!(
                    "Invalid path in TAR entry from {}: {}",
                    archive_path_for_log.display(),
                    e
                ))
            })?;

        let is_dir = entry.header().entry_type().is_dir();

        // unpack_in refuses absolute paths and `..` components.
        match entry.unpack_in(target_dir) {
            Ok(true) => {
                unpacked += 1;
                if is_dir {
                    keep_owner_writable(&target_dir.join(&entry_path))?;
                }
            }
            Ok(false) => warn!(
                "Skipped unsafe TAR entry {} in {}",
                entry_path.display(),
                archive_path_for_log.display()
            ),
            Err(e) => {
                error!(
                    "Failed to unpack TAR entry {} from {}: {}",
                    entry_path.display(),
                    archive_path_for_log.display(),
                    e
                );
                return Err(TarstowError::Extraction(format!(
                    "Failed to unpack {}: {}",
                    entry_path.display(),
                    e
                )));
            }
        }
    }

    debug!(
        "Finished TAR extraction for {} ({} entries)",
        archive_path_for_log.display(),
        unpacked
    );
    Ok(())
}

/// Directories stay owner rwx while their contents are unpacked and while
/// the workspace is removed; the shipped mode is otherwise kept.
fn keep_owner_writable(dir: &Path) -> Result<()> {
    let mode = fs::metadata(dir)?.permissions().mode();
    if mode & 0o700 != 0o700 {
        debug!("Widening read-only directory {}", dir.display());
        fs::set_permissions(dir, Permissions::from_mode(mode | 0o700))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    use super::*;

    fn write_tar_gz(path: &Path, files: &[(&str, &[u8], u32)]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap().flush().unwrap();
    }

    #[test]
    fn archive_kind_dispatches_on_suffix() {
        assert_eq!(archive_kind(Path::new("a.tar.gz")), Some(ArchiveKind::TarGz));
        assert_eq!(archive_kind(Path::new("A.TGZ")), Some(ArchiveKind::TarGz));
        assert_eq!(archive_kind(Path::new("a.tar.xz")), Some(ArchiveKind::TarXz));
        assert_eq!(archive_kind(Path::new("a.tbz2")), Some(ArchiveKind::TarBz2));
        assert_eq!(archive_kind(Path::new("a.tar")), Some(ArchiveKind::Tar));
        assert_eq!(archive_kind(Path::new("a.zip")), None);
    }

    #[test]
    fn extracts_tar_gz_preserving_modes() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("tool-1.0.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("tool-1.0/bin/tool", "#!/bin/sh\necho hi\n".as_bytes(), 0o755),
                ("tool-1.0/README", "readme".as_bytes(), 0o644),
            ],
        );

        let out = temp.path().join("out");
        TarExtractor.extract(&archive, &out).unwrap();

        let tool = out.join("tool-1.0/bin/tool");
        assert!(tool.is_file());
        assert_eq!(
            fs::metadata(&tool).unwrap().permissions().mode() & 0o777,
            0o755
        );
        assert_eq!(fs::read(out.join("tool-1.0/README")).unwrap(), b"readme");
    }

    #[test]
    fn read_only_directories_stay_usable() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("locked-1.0.tar.gz");
        let file = File::create(&archive).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

        let mut dir_header = tar::Header::new_gnu();
        dir_header.set_entry_type(tar::EntryType::Directory);
        dir_header.set_size(0);
        dir_header.set_mode(0o555);
        dir_header.set_cksum();
        builder
            .append_data(&mut dir_header, "locked-1.0/", std::io::empty())
            .unwrap();

        let data = b"payload";
        let mut file_header = tar::Header::new_gnu();
        file_header.set_size(data.len() as u64);
        file_header.set_mode(0o644);
        file_header.set_cksum();
        builder
            .append_data(&mut file_header, "locked-1.0/data.txt", &data[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap().flush().unwrap();

        let out = temp.path().join("out");
        TarExtractor.extract(&archive, &out).unwrap();

        let dir = out.join("locked-1.0");
        assert_eq!(fs::read(dir.join("data.txt")).unwrap(), b"payload");
        let mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o700, 0o700);
        assert_eq!(mode & 0o055, 0o055);
        fs::remove_dir_all(&out).unwrap();
    }

    #[test]
    fn unsupported_and_missing_archives_are_environment_errors() {
        let temp = TempDir::new().unwrap();
        let err = TarExtractor
            .extract(&temp.path().join("x.zip"), temp.path())
            .unwrap_err();
        assert!(matches!(err, TarstowError::UnsupportedArchive(_)));

        let err = TarExtractor
            .extract(&temp.path().join("missing.tar.gz"), temp.path())
            .unwrap_err();
        assert!(matches!(err, TarstowError::Environment(_)));
    }

    #[test]
    fn corrupt_archive_fails_extraction() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.tar.gz");
        fs::write(&archive, b"definitely not gzip").unwrap();
        let err = TarExtractor
            .extract(&archive, &temp.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, TarstowError::Extraction(_)));
    }
}
