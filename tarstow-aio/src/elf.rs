// tarstow-aio/src/elf.rs
//! Native executable detection, standing in for `file(1)`.

use std::fs::File;
use std::path::Path;

use object::{BinaryFormat, Object, ObjectKind, ObjectSection, ReadCache};
use tracing::{debug, trace};

/// True if `path` is an ELF program: `ET_EXEC`, or a position-independent
/// executable (`ET_DYN` carrying an `.interp` section). Shared libraries,
/// scripts and data files are rejected.
pub fn is_native_executable(path: &Path) -> bool {
    match infer::get_from_path(path) {
        Ok(Some(kind)) if kind.extension() == "elf" => {}
        Ok(_) => return false,
        Err(e) => {
            debug!("Could not sniff {}: {}", path.display(), e);
            return false;
        }
    }

    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            debug!("Could not open {}: {}", path.display(), e);
            return false;
        }
    };
    let cache = ReadCache::new(file);
    let parsed = match object::File::parse(&cache) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Not a parseable object file {}: {}", path.display(), e);
            return false;
        }
    };
    if parsed.format() != BinaryFormat::Elf {
        return false;
    }

    let verdict = match parsed.kind() {
        ObjectKind::Executable => true,
        ObjectKind::Dynamic => parsed
            .section_by_name(".interp")
            .is_some_and(|section| section.size() > 0),
        _ => false,
    };
    trace!(
        "ELF {} kind {:?}: executable={}",
        path.display(),
        parsed.kind(),
        verdict
    );
    verdict
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn running_test_binary_is_native_executable() {
        let exe = std::env::current_exe().unwrap();
        assert!(is_native_executable(&exe));
    }

    #[test]
    fn scripts_and_text_are_not_native_executables() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("run.sh");
        fs::write(&script, "#!/bin/sh\nexec true\n").unwrap();
        let text = temp.path().join("notes.txt");
        fs::write(&text, "plain text").unwrap();

        assert!(!is_native_executable(&script));
        assert!(!is_native_executable(&text));
        assert!(!is_native_executable(&temp.path().join("missing")));
    }

    #[test]
    fn truncated_elf_header_is_rejected() {
        let temp = TempDir::new().unwrap();
        let fake = temp.path().join("fake");
        fs::write(&fake, b"\x7fELF\x02\x01\x01\x00garbage").unwrap();
        assert!(!is_native_executable(&fake));
    }
}
