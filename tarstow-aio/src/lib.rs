// tarstow-aio/src/lib.rs
//! Primitive IO operations for tarstow (extraction, filesystem, hashing, binary detection, desktop hooks)

pub mod checksum;
pub mod desktop;
pub mod elf;
pub mod extract;
pub mod fs;

pub use checksum::sha256_file;
pub use desktop::SystemDesktop;
pub use elf::is_native_executable;
pub use extract::{archive_kind, ArchiveKind, TarExtractor};
