// tarstow-common/src/model/mod.rs
pub mod record;
pub mod removal;

pub use record::{InstallationRecord, LiveInstallation, MetadataKey, RecordFileName, SymlinkPair};
pub use removal::RemovalSummary;
