// tarstow-core/src/lib.rs
//! Install and uninstall bookkeeping for pre-compiled application tarballs.

pub mod conflict;
pub mod desktop_entry;
pub mod index;
pub mod install;
pub mod layout;
pub mod naming;
pub mod recorder;
pub mod uninstall;

pub use conflict::{ConflictResolution, ConflictScanner};
pub use index::{find_record, list_live_installations};
pub use install::{InstallOptions, Installer};
pub use naming::NameDeriver;
pub use uninstall::{uninstall_identifier, uninstall_record};
