// tarstow-common/src/lib.rs
pub mod config;
pub mod error;
pub mod host;
pub mod model;

// Re-export key types
pub use config::{Config, NameRules};
pub use error::{Result, TarstowError};
pub use host::{DesktopIntegration, Extractor, Prompter};
pub use model::{InstallationRecord, LiveInstallation, RemovalSummary, SymlinkPair};
