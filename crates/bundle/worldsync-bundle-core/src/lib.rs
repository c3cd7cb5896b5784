//! Entity bundles on disk and their transfer to and from a remote world.
//!
//! * [`bundle`]: reading and writing bundle files.
//! * [`index`]: summarising every bundle in a directory.
//! * [`import`] / [`export`]: moving entity trees over a [`Correlator`].
//!
//! [`Correlator`]: worldsync_ops_core::Correlator

pub mod bundle;
pub mod config;
pub mod export;
pub mod import;
pub mod index;

pub use bundle::{load_from_file, save_to_file, BundleError, BundleFormat, ShortInfo};
pub use config::{ExportConfig, ImportConfig, IndexConfig};
pub use export::{EntityExporter, ExportStats};
pub use import::{EntityImporter, ImportStats};
pub use index::{index_directory, short_info};
