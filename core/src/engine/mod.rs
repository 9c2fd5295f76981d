//! The snapshot engine: ties hashing, compression, chunking,
//! encryption, storage, packing, and the VFS index together into
//! `Repository` (create/open a backend), `SnapshotBuilder` (begin/
//! put_file/finalize one snapshot), and `Snapshot` (open/list/delete/
//! check committed ones) — a repository holding many independently
//! content-addressed snapshots.

mod blob;
mod builder;
mod cancel;
mod config;
mod pipeline;
mod repository;
mod sections;
mod snapshot;
mod state_summary;
mod sync;

pub use builder::SnapshotBuilder;
pub use cancel::CancellationToken;
pub use config::{Config, EncryptionConfig};
pub use pipeline::{backup_path, backup_tree};
pub use repository::{CreateOptions, Repository};
pub use sections::{ErrorsSection, FileInfoRecord, IndexSection, MetadataSection, RootSection, StatisticsSection};
pub use snapshot::{check, CheckMode, CheckReport, Snapshot};
pub use state_summary::StateSummary;
pub use sync::{replicate, replicate_both_ways};

#[cfg(test)]
mod tests;
