use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "snaphold: deduplicating, content-addressed snapshot engine", long_about = None)]
pub struct Cli {
    /// Repository directory (a filesystem backend root).
    #[arg(long, global = true, default_value = ".")]
    pub repo: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum SyncDirection {
    /// Push everything this repository has that `peer` lacks.
    To { peer: String },
    /// Pull everything `peer` has that this repository lacks.
    From { peer: String },
    /// Reconcile both directions.
    With { peer: String },
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a fresh repository at `--repo`.
    Create {
        #[arg(long, default_value = "BLAKE3")]
        hashing: String,
        #[arg(long, default_value = "LZ4")]
        compression: String,
        #[arg(long)]
        chunk_min: Option<u32>,
        #[arg(long)]
        chunk_normal: Option<u32>,
        #[arg(long)]
        chunk_max: Option<u32>,
        /// Encrypt the repository; reads the passphrase from `PASSPHRASE`.
        #[arg(long)]
        encrypt: bool,
    },

    /// Open the repository at `--repo` and print its configuration.
    Open,

    /// Walk `path` and commit it as a new snapshot.
    Backup {
        path: PathBuf,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        category: Option<String>,
    },

    /// Restore `<snapshot-id>:<path>` from the repository into `dest`.
    Restore { target: String, dest: PathBuf },

    /// List snapshots, or the files inside one.
    Ls { snapshot: Option<String> },

    /// Verify a snapshot's integrity.
    Check {
        snapshot: String,
        #[arg(long)]
        fast: bool,
    },

    /// Delete a snapshot.
    Rm { snapshot: String },

    /// Replicate blobs between this repository and a peer backend.
    #[command(subcommand)]
    Sync(SyncDirection),
}
