pub mod handlers;

use crate::presentation::cli::{Cli, Commands, SyncDirection};
use clap::Parser;
use snaphold_core::error::Result;

pub fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Create {
            hashing,
            compression,
            chunk_min,
            chunk_normal,
            chunk_max,
            encrypt,
        } => handlers::handle_create(cli.repo, hashing, compression, chunk_min, chunk_normal, chunk_max, encrypt),
        Commands::Open => handlers::handle_open(cli.repo),
        Commands::Backup { path, tags, category } => handlers::handle_backup(cli.repo, path, tags, category),
        Commands::Restore { target, dest } => handlers::handle_restore(cli.repo, target, dest),
        Commands::Ls { snapshot } => handlers::handle_ls(cli.repo, snapshot),
        Commands::Check { snapshot, fast } => handlers::handle_check(cli.repo, snapshot, fast),
        Commands::Rm { snapshot } => handlers::handle_rm(cli.repo, snapshot),
        Commands::Sync(direction) => match direction {
            SyncDirection::To { peer } => handlers::handle_sync_to(cli.repo, peer),
            SyncDirection::From { peer } => handlers::handle_sync_from(cli.repo, peer),
            SyncDirection::With { peer } => handlers::handle_sync_with(cli.repo, peer),
        },
    }
}
