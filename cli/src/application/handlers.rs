use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use snaphold_core::chunk::ChunkParams;
use snaphold_core::engine::{self, backup_tree, CheckMode, CreateOptions, Repository, Snapshot};
use snaphold_core::error::{EngineError, Result};
use snaphold_core::hash::Digest;
use snaphold_core::storage::filesystem::FsBackend;
use snaphold_core::storage::network::NetworkBackend;
use snaphold_core::storage::Backend;

fn passphrase() -> Option<Vec<u8>> {
    std::env::var("PASSPHRASE").ok().map(|s| s.into_bytes())
}

fn open_repository(repo: &PathBuf) -> Result<Arc<Repository>> {
    let backend: Arc<dyn Backend> = Arc::new(FsBackend::init(repo)?);
    Repository::open(backend, passphrase().as_deref())
}

pub fn handle_create(
    repo: PathBuf,
    hashing: String,
    compression: String,
    chunk_min: Option<u32>,
    chunk_normal: Option<u32>,
    chunk_max: Option<u32>,
    encrypt: bool,
) -> Result<i32> {
    let backend: Arc<dyn Backend> = Arc::new(FsBackend::init(&repo)?);
    let defaults = ChunkParams::default();
    let chunking = ChunkParams {
        min: chunk_min.unwrap_or(defaults.min),
        normal: chunk_normal.unwrap_or(defaults.normal),
        max: chunk_max.unwrap_or(defaults.max),
    };
    let opts = CreateOptions {
        hashing,
        compression,
        chunking,
        passphrase: if encrypt { passphrase() } else { None },
        worker_pool_size: None,
        target_packfile_size: None,
    };
    if opts.passphrase.is_none() && encrypt {
        return Err(EngineError::BadPassphrase);
    }
    let created = Repository::create(backend, opts)?;
    println!("created repository {} at {}", created.config().repository_id, repo.display());
    Ok(0)
}

pub fn handle_open(repo: PathBuf) -> Result<i32> {
    let r = open_repository(&repo)?;
    let cfg = r.config();
    println!("repository {}", cfg.repository_id);
    println!("hashing: {}", cfg.hashing);
    println!("compression: {}", cfg.compression);
    println!("encrypted: {}", r.is_encrypted());
    println!("snapshots: {}", r.list_snapshots()?.len());
    Ok(0)
}

pub fn handle_backup(repo: PathBuf, path: PathBuf, tags: Vec<String>, category: Option<String>) -> Result<i32> {
    let r = open_repository(&repo)?;
    let pool_size = r.worker_pool_size();
    let mut builder = r.begin_snapshot();
    if let Some(category) = category {
        builder.set_category(category);
    }
    for tag in tags {
        builder.add_tag(tag);
    }
    builder.set_importer("filesystem", path.to_string_lossy(), path.to_string_lossy());
    let cancel = builder.cancellation_token();
    let mutex = Mutex::new(builder);
    backup_tree(&mutex, &r, &path, pool_size, &cancel)?;
    let header = mutex.into_inner().expect("snapshot builder mutex poisoned").finalize()?;
    println!("{}", header.snapshot_id.to_hex());
    Ok(0)
}

pub fn handle_restore(repo: PathBuf, target: String, dest: PathBuf) -> Result<i32> {
    let (snapshot_hex, path) = target
        .split_once(':')
        .ok_or_else(|| EngineError::Format(format!("expected <snapshot>:<path>, got {target}")))?;
    let r = open_repository(&repo)?;
    let snapshot_id = Digest::from_hex(snapshot_hex)?;
    let snapshot = Snapshot::open(r, &snapshot_id)?;

    let prefix = if path.is_empty() { "/".to_string() } else { path.to_string() };
    let mut restored = 0u64;
    for file in snapshot.list_files() {
        let matches = prefix == "/" || file == prefix || file.starts_with(&format!("{prefix}/"));
        if !matches {
            continue;
        }
        let rel = file.trim_start_matches('/');
        let out_path = if rel.is_empty() { dest.clone() } else { dest.join(rel) };
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&out_path)?;
        snapshot.write_file_to(&file, &mut out)?;
        restored += 1;
    }
    if restored == 0 {
        return Err(EngineError::not_found(path.to_string()));
    }
    println!("restored {restored} file(s)");
    Ok(0)
}

pub fn handle_ls(repo: PathBuf, snapshot: Option<String>) -> Result<i32> {
    let r = open_repository(&repo)?;
    match snapshot {
        Some(hex) => {
            let snapshot_id = Digest::from_hex(&hex)?;
            let snapshot = Snapshot::open(r, &snapshot_id)?;
            for file in snapshot.list_files() {
                println!("{file}");
            }
        }
        None => {
            for id in r.list_snapshots()? {
                let snapshot = Snapshot::open(Arc::clone(&r), &id)?;
                let header = snapshot.header();
                println!(
                    "{}  {}  {}  files={} dirs={} size={}",
                    header.snapshot_id,
                    header.creation_time,
                    header.category,
                    header.summary.files,
                    header.summary.directories,
                    header.summary.total_size,
                );
            }
        }
    }
    Ok(0)
}

pub fn handle_check(repo: PathBuf, snapshot: String, fast: bool) -> Result<i32> {
    let r = open_repository(&repo)?;
    let snapshot_id = Digest::from_hex(&snapshot)?;
    let mode = if fast { CheckMode::Fast } else { CheckMode::Full };
    let report = engine::check(&r, &snapshot_id, mode)?;
    if report.is_ok() {
        println!("ok ({} chunks checked)", report.chunks_checked);
        Ok(0)
    } else {
        for corruption in &report.corruptions {
            eprintln!("corruption: {corruption}");
        }
        Ok(1)
    }
}

pub fn handle_rm(repo: PathBuf, snapshot: String) -> Result<i32> {
    let r = open_repository(&repo)?;
    let snapshot_id = Digest::from_hex(&snapshot)?;
    Snapshot::delete(&r, &snapshot_id)?;
    println!("removed {snapshot}");
    Ok(0)
}

pub fn handle_sync_to(repo: PathBuf, peer: String) -> Result<i32> {
    let local = FsBackend::init(&repo)?;
    let remote = NetworkBackend::connect(&peer)?;
    let copied = engine::replicate(&local, &remote)?;
    println!("copied {copied} object(s) to {peer}");
    Ok(0)
}

pub fn handle_sync_from(repo: PathBuf, peer: String) -> Result<i32> {
    let local = FsBackend::init(&repo)?;
    let remote = NetworkBackend::connect(&peer)?;
    let copied = engine::replicate(&remote, &local)?;
    println!("copied {copied} object(s) from {peer}");
    Ok(0)
}

pub fn handle_sync_with(repo: PathBuf, peer: String) -> Result<i32> {
    let local = FsBackend::init(&repo)?;
    let remote = NetworkBackend::connect(&peer)?;
    let (to_peer, from_peer) = engine::replicate_both_ways(&local, &remote)?;
    println!("copied {to_peer} object(s) to {peer}, {from_peer} from {peer}");
    Ok(0)
}
