//! `backup_tree` — a walker -> worker-pool -> pack-writer pipeline,
//! built on top of [`SnapshotBuilder::put_file`] rather than replacing
//! it: a bounded `crossbeam_channel` hands discovered paths to a
//! fixed-size worker pool (default size from
//! [`Repository::worker_pool_size`]); each worker opens and reads its
//! own file outside any lock, then commits it by taking the shared
//! builder's mutex for the (fast) chunk/dedupe/pack/VFS-build work.
//! Files land in the snapshot in whatever order workers finish
//! committing them, not walk order — there is no ordering guarantee
//! across files.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crossbeam::channel;

use super::builder::SnapshotBuilder;
use super::cancel::CancellationToken;
use super::repository::Repository;
use crate::error::Result;
use crate::vfs::FileInfo;

fn file_info(meta: &fs::Metadata) -> FileInfo {
    FileInfo {
        mode: meta.mode(),
        mtime: meta.mtime(),
        size: meta.size(),
        dev: meta.dev(),
        ino: meta.ino(),
    }
}

fn snapshot_path(root: &Path, entry: &Path) -> String {
    let rel = entry.strip_prefix(root).unwrap_or(entry);
    let mut s = rel.to_string_lossy().replace('\\', "/");
    if !s.starts_with('/') {
        s = format!("/{s}");
    }
    s
}

/// Walk `root`, committing every entry into `builder` (already wrapped in
/// a `Mutex` so the pool's workers can share it). Each worker reads,
/// chunks, hashes, and compresses/seals a regular file's content via
/// `repo` directly — no lock on `builder` held for any of that — and
/// only takes the builder's lock for the (fast) dedupe-check + pack +
/// VFS-build commit step.
pub fn backup_tree(
    builder: &Mutex<SnapshotBuilder>,
    repo: &Arc<Repository>,
    root: &Path,
    pool_size: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    tracing::debug!(root = %root.display(), pool_size, "starting backup walk");
    let (tx, rx) = channel::bounded::<PathBuf>(pool_size.max(1) * 4);

    std::thread::scope(|scope| -> Result<()> {
        let walker_tx = tx.clone();
        drop(tx);
        let walker = scope.spawn(move || -> Result<()> {
            for entry in walkdir::WalkDir::new(root).into_iter() {
                cancel.check()?;
                let entry = match entry {
                    Ok(e) => e,
                    Err(_) => continue,
                };
                if walker_tx.send(entry.into_path()).is_err() {
                    break;
                }
            }
            Ok(())
        });

        let mut workers = Vec::with_capacity(pool_size.max(1));
        for _ in 0..pool_size.max(1) {
            let rx = rx.clone();
            workers.push(scope.spawn(move || -> Vec<(PathBuf, String)> {
                let mut failures = Vec::new();
                for path in rx.iter() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if let Err(e) = commit_one(builder, repo, root, &path) {
                        failures.push((path, e.to_string()));
                    }
                }
                failures
            }));
        }

        walker.join().expect("walker thread panicked")?;
        let mut b = builder.lock().expect("snapshot builder mutex poisoned");
        for w in workers {
            let failures = w.join().expect("worker thread panicked");
            for (path, message) in failures {
                tracing::warn!(path = %path.display(), error = %message, "failed to back up path");
                b.record_error(path.to_string_lossy().to_string(), message);
            }
        }
        Ok(())
    })
}

fn commit_one(builder: &Mutex<SnapshotBuilder>, repo: &Arc<Repository>, root: &Path, path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;
    let info = file_info(&meta);
    let snap_path = snapshot_path(root, path);

    if meta.file_type().is_symlink() {
        let target = fs::read_link(path)?;
        let mut b = builder.lock().expect("snapshot builder mutex poisoned");
        b.put_symlink(&snap_path, info, &target.to_string_lossy())?;
    } else if meta.is_dir() {
        let mut b = builder.lock().expect("snapshot builder mutex poisoned");
        b.put_directory(&snap_path, info)?;
    } else if meta.is_file() {
        let file = fs::File::open(path)?;
        // The expensive part — chunk/hash/compress/seal the whole file —
        // runs here, off the builder's lock.
        let params = repo.config().chunking;
        let prepared = super::blob::prepare_file(repo, params, file)?;
        let mut b = builder.lock().expect("snapshot builder mutex poisoned");
        b.commit_prepared_file(&snap_path, info, prepared)?;
    }
    Ok(())
}

/// Convenience wrapper: build a fresh snapshot over `root` end to end,
/// using the repository's configured worker pool size, and return the
/// committed header.
pub fn backup_path(repo: Arc<Repository>, root: &Path) -> Result<crate::snapshot::Header> {
    let pool_size = repo.worker_pool_size();
    let mut builder = repo.begin_snapshot();
    builder.set_importer("filesystem", root.to_string_lossy(), root.to_string_lossy());
    let cancel = builder.cancellation_token();
    let mutex = Mutex::new(builder);
    backup_tree(&mutex, &repo, root, pool_size, &cancel)?;
    mutex.into_inner().expect("snapshot builder mutex poisoned").finalize()
}
