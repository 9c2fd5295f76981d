use super::*;
use crate::storage::filesystem::FsBackend;
use crate::vfs::FileInfo;
use std::io::Cursor;
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn fresh_repo(passphrase: Option<&[u8]>) -> (tempfile::TempDir, Arc<Repository>) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FsBackend::init(dir.path()).unwrap());
    let opts = CreateOptions {
        passphrase: passphrase.map(|p| p.to_vec()),
        ..CreateOptions::default()
    };
    let repo = Repository::create(backend, opts).unwrap();
    (dir, repo)
}

fn file_info(size: u64, ino: u64) -> FileInfo {
    FileInfo {
        mode: 0o100644,
        mtime: 0,
        size,
        dev: 1,
        ino,
    }
}

#[test]
fn round_trips_a_single_file_through_backup_and_restore() {
    let (_dir, repo) = fresh_repo(None);
    let mut builder = repo.begin_snapshot();
    let payload = b"hello snapshot engine".repeat(1000);
    builder
        .put_file("/docs/a.txt", file_info(payload.len() as u64, 1), Cursor::new(payload.clone()))
        .unwrap();
    let header = builder.finalize().unwrap();
    assert!(!header.root.is_zero());
    assert!(!header.index.is_zero());

    let snapshot = Snapshot::open(Arc::clone(&repo), &header.snapshot_id).unwrap();
    assert_eq!(snapshot.list_files(), vec!["/docs/a.txt".to_string()]);
    let restored = snapshot.read_file("/docs/a.txt").unwrap();
    assert_eq!(restored, payload);
}

#[test]
fn deduplicates_identical_chunks_across_files() {
    let (_dir, repo) = fresh_repo(None);
    let mut builder = repo.begin_snapshot();
    let payload = vec![0x42u8; 2 * 1024 * 1024];
    builder
        .put_file("/a", file_info(payload.len() as u64, 1), Cursor::new(payload.clone()))
        .unwrap();
    builder
        .put_file("/b", file_info(payload.len() as u64, 2), Cursor::new(payload.clone()))
        .unwrap();
    let header = builder.finalize().unwrap();

    let snapshot = Snapshot::open(Arc::clone(&repo), &header.snapshot_id).unwrap();
    let stats = snapshot.statistics().unwrap().unwrap();
    assert!(stats.deduplicated_chunks > 0, "second identical file should dedupe its chunks");
    assert_eq!(snapshot.read_file("/a").unwrap(), snapshot.read_file("/b").unwrap());
}

#[test]
fn encrypted_repository_round_trips_and_rejects_wrong_passphrase() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FsBackend::init(dir.path()).unwrap());
    let opts = CreateOptions {
        passphrase: Some(b"correct horse".to_vec()),
        ..CreateOptions::default()
    };
    let repo = Repository::create(Arc::clone(&backend) as Arc<dyn crate::storage::Backend>, opts).unwrap();

    let mut builder = repo.begin_snapshot();
    builder.put_file("/secret", file_info(5, 1), Cursor::new(b"s3cr3".to_vec())).unwrap();
    let header = builder.finalize().unwrap();

    assert!(Repository::open(backend.clone() as Arc<dyn crate::storage::Backend>, None).is_err());
    assert!(Repository::open(backend.clone() as Arc<dyn crate::storage::Backend>, Some(b"wrong")).is_err());

    let reopened = Repository::open(backend as Arc<dyn crate::storage::Backend>, Some(b"correct horse")).unwrap();
    let snapshot = Snapshot::open(reopened, &header.snapshot_id).unwrap();
    assert_eq!(snapshot.read_file("/secret").unwrap(), b"s3cr3");
}

#[test]
fn check_fast_and_full_report_no_corruption_on_a_healthy_snapshot() {
    let (_dir, repo) = fresh_repo(None);
    let mut builder = repo.begin_snapshot();
    builder
        .put_file("/file", file_info(3, 1), Cursor::new(b"abc".to_vec()))
        .unwrap();
    let header = builder.finalize().unwrap();

    let fast = check(&repo, &header.snapshot_id, CheckMode::Fast).unwrap();
    assert!(fast.is_ok());
    let full = check(&repo, &header.snapshot_id, CheckMode::Full).unwrap();
    assert!(full.is_ok());
    assert!(full.chunks_checked > 0);
}

#[test]
fn check_detects_a_missing_packfile() {
    let (_dir, repo) = fresh_repo(None);
    let mut builder = repo.begin_snapshot();
    builder
        .put_file("/file", file_info(3, 1), Cursor::new(b"xyz".to_vec()))
        .unwrap();
    let header = builder.finalize().unwrap();

    for digest in repo.backend().list(crate::storage::Namespace::Packfile).unwrap() {
        repo.backend().delete(crate::storage::Namespace::Packfile, &digest).unwrap();
    }

    let full = check(&repo, &header.snapshot_id, CheckMode::Full).unwrap();
    assert!(!full.is_ok());
}

#[test]
fn delete_snapshot_removes_header_and_state_summary() {
    let (_dir, repo) = fresh_repo(None);
    let mut builder = repo.begin_snapshot();
    builder.put_file("/f", file_info(1, 1), Cursor::new(b"x".to_vec())).unwrap();
    let header = builder.finalize().unwrap();

    assert_eq!(repo.list_snapshots().unwrap().len(), 1);
    Snapshot::delete(&repo, &header.snapshot_id).unwrap();
    assert_eq!(repo.list_snapshots().unwrap().len(), 0);
    assert!(Snapshot::open(Arc::clone(&repo), &header.snapshot_id).is_err());
}

#[test]
fn backup_path_walks_a_real_directory_tree() {
    let src = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(src.path().join("sub")).unwrap();
    std::fs::write(src.path().join("top.txt"), b"top level file").unwrap();
    std::fs::write(src.path().join("sub/nested.txt"), b"nested file contents").unwrap();

    let (_dir, repo) = fresh_repo(None);
    let header = backup_path(Arc::clone(&repo), src.path()).unwrap();
    assert!(header.summary.files >= 2);

    let snapshot = Snapshot::open(repo, &header.snapshot_id).unwrap();
    let files = snapshot.list_files();
    assert!(files.iter().any(|f| f.ends_with("top.txt")));
    assert!(files.iter().any(|f| f.ends_with("nested.txt")));
}
