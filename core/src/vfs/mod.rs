//! Virtual filesystem index: interned pathnames, inode
//! deduplication, a locked tree, and a flat `stat_info` projection.
//! Plain std collections behind a small struct, an `apply`/`build`-style
//! mutator, coarse locks per table, following the "cyclic ownership"
//! design: tree nodes own only inode-key strings, the inode table owns
//! the records.

mod node;

pub use node::Node;

use crate::error::{EngineError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Everything a snapshot records about one filesystem entry. `dev`/`ino`
/// form the inode key that dedups hardlinked or repeat-visited paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub mode: u32,
    pub mtime: i64,
    pub size: u64,
    pub dev: u64,
    pub ino: u64,
}

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_regular(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    fn inode_key(&self) -> String {
        format!("{},{}", self.dev, self.ino)
    }
}

/// Aggregate counters kept in step with `build`/`reindex`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub files: u64,
    pub directories: u64,
    pub total_size: u64,
}

#[derive(Default)]
pub struct Index {
    pathnames: Mutex<HashMap<String, u64>>,
    pathnames_inverse: Mutex<HashMap<u64, String>>,
    next_id: AtomicU64,
    inodes: Mutex<HashMap<String, FileInfo>>,
    root: Arc<Node>,
    stat_info: Mutex<HashMap<String, FileInfo>>,
    symlinks: Mutex<HashMap<String, String>>,
    summary: Mutex<Summary>,
}

/// Clean a path to its canonical form: always absolute, `.` maps to
/// `"/"`, `..` pops a segment, repeated/trailing slashes collapse
///.
fn normalize(path: &str) -> String {
    if path.is_empty() || path == "." {
        return "/".to_string();
    }
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    if out.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", out.join("/"))
    }
}

/// Path atoms to descend through from the root; `"/"` itself yields no
/// atoms.
fn atoms(clean_path: &str) -> Vec<&str> {
    if clean_path == "/" {
        Vec::new()
    } else {
        clean_path.trim_start_matches('/').split('/').collect()
    }
}

impl Index {
    pub fn new() -> Self {
        Index::default()
    }

    fn intern(&self, path: &str) -> u64 {
        let mut pathnames = self.pathnames.lock().unwrap();
        if let Some(&id) = pathnames.get(path) {
            return id;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        pathnames.insert(path.to_string(), id);
        self.pathnames_inverse.lock().unwrap().insert(id, path.to_string());
        id
    }

    /// Split `path` by `/`, descend creating missing nodes, assign the
    /// inode key, record it in `inodes` if new, and store `info` in
    /// `stat_info[path]`.
    pub fn build(&self, path: &str, info: FileInfo) -> Result<()> {
        let clean = normalize(path);
        self.intern(&clean);

        let inode_key = info.inode_key();
        self.inodes.lock().unwrap().entry(inode_key.clone()).or_insert(info);

        let mut current = self.root.clone();
        for atom in atoms(&clean) {
            current = current.child_or_insert(atom);
        }
        current.set_inode_key(inode_key);

        let was_new = self
            .stat_info
            .lock()
            .unwrap()
            .insert(clean.clone(), info)
            .is_none();
        if was_new {
            let mut summary = self.summary.lock().unwrap();
            if info.is_dir() {
                summary.directories += 1;
            } else if info.is_regular() {
                summary.files += 1;
                summary.total_size += info.size;
            }
        }
        Ok(())
    }

    /// Record a symlink target verbatim; never dereferenced.
    pub fn record_symlink(&self, path: &str, target: &str) {
        let clean = normalize(path);
        self.intern(&clean);
        self.symlinks.lock().unwrap().insert(clean, target.to_string());
    }

    pub fn symlink_target(&self, path: &str) -> Option<String> {
        self.symlinks.lock().unwrap().get(&normalize(path)).cloned()
    }

    /// Canonicalize `path`, descend atom-by-atom; `"/"` returns the
    /// root with no descent.
    pub fn lookup(&self, path: &str) -> Result<Arc<Node>> {
        let clean = normalize(path);
        if clean == "/" {
            return Ok(self.root.clone());
        }
        let mut current = self.root.clone();
        for atom in atoms(&clean) {
            current = current
                .child(atom)
                .ok_or_else(|| EngineError::not_found(clean.clone()))?;
        }
        Ok(current)
    }

    fn inode_of(&self, node: &Node, path_for_error: &str) -> Result<FileInfo> {
        let key = node.inode_key();
        self.inodes
            .lock()
            .unwrap()
            .get(&key)
            .copied()
            .ok_or_else(|| EngineError::not_found(path_for_error.to_string()))
    }

    pub fn lookup_inode_for_file(&self, path: &str) -> Result<FileInfo> {
        let node = self.lookup(path)?;
        let info = self.inode_of(&node, path)?;
        if !info.is_regular() {
            return Err(EngineError::not_found(path.to_string()));
        }
        Ok(info)
    }

    pub fn lookup_inode_for_directory(&self, path: &str) -> Result<FileInfo> {
        let clean = normalize(path);
        let node = self.lookup(&clean)?;
        if clean == "/" {
            if let Ok(info) = self.inode_of(&node, &clean) {
                return Ok(info);
            }
            return Ok(FileInfo {
                mode: S_IFDIR | 0o755,
                mtime: 0,
                size: 0,
                dev: 0,
                ino: 0,
            });
        }
        let info = self.inode_of(&node, &clean)?;
        if !info.is_dir() {
            return Err(EngineError::not_found(clean));
        }
        Ok(info)
    }

    /// Sorted child names of the node at `path`; non-directory ->
    /// `NotADirectory`.
    pub fn lookup_children(&self, path: &str) -> Result<Vec<String>> {
        let clean = normalize(path);
        let node = self.lookup(&clean)?;
        if clean != "/" {
            match self.inode_of(&node, &clean) {
                Ok(info) if info.is_dir() => {}
                _ => return Err(EngineError::NotADirectory(clean)),
            }
        }
        let mut names = node.child_names();
        names.sort();
        Ok(names)
    }

    pub fn list_files(&self) -> Vec<String> {
        self.list_where(FileInfo::is_regular)
    }

    pub fn list_directories(&self) -> Vec<String> {
        self.list_where(FileInfo::is_dir)
    }

    pub fn list_non_regular(&self) -> Vec<String> {
        self.list_where(|info| !info.is_regular())
    }

    fn list_where(&self, pred: impl Fn(&FileInfo) -> bool) -> Vec<String> {
        let mut out: Vec<String> = self
            .stat_info
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, info)| pred(info))
            .map(|(path, _)| path.clone())
            .collect();
        out.sort();
        out
    }

    pub fn summary(&self) -> Summary {
        *self.summary.lock().unwrap()
    }

    /// Rebuild `pathnames_inverse` from `pathnames`; clear and rebuild
    /// `stat_info` by a recursive walk from `"/"`, accumulating
    /// `summary` along the way.
    pub fn reindex(&self) -> Result<()> {
        {
            let pathnames = self.pathnames.lock().unwrap();
            let mut inverse = self.pathnames_inverse.lock().unwrap();
            inverse.clear();
            for (path, id) in pathnames.iter() {
                inverse.insert(*id, path.clone());
            }
        }

        let mut rebuilt = HashMap::new();
        let mut summary = Summary::default();
        self.walk(&self.root, "/", &mut rebuilt, &mut summary);

        *self.stat_info.lock().unwrap() = rebuilt;
        *self.summary.lock().unwrap() = summary;
        Ok(())
    }

    fn walk(&self, node: &Node, path: &str, out: &mut HashMap<String, FileInfo>, summary: &mut Summary) {
        let key = node.inode_key();
        if !key.is_empty() {
            if let Some(info) = self.inodes.lock().unwrap().get(&key).copied() {
                out.insert(path.to_string(), info);
                if info.is_dir() {
                    summary.directories += 1;
                } else if info.is_regular() {
                    summary.files += 1;
                    summary.total_size += info.size;
                }
            }
        }
        for (name, child) in node.children_snapshot() {
            let child_path = if path == "/" {
                format!("/{name}")
            } else {
                format!("{path}/{name}")
            };
            self.walk(&child, &child_path, out, summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(dev: u64, ino: u64, mode: u32, size: u64) -> FileInfo {
        FileInfo {
            mode,
            mtime: 0,
            size,
            dev,
            ino,
        }
    }

    #[test]
    fn root_lookup_never_descends() {
        let idx = Index::new();
        let root = idx.lookup("/").unwrap();
        assert!(Arc::ptr_eq(&root, &idx.root));
    }

    #[test]
    fn build_then_lookup_nested_file() {
        let idx = Index::new();
        idx.build("/a/b/c.txt", info(1, 10, S_IFREG | 0o644, 42)).unwrap();
        let node = idx.lookup("/a/b/c.txt").unwrap();
        assert_eq!(node.inode_key(), "1,10");
        assert!(idx.lookup("/a/b/missing").is_err());
    }

    #[test]
    fn lookup_children_are_sorted() {
        let idx = Index::new();
        idx.build("/dir", info(1, 1, S_IFDIR | 0o755, 0)).unwrap();
        idx.build("/dir/zeta", info(1, 2, S_IFREG | 0o644, 1)).unwrap();
        idx.build("/dir/alpha", info(1, 3, S_IFREG | 0o644, 1)).unwrap();
        let children = idx.lookup_children("/dir").unwrap();
        assert_eq!(children, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn lookup_children_of_a_file_is_not_a_directory() {
        let idx = Index::new();
        idx.build("/f", info(1, 1, S_IFREG | 0o644, 0)).unwrap();
        assert!(matches!(
            idx.lookup_children("/f").unwrap_err(),
            EngineError::NotADirectory(_)
        ));
    }

    #[test]
    fn hardlinked_paths_share_one_inode_record() {
        let idx = Index::new();
        idx.build("/a", info(9, 99, S_IFREG | 0o644, 5)).unwrap();
        idx.build("/b", info(9, 99, S_IFREG | 0o644, 5)).unwrap();
        assert_eq!(idx.inodes.lock().unwrap().len(), 1);
        assert_eq!(idx.summary().files, 2);
    }

    #[test]
    fn symlinks_are_recorded_verbatim_never_dereferenced() {
        let idx = Index::new();
        idx.record_symlink("/link", "../elsewhere/target");
        assert_eq!(idx.symlink_target("/link").unwrap(), "../elsewhere/target");
    }

    #[test]
    fn reindex_rebuilds_stat_info_and_summary_from_the_tree() {
        let idx = Index::new();
        idx.build("/dir", info(1, 1, S_IFDIR | 0o755, 0)).unwrap();
        idx.build("/dir/file", info(1, 2, S_IFREG | 0o644, 100)).unwrap();
        idx.reindex().unwrap();
        let summary = idx.summary();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.directories, 1);
        assert_eq!(summary.total_size, 100);
        assert!(idx.list_files().contains(&"/dir/file".to_string()));
        assert!(idx.list_directories().contains(&"/dir".to_string()));
    }
}
