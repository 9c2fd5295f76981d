//! Tree node: owns only a string inode key plus its named children,
//! an arena-and-index split — the inode record itself lives in
//! [`super::Index`]'s flat `inodes` map, not on the node. Locking is
//! per-node, not one lock over the whole tree.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct Node {
    inode_key: Mutex<String>,
    pub(super) children: Mutex<HashMap<String, Arc<Node>>>,
}

impl Node {
    pub fn new() -> Arc<Node> {
        Arc::new(Node::default())
    }

    pub(super) fn set_inode_key(&self, key: String) {
        *self.inode_key.lock().unwrap() = key;
    }

    pub(super) fn inode_key(&self) -> String {
        self.inode_key.lock().unwrap().clone()
    }

    pub(super) fn child(&self, name: &str) -> Option<Arc<Node>> {
        self.children.lock().unwrap().get(name).cloned()
    }

    pub(super) fn child_or_insert(&self, name: &str) -> Arc<Node> {
        self.children
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(Node::new)
            .clone()
    }

    pub(super) fn child_names(&self) -> Vec<String> {
        self.children.lock().unwrap().keys().cloned().collect()
    }

    pub(super) fn children_snapshot(&self) -> Vec<(String, Arc<Node>)> {
        self.children
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
