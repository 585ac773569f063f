//! Common assertions for xtract testing

use anyhow::Result;
use filetime::FileTime;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// What a tree node is, with file contents reduced to a blake3 digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Dir,
    File(String),
    Symlink(PathBuf),
}

/// Every node under `root`, keyed by its path relative to `root`
pub fn tree_digest(root: &Path) -> Result<BTreeMap<PathBuf, Node>> {
    let mut nodes = BTreeMap::new();

    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(root)?.to_path_buf();
        let file_type = entry.file_type();

        let node = if file_type.is_symlink() {
            Node::Symlink(fs::read_link(entry.path())?)
        } else if file_type.is_dir() {
            Node::Dir
        } else {
            let content = fs::read(entry.path())?;
            Node::File(blake3::hash(&content).to_hex().to_string())
        };
        nodes.insert(relative, node);
    }

    Ok(nodes)
}

/// Asserts that two directory trees hold the same paths and identical bytes
pub fn assert_trees_equal(left: &Path, right: &Path) -> Result<()> {
    let left_nodes = tree_digest(left)?;
    let right_nodes = tree_digest(right)?;

    let left_paths: Vec<_> = left_nodes.keys().collect();
    let right_paths: Vec<_> = right_nodes.keys().collect();
    assert_eq!(left_paths, right_paths, "Different entries under {:?} and {:?}", left, right);

    for (path, node) in &left_nodes {
        assert_eq!(Some(node), right_nodes.get(path), "Content mismatch for {:?}", path);
    }

    Ok(())
}

/// Asserts the paths relative to `root` are exactly `expected`
pub fn assert_tree_paths(root: &Path, expected: &[&str]) -> Result<()> {
    let actual: Vec<PathBuf> = tree_digest(root)?.into_keys().collect();
    let mut expected: Vec<PathBuf> = expected.iter().map(PathBuf::from).collect();
    expected.sort();
    assert_eq!(actual, expected, "Unexpected tree under {:?}", root);
    Ok(())
}

/// Asserts that a file has specific permissions (Unix only)
#[cfg(unix)]
pub fn assert_file_permissions(path: &Path, expected: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path)?;
    let mode = metadata.permissions().mode() & 0o7777;

    assert_eq!(
        mode, expected,
        "Permission mismatch for {:?}: expected {:o}, got {:o}",
        path, expected, mode
    );

    Ok(())
}

/// Asserts the modification time of `path` (not following symlinks)
pub fn assert_mtime(path: &Path, expected_seconds: i64) -> Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    let mtime = FileTime::from_last_modification_time(&metadata);
    assert_eq!(
        mtime.unix_seconds(),
        expected_seconds,
        "Modification time mismatch for {:?}",
        path
    );
    Ok(())
}

/// Asserts an archive left nothing behind at `path`
pub fn assert_absent(path: &Path) {
    assert!(
        fs::symlink_metadata(path).is_err(),
        "{:?} should not exist",
        path
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestDir;

    #[test]
    fn test_identical_trees() {
        let a = TestDir::new().unwrap();
        let b = TestDir::new().unwrap();
        for dir in [&a, &b] {
            dir.create_file("x/y.txt", b"same").unwrap();
            dir.create_dir("empty").unwrap();
        }
        assert_trees_equal(a.path(), b.path()).unwrap();
        assert_tree_paths(a.path(), &["x", "x/y.txt", "empty"]).unwrap();
    }

    #[test]
    #[should_panic(expected = "Content mismatch")]
    fn test_different_content_panics() {
        let a = TestDir::new().unwrap();
        let b = TestDir::new().unwrap();
        a.create_file("f", b"one").unwrap();
        b.create_file("f", b"two").unwrap();
        let _ = assert_trees_equal(a.path(), b.path());
    }
}
