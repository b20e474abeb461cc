// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File { executable: bool },
    Dir,
    /// Points at another path; followed by `canonicalize`.
    Symlink(PathBuf),
}

/// In-memory filesystem for tests.
///
/// Paths are expected to be absolute. Parent directories are created
/// implicitly.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.add_dir("/");
        fs
    }

    pub fn add_file(&self, path: impl AsRef<Path>, executable: bool) {
        self.insert(path.as_ref(), MockEntry::File { executable });
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.insert(path.as_ref(), MockEntry::Dir);
    }

    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        self.insert(path.as_ref(), MockEntry::Symlink(target.as_ref().to_path_buf()));
    }

    fn insert(&self, path: &Path, entry: MockEntry) {
        let mut entries = self.entries.lock().unwrap();
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            entries
                .entry(ancestor.to_path_buf())
                .or_insert(MockEntry::Dir);
        }
        entries.insert(path.to_path_buf(), entry);
    }

    fn get(&self, path: &Path) -> Option<MockEntry> {
        self.entries.lock().unwrap().get(path).cloned()
    }
}

/// Lexically normalise `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl FileSystem for MockFileSystem {
    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        let mut current = normalize(path);
        // Bounded so a symlink loop can't spin forever.
        for _ in 0..16 {
            match self.get(&current) {
                Some(MockEntry::Symlink(target)) => current = normalize(&target),
                Some(_) => return Ok(current),
                None => return Err(anyhow!("No such file or directory: {:?}", path)),
            }
        }
        Err(anyhow!("Too many levels of symbolic links: {:?}", path))
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.get(path), Some(MockEntry::File { .. }))
    }

    fn is_executable(&self, path: &Path) -> bool {
        matches!(self.get(path), Some(MockEntry::File { executable: true }))
    }
}
