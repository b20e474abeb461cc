use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary script root populated with fixture files.
pub struct ScriptDir {
    dir: TempDir,
}

impl ScriptDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp script dir"),
        }
    }

    /// Canonical path of the directory, suitable for `allowed_script_root`.
    pub fn root(&self) -> PathBuf {
        fs::canonicalize(self.dir.path()).expect("canonicalize temp dir")
    }

    /// Write an executable `#!/bin/sh` script with `body`.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.write(name, &format!("#!/bin/sh\n{body}\n"));
        set_mode(&path, 0o755);
        path
    }

    /// Write a plain, non-executable file.
    pub fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.write(name, contents);
        set_mode(&path, 0o644);
        path
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.root().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create script parent dir");
        }
        fs::write(&path, contents).expect("write script");
        path
    }
}

impl Default for ScriptDir {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).expect("chmod script");
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}
