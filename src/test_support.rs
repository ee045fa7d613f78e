//! Fixtures shared by unit tests.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;

static CWD_LOCK: Mutex<()> = Mutex::new(());

/// Serialize tests that read or change the process working directory.
pub fn lock_cwd() -> MutexGuard<'static, ()> {
    CWD_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A source tree plus a runfiles-style sandbox whose files are symlinks into it.
///
/// Layout, under a canonicalized temp root:
///   src/proj/{entry,dep,plugin}.mjs
///   sandbox/bin.runfiles/_main/proj/{entry,dep,plugin}.mjs -> src/proj/...
pub struct SymlinkSandbox {
    _dir: TempDir,
    root: PathBuf,
}

impl SymlinkSandbox {
    pub const FILES: &'static [&'static str] = &["entry.mjs", "dep.mjs", "plugin.mjs"];

    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = fs::canonicalize(dir.path()).expect("canonicalize temp dir");
        let sandbox = Self { _dir: dir, root };
        fs::create_dir_all(sandbox.source_dir()).expect("create source dir");
        fs::create_dir_all(sandbox.sandbox_dir()).expect("create sandbox dir");
        for name in Self::FILES {
            fs::write(sandbox.source_file(name), format!("// {name}\n")).expect("write source");
            std::os::unix::fs::symlink(sandbox.source_file(name), sandbox.sandbox_file(name))
                .expect("link sandbox file");
        }
        sandbox
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_root(&self) -> PathBuf {
        self.root.join("src")
    }

    pub fn source_dir(&self) -> PathBuf {
        self.source_root().join("proj")
    }

    pub fn source_file(&self, name: &str) -> PathBuf {
        self.source_dir().join(name)
    }

    pub fn sandbox_dir(&self) -> PathBuf {
        self.root.join("sandbox/bin.runfiles/_main/proj")
    }

    pub fn sandbox_file(&self, name: &str) -> PathBuf {
        self.sandbox_dir().join(name)
    }
}
