//! Shared test infrastructure for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const SOURCE_ENV: &str = "BUILD_WORKSPACE_DIRECTORY";

/// A source tree plus a runfiles-style sandbox of symlinks pointing into it.
pub struct Sandbox {
    _dir: TempDir,
    root: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = fs::canonicalize(dir.path()).expect("canonicalize temp dir");
        let sandbox = Self { _dir: dir, root };
        fs::create_dir_all(sandbox.source_dir()).expect("create source dir");
        fs::create_dir_all(sandbox.sandbox_dir()).expect("create sandbox dir");
        for name in ["entry.mjs", "dep.mjs", "plugin.mjs"] {
            fs::write(sandbox.source_dir().join(name), format!("// {name}\n"))
                .expect("write source file");
            std::os::unix::fs::symlink(
                sandbox.source_dir().join(name),
                sandbox.sandbox_dir().join(name),
            )
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

    pub fn sandbox_dir(&self) -> PathBuf {
        self.root.join("sandbox/bin.runfiles/_main/proj")
    }

    /// `sbv` started inside the sandbox directory with a clean mode signal.
    pub fn sbv(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_sbv"));
        command
            .current_dir(self.sandbox_dir())
            .env_remove(SOURCE_ENV)
            .env_remove("RUST_LOG");
        command
    }

    /// Same as [`Sandbox::sbv`], in RUN mode against this source tree.
    pub fn sbv_run_mode(&self) -> Command {
        let mut command = self.sbv();
        command.env(SOURCE_ENV, self.source_root());
        command
    }
}

pub fn run(command: &mut Command) -> Output {
    command.output().expect("spawn sbv")
}

pub fn exit_code(output: &Output) -> i32 {
    output.status.code().expect("sbv exited by signal")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
