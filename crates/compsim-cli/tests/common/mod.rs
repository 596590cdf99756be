//! Shared E2E test helpers for `compsim` binary tests.

use assert_cmd::cargo::cargo_bin_cmd;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Default timeout for basic CLI tests.
pub const TIMEOUT_BASIC: Duration = Duration::from_secs(10);

/// Environment variables the config loader reads.
const CONFIG_VARS: &[&str] = &[
    "COMPSIM_DEBUG",
    "COMPSIM_ROOT",
    "COMPSIM_TICK_MS",
    "COMPSIM_BOOT_SCRIPT",
];

/// Isolated storage root plus a template directory.
pub struct Sandbox {
    pub dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir for sandbox"),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("root")
    }

    pub fn template(&self) -> PathBuf {
        self.dir.path().join("template")
    }

    /// Writes `content` at `rel` inside the template.
    pub fn template_file(&self, rel: &str, content: &str) {
        let path = self.template().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create template dir");
        }
        fs::write(path, content).expect("write template file");
    }

    /// Metadata file of `designation`, if written.
    pub fn meta(&self, designation: &str) -> Option<String> {
        fs::read_to_string(self.root().join("machines").join(designation).join("meta.dt")).ok()
    }

    /// `compsim` isolated from the global config and `COMPSIM_*` variables,
    /// storing under [`Sandbox::root`].
    pub fn cmd(&self) -> assert_cmd::Command {
        let mut cmd: assert_cmd::Command = cargo_bin_cmd!("compsim");
        cmd.timeout(TIMEOUT_BASIC);
        for var in CONFIG_VARS {
            cmd.env_remove(var);
        }
        cmd.env_remove("RUST_LOG");
        cmd.env("HOME", self.dir.path());
        cmd.arg("--no-global-config")
            .arg("--root")
            .arg(path_arg(&self.root()));
        cmd
    }
}

pub fn path_arg(path: &Path) -> &str {
    path.to_str().expect("valid utf8")
}
