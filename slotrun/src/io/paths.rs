//! Canonical filesystem layout under a sandbox root.

use std::path::PathBuf;

/// All canonical paths for a sandbox root directory.
#[derive(Debug, Clone)]
pub struct SandboxPaths {
    pub root: PathBuf,
    /// Instruction-set files, one `.txt` per set.
    pub sets_dir: PathBuf,
    /// Hash-sharded artifact store.
    pub store_dir: PathBuf,
    pub config_path: PathBuf,
}

impl SandboxPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            sets_dir: root.join("sets"),
            store_dir: root.join("store"),
            config_path: root.join("slotrun.toml"),
            root,
        }
    }
}
