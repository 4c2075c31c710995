//! Test-only helpers for constructing sandbox roots on disk.

use std::path::Path;

use crate::io::paths::SandboxPaths;
use crate::io::sets::SetStore;
use crate::io::shard::ShardStore;

/// A sandbox root in a temp directory, removed when dropped.
pub struct TempSandbox {
    _temp: tempfile::TempDir,
    pub paths: SandboxPaths,
}

impl TempSandbox {
    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn sets(&self) -> SetStore {
        SetStore::new(&self.paths.sets_dir)
    }

    pub fn store(&self) -> ShardStore {
        ShardStore::new(&self.paths.store_dir)
    }
}

/// Create an empty sandbox root in a fresh temp directory.
pub fn temp_sandbox() -> TempSandbox {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = SandboxPaths::new(temp.path());
    TempSandbox { _temp: temp, paths }
}

/// Create a set and seed it with the given slot bodies.
pub fn seed_set(sandbox: &TempSandbox, name: &str, slots: &[(u32, &str)]) {
    let sets = sandbox.sets();
    sets.create(name).expect("create set");
    for (id, body) in slots {
        sets.save_slot(name, *id, body).expect("save slot");
    }
}
