//! Sandbox configuration stored at `<root>/slotrun.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Sandbox configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values; a missing file is
/// equivalent to an empty one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Per-fragment wall-clock bound in seconds (process strategy).
    pub exec_timeout_secs: u64,

    /// Truncate captured fragment output beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Evaluation fuel per fragment (template strategy).
    pub template_fuel: u64,

    /// Which execution strategy serves batch requests.
    pub strategy: StrategyKind,

    /// Interpreter command for the process strategy (e.g. `["sh"]`).
    pub interpreter: Vec<String>,
}

/// Execution strategy selector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Template,
    Process,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            exec_timeout_secs: 60,
            output_limit_bytes: 100_000,
            template_fuel: 1_000_000,
            strategy: StrategyKind::Template,
            interpreter: vec!["sh".to_string()],
        }
    }
}

impl SandboxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.exec_timeout_secs == 0 {
            return Err(anyhow!("exec_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.template_fuel == 0 {
            return Err(anyhow!("template_fuel must be > 0"));
        }
        if self.interpreter.is_empty() || self.interpreter[0].trim().is_empty() {
            return Err(anyhow!("interpreter must be a non-empty array"));
        }
        Ok(())
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SandboxConfig::default()`.
pub fn load_config(path: &Path) -> Result<SandboxConfig> {
    if !path.exists() {
        let cfg = SandboxConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SandboxConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SandboxConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
