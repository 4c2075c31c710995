//! Hash-sharded artifact store.
//!
//! Every artifact lives at a path derived purely from its slug: the first
//! three byte pairs of the slug's SHA-256 hex digest become nested
//! directories, keeping any one directory small no matter how many
//! artifacts accumulate. Each artifact has a JSON sidecar recording slug,
//! size, timestamp, and shard depth.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

/// Directory levels between the root and an artifact.
pub const SHARD_LEVELS: usize = 3;

/// Retry ceiling for ingestion collision suffixes.
const MAX_INGEST_ATTEMPTS: u32 = 1000;

/// Runs of characters outside the safe slug alphabet collapse to one `_`.
static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Sharded store rooted at one directory.
#[derive(Debug, Clone)]
pub struct ShardStore {
    root: PathBuf,
}

/// Where and as what an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Final slug; ingestion may have appended a collision suffix.
    pub slug: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Sidecar metadata written next to every artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardSidecar {
    pub slug: String,
    pub bytes: u64,
    /// RFC 3339 timestamp of the store operation.
    pub stored_at: String,
    pub levels: usize,
}

impl ShardStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute the artifact path for a slug.
    ///
    /// Pure for `create_dirs = false`. With `create_dirs = true` the shard
    /// directories are created first; an already-existing directory, racing
    /// creator included, is success.
    pub fn locate(&self, slug: &str, create_dirs: bool) -> Result<PathBuf> {
        let slug = sanitize_slug(slug)?;
        let dir = self.shard_dir(&slug);
        if create_dirs {
            fs::create_dir_all(&dir)
                .with_context(|| format!("create shard dir {}", dir.display()))?;
        }
        Ok(dir.join(format!("{slug}.csv")))
    }

    /// Store content under a slug, overwriting any previous artifact.
    ///
    /// The sidecar is rewritten on every store, so it always describes the
    /// latest content.
    #[instrument(skip(self, content))]
    pub fn store(&self, slug: &str, content: &str) -> Result<StoredArtifact> {
        let slug = sanitize_slug(slug)?;
        let path = self.locate(&slug, true)?;
        fs::write(&path, content)
            .with_context(|| format!("write artifact {}", path.display()))?;
        let artifact = StoredArtifact {
            slug,
            bytes: content.len() as u64,
            path,
        };
        self.write_sidecar(&artifact)?;
        debug!(slug = %artifact.slug, bytes = artifact.bytes, "stored artifact");
        Ok(artifact)
    }

    /// Move an existing file into the store, deriving the slug from its
    /// base name (extension dropped).
    ///
    /// When the destination already holds an artifact the slug gets `_1`,
    /// `_2`, ... appended until a free path is found, bounded by a fixed
    /// ceiling. The source must live on the same filesystem as the store.
    #[instrument(skip(self))]
    pub fn ingest(&self, source: &Path) -> Result<StoredArtifact> {
        let stem = source
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| anyhow!("no usable file name in {}", source.display()))?;
        let base = sanitize_slug(stem)?;

        let mut attempt = 0u32;
        let (slug, path) = loop {
            let candidate = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}_{attempt}")
            };
            let path = self.locate(&candidate, true)?;
            if !path.exists() {
                break (candidate, path);
            }
            attempt += 1;
            if attempt > MAX_INGEST_ATTEMPTS {
                bail!(
                    "no free slug for '{}' after {} attempts",
                    base,
                    MAX_INGEST_ATTEMPTS
                );
            }
        };

        fs::rename(source, &path).with_context(|| {
            format!("move {} into store as {}", source.display(), path.display())
        })?;
        let bytes = fs::metadata(&path)
            .with_context(|| format!("stat artifact {}", path.display()))?
            .len();
        let artifact = StoredArtifact { slug, bytes, path };
        self.write_sidecar(&artifact)?;
        info!(slug = %artifact.slug, bytes = artifact.bytes, "ingested artifact");
        Ok(artifact)
    }

    /// Public URL for a slug under a base URL.
    ///
    /// The sanitized slug alphabet needs no percent-encoding, so the URL is
    /// plain path concatenation mirroring [`ShardStore::locate`].
    pub fn url_for(&self, slug: &str, base: &str) -> Result<String> {
        let slug = sanitize_slug(slug)?;
        let dirs = shard_dirs(&slug);
        Ok(format!(
            "{}/{}/{slug}.csv",
            base.trim_end_matches('/'),
            dirs.join("/")
        ))
    }

    /// Pre-create all 256 first-level shard directories.
    ///
    /// Returns how many were newly created; rerunning is a no-op.
    #[instrument(skip(self))]
    pub fn init(&self) -> Result<usize> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create store root {}", self.root.display()))?;
        let mut created = 0;
        for byte in 0..=255u8 {
            let dir = self.root.join(format!("{byte:02x}"));
            if !dir.exists() {
                fs::create_dir(&dir)
                    .with_context(|| format!("create shard dir {}", dir.display()))?;
                created += 1;
            }
        }
        info!(created, "initialized shard store");
        Ok(created)
    }

    fn shard_dir(&self, sanitized: &str) -> PathBuf {
        let mut dir = self.root.clone();
        for level in shard_dirs(sanitized) {
            dir.push(level);
        }
        dir
    }

    fn write_sidecar(&self, artifact: &StoredArtifact) -> Result<()> {
        let sidecar = ShardSidecar {
            slug: artifact.slug.clone(),
            bytes: artifact.bytes,
            stored_at: Utc::now().to_rfc3339(),
            levels: SHARD_LEVELS,
        };
        let mut buf = serde_json::to_string_pretty(&sidecar).context("serialize sidecar")?;
        buf.push('\n');
        let path = artifact.path.with_extension("json");
        fs::write(&path, buf).with_context(|| format!("write sidecar {}", path.display()))
    }
}

/// Sanitize a slug for storage.
///
/// Runs of characters outside `[A-Za-z0-9._-]` collapse to a single `_`.
/// An empty result or one containing `..` is rejected before any side
/// effect happens.
pub fn sanitize_slug(slug: &str) -> Result<String> {
    let sanitized = SLUG_RE.replace_all(slug, "_").into_owned();
    if sanitized.is_empty() {
        bail!("slug is empty after sanitization");
    }
    if sanitized.contains("..") {
        bail!("slug '{}' contains '..'", sanitized);
    }
    Ok(sanitized)
}

/// Shard directory names for a sanitized slug: the first [`SHARD_LEVELS`]
/// byte pairs of its SHA-256 hex digest.
fn shard_dirs(sanitized: &str) -> Vec<String> {
    let digest = hex::encode(Sha256::digest(sanitized.as_bytes()));
    (0..SHARD_LEVELS)
        .map(|level| digest[level * 2..level * 2 + 2].to_string())
        .collect()
}
