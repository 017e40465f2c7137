//! Dataset fingerprinting.
//!
//! A fingerprint is a SHA-256 over the `(group, relative path, size, mtime)`
//! of every file backing the requested groups. It changes whenever a file is
//! added, removed, resized or touched, and lets the caller decide whether the
//! index must be rebuilt without reading any file content.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::IndexConfig;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The group currently has no files; fingerprinting treats it as empty.
    #[error("no files for group {0}")]
    NotFound(String),
    #[error("unknown file group {0}")]
    UnknownGroup(String),
    #[error("invalid pattern: {0}")]
    Pattern(String),
    #[error("data directory not configured")]
    Unconfigured,
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("resolve group {group}: {source}")]
    Source { group: String, source: SourceError },
    #[error("stat {path}: {message}")]
    Stat { path: String, message: String },
}

/// Resolves named file groups to the files currently backing them.
pub trait FileGroupSource {
    /// Paths in the fingerprint are made relative to this directory.
    fn base_dir(&self) -> &Path;

    /// Files of `group`. An empty group is reported as [`SourceError::NotFound`].
    fn group_files(&self, group: &str) -> Result<Vec<PathBuf>, SourceError>;
}

struct FileEntry {
    group: String,
    rel: String,
    size: u64,
    mtime_nanos: i128,
}

/// Fingerprint of `groups` as seen through `source`; `""` when no group is
/// requested or none of them has files.
pub fn fingerprint<G: AsRef<str>>(
    source: &dyn FileGroupSource,
    groups: &[G],
) -> Result<String, FingerprintError> {
    if groups.is_empty() {
        return Ok(String::new());
    }
    let groups: BTreeSet<&str> = groups.iter().map(|g| g.as_ref()).collect();

    let mut entries = Vec::new();
    for group in groups {
        let files = match source.group_files(group) {
            Ok(files) => files,
            Err(SourceError::NotFound(_)) => continue,
            Err(source) => {
                return Err(FingerprintError::Source { group: group.to_string(), source })
            }
        };
        for path in files {
            let meta = match std::fs::metadata(&path) {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(stat_error(&path, e)),
            };
            let modified = meta.modified().map_err(|e| stat_error(&path, e))?;
            let mtime_nanos = match modified.duration_since(UNIX_EPOCH) {
                Ok(d) => d.as_nanos() as i128,
                Err(e) => -(e.duration().as_nanos() as i128),
            };
            entries.push(FileEntry {
                group: group.to_string(),
                rel: relative_slash_path(source.base_dir(), &path),
                size: meta.len(),
                mtime_nanos,
            });
        }
    }
    if entries.is_empty() {
        return Ok(String::new());
    }
    entries.sort_by(|a, b| (&a.group, &a.rel).cmp(&(&b.group, &b.rel)));

    let mut hasher = Sha256::new();
    for e in &entries {
        hasher.update(format!("{}|{}|{}|{};", e.group, e.rel, e.size, e.mtime_nanos).as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    debug!(files = entries.len(), fingerprint = %digest, "dataset fingerprint computed");
    Ok(digest)
}

fn stat_error(path: &Path, e: std::io::Error) -> FingerprintError {
    FingerprintError::Stat { path: path.display().to_string(), message: e.to_string() }
}

fn relative_slash_path(base: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

/// File groups defined as glob patterns over a directory tree.
pub struct DirectoryFileGroups {
    base: PathBuf,
    groups: BTreeMap<String, GlobSet>,
}

impl DirectoryFileGroups {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into(), groups: BTreeMap::new() }
    }

    /// Patterns match paths relative to the base directory, `*` stays within one segment.
    pub fn with_group<S: AsRef<str>>(
        mut self,
        name: &str,
        patterns: &[S],
    ) -> Result<Self, SourceError> {
        let mut builder = GlobSetBuilder::new();
        for p in patterns {
            let glob = GlobBuilder::new(p.as_ref())
                .literal_separator(true)
                .build()
                .map_err(|e| SourceError::Pattern(e.to_string()))?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| SourceError::Pattern(e.to_string()))?;
        self.groups.insert(name.to_string(), set);
        Ok(self)
    }

    pub fn from_config(config: &IndexConfig) -> Result<Self, SourceError> {
        let base = config.data_dir.clone().ok_or(SourceError::Unconfigured)?;
        config
            .groups
            .iter()
            .try_fold(Self::new(base), |acc, g| acc.with_group(&g.name, &g.patterns))
    }
}

impl FileGroupSource for DirectoryFileGroups {
    fn base_dir(&self) -> &Path {
        &self.base
    }

    fn group_files(&self, group: &str) -> Result<Vec<PathBuf>, SourceError> {
        let set = self
            .groups
            .get(group)
            .ok_or_else(|| SourceError::UnknownGroup(group.to_string()))?;
        if !self.base.is_dir() {
            return Err(SourceError::NotFound(group.to_string()));
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.base) {
            let entry = entry.map_err(|e| SourceError::Io(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = relative_slash_path(&self.base, entry.path());
            if set.is_match(&rel) {
                files.push(entry.into_path());
            }
        }
        if files.is_empty() {
            return Err(SourceError::NotFound(group.to_string()));
        }
        files.sort();
        Ok(files)
    }
}
