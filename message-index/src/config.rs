use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Documents committed per write batch.
pub const DEFAULT_BATCH_SIZE: usize = 250;
pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 200;
pub const DEFAULT_WRITER_MEMORY_BYTES: usize = 50_000_000;
/// Tantivy refuses writer budgets below 15 MB per indexing thread.
pub const MIN_WRITER_MEMORY_BYTES: usize = 15_000_000;
pub const DEFAULT_SNIPPET_MAX_CHARS: usize = 150;
pub const DEFAULT_SNIPPET_FRAGMENTS: usize = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index root directory (tantivy segments + metadata table).
    pub path: PathBuf,
    pub batch_size: usize,
    pub writer_memory_bytes: usize,
    pub default_limit: usize,
    pub max_limit: usize,
    pub snippet_max_chars: usize,
    pub snippet_max_fragments: usize,
    /// Base directory of the decrypted dataset, used for fingerprinting.
    pub data_dir: Option<PathBuf>,
    pub groups: Vec<FileGroupConfig>,
}

/// Named set of data files, matched by glob patterns relative to `data_dir`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileGroupConfig {
    pub name: String,
    pub patterns: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {path}: {message}")]
    Io { path: String, message: String },
    #[error("parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("target/demo/chatlog-index"),
            batch_size: DEFAULT_BATCH_SIZE,
            writer_memory_bytes: DEFAULT_WRITER_MEMORY_BYTES,
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
            snippet_max_chars: DEFAULT_SNIPPET_MAX_CHARS,
            snippet_max_fragments: DEFAULT_SNIPPET_FRAGMENTS,
            data_dir: None,
            groups: Vec::new(),
        }
    }
}

impl IndexConfig {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: IndexConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".into()));
        }
        if self.writer_memory_bytes < MIN_WRITER_MEMORY_BYTES {
            return Err(ConfigError::Invalid(format!(
                "writer_memory_bytes must be >= {MIN_WRITER_MEMORY_BYTES}"
            )));
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(ConfigError::Invalid("default_limit must be in 1..=max_limit".into()));
        }
        if self.snippet_max_chars == 0 {
            return Err(ConfigError::Invalid("snippet_max_chars must be > 0".into()));
        }
        for g in &self.groups {
            if g.name.trim().is_empty() {
                return Err(ConfigError::Invalid("file group name must not be empty".into()));
            }
            if g.patterns.is_empty() {
                let msg = format!("file group '{}' has no patterns", g.name);
                return Err(ConfigError::Invalid(msg));
            }
            for p in &g.patterns {
                globset::Glob::new(p)
                    .map_err(|e| ConfigError::Invalid(format!("file group '{}': {e}", g.name)))?;
            }
        }
        Ok(())
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    /// Clamp a requested page to the configured bounds: `limit <= 0` becomes
    /// `default_limit`, anything above `max_limit` is capped, negative offsets become 0.
    pub fn clamp_page(&self, limit: i64, offset: i64) -> (usize, usize) {
        let limit = if limit <= 0 {
            self.default_limit
        } else {
            (limit as u64).min(self.max_limit as u64) as usize
        };
        (limit, offset.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_documented_constants() {
        let c = IndexConfig::default();
        assert_eq!(c.batch_size, 250);
        assert_eq!(c.clamp_page(0, 0), (20, 0));
        assert_eq!(c.clamp_page(500, 0), (200, 0));
        assert_eq!(c.clamp_page(10, -5), (10, 0));
        assert_eq!(c.clamp_page(-3, 7), (20, 7));
    }

    #[test]
    fn parses_groups_from_toml() {
        let c = IndexConfig::from_toml_str(
            r#"
            path = "/var/lib/chatlog/index"
            data_dir = "/var/lib/chatlog/decrypted"

            [[groups]]
            name = "message"
            patterns = ["message/message_*.db"]

            [[groups]]
            name = "contact"
            patterns = ["contact/*.db"]
            "#,
        )
        .unwrap();
        assert_eq!(c.path, PathBuf::from("/var/lib/chatlog/index"));
        assert_eq!(c.group_names(), vec!["message", "contact"]);
        assert_eq!(c.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn rejects_zero_batch_and_bad_limits() {
        assert!(matches!(
            IndexConfig::from_toml_str("batch_size = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            IndexConfig::from_toml_str("default_limit = 50\nmax_limit = 10"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_invalid_glob() {
        let err = IndexConfig::from_toml_str("[[groups]]\nname = \"x\"\npatterns = [\"a[\"]")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unparsable_toml_is_a_parse_error() {
        assert!(matches!(
            IndexConfig::from_toml_str("batch_size = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
