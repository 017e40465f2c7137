use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use message_model::IndexStatus;
use tantivy::directory::MmapDirectory;
use tantivy::schema::Schema;
use tantivy::{Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy};
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::meta::MetaStore;
use crate::schema::MessageSchema;
use crate::IndexError;

/// Mapping version expected by this build. Bump whenever [`MessageSchema`]
/// or the content rendering changes so stale indexes get rebuilt.
pub const SCHEMA_VERSION: &str = "1";

pub const META_SCHEMA_VERSION: &str = "schema_version";
pub const META_FINGERPRINT: &str = "fingerprint";
pub const META_LAST_BUILT: &str = "last_built_at";

const ENGINE_DIR: &str = "tantivy";
const META_FILE: &str = "index_meta.db";

/// Everything that lives only while the store is open.
pub(crate) struct Handle {
    pub(crate) index: Index,
    pub(crate) reader: IndexReader,
    pub(crate) writer: Mutex<IndexWriter>,
    pub(crate) meta: Mutex<MetaStore>,
}

impl Handle {
    fn open(root: &Path, fields: &MessageSchema, writer_memory: usize) -> Result<Self, IndexError> {
        let (index, recreated) = open_engine(&root.join(ENGINE_DIR), &fields.schema)?;
        MessageSchema::register_tokenizers(&index);
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| IndexError::Initialization(e.to_string()))?;
        let writer: IndexWriter = index
            .writer(writer_memory)
            .map_err(|e| IndexError::Initialization(format!("acquire index writer: {e}")))?;
        let meta = MetaStore::open(root.join(META_FILE))
            .map_err(|e| IndexError::Initialization(format!("open metadata: {e}")))?;
        if recreated {
            // The stored version described the discarded layout.
            meta.delete(META_SCHEMA_VERSION)
                .map_err(|e| IndexError::Initialization(format!("clear schema version: {e}")))?;
        }
        Ok(Self { index, reader, writer: Mutex::new(writer), meta: Mutex::new(meta) })
    }

    fn close(self) -> Result<(), IndexError> {
        let writer = self
            .writer
            .into_inner()
            .map_err(|_| IndexError::Storage("index writer lock poisoned".into()))?;
        writer.wait_merging_threads().map_err(|e| IndexError::Storage(e.to_string()))
    }
}

/// Open the engine under `engine_dir`, creating it when absent. An existing
/// engine whose field layout differs from `schema` is wiped and recreated
/// empty; the returned flag is `true` in that case.
fn open_engine(engine_dir: &Path, schema: &Schema) -> Result<(Index, bool), IndexError> {
    let dir = engine_directory(engine_dir)?;
    let exists = Index::exists(&dir).map_err(|e| IndexError::Initialization(e.to_string()))?;
    if !exists {
        return Ok((create_engine(dir, schema)?, false));
    }
    let existing = Index::open(dir).map_err(|e| IndexError::Initialization(e.to_string()))?;
    if existing.schema() == *schema {
        return Ok((existing, false));
    }
    warn!(path = %engine_dir.display(), "index field layout changed, recreating engine");
    drop(existing);
    std::fs::remove_dir_all(engine_dir).map_err(|e| {
        IndexError::Initialization(format!("remove {}: {e}", engine_dir.display()))
    })?;
    let dir = engine_directory(engine_dir)?;
    Ok((create_engine(dir, schema)?, true))
}

fn engine_directory(engine_dir: &Path) -> Result<MmapDirectory, IndexError> {
    std::fs::create_dir_all(engine_dir).map_err(|e| {
        IndexError::Initialization(format!("create {}: {e}", engine_dir.display()))
    })?;
    MmapDirectory::open(engine_dir).map_err(|e| IndexError::Initialization(e.to_string()))
}

fn create_engine(dir: MmapDirectory, schema: &Schema) -> Result<Index, IndexError> {
    Index::create(dir, schema.clone(), IndexSettings::default())
        .map_err(|e| IndexError::Initialization(e.to_string()))
}

fn poisoned(what: &str) -> IndexError {
    IndexError::Storage(format!("{what} lock poisoned"))
}

/// Persistent message index rooted at one directory.
///
/// Lifecycle: `open` -> ready -> (`reset` -> ready)* -> `close`. After
/// `close` every operation fails with [`IndexError::NotInitialized`].
pub struct MessageIndex {
    path: PathBuf,
    config: IndexConfig,
    fields: MessageSchema,
    handle: RwLock<Option<Handle>>,
}

impl MessageIndex {
    /// Open the index at `path`, creating it (and its parents) when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        Self::with_config(&IndexConfig::with_path(path.as_ref()))
    }

    pub fn with_config(config: &IndexConfig) -> Result<Self, IndexError> {
        config.validate().map_err(|e| IndexError::Initialization(e.to_string()))?;
        let fields = MessageSchema::build();
        let handle = Handle::open(&config.path, &fields, config.writer_memory_bytes)?;
        info!(
            path = %config.path.display(),
            docs = handle.reader.searcher().num_docs(),
            "message index opened"
        );
        Ok(Self {
            path: config.path.clone(),
            config: config.clone(),
            fields,
            handle: RwLock::new(Some(handle)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn fields(&self) -> &MessageSchema {
        &self.fields
    }

    pub fn is_open(&self) -> bool {
        self.handle.read().map(|h| h.is_some()).unwrap_or(false)
    }

    /// Run `f` under the shared lock.
    pub(crate) fn with_handle<T>(
        &self,
        f: impl FnOnce(&Handle) -> Result<T, IndexError>,
    ) -> Result<T, IndexError> {
        let guard = self.handle.read().map_err(|_| poisoned("index"))?;
        let handle = guard.as_ref().ok_or(IndexError::NotInitialized)?;
        f(handle)
    }

    /// Run `f` under the exclusive lock.
    pub(crate) fn with_handle_mut<T>(
        &self,
        f: impl FnOnce(&mut Handle) -> Result<T, IndexError>,
    ) -> Result<T, IndexError> {
        let mut guard = self.handle.write().map_err(|_| poisoned("index"))?;
        let handle = guard.as_mut().ok_or(IndexError::NotInitialized)?;
        f(handle)
    }

    /// Drop every document and all metadata, then recreate an empty index
    /// at the same path. If recreation fails the store stays closed.
    pub fn reset(&self) -> Result<(), IndexError> {
        let mut guard = self.handle.write().map_err(|_| poisoned("index"))?;
        let old = guard.take().ok_or(IndexError::NotInitialized)?;
        if let Err(e) = old.close() {
            warn!(error = %e, "closing index before reset failed");
        }
        if self.path.exists() {
            std::fs::remove_dir_all(&self.path).map_err(|e| {
                IndexError::Initialization(format!("remove {}: {e}", self.path.display()))
            })?;
        }
        let fresh = Handle::open(&self.path, &self.fields, self.config.writer_memory_bytes)?;
        *guard = Some(fresh);
        info!(path = %self.path.display(), "message index reset");
        Ok(())
    }

    /// Release the engine and metadata handles. Calling it again is a no-op.
    pub fn close(&self) -> Result<(), IndexError> {
        let mut guard = self.handle.write().map_err(|_| poisoned("index"))?;
        match guard.take() {
            Some(handle) => {
                handle.close()?;
                info!(path = %self.path.display(), "message index closed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn set_metadata(&self, key: &str, value: &[u8]) -> Result<(), IndexError> {
        self.with_handle_mut(|h| {
            let meta = h.meta.get_mut().map_err(|_| poisoned("metadata"))?;
            meta.set(key, value)
                .map_err(|e| IndexError::Storage(format!("set metadata {key}: {e}")))
        })
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        self.with_handle(|h| read_meta(h, key))
    }

    /// Compare the stored schema version with [`SCHEMA_VERSION`]. On mismatch
    /// (or when none is stored) the current version is written and `false`
    /// is returned: the caller must rebuild.
    pub fn ensure_version(&self) -> Result<bool, IndexError> {
        self.compare_and_store(META_SCHEMA_VERSION, SCHEMA_VERSION)
    }

    /// Same gate as [`ensure_version`](Self::ensure_version) for the
    /// dataset fingerprint.
    pub fn ensure_fingerprint(&self, fingerprint: &str) -> Result<bool, IndexError> {
        self.compare_and_store(META_FINGERPRINT, fingerprint)
    }

    fn compare_and_store(&self, key: &str, expected: &str) -> Result<bool, IndexError> {
        let matched = self.with_handle_mut(|h| {
            let meta = h.meta.get_mut().map_err(|_| poisoned("metadata"))?;
            let stored = meta
                .get(key)
                .map_err(|e| IndexError::Storage(format!("get metadata {key}: {e}")))?;
            if stored.as_deref() == Some(expected.as_bytes()) {
                return Ok(true);
            }
            meta.set(key, expected.as_bytes())
                .map_err(|e| IndexError::Storage(format!("set metadata {key}: {e}")))?;
            Ok(false)
        })?;
        if !matched {
            debug!(key, value = expected, "index metadata updated");
        }
        Ok(matched)
    }

    pub fn schema_version(&self) -> Result<Option<String>, IndexError> {
        self.get_metadata_str(META_SCHEMA_VERSION)
    }

    pub fn stored_fingerprint(&self) -> Result<Option<String>, IndexError> {
        self.get_metadata_str(META_FINGERPRINT)
    }

    /// Read-only check; an empty fingerprint never matches.
    pub fn fingerprint_matches(&self, fingerprint: &str) -> Result<bool, IndexError> {
        if fingerprint.is_empty() {
            return Ok(false);
        }
        Ok(self.stored_fingerprint()?.as_deref() == Some(fingerprint))
    }

    pub fn update_fingerprint(&self, fingerprint: &str) -> Result<(), IndexError> {
        self.set_metadata(META_FINGERPRINT, fingerprint.as_bytes())
    }

    /// Record the completion time of a full build (Unix seconds).
    pub fn mark_built(&self, at: DateTime<Utc>) -> Result<(), IndexError> {
        self.set_metadata(META_LAST_BUILT, at.timestamp().to_string().as_bytes())
    }

    pub fn last_built(&self) -> Result<Option<DateTime<Utc>>, IndexError> {
        let Some(raw) = self.get_metadata_str(META_LAST_BUILT)? else {
            return Ok(None);
        };
        let secs: i64 = raw.trim().parse().map_err(|e| {
            IndexError::Storage(format!("invalid {META_LAST_BUILT} value {raw:?}: {e}"))
        })?;
        Ok(DateTime::from_timestamp(secs, 0))
    }

    pub fn doc_count(&self) -> Result<u64, IndexError> {
        self.with_handle(|h| Ok(h.reader.searcher().num_docs()))
    }

    pub fn status(&self) -> Result<IndexStatus, IndexError> {
        Ok(IndexStatus {
            document_count: self.doc_count()?,
            schema_version: self.schema_version()?,
            fingerprint: self.stored_fingerprint()?,
            last_built_at: self.last_built()?,
        })
    }

    fn get_metadata_str(&self, key: &str) -> Result<Option<String>, IndexError> {
        match self.get_metadata(key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| IndexError::Storage(format!("metadata {key} is not utf-8: {e}"))),
            None => Ok(None),
        }
    }
}

fn read_meta(h: &Handle, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
    let meta = h.meta.lock().map_err(|_| poisoned("metadata"))?;
    meta.get(key).map_err(|e| IndexError::Storage(format!("get metadata {key}: {e}")))
}

impl Drop for MessageIndex {
    fn drop(&mut self) {
        if let Ok(guard) = self.handle.get_mut() {
            if let Some(handle) = guard.take() {
                if let Err(e) = handle.close() {
                    warn!(error = %e, "closing message index on drop failed");
                }
            }
        }
    }
}
