use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use ldp_index::{InMemoryMembershipIndex, MembershipIndex, SqliteMembershipIndex};
use ldp_store::{ContainerStore, FileContainerStore, InMemoryContainerStore};

use crate::error::{RepositoryError, RepositoryResult};
use crate::events::{EventDispatcher, NoopDispatcher};
use crate::store_repository::StoreRepository;

/// Where container records live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    /// One file per container; relative paths resolve against `data_dir`.
    Files { dir: PathBuf },
}

/// Where the membership index lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum IndexBackend {
    Memory,
    /// SQLite database file; relative paths resolve against `data_dir`.
    Sqlite { path: PathBuf },
}

/// Bounds the repository enforces on walks and reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepositoryLimits {
    pub max_depth: usize,
    pub default_page_limit: u64,
    pub max_page_limit: u64,
    pub cursor_batch_size: usize,
}

impl Default for RepositoryLimits {
    fn default() -> Self {
        Self {
            max_depth: 256,
            default_page_limit: 100,
            max_page_limit: 1000,
            cursor_batch_size: 500,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub data_dir: PathBuf,
    /// Longest parent chain a path walk follows before giving up.
    pub max_depth: usize,
    pub default_page_limit: u64,
    pub max_page_limit: u64,
    pub cursor_batch_size: usize,
    pub event_channel_capacity: usize,
    // Tables last so the TOML output stays valid.
    pub store: StoreBackend,
    pub index: IndexBackend,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        let limits = RepositoryLimits::default();
        Self {
            data_dir: PathBuf::from("./ldp-data"),
            max_depth: limits.max_depth,
            default_page_limit: limits.default_page_limit,
            max_page_limit: limits.max_page_limit,
            cursor_batch_size: limits.cursor_batch_size,
            event_channel_capacity: 1024,
            store: StoreBackend::Files {
                dir: PathBuf::from("containers"),
            },
            index: IndexBackend::Sqlite {
                path: PathBuf::from("index.db"),
            },
        }
    }
}

impl RepositoryConfig {
    /// A configuration with both backends in memory.
    pub fn in_memory() -> Self {
        Self {
            store: StoreBackend::Memory,
            index: IndexBackend::Memory,
            ..Self::default()
        }
    }

    /// Read a TOML configuration file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> RepositoryResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RepositoryError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> RepositoryResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| RepositoryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> RepositoryResult<String> {
        toml::to_string_pretty(self).map_err(|e| RepositoryError::Config(e.to_string()))
    }

    pub fn validate(&self) -> RepositoryResult<()> {
        if self.max_depth == 0 {
            return Err(RepositoryError::Config("max_depth must be positive".into()));
        }
        if self.default_page_limit == 0 || self.default_page_limit > self.max_page_limit {
            return Err(RepositoryError::Config(format!(
                "default_page_limit must be in 1..={}",
                self.max_page_limit
            )));
        }
        if self.cursor_batch_size == 0 {
            return Err(RepositoryError::Config("cursor_batch_size must be positive".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(RepositoryError::Config(
                "event_channel_capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn limits(&self) -> RepositoryLimits {
        RepositoryLimits {
            max_depth: self.max_depth,
            default_page_limit: self.default_page_limit,
            max_page_limit: self.max_page_limit,
            cursor_batch_size: self.cursor_batch_size,
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn open_store(&self) -> RepositoryResult<Arc<dyn ContainerStore>> {
        let store: Arc<dyn ContainerStore> = match &self.store {
            StoreBackend::Memory => Arc::new(InMemoryContainerStore::new()),
            StoreBackend::Files { dir } => Arc::new(FileContainerStore::open(self.resolve(dir))?),
        };
        Ok(store)
    }

    pub fn open_index(&self) -> RepositoryResult<Arc<dyn MembershipIndex>> {
        let index: Arc<dyn MembershipIndex> = match &self.index {
            IndexBackend::Memory => Arc::new(InMemoryMembershipIndex::new()),
            IndexBackend::Sqlite { path } => {
                Arc::new(SqliteMembershipIndex::open(self.resolve(path))?)
            }
        };
        Ok(index)
    }
}

/// Build a repository over the configured backends, discarding events.
pub fn open_repository(config: &RepositoryConfig) -> RepositoryResult<StoreRepository> {
    open_repository_with(config, Arc::new(NoopDispatcher))
}

/// Build a repository over the configured backends with a dispatcher.
pub fn open_repository_with(
    config: &RepositoryConfig,
    dispatcher: Arc<dyn EventDispatcher>,
) -> RepositoryResult<StoreRepository> {
    config.validate()?;
    let store = config.open_store()?;
    let index = config.open_index()?;
    info!(
        data_dir = %config.data_dir.display(),
        store = ?config.store,
        index = ?config.index,
        "repository opened"
    );
    Ok(StoreRepository::builder(store, index)
        .dispatcher(dispatcher)
        .limits(config.limits())
        .build())
}
