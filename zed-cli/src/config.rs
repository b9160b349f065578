use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use zed_compiler::zedc::{
    compiler::source::{Head, MemoryLake, NoLake, PoolEntry, Source},
    dag::{Order, SortKey},
};

pub const CONFIG_FILE: &str = "zc.toml";

/// Settings read from `zc.toml`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZcConfig {
    #[serde(default)]
    pub compile: CompileConfig,
    #[serde(default)]
    pub lake: LakeConfig,
    #[serde(default)]
    pub head: Option<HeadConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Used by `-P` when it is given without a value.
    #[serde(default)]
    pub parallelism: Option<usize>,
    /// Files read before the query text on every compile.
    #[serde(default)]
    pub includes: Vec<PathBuf>,
    /// Order assumed for records read from stdin.
    #[serde(default)]
    pub sort_key: Option<SortKeyConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKeyConfig {
    pub field: String,
    #[serde(default = "default_order")]
    pub order: Order,
}

fn default_order() -> Order {
    Order::Asc
}

impl SortKeyConfig {
    pub fn to_sort_key(&self) -> SortKey {
        SortKey::new(field_path(&self.field), self.order)
    }
}

fn field_path(field: &str) -> Vec<String> {
    field.split('.').map(str::to_string).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LakeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default = "default_pool_key")]
    pub sort_key: String,
    #[serde(default = "default_order")]
    pub order: Order,
    /// Branch name to the commit at its tip.
    #[serde(default)]
    pub branches: BTreeMap<String, Uuid>,
}

fn default_pool_key() -> String {
    "ts".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadConfig {
    pub pool: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

/// The catalog a compile resolves names against.
#[derive(Debug, Clone)]
pub enum Catalog {
    Lake(MemoryLake),
    Files(NoLake),
}

impl Catalog {
    pub fn as_source(&self) -> &dyn Source {
        match self {
            Catalog::Lake(lake) => lake,
            Catalog::Files(files) => files,
        }
    }
}

impl ZcConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ZcConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), pools = config.lake.pools.len(), "loaded config");
        Ok(config)
    }

    /// Loads `explicit` when given, else `zc.toml` in `dir` when it exists,
    /// else the defaults.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.compile.parallelism == Some(0) {
            return Err(ConfigError::ZeroParallelism);
        }
        if let Some(key) = &self.compile.sort_key
            && key.field.is_empty()
        {
            return Err(ConfigError::EmptySortKey);
        }
        let mut seen = Vec::with_capacity(self.lake.pools.len());
        for pool in &self.lake.pools {
            if pool.name.is_empty() {
                return Err(ConfigError::EmptyPoolName);
            }
            if pool.sort_key.is_empty() {
                return Err(ConfigError::EmptySortKey);
            }
            if seen.contains(&pool.name) {
                return Err(ConfigError::DuplicatePool {
                    name: pool.name.clone(),
                });
            }
            seen.push(pool.name.clone());
        }
        if let Some(head) = &self.head
            && self.lake.enabled
            && !seen.contains(&head.pool)
        {
            return Err(ConfigError::UnknownHeadPool {
                name: head.pool.clone(),
            });
        }
        Ok(())
    }

    pub fn catalog(&self) -> Catalog {
        if !self.lake.enabled {
            return Catalog::Files(NoLake);
        }
        let mut lake = MemoryLake::new();
        for pool in &self.lake.pools {
            let entry = PoolEntry {
                name: pool.name.clone(),
                id: pool.id,
                sort_key: SortKey::new(field_path(&pool.sort_key), pool.order),
                branches: pool.branches.clone(),
            };
            // Names were checked for duplicates when the file was loaded.
            if let Err(e) = lake.add_pool(entry) {
                tracing::warn!(pool = %pool.name, error = %e, "skipping pool");
            }
        }
        Catalog::Lake(lake)
    }

    pub fn head(&self) -> Option<Head> {
        self.head
            .as_ref()
            .filter(|_| self.lake.enabled)
            .map(|h| Head::new(&h.pool, &h.branch))
    }

    pub fn default_sort(&self) -> Option<SortKey> {
        self.compile.sort_key.as_ref().map(SortKeyConfig::to_sort_key)
    }
}
