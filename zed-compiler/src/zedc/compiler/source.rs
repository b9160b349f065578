//! The data catalog the analyzer resolves names against.

use crate::zedc::{
    analyzer::errors::CompileError,
    dag::{Op, SortKey},
};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The pool and branch a query runs against when it names no source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    pub pool: String,
    pub branch: String,
}

impl Head {
    pub fn new(pool: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            branch: branch.into(),
        }
    }
}

/// Resolves pool and commit names and reports scan order. Implementations
/// that block should return [`CompileError::Interrupted`] once `cancel` fires.
pub trait Source {
    fn is_lake(&self) -> bool;

    fn pool_id(&self, cancel: &CancellationToken, name: &str) -> Result<Uuid, CompileError>;

    /// Resolves a branch name or commit ID within a pool.
    fn commit_object(
        &self,
        cancel: &CancellationToken,
        pool: Uuid,
        name: &str,
    ) -> Result<Uuid, CompileError>;

    /// Names of every pool, for glob and regexp pool patterns.
    fn pool_names(&self, cancel: &CancellationToken) -> Result<Vec<String>, CompileError>;

    fn pool_name(&self, cancel: &CancellationToken, id: Uuid) -> Result<String, CompileError>;

    /// The order a scan produces its records in, when known.
    fn sort_key(&self, _cancel: &CancellationToken, op: &Op) -> Option<SortKey> {
        match op {
            Op::FileScan { sort_key, .. } | Op::HttpScan { sort_key, .. } => sort_key.clone(),
            _ => None,
        }
    }
}

fn check(cancel: &CancellationToken) -> Result<(), CompileError> {
    if cancel.is_cancelled() {
        return Err(CompileError::Interrupted);
    }
    Ok(())
}

/// Files and URLs only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLake;

impl Source for NoLake {
    fn is_lake(&self) -> bool {
        false
    }

    fn pool_id(&self, _cancel: &CancellationToken, name: &str) -> Result<Uuid, CompileError> {
        Err(CompileError::catalog(format!("{name}: pool not found")))
    }

    fn commit_object(
        &self,
        _cancel: &CancellationToken,
        _pool: Uuid,
        name: &str,
    ) -> Result<Uuid, CompileError> {
        Err(CompileError::catalog(format!("{name}: branch not found")))
    }

    fn pool_names(&self, _cancel: &CancellationToken) -> Result<Vec<String>, CompileError> {
        Ok(Vec::new())
    }

    fn pool_name(&self, _cancel: &CancellationToken, id: Uuid) -> Result<String, CompileError> {
        Err(CompileError::catalog(format!("{id}: pool not found")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    pub name: String,
    pub id: Uuid,
    pub sort_key: SortKey,
    /// Branch name to the commit at its tip.
    pub branches: BTreeMap<String, Uuid>,
}

/// A catalog held in memory, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct MemoryLake {
    pools: Vec<PoolEntry>,
}

impl MemoryLake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pool(&mut self, pool: PoolEntry) -> Result<(), CompileError> {
        if self.pools.iter().any(|p| p.name == pool.name) {
            return Err(CompileError::catalog(format!("{}: pool already exists", pool.name)));
        }
        tracing::debug!(pool = %pool.name, id = %pool.id, "registered pool");
        self.pools.push(pool);
        Ok(())
    }

    pub fn pools(&self) -> &[PoolEntry] {
        &self.pools
    }

    fn by_id(&self, id: Uuid) -> Option<&PoolEntry> {
        self.pools.iter().find(|p| p.id == id)
    }
}

impl Source for MemoryLake {
    fn is_lake(&self) -> bool {
        true
    }

    fn pool_id(&self, cancel: &CancellationToken, name: &str) -> Result<Uuid, CompileError> {
        check(cancel)?;
        if let Ok(id) = Uuid::parse_str(name) {
            return Ok(id);
        }
        self.pools
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.id)
            .ok_or_else(|| CompileError::catalog(format!("{name}: pool not found")))
    }

    fn commit_object(
        &self,
        cancel: &CancellationToken,
        pool: Uuid,
        name: &str,
    ) -> Result<Uuid, CompileError> {
        check(cancel)?;
        if let Ok(id) = Uuid::parse_str(name) {
            return Ok(id);
        }
        let entry = self
            .by_id(pool)
            .ok_or_else(|| CompileError::catalog(format!("{pool}: pool not found")))?;
        entry
            .branches
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::catalog(format!("{name:?}: branch not found")))
    }

    fn pool_names(&self, cancel: &CancellationToken) -> Result<Vec<String>, CompileError> {
        check(cancel)?;
        Ok(self.pools.iter().map(|p| p.name.clone()).collect())
    }

    fn pool_name(&self, cancel: &CancellationToken, id: Uuid) -> Result<String, CompileError> {
        check(cancel)?;
        self.by_id(id)
            .map(|p| p.name.clone())
            .ok_or_else(|| CompileError::catalog(format!("{id}: pool not found")))
    }

    fn sort_key(&self, _cancel: &CancellationToken, op: &Op) -> Option<SortKey> {
        match op {
            Op::PoolScan { id, .. } | Op::DeleteScan { id, .. } => {
                self.by_id(*id).map(|p| p.sort_key.clone())
            }
            Op::FileScan { sort_key, .. } | Op::HttpScan { sort_key, .. } => sort_key.clone(),
            _ => None,
        }
    }
}
