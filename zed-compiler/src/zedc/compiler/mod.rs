// SPDX-License-Identifier: AGPL-3.0

//! Entry points for driving a compilation and the catalog it resolves
//! names against.

pub mod job;
pub mod source;

pub use job::{Job, compile, load, parse};
pub use source::{Head, MemoryLake, NoLake, PoolEntry, Source};
