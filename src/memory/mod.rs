//! 调查记忆：按身份键合并的账本与 checkpoint

pub mod checkpoint;
pub mod store;

pub use checkpoint::{CacheStore, CheckpointError, InMemoryCache, MemoryCheckpointer};
pub use store::{MemorySnapshot, MemoryStore, MemorySummary, Relationship};
