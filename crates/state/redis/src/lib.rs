//! Redis state backend for the remedy engine.
//!
//! Provides a Redis-backed implementation of the [`StateStore`] trait from
//! `remedy-state`.
//!
//! Every entry is a Redis hash with a value field `v` and a version field
//! `ver`. Claims, overwrites and compare-and-swap all run as Lua scripts, so
//! each is atomic on a single Redis instance. Under Sentinel or Cluster
//! failover an acknowledged write can be lost, which may let a second job
//! claim the same resource slot.
//!
//! # Example
//!
//! ```ignore
//! use remedy_state_redis::{RedisConfig, RedisStateStore};
//!
//! let config = RedisConfig::new("redis://localhost:6379");
//! let store = RedisStateStore::new(&config)?;
//! ```
//!
//! [`StateStore`]: remedy_state::StateStore

mod config;
mod key_render;
mod scripts;
mod store;

pub use config::RedisConfig;
pub use store::RedisStateStore;
