//! Per-organization settings persistence
//!
//! - [`types`]: the persisted configuration record and patch shape
//! - [`store`]: SQLite-backed store with optimistic-concurrency writes

pub mod store;
pub mod types;

pub use store::SettingsStore;
pub use types::{EmailIdentityConfig, SettingsPatch};
