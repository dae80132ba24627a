//! Persisted launcher settings.

mod atomic;
mod store;

pub use atomic::{atomic_read_json, atomic_write_json};
pub use store::{Settings, SettingsStore, SettingsTransaction};
