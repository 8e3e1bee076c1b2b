//! Configuration snapshots and change notification
//!
//! This crate builds on `tamaya-core` with:
//! - `FrozenConfiguration`: immutable, versioned snapshots of all entries
//! - `ConfigurationChange`: per-key differences between two snapshots
//! - `EventBus`: synchronous delivery of changes to registered listeners
//! - `ConfigurationWatcher`: rebuilds the configuration when watched files change

mod change;
mod frozen;
mod listener;
mod watcher;

pub use change::{ChangeKind, ConfigurationChange, PropertyChange};
pub use frozen::FrozenConfiguration;
pub use listener::{ChangeListener, EventBus, ListenerId};
pub use watcher::{ConfigurationFactory, ConfigurationWatcher};

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Failed to rebuild configuration: {0}")]
    Rebuild(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EventError>;
