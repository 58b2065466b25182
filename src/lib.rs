pub mod config;
pub mod error;
pub mod notifier;
pub mod utils;
pub mod watcher;

pub use config::Settings;
pub use error::Error;
pub use notifier::{NotificationMessage, Notifier, WebhookNotifier};
pub use watcher::{
    Dispatcher, EventKind, NamespaceEvent, NamespaceSource, NamespaceWatcher, WatchEnd,
};
