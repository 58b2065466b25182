// System
use std::{fmt, future::Future};

// Third Party
use futures::{pin_mut, stream::BoxStream, Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{Api, ListParams, WatchEvent, WatchParams},
    error::ErrorResponse,
    Client, ResourceExt,
};
use tracing::{debug, error, info, warn};

// Local
use crate::{
    error::Error,
    notifier::{NotificationMessage, Notifier},
};

/// Status code the API server uses when a watch asks for a resource version it no longer has.
const GONE: u16 = 410;

pub type WatchStream = BoxStream<'static, Result<WatchEvent<Namespace>, kube::Error>>;

/// What happened to a namespace, as reported by the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Modified => "modified",
            EventKind::Deleted => "deleted",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A namespace watch event. Error events carry the API status instead of a namespace.
#[derive(Debug, Clone)]
pub enum NamespaceEvent {
    Added(Namespace),
    Modified(Namespace),
    Deleted(Namespace),
    Error(ErrorResponse),
}

impl NamespaceEvent {
    /// Bookmarks only move the resource version along, so they have no namespace event.
    pub fn from_watch_event(event: WatchEvent<Namespace>) -> Option<Self> {
        match event {
            WatchEvent::Added(ns) => Some(NamespaceEvent::Added(ns)),
            WatchEvent::Modified(ns) => Some(NamespaceEvent::Modified(ns)),
            WatchEvent::Deleted(ns) => Some(NamespaceEvent::Deleted(ns)),
            WatchEvent::Error(status) => Some(NamespaceEvent::Error(status)),
            WatchEvent::Bookmark(_) => None,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            NamespaceEvent::Added(_) => EventKind::Added,
            NamespaceEvent::Modified(_) => EventKind::Modified,
            NamespaceEvent::Deleted(_) => EventKind::Deleted,
            NamespaceEvent::Error(_) => EventKind::Error,
        }
    }
}

fn resource_version_of(event: &WatchEvent<Namespace>) -> Option<String> {
    match event {
        WatchEvent::Added(ns) | WatchEvent::Modified(ns) | WatchEvent::Deleted(ns) => {
            ns.metadata.resource_version.clone()
        }
        WatchEvent::Bookmark(bookmark) => Some(bookmark.metadata.resource_version.clone()),
        WatchEvent::Error(_) => None,
    }
}

/// Why a single watch stream stopped being consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEnd {
    /// The shutdown future resolved.
    Shutdown,
    /// The server ended the stream, usually on its watch timeout. Carries the last resource
    /// version seen on it, if any.
    Closed(Option<String>),
    /// The server reported that the requested resource version is gone.
    Expired,
}

/// Turns namespace events into notifications. Holds no state between events.
pub struct Dispatcher<N> {
    notifier: N,
}

impl<N: Notifier> Dispatcher<N> {
    pub fn new(notifier: N) -> Self {
        Self { notifier }
    }

    /// Added and deleted namespaces are sent to the notifier, everything else is only logged.
    /// A failed delivery is logged and dropped.
    pub async fn dispatch(&self, event: NamespaceEvent) {
        let kind = event.kind();
        match event {
            NamespaceEvent::Added(ns) | NamespaceEvent::Deleted(ns) => {
                let name = ns.name_any();
                info!(namespace = %name, status = %kind, "Namespace {}", kind);
                let message = NotificationMessage::new(&name, kind);
                if let Err(e) = self.notifier.notify(&message).await {
                    error!(namespace = %name, error = %e, "Failed to send notification");
                }
            }
            NamespaceEvent::Modified(ns) => {
                let name = ns.name_any();
                info!(namespace = %name, "Modified: {}", name);
            }
            NamespaceEvent::Error(status) => {
                warn!(
                    code = status.code,
                    reason = %status.reason,
                    "Watch error event: {}",
                    status.message
                );
            }
        }
    }

    /// Handles the events of one watch stream in order until the stream ends, the server
    /// reports an expired resource version, or `shutdown` resolves.
    ///
    /// Returns `Error::UnexpectedPayload` if an event does not decode as a namespace and
    /// `Error::Kube` for any other stream failure; both are for the caller to treat as fatal.
    pub async fn run<S, F>(&self, stream: S, shutdown: F) -> Result<WatchEnd, Error>
    where
        S: Stream<Item = Result<WatchEvent<Namespace>, kube::Error>>,
        F: Future<Output = ()>,
    {
        pin_mut!(stream);
        pin_mut!(shutdown);
        let mut last_seen = None;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer watching namespaces");
                    return Ok(WatchEnd::Shutdown);
                }
                next = stream.try_next() => match next.map_err(Error::from_watch)? {
                    Some(event) => {
                        if let Some(resource_version) = resource_version_of(&event) {
                            last_seen = Some(resource_version);
                        }
                        match NamespaceEvent::from_watch_event(event) {
                            Some(NamespaceEvent::Error(status)) if status.code == GONE => {
                                self.dispatch(NamespaceEvent::Error(status)).await;
                                return Ok(WatchEnd::Expired);
                            }
                            Some(event) => self.dispatch(event).await,
                            None => debug!(resource_version = ?last_seen, "Bookmark event"),
                        }
                    }
                    None => {
                        debug!(resource_version = ?last_seen, "Namespace watch closed");
                        return Ok(WatchEnd::Closed(last_seen));
                    }
                },
            }
        }
    }
}

/// Where namespace watches come from.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait NamespaceSource: Send + Sync {
    /// Resource version of a fresh namespace list.
    async fn resource_version(&self) -> Result<String, Error>;

    /// Opens a watch that starts after `resource_version`.
    async fn open_watch(&self, resource_version: &str) -> Result<WatchStream, Error>;
}

#[async_trait::async_trait]
impl NamespaceSource for Api<Namespace> {
    async fn resource_version(&self) -> Result<String, Error> {
        let list = self.list(&ListParams::default()).await?;
        Ok(list
            .metadata
            .resource_version
            .unwrap_or_else(|| "0".to_string()))
    }

    async fn open_watch(&self, resource_version: &str) -> Result<WatchStream, Error> {
        let stream = self
            .watch(&WatchParams::default(), resource_version)
            .await?;
        Ok(stream.boxed())
    }
}

/// Watches every namespace in the cluster and notifies on creation and deletion.
pub struct NamespaceWatcher<N, S = Api<Namespace>> {
    source: S,
    dispatcher: Dispatcher<N>,
}

impl<N: Notifier> NamespaceWatcher<N> {
    pub fn new(client: &Client, notifier: N) -> Self {
        Self::with_source(Api::all(client.clone()), notifier)
    }
}

impl<N: Notifier, S: NamespaceSource> NamespaceWatcher<N, S> {
    pub fn with_source(source: S, notifier: N) -> Self {
        Self {
            source,
            dispatcher: Dispatcher::new(notifier),
        }
    }

    /// Starts at the current resource version, so namespaces that already exist are not
    /// announced again.
    ///
    /// The API server closes every watch after its timeout. Each close reopens the watch from
    /// the last resource version seen, so nothing between the two streams is lost. Only an
    /// expired resource version forces a fresh list. Returns when `shutdown` fires or on the
    /// first error.
    pub async fn watch_namespaces<F>(&self, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        pin_mut!(shutdown);
        let mut resource_version = self.source.resource_version().await?;
        info!(%resource_version, "Starting namespace watcher...");
        loop {
            let stream = self.source.open_watch(&resource_version).await?;
            match self.dispatcher.run(stream, shutdown.as_mut()).await? {
                WatchEnd::Shutdown => return Ok(()),
                WatchEnd::Closed(last_seen) => {
                    if let Some(last_seen) = last_seen {
                        resource_version = last_seen;
                    }
                    debug!(%resource_version, "Watch closed by the server, resuming...");
                }
                WatchEnd::Expired => {
                    resource_version = self.source.resource_version().await?;
                    warn!(
                        %resource_version,
                        "Resource version expired, restarting watch from a fresh list"
                    );
                }
            }
        }
    }
}
