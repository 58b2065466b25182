// Third Party
use kube::config::KubeconfigError;
use thiserror::Error;

/// Everything that can go wrong between reading settings and delivering a notification.
///
/// Startup failures and `UnexpectedPayload` are fatal and bubble up to `main`.
/// `Delivery` is handled where it occurs and never stops the watch.
#[derive(Debug, Error)]
pub enum Error {
    #[error("SLACK_WEBHOOK must be set to a valid webhook URL")]
    MissingWebhookUrl,

    #[error("SLACK_WEBHOOK is not a valid URL: {0}")]
    InvalidWebhookUrl(#[from] url::ParseError),

    #[error("failed to read settings: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("KUBECONFIG is not set and no home directory could be resolved")]
    NoHomeDirectory,

    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("watch event payload is not a namespace: {0}")]
    UnexpectedPayload(#[source] serde_json::Error),

    #[error("failed to deliver webhook notification: {0}")]
    Delivery(#[from] reqwest::Error),
}

impl Error {
    /// Sorts an error surfaced by the watch stream. A body that fails to decode means the
    /// stream handed us something other than a namespace.
    pub fn from_watch(error: kube::Error) -> Self {
        match error {
            kube::Error::SerdeError(e) => Error::UnexpectedPayload(e),
            other => Error::Kube(other),
        }
    }
}
