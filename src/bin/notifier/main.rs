// Third Party
use dotenv::dotenv;

// Local
use namespace_notifier::{
    utils::{init_tracing, setup_exit_hooks},
    NamespaceWatcher, Settings, WebhookNotifier,
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv().ok();
    init_tracing("namespace_notifier", tracing::Level::INFO);

    // Without somewhere to send notifications there is nothing to do, so settings are
    // validated before touching the cluster.
    let settings = Settings::from_env()?;
    let client = settings.kube_client().await?;
    let notifier = WebhookNotifier::try_new(settings.webhook_url.clone())?;
    let shutdown = setup_exit_hooks()?;

    // Runs until a signal arrives or the watch fails
    let namespace_watcher = NamespaceWatcher::new(&client, notifier);
    namespace_watcher.watch_namespaces(shutdown).await?;

    Ok(())
}
