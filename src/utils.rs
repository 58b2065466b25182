// System
use std::{future::Future, io, thread};

// Third Party
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tokio::sync::oneshot;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Logs at `level` for `crate_name`. `RUST_LOG`, when set, replaces the default directive.
pub fn init_tracing(crate_name: &str, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={}",
            crate_name,
            level.to_string().to_lowercase()
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Listens for SIGINT and SIGTERM on a dedicated thread. The returned future resolves on the
/// first one received.
pub fn setup_exit_hooks() -> Result<impl Future<Output = ()>, io::Error> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let (tx, rx) = oneshot::channel();
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!("Received signal {}, shutting down...", signal);
            let _ = tx.send(());
        }
    });
    Ok(async move {
        let _ = rx.await;
    })
}

#[cfg(test)]
mod tests {
    // Third Party
    use tracing::Level;

    // Local
    use super::init_tracing;

    #[test]
    fn init_tracing_tolerates_custom_level() {
        init_tracing("namespace_notifier", Level::TRACE);
        tracing::trace!("tracing initialised");
    }
}
