use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::broadcast;

use rulesync::reconcile::{Controller, ReconciliationHandler};
use rulesync::telemetry::{init_logging, LogFormat};
use rulesync::watch::{AsyncManifestWatcher, Informer, ResyncScheduler, Selector};
use rulesync::{Result, Settings};

/// Logs the error and terminates the process.
fn fatal(message: impl std::fmt::Display) -> ! {
    error!("{}", message);
    std::process::exit(1);
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Forwards SIGHUP as a manual resync request.
#[cfg(unix)]
fn spawn_hangup_trigger(trigger_tx: broadcast::Sender<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::hangup()) {
        Ok(mut hangup) => {
            tokio::spawn(async move {
                while hangup.recv().await.is_some() {
                    let _ = trigger_tx.send(());
                }
            });
        }
        Err(e) => warn!("Failed to listen for SIGHUP, manual resync disabled: {}", e),
    }
}

#[cfg(not(unix))]
fn spawn_hangup_trigger(_trigger_tx: broadcast::Sender<()>) {}

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging("info", LogFormat::from_env()) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = run().await {
        fatal(e);
    }
}

async fn run() -> Result<()> {
    info!("Starting rulesync v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::from_env()?;
    info!(
        "Watching namespace {} in {}, writing to {}, resync every {}",
        settings.namespace,
        settings.manifest_dir.display(),
        settings.base_dir.display(),
        humantime::format_duration(settings.resync)
    );

    let (informer, events) = Informer::new(Selector::for_namespace(&settings.namespace));
    let informer = Arc::new(informer);

    let mut controller = Controller::new(ReconciliationHandler::new(&settings.base_dir));
    let controller_task = tokio::spawn(async move { controller.run(events).await });

    let mut watcher = AsyncManifestWatcher::new(&settings.manifest_dir, Arc::clone(&informer));
    let count = watcher.start_with_listing()?;
    info!("Initial listing found {} ConfigMaps", count);

    let scheduler = ResyncScheduler::new(Arc::clone(&informer), settings.resync);
    let (trigger_tx, trigger_rx) = broadcast::channel(4);
    spawn_hangup_trigger(trigger_tx);
    let resync_task = scheduler.start(trigger_rx);

    shutdown_signal().await;
    info!("Shutting down");

    watcher.stop();
    scheduler.stop();
    if let Err(e) = resync_task.await {
        error!("Resync scheduler task failed: {}", e);
    }

    // Dropping the last informer handle closes the event stream.
    drop(watcher);
    drop(scheduler);
    drop(informer);

    match controller_task.await {
        Ok(stats) => info!("Processed {} events", stats.processed),
        Err(e) => error!("Controller task failed: {}", e),
    }

    Ok(())
}
