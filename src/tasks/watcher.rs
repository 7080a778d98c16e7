use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::mpsc::{self, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::WatchConfig;
use crate::events::StationCommand;
use crate::watch::ConfigWatcher;

#[instrument(
    skip(cfg, to_station, cancel),
    fields(directory = %cfg.directory.display(), file = %cfg.file_name)
)]
pub async fn run(
    cfg: WatchConfig,
    to_station: Sender<StationCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut watcher = ConfigWatcher::new(&cfg);

    // Bridge notify callback -> async channel
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<Event>>(128);
    let mut notifier = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send(res);
    })
    .context("failed to create filesystem watcher")?;
    notifier
        .watch(&cfg.directory, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", cfg.directory.display()))?;
    match cfg.directory.canonicalize() {
        Ok(abs) => info!(watching = %abs.display(), "notify watcher initialized"),
        Err(_) => info!(watching = %cfg.directory.display(), "notify watcher initialized"),
    }

    let target = watcher.target();
    if cfg.apply_existing_on_start && target.is_file() {
        info!(path = %target.display(), "applying directive present at startup");
        if let Some(directive) = watcher.read_current()
            && to_station.send(StationCommand::Apply(directive)).await.is_err()
        {
            warn!("station queue closed; exiting watcher task");
            return Ok(());
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting watcher task");
                break;
            }

            Some(res) = watch_rx.recv() => match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        debug!(kind = ?event.kind, "fs: ignored");
                        continue;
                    }
                    for path in &event.paths {
                        let Some(directive) = watcher.on_file_changed(path) else {
                            continue;
                        };
                        if to_station.send(StationCommand::Apply(directive)).await.is_err() {
                            warn!("station queue closed; exiting watcher task");
                            return Ok(());
                        }
                    }
                }
                Err(err) => error!("watch error: {err}"),
            }
        }
    }
    Ok(())
}
