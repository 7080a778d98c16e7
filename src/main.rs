use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use config_model::{Directive, Mode};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use alarm_kiosk::config::{Configuration, DisplayPowerConfig};
use alarm_kiosk::controller::{ControllerSettings, ScreenStateController};
use alarm_kiosk::events::StationCommand;
use alarm_kiosk::platform::audio::CommandAudioPlayer;
use alarm_kiosk::platform::display_power::{
    DisplayPowerController, PowerCommandReport, log_report,
};
use alarm_kiosk::screens::ScreenDeck;
use alarm_kiosk::tasks;

#[derive(Debug, Parser)]
#[command(
    name = "alarm-kiosk",
    version,
    about = "alarm display kiosk for fire station alerting"
)]
struct Args {
    /// Path to the station YAML config
    #[arg(value_name = "CONFIG", required_unless_present = "print_directive")]
    config: Option<PathBuf>,
    /// Parse one directive file, print the result and exit
    #[arg(long = "print-directive", value_name = "FILE")]
    print_directive: Option<PathBuf>,
    /// Switch the display off for N seconds, switch it back on and exit
    #[arg(long = "power-test", value_name = "SECONDS")]
    power_test: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // init tracing (RUST_LOG controls level, default = info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let Args {
        config,
        print_directive,
        power_test,
    } = Args::parse();

    if let Some(file) = print_directive {
        return print_directive_file(&file);
    }
    let config = config.ok_or_else(|| anyhow!("a station configuration file is required"))?;

    let loaded = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))
        .and_then(|cfg| cfg.validated().context("invalid configuration values"));

    if let Some(seconds) = power_test {
        let cfg = loaded?;
        return run_power_test(&cfg.display_power, seconds).await;
    }

    let (cfg, fatal) = match loaded {
        Ok(cfg) if cfg.watch.directory.is_dir() => (cfg, None),
        Ok(cfg) => {
            let message = format!(
                "watched directory {} does not exist",
                cfg.watch.directory.display()
            );
            (cfg, Some(message))
        }
        Err(err) => (Configuration::default(), Some(format!("{err:#}"))),
    };
    if fatal.is_none() {
        tracing::info!(
            "Loaded configuration from {}:\n{:#?}",
            config.display(),
            cfg
        );
    }

    let (station_tx, station_rx) = mpsc::channel::<StationCommand>(32); // Watcher/signals/timers -> Station
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sigterm.recv() => {
                            tracing::info!("SIGTERM received; initiating shutdown");
                            cancel.cancel();
                        }
                    }
                }
                Err(err) => tracing::warn!("failed to register SIGTERM handler: {err}"),
            }
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        let control = station_tx.clone();
        tokio::spawn(async move {
            match signal(SignalKind::user_defined1()) {
                Ok(mut sigusr1) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = sigusr1.recv() => {
                            if received.is_none() {
                                break;
                            }
                            tracing::info!("SIGUSR1 received; resetting to default screen");
                            if let Err(err) = control.send(StationCommand::ResetToDefault).await {
                                tracing::warn!("failed to forward reset request: {err}");
                                break;
                            }
                        }
                    }
                },
                Err(err) => tracing::warn!("failed to register SIGUSR1 handler: {err}"),
            }
        });
    }

    let power = DisplayPowerController::from_config(&cfg.display_power)
        .context("failed to set up display power control")?;
    let mut controller = ScreenStateController::new(
        ControllerSettings::from_config(&cfg),
        ScreenDeck::standard(&cfg),
        Box::new(CommandAudioPlayer::new(&cfg.audio)),
        Arc::new(power),
        station_tx.clone(),
    );

    if let Some(message) = fatal {
        tracing::error!(error = %message, "fatal startup error; waiting for shutdown signal");
        controller.show_fatal(&message).await;
        cancel.cancelled().await;
        controller.shutdown().await;
        bail!(message);
    }

    // Splash first, so a directive applied at startup lands on top of it.
    station_tx
        .send(StationCommand::Apply(Directive::bare(Mode::Splashscreen)))
        .await
        .context("station queue closed before startup")?;

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    // Station UI loop
    tasks.spawn({
        let cancel = cancel.clone();
        let tick = cfg.screens.tick;
        async move {
            tasks::station::run(controller, station_rx, cancel, tick).await;
            Ok(())
        }
    });

    // Directive watcher
    tasks.spawn({
        let watch = cfg.watch.clone();
        let to_station = station_tx.clone();
        let cancel = cancel.clone();
        async move {
            tasks::watcher::run(watch, to_station, cancel)
                .await
                .context("watcher task failed")
        }
    });
    drop(station_tx);

    // Drain JoinSet; whichever task ends first takes the others down with it.
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
        cancel.cancel();
    }

    Ok(())
}

fn print_directive_file(path: &Path) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let directive = Directive::parse(&bytes)
        .with_context(|| format!("failed to parse directive file {}", path.display()))?;
    println!("# directive: {}\n{directive:#?}", path.display());
    Ok(())
}

async fn run_power_test(cfg: &DisplayPowerConfig, seconds: u64) -> Result<()> {
    let controller = DisplayPowerController::from_config(cfg)?;
    if !controller.is_enabled() {
        bail!("--power-test requires display-power.enabled");
    }

    tracing::info!(duration = seconds, "power-test: switching display off");
    let off_report = power_step(&controller, false).await?;
    log_report("power-test-off", &off_report);
    if !off_report.success() {
        bail!("power-test power-off failed");
    }

    sleep(Duration::from_secs(seconds)).await;

    tracing::info!("power-test: switching display on");
    let on_report = power_step(&controller, true).await?;
    log_report("power-test-on-1", &on_report);
    if !on_report.success() {
        tracing::warn!("power-test power-on attempt 1 failed; retrying");
        sleep(Duration::from_secs(2)).await;
        let retry = power_step(&controller, true).await?;
        log_report("power-test-on-2", &retry);
        if !retry.success() {
            bail!("power-test power-on failed after retry");
        }
    }

    tracing::info!("power-test completed successfully");
    Ok(())
}

async fn power_step(controller: &DisplayPowerController, on: bool) -> Result<PowerCommandReport> {
    let controller = controller.clone();
    tokio::task::spawn_blocking(move || {
        if on {
            controller.power_on()
        } else {
            controller.power_off()
        }
    })
    .await
    .context("display power task failed")
}
