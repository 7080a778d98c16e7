use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::controller::{Outcome, ScreenStateController};
use crate::events::StationCommand;

/// Single consumer of the station queue. Owns the controller, so screens are
/// only ever touched from here.
#[instrument(skip_all, fields(tick = ?tick))]
pub async fn run(
    mut controller: ScreenStateController,
    mut commands: Receiver<StationCommand>,
    cancel: CancellationToken,
    tick: Duration,
) -> ScreenStateController {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting station loop");
                break;
            }

            command = commands.recv() => {
                let Some(command) = command else {
                    info!("station queue closed; exiting station loop");
                    break;
                };
                debug!(?command, "station command");
                if controller.handle(command).await == Outcome::Shutdown {
                    cancel.cancel();
                    break;
                }
            }

            now = ticker.tick() => controller.tick(Instant::into_std(now)).await,
        }
    }

    controller.shutdown().await;
    controller
}
