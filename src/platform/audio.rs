use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, ensure};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AudioConfig;

/// Alarm sound playback as seen by the screen controller.
pub trait AudioPlayer: Send {
    /// Select the sound for the next `start`. Fails when the file is missing.
    fn load(&mut self, file: &Path) -> Result<()>;
    /// Play the loaded sound `loops` times, `delay` after the call and with
    /// `pause` between plays. Replaces any playback still running.
    fn start(&mut self, loops: u32, delay: Duration, pause: Duration);
    /// Silence playback. A no-op when nothing is playing.
    fn stop(&mut self);
}

/// Plays sounds by spawning an external player per repetition.
#[derive(Debug)]
pub struct CommandAudioPlayer {
    player_command: String,
    sound_directory: PathBuf,
    loaded: Option<PathBuf>,
    playback: Option<Playback>,
}

#[derive(Debug)]
struct Playback {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CommandAudioPlayer {
    pub fn new(cfg: &AudioConfig) -> Self {
        Self {
            player_command: cfg.player_command.clone(),
            sound_directory: cfg.sound_directory.clone(),
            loaded: None,
            playback: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|playback| !playback.handle.is_finished())
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.sound_directory.join(file)
        }
    }
}

impl AudioPlayer for CommandAudioPlayer {
    fn load(&mut self, file: &Path) -> Result<()> {
        let path = self.resolve(file);
        ensure!(path.is_file(), "sound file {} does not exist", path.display());
        debug!(path = %path.display(), "sound loaded");
        self.loaded = Some(path);
        Ok(())
    }

    fn start(&mut self, loops: u32, delay: Duration, pause: Duration) {
        let Some(path) = self.loaded.clone() else {
            warn!("audio start requested without a loaded sound");
            return;
        };
        self.stop();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let command = self.player_command.clone();
        info!(path = %path.display(), loops, ?delay, ?pause, "starting alarm sound");
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("alarm sound cancelled"),
                _ = play_rounds(&command, &path, loops, delay, pause) => debug!("alarm sound finished"),
            }
        });
        self.playback = Some(Playback { cancel, handle });
    }

    fn stop(&mut self) {
        if let Some(playback) = self.playback.take() {
            if !playback.handle.is_finished() {
                info!("stopping alarm sound");
            }
            playback.cancel.cancel();
            playback.handle.abort();
        }
    }
}

impl Drop for CommandAudioPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn play_rounds(command: &str, path: &Path, loops: u32, delay: Duration, pause: Duration) {
    sleep(delay).await;
    for round in 0..loops.max(1) {
        if round > 0 {
            sleep(pause).await;
        }
        // The file is passed as a positional argument so the shell never
        // re-parses its name.
        let status = Command::new("sh")
            .arg("-c")
            .arg(format!("{command} \"$1\""))
            .arg("alarm-kiosk")
            .arg(path)
            .kill_on_drop(true)
            .status()
            .await;
        match status {
            Ok(status) if status.success() => debug!(round, "sound played"),
            Ok(status) => warn!(round, code = ?status.code(), "sound player exited with failure"),
            Err(err) => {
                warn!(error = %err, "failed to spawn sound player");
                return;
            }
        }
    }
}
