//! Screen state machine.
//!
//! [`ScreenStateController`] turns [`Directive`]s into screen lifecycle calls,
//! audio and display power intents, and owns the two auxiliary timers. It is
//! driven exclusively by the station loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use config_model::{ClockFaces, Directive, EventInfo, Mode, Payload};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Configuration;
use crate::events::StationCommand;
use crate::platform::audio::AudioPlayer;
use crate::platform::display_power::DisplayPower;
use crate::screens::{
    EventOptions, OffOptions, ScreenDeck, ScreenId, ScreenOptions, SlideshowOptions,
};
use crate::timer::DelayedAction;

/// Upper bound for waiting on a cancelled timer before it is aborted.
const TIMER_JOIN_LIMIT: Duration = Duration::from_secs(2);

/// Immutable knobs the controller needs from the station configuration.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub default_mode: Mode,
    pub auto_revert: Option<Duration>,
    pub auto_power_off: Option<Duration>,
    pub splash_picture: Option<PathBuf>,
    pub slideshow: SlideshowOptions,
    pub audio_start_delay: Duration,
    pub audio_repeat_pause: Duration,
    pub keep_alive: Option<Duration>,
}

impl ControllerSettings {
    pub fn from_config(cfg: &Configuration) -> Self {
        Self {
            default_mode: cfg.screens.default_screen,
            auto_revert: cfg.screens.auto_revert,
            auto_power_off: cfg.screens.event.auto_power_off,
            splash_picture: cfg.screens.splash_picture.clone(),
            slideshow: SlideshowOptions {
                directory: cfg.screens.slideshow.directory.clone(),
                delay: cfg.screens.slideshow.delay,
                order: cfg.screens.slideshow.order,
            },
            audio_start_delay: cfg.audio.start_delay,
            audio_repeat_pause: cfg.audio.repeat_pause,
            keep_alive: cfg.display_power.keep_alive,
        }
    }
}

/// Which screen is shown and since when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSession {
    pub active_screen: ScreenId,
    /// Off and splash share one screen; the mode tells them apart.
    pub active_mode: Mode,
    pub entered_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Shutdown,
}

pub fn screen_for(mode: Mode) -> ScreenId {
    match mode {
        Mode::Off | Mode::Splashscreen | Mode::Quit => ScreenId::Off,
        Mode::Clock => ScreenId::Clock,
        Mode::Event => ScreenId::Event,
        Mode::Slideshow => ScreenId::Slideshow,
    }
}

/// Display power intent for `mode`; `None` leaves the display as it is.
pub fn power_intent(mode: Mode) -> Option<bool> {
    match mode {
        Mode::Off => Some(false),
        Mode::Splashscreen | Mode::Clock | Mode::Event | Mode::Slideshow => Some(true),
        Mode::Quit => None,
    }
}

pub struct ScreenStateController {
    settings: ControllerSettings,
    deck: ScreenDeck,
    audio: Box<dyn AudioPlayer>,
    power: Arc<dyn DisplayPower>,
    commands: mpsc::Sender<StationCommand>,
    session: ScreenSession,
    /// Bumped by every applied directive; timers carry the value they were armed at.
    generation: u64,
    power_off_timer: DelayedAction,
    revert_timer: DelayedAction,
    power_tracking: PowerTracking,
}

#[derive(Debug, Default)]
struct PowerTracking {
    intent: Option<bool>,
    asserted_at: Option<Instant>,
}

impl ScreenStateController {
    /// Starts on a blank Off screen without touching display power.
    pub fn new(
        settings: ControllerSettings,
        mut deck: ScreenDeck,
        audio: Box<dyn AudioPlayer>,
        power: Arc<dyn DisplayPower>,
        commands: mpsc::Sender<StationCommand>,
    ) -> Self {
        if let Some(off) = deck.get_mut(ScreenId::Off) {
            off.configure(ScreenOptions::Off(OffOptions::default()));
            off.enter();
        }
        Self {
            settings,
            deck,
            audio,
            power,
            commands,
            session: ScreenSession {
                active_screen: ScreenId::Off,
                active_mode: Mode::Off,
                entered_at: Instant::now(),
            },
            generation: 0,
            power_off_timer: DelayedAction::new("auto-power-off"),
            revert_timer: DelayedAction::new("auto-revert"),
            power_tracking: PowerTracking::default(),
        }
    }

    pub fn session(&self) -> ScreenSession {
        self.session
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn deck(&self) -> &ScreenDeck {
        &self.deck
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn power_off_timer_running(&self) -> bool {
        self.power_off_timer.is_running()
    }

    pub fn revert_timer_running(&self) -> bool {
        self.revert_timer.is_running()
    }

    /// Last power intent issued, `None` before the first one.
    pub fn power_intent(&self) -> Option<bool> {
        self.power_tracking.intent
    }

    pub async fn handle(&mut self, command: StationCommand) -> Outcome {
        match command {
            StationCommand::Apply(directive) => self.apply(directive).await,
            StationCommand::RevertIdle { generation } => self.on_revert_idle(generation).await,
            StationCommand::PowerOffElapsed { generation } => {
                self.on_power_off_elapsed(generation).await;
                Outcome::Continue
            }
            StationCommand::ResetToDefault => {
                info!(mode = %self.settings.default_mode, "operator reset to default screen");
                self.apply(Directive::bare(self.settings.default_mode)).await
            }
        }
    }

    /// Run one transition. Same-mode directives reconfigure in place and
    /// replay their side effects.
    pub async fn apply(&mut self, directive: Directive) -> Outcome {
        self.generation += 1;
        let generation = self.generation;
        let mode = directive.mode;
        info!(%mode, generation, "applying directive");

        // Stale timers must be gone before anything below can re-arm them.
        self.power_off_timer.cancel_and_join(TIMER_JOIN_LIMIT).await;
        self.revert_timer.cancel_and_join(TIMER_JOIN_LIMIT).await;
        self.audio.stop();

        self.switch_to(screen_for(mode), mode);
        let options = self.options_for(&directive);
        if let Some(screen) = self.deck.get_mut(options.screen()) {
            screen.configure(options);
        }

        if mode == Mode::Event {
            let info = match &directive.payload {
                Payload::Event(info) => info.clone(),
                _ => EventInfo::default(),
            };
            self.start_alarm_sound(&info);
            if let Some(delay) = self.settings.auto_power_off {
                self.arm_power_off(delay, generation);
            }
        }

        if let Some(on) = power_intent(mode) {
            self.set_power(on).await;
        }

        if self.revert_applies(mode)
            && let Some(idle) = self.settings.auto_revert
        {
            self.arm_revert(idle, generation);
        }

        if mode == Mode::Quit {
            info!("quit directive received; shutting down");
            Outcome::Shutdown
        } else {
            Outcome::Continue
        }
    }

    /// Periodic redraw of the active screen plus the power keep-alive.
    pub async fn tick(&mut self, now: Instant) {
        if let Some(screen) = self.deck.get_mut(self.session.active_screen) {
            screen.tick(now);
        }

        let Some(period) = self.settings.keep_alive else {
            return;
        };
        if self.power_tracking.intent != Some(true) {
            return;
        }
        let due = self
            .power_tracking
            .asserted_at
            .is_none_or(|at| now.saturating_duration_since(at) >= period);
        if due {
            debug!(?period, "re-asserting display power");
            self.drive_power(true).await;
            self.power_tracking.asserted_at = Some(now);
        }
    }

    /// Present a fatal startup error on the Off screen with the display on.
    pub async fn show_fatal(&mut self, message: &str) {
        self.switch_to(ScreenId::Off, Mode::Off);
        if let Some(off) = self.deck.get_mut(ScreenId::Off) {
            off.configure(ScreenOptions::Off(OffOptions {
                message: Some(message.to_string()),
                ..OffOptions::default()
            }));
        }
        self.set_power(true).await;
    }

    /// Stop timers and audio and leave the active screen.
    pub async fn shutdown(&mut self) {
        self.power_off_timer.cancel_and_join(TIMER_JOIN_LIMIT).await;
        self.revert_timer.cancel_and_join(TIMER_JOIN_LIMIT).await;
        self.audio.stop();
        if let Some(screen) = self.deck.get_mut(self.session.active_screen) {
            screen.exit();
        }
        info!(screen = %self.session.active_screen, "screen controller stopped");
    }

    async fn on_revert_idle(&mut self, generation: u64) -> Outcome {
        if generation != self.generation {
            debug!(generation, current = self.generation, "stale auto-revert ignored");
            return Outcome::Continue;
        }
        let default = self.settings.default_mode;
        if self.session.active_mode == default {
            return Outcome::Continue;
        }
        info!(from = %self.session.active_mode, to = %default, "idle; reverting to default screen");
        self.apply(Directive::bare(default)).await
    }

    async fn on_power_off_elapsed(&mut self, generation: u64) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "stale auto-power-off ignored");
            return;
        }
        if self.session.active_screen != ScreenId::Event {
            debug!(screen = %self.session.active_screen, "auto-power-off outside alarm ignored");
            return;
        }
        info!("alarm display time elapsed; powering display off");
        self.set_power(false).await;
    }

    fn switch_to(&mut self, target: ScreenId, mode: Mode) {
        let previous = self.session.active_screen;
        if previous != target {
            if let Some(screen) = self.deck.get_mut(previous) {
                screen.exit();
            }
            self.session.active_screen = target;
            if let Some(screen) = self.deck.get_mut(target) {
                screen.enter();
            }
            info!(from = %previous, to = %target, "screen switched");
        }
        self.session.active_mode = mode;
        self.session.entered_at = Instant::now();
    }

    fn options_for(&self, directive: &Directive) -> ScreenOptions {
        match directive.mode {
            Mode::Off | Mode::Quit => ScreenOptions::Off(OffOptions::default()),
            Mode::Splashscreen => ScreenOptions::Off(OffOptions {
                splash: true,
                picture: self.settings.splash_picture.clone(),
                message: None,
            }),
            Mode::Clock => ScreenOptions::Clock(match directive.payload {
                Payload::Clock(faces) => faces,
                _ => ClockFaces::default(),
            }),
            Mode::Slideshow => ScreenOptions::Slideshow(self.settings.slideshow.clone()),
            Mode::Event => {
                let info = match &directive.payload {
                    Payload::Event(info) => info.clone(),
                    _ => EventInfo::default(),
                };
                ScreenOptions::Event(EventOptions {
                    progress: info.progress(),
                    response_order: if info.show_response_order {
                        info.equipment
                    } else {
                        Vec::new()
                    },
                    message: info.message,
                    picture_left: info.picture_left,
                    picture_right: info.picture_right,
                    crop_picture: info.crop_picture,
                    category: info.category,
                })
            }
        }
    }

    fn start_alarm_sound(&mut self, info: &EventInfo) {
        let Some(sound) = info.sound_file() else {
            debug!("alarm without sound");
            return;
        };
        if let Err(err) = self.audio.load(Path::new(sound)) {
            warn!(sound, error = %err, "alarm sound not started");
            return;
        }
        self.audio.start(
            info.repeat.max(1),
            self.settings.audio_start_delay,
            self.settings.audio_repeat_pause,
        );
        info!(sound, repeat = info.repeat.max(1), "alarm sound started");
    }

    fn revert_applies(&self, mode: Mode) -> bool {
        mode != self.settings.default_mode && !matches!(mode, Mode::Off | Mode::Quit)
    }

    fn arm_power_off(&mut self, delay: Duration, generation: u64) {
        let tx = self.commands.clone();
        let action = async move {
            if tx
                .send(StationCommand::PowerOffElapsed { generation })
                .await
                .is_err()
            {
                debug!("station loop gone; auto-power-off dropped");
            }
        };
        if let Err(err) = self.power_off_timer.start(delay, action) {
            warn!(error = %err, "auto-power-off not armed");
        }
    }

    fn arm_revert(&mut self, idle: Duration, generation: u64) {
        let tx = self.commands.clone();
        let action = async move {
            if tx
                .send(StationCommand::RevertIdle { generation })
                .await
                .is_err()
            {
                debug!("station loop gone; auto-revert dropped");
            }
        };
        if let Err(err) = self.revert_timer.start(idle, action) {
            warn!(error = %err, "auto-revert not armed");
        }
    }

    async fn set_power(&mut self, on: bool) {
        self.drive_power(on).await;
        self.power_tracking = PowerTracking {
            intent: Some(on),
            asserted_at: Some(Instant::now()),
        };
    }

    /// Power drivers shell out and can take seconds; they run on the blocking
    /// pool and are awaited so transition order holds.
    async fn drive_power(&mut self, on: bool) {
        let power = Arc::clone(&self.power);
        if let Err(err) = tokio::task::spawn_blocking(move || power.set_power(on)).await {
            warn!(error = %err, on, "display power call did not complete");
        }
    }
}
