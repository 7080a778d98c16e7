use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use alarm_kiosk::config::SlideshowOrder;
use alarm_kiosk::controller::{ControllerSettings, Outcome, ScreenStateController};
use alarm_kiosk::events::StationCommand;
use alarm_kiosk::platform::audio::AudioPlayer;
use alarm_kiosk::platform::display_power::DisplayPower;
use alarm_kiosk::screens::{
    EventOptions, OffOptions, Presentable, ScreenDeck, ScreenId, ScreenOptions, SlideshowOptions,
};
use alarm_kiosk::tasks::station;
use anyhow::{Result, bail};
use config_model::{ClockFaces, Directive, EventInfo, Mode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Shared call log for all test doubles, in call order.
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    fn count(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }
}

struct RecordingScreen {
    id: ScreenId,
    options: ScreenOptions,
    entered: bool,
    journal: Journal,
}

impl RecordingScreen {
    fn boxed(id: ScreenId, journal: &Journal) -> Box<dyn Presentable> {
        let options = match id {
            ScreenId::Off => ScreenOptions::Off(OffOptions::default()),
            ScreenId::Event => ScreenOptions::Event(EventOptions::default()),
            ScreenId::Clock => ScreenOptions::Clock(ClockFaces::default()),
            ScreenId::Slideshow => ScreenOptions::Slideshow(slideshow_options()),
        };
        Box::new(Self {
            id,
            options,
            entered: false,
            journal: journal.clone(),
        })
    }
}

impl Presentable for RecordingScreen {
    fn id(&self) -> ScreenId {
        self.id
    }

    fn configure(&mut self, options: ScreenOptions) {
        self.journal.push(format!("{}:configure", self.id));
        self.options = options;
    }

    fn options(&self) -> ScreenOptions {
        self.options.clone()
    }

    fn enter(&mut self) {
        self.journal.push(format!("{}:enter", self.id));
        self.entered = true;
    }

    fn exit(&mut self) {
        self.journal.push(format!("{}:exit", self.id));
        self.entered = false;
    }

    fn is_entered(&self) -> bool {
        self.entered
    }
}

struct RecordingAudio(Journal);

impl AudioPlayer for RecordingAudio {
    fn load(&mut self, file: &Path) -> Result<()> {
        if file == Path::new("missing.wav") {
            bail!("sound file missing.wav does not exist");
        }
        self.0.push(format!("audio:load:{}", file.display()));
        Ok(())
    }

    fn start(&mut self, loops: u32, _delay: Duration, _pause: Duration) {
        self.0.push(format!("audio:start:{loops}"));
    }

    fn stop(&mut self) {
        self.0.push("audio:stop");
    }
}

struct RecordingPower(Journal);

impl DisplayPower for RecordingPower {
    fn set_power(&self, on: bool) {
        self.0.push(if on { "power:on" } else { "power:off" });
    }
}

/// A driver that blocks its thread like a slow `cec-client` run.
struct SlowPower {
    busy: Arc<AtomicBool>,
}

impl DisplayPower for SlowPower {
    fn set_power(&self, _on: bool) {
        self.busy.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(300));
        self.busy.store(false, Ordering::SeqCst);
    }
}

fn slideshow_options() -> SlideshowOptions {
    SlideshowOptions {
        directory: None,
        delay: Duration::from_secs(10),
        order: SlideshowOrder::Name,
    }
}

fn settings() -> ControllerSettings {
    ControllerSettings {
        default_mode: Mode::Clock,
        auto_revert: None,
        auto_power_off: None,
        splash_picture: None,
        slideshow: slideshow_options(),
        audio_start_delay: Duration::ZERO,
        audio_repeat_pause: Duration::ZERO,
        keep_alive: None,
    }
}

struct Station {
    controller: ScreenStateController,
    journal: Journal,
    commands: mpsc::Receiver<StationCommand>,
}

fn station(settings: ControllerSettings) -> Station {
    let journal = Journal::default();
    let deck = [
        ScreenId::Off,
        ScreenId::Event,
        ScreenId::Clock,
        ScreenId::Slideshow,
    ]
    .into_iter()
    .fold(ScreenDeck::empty(), |deck, id| {
        deck.with_screen(RecordingScreen::boxed(id, &journal))
    });
    let (tx, commands) = mpsc::channel(8);
    let controller = ScreenStateController::new(
        settings,
        deck,
        Box::new(RecordingAudio(journal.clone())),
        Arc::new(RecordingPower(journal.clone())),
        tx,
    );
    assert_eq!(journal.take(), ["off:configure", "off:enter"]);
    Station {
        controller,
        journal,
        commands,
    }
}

fn alarm(sound: &str, repeat: u32) -> Directive {
    Directive::event(EventInfo {
        message: "Brand Einfamilienhaus".to_string(),
        sound: sound.to_string(),
        repeat,
        ..EventInfo::default()
    })
}

async fn next_command(rx: &mut mpsc::Receiver<StationCommand>) -> StationCommand {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timeout waiting for station command")
        .expect("station channel closed unexpectedly")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transition_side_effects_run_in_order() {
    let mut st = station(settings());

    let outcome = st.controller.apply(Directive::bare(Mode::Clock)).await;

    assert_eq!(outcome, Outcome::Continue);
    assert_eq!(
        st.journal.take(),
        [
            "audio:stop",
            "off:exit",
            "clock:enter",
            "clock:configure",
            "power:on"
        ]
    );
    assert_eq!(st.controller.session().active_screen, ScreenId::Clock);
    assert_eq!(st.controller.power_intent(), Some(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn same_mode_reapply_reconfigures_in_place() {
    let mut st = station(settings());
    st.controller.apply(alarm("gong.wav", 3)).await;
    st.journal.take();

    st.controller.apply(alarm("gong.wav", 3)).await;

    assert_eq!(
        st.journal.take(),
        [
            "audio:stop",
            "event:configure",
            "audio:load:gong.wav",
            "audio:start:3",
            "power:on"
        ]
    );
    assert_eq!(st.controller.deck().entered(), [ScreenId::Event]);
    let Some(ScreenOptions::Event(options)) =
        st.controller.deck().get(ScreenId::Event).map(|s| s.options())
    else {
        panic!("event screen missing");
    };
    assert_eq!(options.message, "Brand Einfamilienhaus");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn alarm_without_sound_key_keeps_audio_silent() {
    let mut st = station(settings());
    let directive = Directive::parse(
        b"[General]\nshow = object\n[ObjectInfo]\nentire_msg = Alarm Ittigen\npicture_1 = a.jpg\n",
    )
    .unwrap();

    st.controller.apply(directive).await;

    assert_eq!(st.journal.count("audio:start"), 0);
    assert_eq!(st.journal.count("audio:load"), 0);
    let Some(ScreenOptions::Event(options)) =
        st.controller.deck().get(ScreenId::Event).map(|s| s.options())
    else {
        panic!("event screen missing");
    };
    assert_eq!(options.message, "Alarm Ittigen");
    assert_eq!(options.picture_left.as_deref(), Some(Path::new("a.jpg")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_sound_file_still_completes_transition() {
    let mut st = station(settings());

    st.controller.apply(alarm("missing.wav", 2)).await;

    assert_eq!(st.journal.count("audio:start"), 0);
    assert_eq!(st.controller.session().active_screen, ScreenId::Event);
    assert_eq!(st.controller.power_intent(), Some(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exactly_one_screen_is_entered_across_any_sequence() {
    let mut st = station(settings());
    let sequence = [
        Directive::bare(Mode::Splashscreen),
        Directive::bare(Mode::Clock),
        alarm("none", 1),
        Directive::bare(Mode::Slideshow),
        Directive::bare(Mode::Slideshow),
        alarm("NONE", 1),
        Directive::bare(Mode::Clock),
        Directive::bare(Mode::Off),
    ];

    for directive in sequence {
        st.controller.apply(directive).await;
        assert_eq!(st.controller.deck().entered().len(), 1);
    }

    assert_eq!(st.controller.session().active_screen, ScreenId::Off);
    assert_eq!(st.journal.count("audio:start"), 0);
    let enters = ["off", "event", "clock", "slideshow"]
        .iter()
        .map(|id| st.journal.count(&format!("{id}:enter")))
        .sum::<usize>();
    let exits = ["off", "event", "clock", "slideshow"]
        .iter()
        .map(|id| st.journal.count(&format!("{id}:exit")))
        .sum::<usize>();
    assert_eq!(enters, exits);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn splash_and_off_share_a_screen_but_not_power() {
    let mut st = station(settings());

    st.controller.apply(Directive::bare(Mode::Splashscreen)).await;
    assert_eq!(
        st.journal.take(),
        ["audio:stop", "off:configure", "power:on"]
    );
    let Some(ScreenOptions::Off(options)) =
        st.controller.deck().get(ScreenId::Off).map(|s| s.options())
    else {
        panic!("off screen missing");
    };
    assert!(options.splash);

    st.controller.apply(Directive::bare(Mode::Off)).await;
    assert_eq!(
        st.journal.take(),
        ["audio:stop", "off:configure", "power:off"]
    );
    assert_eq!(st.controller.session().active_mode, Mode::Off);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_alarm_replaces_power_off_timer() {
    let mut st = station(ControllerSettings {
        auto_power_off: Some(Duration::from_secs(300)),
        ..settings()
    });

    st.controller.apply(alarm("none", 1)).await;
    assert!(st.controller.power_off_timer_running());
    tokio::time::sleep(Duration::from_secs(1)).await;
    st.controller.apply(alarm("none", 1)).await;

    assert!(st.controller.power_off_timer_running());
    assert_eq!(st.controller.generation(), 2);
    assert!(st.commands.try_recv().is_err(), "no timer may have fired");
    assert_eq!(st.journal.count("power:off"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn power_off_fires_during_alarm() {
    let mut st = station(ControllerSettings {
        auto_power_off: Some(Duration::from_millis(50)),
        ..settings()
    });
    st.controller.apply(alarm("none", 1)).await;

    let command = next_command(&mut st.commands).await;
    assert_eq!(command, StationCommand::PowerOffElapsed { generation: 1 });
    st.controller.handle(command).await;

    assert_eq!(st.controller.power_intent(), Some(false));
    assert_eq!(st.controller.session().active_screen, ScreenId::Event);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_timer_commands_are_ignored() {
    let mut st = station(ControllerSettings {
        auto_power_off: Some(Duration::from_millis(50)),
        auto_revert: Some(Duration::from_millis(50)),
        ..settings()
    });
    st.controller.apply(alarm("none", 1)).await;
    st.controller.apply(alarm("none", 1)).await;
    st.journal.take();

    st.controller
        .handle(StationCommand::PowerOffElapsed { generation: 1 })
        .await;
    st.controller
        .handle(StationCommand::RevertIdle { generation: 1 })
        .await;

    assert!(st.journal.take().is_empty());
    assert_eq!(st.controller.session().active_screen, ScreenId::Event);
    assert_eq!(st.controller.generation(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_screen_reverts_to_default() {
    let mut st = station(ControllerSettings {
        auto_revert: Some(Duration::from_millis(50)),
        ..settings()
    });

    st.controller.apply(Directive::bare(Mode::Slideshow)).await;
    assert!(st.controller.revert_timer_running());

    let command = next_command(&mut st.commands).await;
    assert_eq!(command, StationCommand::RevertIdle { generation: 1 });
    st.controller.handle(command).await;

    assert_eq!(st.controller.session().active_mode, Mode::Clock);
    assert!(!st.controller.revert_timer_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn default_and_off_screens_never_arm_revert() {
    let mut st = station(ControllerSettings {
        auto_revert: Some(Duration::from_secs(60)),
        ..settings()
    });

    st.controller.apply(Directive::bare(Mode::Clock)).await;
    assert!(!st.controller.revert_timer_running());
    st.controller.apply(Directive::bare(Mode::Off)).await;
    assert!(!st.controller.revert_timer_running());
    st.controller.apply(Directive::bare(Mode::Splashscreen)).await;
    assert!(st.controller.revert_timer_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn operator_reset_shows_default_screen() {
    let mut st = station(settings());
    st.controller.apply(alarm("gong.wav", 1)).await;

    let outcome = st.controller.handle(StationCommand::ResetToDefault).await;

    assert_eq!(outcome, Outcome::Continue);
    assert_eq!(st.controller.session().active_screen, ScreenId::Clock);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn quit_blanks_without_power_change_and_requests_shutdown() {
    let mut st = station(settings());
    st.controller.apply(Directive::bare(Mode::Clock)).await;
    st.journal.take();

    let outcome = st.controller.apply(Directive::bare(Mode::Quit)).await;

    assert_eq!(outcome, Outcome::Shutdown);
    assert_eq!(
        st.journal.take(),
        ["audio:stop", "clock:exit", "off:enter", "off:configure"]
    );
    assert_eq!(st.controller.power_intent(), Some(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn keep_alive_reasserts_power_while_on() {
    let mut st = station(ControllerSettings {
        keep_alive: Some(Duration::from_secs(1)),
        ..settings()
    });
    st.controller.apply(Directive::bare(Mode::Clock)).await;
    st.journal.take();

    st.controller.tick(Instant::now()).await;
    assert!(st.journal.take().is_empty());
    st.controller.tick(Instant::now() + Duration::from_secs(2)).await;
    assert_eq!(st.journal.take(), ["power:on"]);

    st.controller.apply(Directive::bare(Mode::Off)).await;
    st.journal.take();
    st.controller.tick(Instant::now() + Duration::from_secs(5)).await;
    assert!(st.journal.take().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fatal_message_is_shown_with_display_on() {
    let mut st = station(settings());

    st.controller
        .show_fatal("watched directory /srv/alarm does not exist")
        .await;

    let Some(ScreenOptions::Off(options)) =
        st.controller.deck().get(ScreenId::Off).map(|s| s.options())
    else {
        panic!("off screen missing");
    };
    assert_eq!(
        options.message.as_deref(),
        Some("watched directory /srv/alarm does not exist")
    );
    assert_eq!(st.journal.take(), ["off:configure", "power:on"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn station_loop_stops_on_quit_and_cancels_everything() {
    let journal = Journal::default();
    let deck = [ScreenId::Off, ScreenId::Clock]
        .into_iter()
        .fold(ScreenDeck::empty(), |deck, id| {
            deck.with_screen(RecordingScreen::boxed(id, &journal))
        });
    let (tx, rx) = mpsc::channel(8);
    let controller = ScreenStateController::new(
        settings(),
        deck,
        Box::new(RecordingAudio(journal.clone())),
        Arc::new(RecordingPower(journal.clone())),
        tx.clone(),
    );
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(station::run(
        controller,
        rx,
        cancel.clone(),
        Duration::from_millis(100),
    ));

    tx.send(StationCommand::Apply(Directive::bare(Mode::Clock)))
        .await
        .unwrap();
    tx.send(StationCommand::Apply(Directive::bare(Mode::Quit)))
        .await
        .unwrap();

    let controller = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("station loop did not stop")
        .unwrap();
    assert!(cancel.is_cancelled());
    assert_eq!(controller.session().active_mode, Mode::Quit);
    assert!(controller.deck().entered().is_empty());
}

#[tokio::test]
async fn slow_power_driver_does_not_stall_the_runtime() {
    let journal = Journal::default();
    let busy = Arc::new(AtomicBool::new(false));
    let (tx, _rx) = mpsc::channel(8);
    let mut controller = ScreenStateController::new(
        settings(),
        ScreenDeck::empty().with_screen(RecordingScreen::boxed(ScreenId::Clock, &journal)),
        Box::new(RecordingAudio(journal.clone())),
        Arc::new(SlowPower {
            busy: Arc::clone(&busy),
        }),
        tx,
    );

    // Single-threaded runtime: this task only runs while `apply` yields.
    let observer = tokio::spawn({
        let busy = Arc::clone(&busy);
        async move {
            for _ in 0..200 {
                if busy.load(Ordering::SeqCst) {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            false
        }
    });

    controller.apply(Directive::bare(Mode::Clock)).await;
    assert_eq!(controller.power_intent(), Some(true));
    assert!(!busy.load(Ordering::SeqCst), "power call must finish before apply returns");
    assert!(
        observer.await.unwrap(),
        "runtime stayed responsive while the display switched"
    );
}
