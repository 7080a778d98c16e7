//! Full-screen presentation modes.
//!
//! Every screen implements [`Presentable`]; the controller only ever talks to
//! that interface and looks screens up by [`ScreenId`] in a [`ScreenDeck`].
//! Pixel output is the renderer's business: screens keep the model it draws.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use config_model::ClockFaces;
use tracing::warn;

use crate::config::{Configuration, SlideshowOrder};

pub mod clock;
pub mod event;
pub mod off;
pub mod slideshow;

pub use clock::ClockScreen;
pub use event::EventScreen;
pub use off::OffScreen;
pub use slideshow::SlideshowScreen;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScreenId {
    Off,
    Event,
    Clock,
    Slideshow,
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScreenId::Off => "off",
            ScreenId::Event => "event",
            ScreenId::Clock => "clock",
            ScreenId::Slideshow => "slideshow",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OffOptions {
    /// Show the splash picture instead of a blank screen.
    pub splash: bool,
    pub picture: Option<PathBuf>,
    /// Error text for fatal startup failures; takes precedence over the splash.
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventOptions {
    pub message: String,
    pub picture_left: Option<PathBuf>,
    pub picture_right: Option<PathBuf>,
    pub crop_picture: bool,
    pub category: String,
    /// Progress bar run time; `None` hides the bar.
    pub progress: Option<Duration>,
    /// Equipment pictures in response order; empty hides the strip.
    pub response_order: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideshowOptions {
    pub directory: Option<PathBuf>,
    pub delay: Duration,
    pub order: SlideshowOrder,
}

/// Named options accepted by [`Presentable::configure`]. Each screen accepts
/// exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenOptions {
    Off(OffOptions),
    Event(EventOptions),
    Clock(ClockFaces),
    Slideshow(SlideshowOptions),
}

impl ScreenOptions {
    pub fn screen(&self) -> ScreenId {
        match self {
            ScreenOptions::Off(_) => ScreenId::Off,
            ScreenOptions::Event(_) => ScreenId::Event,
            ScreenOptions::Clock(_) => ScreenId::Clock,
            ScreenOptions::Slideshow(_) => ScreenId::Slideshow,
        }
    }
}

/// Capability contract shared by all screens.
///
/// `configure` never fails: a screen that cannot honor part of its options
/// (missing picture, empty directory) logs and falls back to a placeholder.
/// `enter` and `exit` are idempotent.
pub trait Presentable: Send {
    fn id(&self) -> ScreenId;
    fn configure(&mut self, options: ScreenOptions);
    /// Current configuration (the no-argument form of `configure`).
    fn options(&self) -> ScreenOptions;
    fn enter(&mut self);
    fn exit(&mut self);
    fn is_entered(&self) -> bool;
    /// Periodic redraw hook, called only for the active screen.
    fn tick(&mut self, _now: Instant) {}
}

/// Mapping from screen identity to its instance.
pub struct ScreenDeck {
    screens: HashMap<ScreenId, Box<dyn Presentable>>,
}

impl ScreenDeck {
    pub fn empty() -> Self {
        Self {
            screens: HashMap::new(),
        }
    }

    /// The four production screens.
    pub fn standard(cfg: &Configuration) -> Self {
        Self::empty()
            .with_screen(Box::new(OffScreen::new()))
            .with_screen(Box::new(EventScreen::new(cfg.screens.event.clone())))
            .with_screen(Box::new(ClockScreen::new()))
            .with_screen(Box::new(SlideshowScreen::new(&cfg.screens.slideshow)))
    }

    /// Register `screen`, replacing any screen with the same id.
    pub fn with_screen(mut self, screen: Box<dyn Presentable>) -> Self {
        self.screens.insert(screen.id(), screen);
        self
    }

    pub fn get(&self, id: ScreenId) -> Option<&dyn Presentable> {
        self.screens.get(&id).map(|screen| screen.as_ref())
    }

    pub fn get_mut(&mut self, id: ScreenId) -> Option<&mut (dyn Presentable + 'static)> {
        let screen = self.screens.get_mut(&id);
        if screen.is_none() {
            warn!(screen = %id, "screen is not registered");
        }
        screen.map(|screen| screen.as_mut())
    }

    pub fn entered(&self) -> Vec<ScreenId> {
        self.screens
            .values()
            .filter(|screen| screen.is_entered())
            .map(|screen| screen.id())
            .collect()
    }
}

impl fmt::Debug for ScreenDeck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenDeck")
            .field("screens", &self.screens.keys().collect::<Vec<_>>())
            .finish()
    }
}
