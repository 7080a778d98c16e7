use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{EventOptions, Presentable, ScreenId, ScreenOptions};
use crate::config::EventScreenConfig;

/// A picture slot after resolution against the picture directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Picture {
    File(PathBuf),
    /// The requested file is missing; the configured placeholder (if any)
    /// is shown instead.
    Placeholder {
        requested: PathBuf,
        placeholder: Option<PathBuf>,
    },
}

/// Resolved presentation model of the alarm screen.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventView {
    pub message: String,
    pub left: Option<Picture>,
    pub right: Option<Picture>,
    pub crop: bool,
    pub color: String,
    pub equipment: Vec<Picture>,
    /// Elapsed share of the progress bar in `0.0..=1.0`; `None` hides it.
    pub progress: Option<f32>,
}

#[derive(Debug)]
pub struct EventScreen {
    cfg: EventScreenConfig,
    options: EventOptions,
    view: EventView,
    progress_started: Option<Instant>,
    entered: bool,
}

impl EventScreen {
    pub fn new(cfg: EventScreenConfig) -> Self {
        let view = EventView {
            color: cfg.default_color.clone(),
            ..EventView::default()
        };
        Self {
            cfg,
            options: EventOptions::default(),
            view,
            progress_started: None,
            entered: false,
        }
    }

    pub fn view(&self) -> &EventView {
        &self.view
    }

    fn resolve(&self, requested: &Path) -> Picture {
        let path = match &self.cfg.picture_directory {
            Some(dir) if requested.is_relative() => dir.join(requested),
            _ => requested.to_path_buf(),
        };
        if path.is_file() {
            Picture::File(path)
        } else {
            warn!(picture = %path.display(), "alarm picture missing; using placeholder");
            Picture::Placeholder {
                requested: path,
                placeholder: self.cfg.placeholder_picture.clone(),
            }
        }
    }

    fn rebuild_view(&mut self, now: Instant) {
        let options = &self.options;
        let view = EventView {
            message: options.message.clone(),
            left: options.picture_left.as_deref().map(|p| self.resolve(p)),
            right: options.picture_right.as_deref().map(|p| self.resolve(p)),
            crop: options.crop_picture,
            color: self.cfg.color_for(&options.category).to_string(),
            equipment: options
                .response_order
                .iter()
                .map(|p| self.resolve(p))
                .collect(),
            progress: options.progress.map(|_| 0.0),
        };
        self.view = view;
        self.progress_started = self.options.progress.map(|_| now);
    }
}

impl Presentable for EventScreen {
    fn id(&self) -> ScreenId {
        ScreenId::Event
    }

    fn configure(&mut self, options: ScreenOptions) {
        match options {
            ScreenOptions::Event(options) => {
                self.options = options;
                self.rebuild_view(Instant::now());
                info!(
                    alarm = self.view.message,
                    color = self.view.color,
                    equipment = self.view.equipment.len(),
                    progress = self.view.progress.is_some(),
                    "alarm screen configured"
                );
            }
            other => warn!(screen = %self.id(), got = %other.screen(), "ignoring foreign options"),
        }
    }

    fn options(&self) -> ScreenOptions {
        ScreenOptions::Event(self.options.clone())
    }

    fn enter(&mut self) {
        self.entered = true;
    }

    fn exit(&mut self) {
        self.entered = false;
    }

    fn is_entered(&self) -> bool {
        self.entered
    }

    fn tick(&mut self, now: Instant) {
        let (Some(total), Some(started)) = (self.options.progress, self.progress_started) else {
            return;
        };
        let fraction = (now.saturating_duration_since(started).as_secs_f32()
            / total.as_secs_f32())
        .clamp(0.0, 1.0);
        if self.view.progress != Some(fraction) {
            debug!(fraction, "progress bar advanced");
            self.view.progress = Some(fraction);
        }
    }
}
