use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use rand::seq::SliceRandom;
use rand::{SeedableRng, rngs::StdRng};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{Presentable, ScreenId, ScreenOptions, SlideshowOptions};
use crate::config::{SlideshowConfig, SlideshowOrder};

const PICTURE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

fn is_picture(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            PICTURE_EXTENSIONS.contains(&ext.as_str())
        })
}

/// Pictures directly inside `dir`, ordered per `order`.
pub fn collect_pictures(dir: &Path, order: SlideshowOrder, rng: &mut StdRng) -> Vec<PathBuf> {
    let mut pictures: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && is_picture(e.path()))
        .map(|e| e.into_path())
        .collect();

    match order {
        SlideshowOrder::Name => pictures.sort(),
        SlideshowOrder::Modified => pictures.sort_by_key(|p| {
            (
                fs::metadata(p)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH),
                p.clone(),
            )
        }),
        SlideshowOrder::Random => pictures.shuffle(rng),
    }
    pictures
}

/// Cycles through the pictures of one directory.
#[derive(Debug)]
pub struct SlideshowScreen {
    options: SlideshowOptions,
    pictures: Vec<PathBuf>,
    index: usize,
    shown_at: Option<Instant>,
    rng: StdRng,
    entered: bool,
    /// Set by `enter`; the first `configure` after it reuses that scan when
    /// the options match.
    scanned_on_enter: bool,
}

impl SlideshowScreen {
    pub fn new(cfg: &SlideshowConfig) -> Self {
        Self::with_rng(cfg, StdRng::from_os_rng())
    }

    pub fn with_rng(cfg: &SlideshowConfig, rng: StdRng) -> Self {
        Self {
            options: SlideshowOptions {
                directory: cfg.directory.clone(),
                delay: cfg.delay,
                order: cfg.order,
            },
            pictures: Vec::new(),
            index: 0,
            shown_at: None,
            rng,
            entered: false,
            scanned_on_enter: false,
        }
    }

    /// Picture on screen, `None` while the placeholder is shown.
    pub fn current(&self) -> Option<&Path> {
        self.pictures.get(self.index).map(PathBuf::as_path)
    }

    pub fn pictures(&self) -> &[PathBuf] {
        &self.pictures
    }

    fn rescan(&mut self, now: Instant) {
        self.pictures = match &self.options.directory {
            Some(dir) if dir.is_dir() => collect_pictures(dir, self.options.order, &mut self.rng),
            Some(dir) => {
                warn!(directory = %dir.display(), "slideshow directory missing");
                Vec::new()
            }
            None => Vec::new(),
        };
        self.index = 0;
        self.shown_at = Some(now);
        if self.pictures.is_empty() {
            warn!("slideshow has no pictures; showing placeholder");
        } else {
            info!(
                pictures = self.pictures.len(),
                order = ?self.options.order,
                "slideshow loaded"
            );
        }
    }
}

impl Presentable for SlideshowScreen {
    fn id(&self) -> ScreenId {
        ScreenId::Slideshow
    }

    fn configure(&mut self, options: ScreenOptions) {
        match options {
            ScreenOptions::Slideshow(options) => {
                let unchanged = options == self.options;
                self.options = options;
                let fresh = std::mem::take(&mut self.scanned_on_enter);
                if self.entered && !(fresh && unchanged) {
                    self.rescan(Instant::now());
                }
            }
            other => warn!(screen = %self.id(), got = %other.screen(), "ignoring foreign options"),
        }
    }

    fn options(&self) -> ScreenOptions {
        ScreenOptions::Slideshow(self.options.clone())
    }

    fn enter(&mut self) {
        if !self.entered {
            self.entered = true;
            self.rescan(Instant::now());
            self.scanned_on_enter = true;
        }
    }

    fn exit(&mut self) {
        self.entered = false;
        self.scanned_on_enter = false;
        self.shown_at = None;
    }

    fn is_entered(&self) -> bool {
        self.entered
    }

    fn tick(&mut self, now: Instant) {
        let Some(shown_at) = self.shown_at else {
            return;
        };
        if self.pictures.len() < 2 || now.saturating_duration_since(shown_at) < self.options.delay {
            return;
        }
        self.index = (self.index + 1) % self.pictures.len();
        self.shown_at = Some(now);
        if let Some(current) = self.current() {
            debug!(picture = %current.display(), "slideshow advanced");
        }
    }
}
