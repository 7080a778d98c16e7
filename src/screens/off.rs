use tracing::{info, warn};

use super::{OffOptions, Presentable, ScreenId, ScreenOptions};

/// Blank screen, splash picture or fatal error message.
#[derive(Debug, Default)]
pub struct OffScreen {
    options: OffOptions,
    entered: bool,
}

impl OffScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// What the screen currently presents, for logs and the renderer.
    pub fn describe(&self) -> String {
        match (&self.options.message, self.options.splash, &self.options.picture) {
            (Some(message), _, _) => format!("error: {message}"),
            (None, true, Some(picture)) => format!("splash {}", picture.display()),
            (None, true, None) => "splash".to_string(),
            (None, false, _) => "blank".to_string(),
        }
    }
}

impl Presentable for OffScreen {
    fn id(&self) -> ScreenId {
        ScreenId::Off
    }

    fn configure(&mut self, options: ScreenOptions) {
        match options {
            ScreenOptions::Off(options) => {
                if let Some(picture) = options.picture.as_ref().filter(|p| !p.is_file()) {
                    warn!(picture = %picture.display(), "splash picture missing; showing plain splash");
                }
                self.options = options;
                info!(content = self.describe(), "off screen configured");
            }
            other => warn!(screen = %self.id(), got = %other.screen(), "ignoring foreign options"),
        }
    }

    fn options(&self) -> ScreenOptions {
        ScreenOptions::Off(self.options.clone())
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
}
