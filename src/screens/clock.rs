use std::time::Instant;

use chrono::{DateTime, Local};
use config_model::ClockFaces;
use tracing::{debug, warn};

use super::{Presentable, ScreenId, ScreenOptions};

/// Text shown below the dial, or `None` when both digital faces are off.
pub fn render_readout(faces: &ClockFaces, now: DateTime<Local>) -> Option<String> {
    let time = faces.digital_time.then(|| {
        if faces.digital_second {
            now.format("%H:%M:%S").to_string()
        } else {
            now.format("%H:%M").to_string()
        }
    });
    let date = faces
        .digital_date
        .then(|| now.format("%d.%m.%Y").to_string());
    match (time, date) {
        (Some(time), Some(date)) => Some(format!("{time}  {date}")),
        (time, date) => time.or(date),
    }
}

/// Analog dial with optional digital time and date.
#[derive(Debug, Default)]
pub struct ClockScreen {
    faces: ClockFaces,
    readout: Option<String>,
    entered: bool,
}

impl ClockScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faces(&self) -> ClockFaces {
        self.faces
    }

    pub fn readout(&self) -> Option<&str> {
        self.readout.as_deref()
    }

    fn refresh(&mut self) {
        let readout = render_readout(&self.faces, Local::now());
        if readout != self.readout {
            debug!(readout = ?readout, "clock readout changed");
            self.readout = readout;
        }
    }
}

impl Presentable for ClockScreen {
    fn id(&self) -> ScreenId {
        ScreenId::Clock
    }

    fn configure(&mut self, options: ScreenOptions) {
        match options {
            ScreenOptions::Clock(faces) => {
                self.faces = faces;
                self.refresh();
            }
            other => warn!(screen = %self.id(), got = %other.screen(), "ignoring foreign options"),
        }
    }

    fn options(&self) -> ScreenOptions {
        ScreenOptions::Clock(self.faces)
    }

    fn enter(&mut self) {
        self.entered = true;
        self.refresh();
    }

    fn exit(&mut self) {
        self.entered = false;
    }

    fn is_entered(&self) -> bool {
        self.entered
    }

    fn tick(&mut self, _now: Instant) {
        self.refresh();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, 9, 5, 7).unwrap()
    }

    #[test]
    fn default_faces_show_time_and_date() {
        let faces = ClockFaces::default();
        assert_eq!(
            render_readout(&faces, at()).as_deref(),
            Some("09:05  14.03.2026")
        );
    }

    #[test]
    fn seconds_are_opt_in() {
        let faces = ClockFaces {
            digital_date: false,
            digital_second: true,
            ..ClockFaces::default()
        };
        assert_eq!(render_readout(&faces, at()).as_deref(), Some("09:05:07"));
    }

    #[test]
    fn no_digital_faces_means_no_readout() {
        let faces = ClockFaces {
            digital_time: false,
            digital_date: false,
            ..ClockFaces::default()
        };
        assert_eq!(render_readout(&faces, at()), None);
    }

    #[test]
    fn configure_keeps_faces_for_options_query() {
        let mut screen = ClockScreen::new();
        let faces = ClockFaces {
            second_hand: false,
            ..ClockFaces::default()
        };
        screen.configure(ScreenOptions::Clock(faces));
        assert_eq!(screen.options(), ScreenOptions::Clock(faces));
        assert!(screen.readout().is_some());
    }
}
