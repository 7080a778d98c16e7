use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, ParseOption};
use thiserror::Error;
use tracing::warn;

pub use directive::{ClockFaces, Directive, EventInfo, Mode, Payload};
pub use document::{Document, Section};

/// Why a directive file could not be turned into a [`Directive`].
#[derive(Debug, Error)]
pub enum DirectiveError {
    #[error("directive file could not be decoded: {0}")]
    Decode(String),
    #[error("directive file has no [General] show entry")]
    MissingShow,
    #[error("unknown show mode '{0}'")]
    UnknownMode(String),
}

mod document {
    use super::*;

    const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
    pub(crate) const GENERAL: &str = "General";

    /// Decoded key-value sections. Section names keep their case, keys are
    /// folded to lowercase.
    #[derive(Debug, Clone, Default)]
    pub struct Document {
        sections: HashMap<String, HashMap<String, String>>,
    }

    impl Document {
        /// Decode raw bytes as UTF-8 text. When the plain decoding fails or
        /// yields no `[General]` section, a BOM-aware decoding is attempted.
        pub fn decode(bytes: &[u8]) -> Result<Self, DirectiveError> {
            let plain = std::str::from_utf8(bytes)
                .map_err(|err| DirectiveError::Decode(err.to_string()))
                .and_then(Self::parse_text);

            match plain {
                Ok(doc) if doc.has_section(GENERAL) => Ok(doc),
                first => match Self::decode_with_bom(bytes) {
                    Ok(doc) if doc.has_section(GENERAL) => Ok(doc),
                    retry => match (first, retry) {
                        (Ok(doc), _) => Ok(doc),
                        (Err(_), Ok(doc)) => Ok(doc),
                        (Err(_), Err(err)) => Err(err),
                    },
                },
            }
        }

        fn decode_with_bom(bytes: &[u8]) -> Result<Self, DirectiveError> {
            let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
            let text = std::str::from_utf8(body)
                .map_err(|err| DirectiveError::Decode(err.to_string()))?;
            Self::parse_text(text.trim_start_matches('\u{feff}'))
        }

        fn parse_text(text: &str) -> Result<Self, DirectiveError> {
            let options = ParseOption {
                enabled_quote: false,
                enabled_escape: false,
                enabled_indented_mutiline_value: true,
                ..ParseOption::default()
            };
            let ini = Ini::load_from_str_opt(text, options)
                .map_err(|err| DirectiveError::Decode(err.to_string()))?;

            let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
            for (name, properties) in ini.iter() {
                let entries = sections
                    .entry(name.unwrap_or_default().trim().to_string())
                    .or_default();
                for (key, value) in properties.iter() {
                    entries.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
                }
            }
            Ok(Self { sections })
        }

        pub fn has_section(&self, name: &str) -> bool {
            self.sections.contains_key(name)
        }

        pub fn section(&self, name: &'static str) -> Section<'_> {
            Section {
                name,
                entries: self.sections.get(name),
            }
        }
    }

    /// Read-only view over one section with per-key fallbacks.
    #[derive(Debug, Clone, Copy)]
    pub struct Section<'a> {
        name: &'static str,
        entries: Option<&'a HashMap<String, String>>,
    }

    impl<'a> Section<'a> {
        pub fn get(&self, key: &str) -> Option<&'a str> {
            self.entries
                .and_then(|entries| entries.get(&key.to_ascii_lowercase()))
                .map(String::as_str)
        }

        pub fn text_or(&self, key: &str, default: &str) -> String {
            self.get(key).unwrap_or(default).to_string()
        }

        pub fn path(&self, key: &str) -> Option<PathBuf> {
            self.get(key)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        }

        pub fn flag_or(&self, key: &str, default: bool) -> bool {
            let Some(raw) = self.get(key) else {
                return default;
            };
            match raw.to_ascii_lowercase().as_str() {
                "1" | "yes" | "true" | "on" => true,
                "0" | "no" | "false" | "off" => false,
                _ => {
                    warn!(
                        section = self.name,
                        key,
                        value = raw,
                        default,
                        "not a boolean; using default"
                    );
                    default
                }
            }
        }

        pub fn int_or(&self, key: &str, default: i64) -> i64 {
            let Some(raw) = self.get(key) else {
                return default;
            };
            match raw.parse::<i64>() {
                Ok(value) => value,
                Err(_) => {
                    warn!(
                        section = self.name,
                        key,
                        value = raw,
                        default,
                        "not an integer; using default"
                    );
                    default
                }
            }
        }
    }
}

mod directive {
    use super::*;
    use super::document::GENERAL;

    const OBJECT_INFO: &str = "ObjectInfo";
    const CLOCK: &str = "Clock";
    const SOUND_SENTINEL: &str = "none";
    const EQUIPMENT_SLOTS: usize = 9;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Mode {
        Off,
        Splashscreen,
        Clock,
        Slideshow,
        Event,
        Quit,
    }

    impl Mode {
        pub fn as_str(self) -> &'static str {
            match self {
                Mode::Off => "off",
                Mode::Splashscreen => "splashscreen",
                Mode::Clock => "time",
                Mode::Slideshow => "slideshow",
                Mode::Event => "object",
                Mode::Quit => "quit",
            }
        }
    }

    impl fmt::Display for Mode {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl FromStr for Mode {
        type Err = DirectiveError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.trim().to_ascii_lowercase().as_str() {
                "off" => Ok(Mode::Off),
                "splashscreen" => Ok(Mode::Splashscreen),
                "time" => Ok(Mode::Clock),
                "slideshow" => Ok(Mode::Slideshow),
                "object" => Ok(Mode::Event),
                "quit" => Ok(Mode::Quit),
                _ => Err(DirectiveError::UnknownMode(s.trim().to_string())),
            }
        }
    }

    /// Alarm details shown while an event is active.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct EventInfo {
        pub message: String,
        pub picture_left: Option<PathBuf>,
        pub picture_right: Option<PathBuf>,
        pub crop_picture: bool,
        pub category: String,
        pub sound: String,
        pub repeat: u32,
        pub show_progress: bool,
        pub progress_time: Duration,
        pub show_response_order: bool,
        pub equipment: Vec<PathBuf>,
    }

    impl Default for EventInfo {
        fn default() -> Self {
            Self {
                message: String::new(),
                picture_left: None,
                picture_right: None,
                crop_picture: false,
                category: String::new(),
                sound: SOUND_SENTINEL.to_string(),
                repeat: 1,
                show_progress: false,
                progress_time: Duration::ZERO,
                show_response_order: false,
                equipment: Vec::new(),
            }
        }
    }

    impl EventInfo {
        fn from_section(section: Section<'_>) -> Self {
            let defaults = Self::default();

            let repeat = section.int_or("repeat", i64::from(defaults.repeat));
            let repeat = u32::try_from(repeat.max(1)).unwrap_or(u32::MAX);

            let progress_secs = section.int_or("progresstime", 0);
            let progress_time = match u64::try_from(progress_secs) {
                Ok(secs) => Duration::from_secs(secs),
                Err(_) => {
                    warn!(value = progress_secs, "negative progresstime; disabling progress");
                    Duration::ZERO
                }
            };

            let equipment = (1..=EQUIPMENT_SLOTS)
                .filter_map(|slot| section.path(&format!("equipment_{slot}")))
                .collect();

            Self {
                message: section.text_or("entire_msg", &defaults.message),
                picture_left: section.path("picture_1"),
                picture_right: section.path("picture_2"),
                crop_picture: section.flag_or("crop_picture", defaults.crop_picture),
                category: section.text_or("category", &defaults.category),
                sound: section.text_or("sound", &defaults.sound),
                repeat,
                show_progress: section.flag_or("show_progress", defaults.show_progress),
                progress_time,
                show_response_order: section
                    .flag_or("show_responseOrder", defaults.show_response_order),
                equipment,
            }
        }

        /// The sound to play, or `None` when the sentinel `none` (or nothing)
        /// was given.
        pub fn sound_file(&self) -> Option<&str> {
            let sound = self.sound.trim();
            if sound.is_empty() || sound.eq_ignore_ascii_case(SOUND_SENTINEL) {
                None
            } else {
                Some(sound)
            }
        }

        /// Progress bar duration, when it is both enabled and non-zero.
        pub fn progress(&self) -> Option<Duration> {
            (self.show_progress && !self.progress_time.is_zero()).then_some(self.progress_time)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClockFaces {
        pub second_hand: bool,
        pub minute_hand: bool,
        pub hour_hand: bool,
        pub digital_time: bool,
        pub digital_date: bool,
        pub digital_second: bool,
    }

    impl Default for ClockFaces {
        fn default() -> Self {
            Self {
                second_hand: true,
                minute_hand: true,
                hour_hand: true,
                digital_time: true,
                digital_date: true,
                digital_second: false,
            }
        }
    }

    impl ClockFaces {
        fn from_section(section: Section<'_>) -> Self {
            let d = Self::default();
            Self {
                second_hand: section.flag_or("show_second_hand", d.second_hand),
                minute_hand: section.flag_or("show_minute_hand", d.minute_hand),
                hour_hand: section.flag_or("show_hour_hand", d.hour_hand),
                digital_time: section.flag_or("show_digital_time", d.digital_time),
                digital_date: section.flag_or("show_digital_date", d.digital_date),
                digital_second: section.flag_or("show_digital_second", d.digital_second),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Payload {
        None,
        Event(EventInfo),
        Clock(ClockFaces),
    }

    /// One parsed display intent.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Directive {
        pub mode: Mode,
        pub payload: Payload,
    }

    impl Directive {
        /// A directive for `mode` with every payload field at its default.
        pub fn bare(mode: Mode) -> Self {
            let payload = match mode {
                Mode::Event => Payload::Event(EventInfo::default()),
                Mode::Clock => Payload::Clock(ClockFaces::default()),
                _ => Payload::None,
            };
            Self { mode, payload }
        }

        pub fn event(info: EventInfo) -> Self {
            Self {
                mode: Mode::Event,
                payload: Payload::Event(info),
            }
        }

        pub fn parse(bytes: &[u8]) -> Result<Self, DirectiveError> {
            Self::from_document(&Document::decode(bytes)?)
        }

        pub fn from_document(doc: &Document) -> Result<Self, DirectiveError> {
            let show = doc
                .section(GENERAL)
                .get("show")
                .filter(|value| !value.is_empty())
                .ok_or(DirectiveError::MissingShow)?;
            let mode: Mode = show.parse()?;

            let payload = match mode {
                Mode::Event => Payload::Event(EventInfo::from_section(doc.section(OBJECT_INFO))),
                Mode::Clock => Payload::Clock(ClockFaces::from_section(doc.section(CLOCK))),
                _ => Payload::None,
            };
            Ok(Self { mode, payload })
        }
    }
}
