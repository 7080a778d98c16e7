use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use config_model::Mode;
use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::platform::display_power::{BacklightSysfs, DisplayPowerPlan};

pub const DEFAULT_DIRECTIVE_FILE: &str = "alarmdisplay.ini";
pub const DEFAULT_CEC_WAKE_COMMAND: &str = "echo 'on 0' | cec-client -s -d 1";
pub const DEFAULT_CEC_SLEEP_COMMAND: &str = "echo 'standby 0' | cec-client -s -d 1";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Configuration {
    pub watch: WatchConfig,
    #[serde(default)]
    pub display_power: DisplayPowerConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub screens: ScreensConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.watch.directory.as_os_str().is_empty(),
            "watch.directory must not be empty"
        );
        ensure!(
            !self.watch.file_name.trim().is_empty(),
            "watch.file-name must not be blank"
        );
        ensure!(
            Path::new(&self.watch.file_name).file_name().is_some()
                && !self.watch.file_name.contains(std::path::MAIN_SEPARATOR),
            "watch.file-name must be a bare file name"
        );
        self.display_power
            .validate()
            .context("invalid display-power configuration")?;
        self.audio
            .validate()
            .context("invalid audio configuration")?;
        self.screens
            .validate()
            .context("invalid screens configuration")?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct WatchConfig {
    /// Directory the external alarm system writes the directive file into.
    pub directory: PathBuf,
    /// Directive file name, matched case-insensitively.
    #[serde(default = "WatchConfig::default_file_name")]
    pub file_name: String,
    /// Timestamped copies of every processed directive file land here.
    #[serde(default)]
    pub backup_directory: Option<PathBuf>,
    /// Parse and apply the directive file already present at startup.
    #[serde(default)]
    pub apply_existing_on_start: bool,
}

impl WatchConfig {
    fn default_file_name() -> String {
        DEFAULT_DIRECTIVE_FILE.to_string()
    }

    pub fn target_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            file_name: Self::default_file_name(),
            backup_directory: None,
            apply_existing_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DisplayPowerConfig {
    /// Master switch for HDMI-CEC / backlight control.
    pub enabled: bool,
    pub sysfs: Option<BacklightSysfsConfig>,
    pub sleep_command: Option<String>,
    pub wake_command: Option<String>,
    /// Re-assert a power-on intent at this period (some TVs fall asleep on their own).
    #[serde(with = "humantime_serde")]
    pub keep_alive: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BacklightSysfsConfig {
    pub path: PathBuf,
    pub sleep_value: String,
    pub wake_value: String,
}

impl Default for DisplayPowerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sysfs: None,
            sleep_command: None,
            wake_command: None,
            keep_alive: None,
        }
    }
}

impl DisplayPowerConfig {
    /// Commands fall back to `cec-client` unless a sysfs backlight is the only
    /// configured mechanism.
    pub fn plan(&self) -> DisplayPowerPlan {
        let use_cec_defaults =
            self.sysfs.is_none() || self.sleep_command.is_some() || self.wake_command.is_some();
        let command = |custom: &Option<String>, fallback: &str| {
            custom
                .clone()
                .or_else(|| use_cec_defaults.then(|| fallback.to_string()))
        };
        DisplayPowerPlan {
            sysfs: self.sysfs.as_ref().map(|sysfs| BacklightSysfs {
                path: sysfs.path.clone(),
                sleep_value: sysfs.sleep_value.clone(),
                wake_value: sysfs.wake_value.clone(),
            }),
            sleep_command: command(&self.sleep_command, DEFAULT_CEC_SLEEP_COMMAND),
            wake_command: command(&self.wake_command, DEFAULT_CEC_WAKE_COMMAND),
        }
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("sleep-command", &self.sleep_command),
            ("wake-command", &self.wake_command),
        ] {
            if let Some(command) = value {
                ensure!(
                    !command.trim().is_empty(),
                    "display-power.{} must not be blank when provided",
                    field
                );
            }
        }
        if let Some(period) = self.keep_alive {
            ensure!(
                period >= Duration::from_secs(1),
                "display-power.keep-alive must be at least one second"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct AudioConfig {
    /// Relative sound names from the directive resolve against this directory.
    pub sound_directory: PathBuf,
    /// Player invocation; the sound file is appended as the last argument.
    pub player_command: String,
    #[serde(with = "humantime_serde")]
    pub start_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub repeat_pause: Duration,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sound_directory: PathBuf::from("/opt/alarm-kiosk/sounds"),
            player_command: "aplay -q".to_string(),
            start_delay: Duration::from_millis(500),
            repeat_pause: Duration::from_secs(2),
        }
    }
}

impl AudioConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            !self.player_command.trim().is_empty(),
            "audio.player-command must not be blank"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ScreensConfig {
    /// Screen the idle auto-revert and the operator reset return to.
    #[serde(deserialize_with = "deserialize_mode")]
    pub default_screen: Mode,
    /// Return to the default screen after this much time without a directive.
    #[serde(with = "humantime_serde")]
    pub auto_revert: Option<Duration>,
    pub splash_picture: Option<PathBuf>,
    /// Redraw period of the station loop.
    #[serde(with = "humantime_serde")]
    pub tick: Duration,
    pub event: EventScreenConfig,
    pub slideshow: SlideshowConfig,
}

impl Default for ScreensConfig {
    fn default() -> Self {
        Self {
            default_screen: Mode::Clock,
            auto_revert: None,
            splash_picture: None,
            tick: Duration::from_secs(1),
            event: EventScreenConfig::default(),
            slideshow: SlideshowConfig::default(),
        }
    }
}

impl ScreensConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            !matches!(self.default_screen, Mode::Event | Mode::Quit),
            "screens.default-screen must be one of off, splashscreen, time or slideshow"
        );
        ensure!(
            self.tick >= Duration::from_millis(50),
            "screens.tick must be at least 50ms"
        );
        if let Some(idle) = self.auto_revert {
            ensure!(!idle.is_zero(), "screens.auto-revert must be positive");
        }
        if let Some(delay) = self.event.auto_power_off {
            ensure!(!delay.is_zero(), "screens.event.auto-power-off must be positive");
        }
        ensure!(
            !self.event.default_color.trim().is_empty(),
            "screens.event.default-color must not be blank"
        );
        ensure!(
            self.slideshow.delay >= Duration::from_secs(1),
            "screens.slideshow.delay must be at least one second"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct EventScreenConfig {
    /// Relative picture names from the directive resolve against this directory.
    pub picture_directory: Option<PathBuf>,
    /// Shown in place of a picture that cannot be found.
    pub placeholder_picture: Option<PathBuf>,
    /// Switch the display off this long after an alarm arrived.
    #[serde(with = "humantime_serde")]
    pub auto_power_off: Option<Duration>,
    /// Category tag (case-insensitive) to banner color.
    pub category_colors: BTreeMap<String, String>,
    pub default_color: String,
}

impl Default for EventScreenConfig {
    fn default() -> Self {
        Self {
            picture_directory: None,
            placeholder_picture: None,
            auto_power_off: None,
            category_colors: BTreeMap::new(),
            default_color: "#c00000".to_string(),
        }
    }
}

impl EventScreenConfig {
    pub fn color_for(&self, category: &str) -> &str {
        let category = category.trim();
        self.category_colors
            .iter()
            .find(|(tag, _)| tag.eq_ignore_ascii_case(category))
            .map(|(_, color)| color.as_str())
            .unwrap_or(&self.default_color)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlideshowOrder {
    #[default]
    Name,
    Modified,
    Random,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SlideshowConfig {
    pub directory: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    pub order: SlideshowOrder,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            directory: None,
            delay: Duration::from_secs(10),
            order: SlideshowOrder::Name,
        }
    }
}

fn deserialize_mode<'de, D>(deserializer: D) -> Result<Mode, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(de::Error::custom)
}
