//! Alarm display kiosk: watches a directive file written by the alerting
//! system and drives the station screen, alarm audio and display power.

pub mod backup;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod screens;
pub mod timer;
pub mod watch;

pub mod platform {
    pub mod audio;
    pub mod display_power;
}

pub mod tasks {
    pub mod station;
    pub mod watcher;
}
