use std::io;
use std::path::PathBuf;

use config_model::DirectiveError;
use thiserror::Error;

/// Misuse of a [`crate::timer::DelayedAction`].
#[derive(Debug, Error)]
pub enum TimerError {
    /// A new arming was requested while the previous one is still alive.
    #[error("timer '{0}' is still running; cancel and join it before re-arming")]
    AlreadyRunning(&'static str),
}

/// Failures inside one watcher cycle. None of these escape the watcher task.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to read modification time of {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Directive(#[from] DirectiveError),
}
