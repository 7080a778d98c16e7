use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use config_model::Directive;
use tracing::{debug, error, info, trace, warn};

use crate::backup;
use crate::config::WatchConfig;
use crate::error::WatchError;

/// Debounce state private to the watcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchState {
    /// Modification time of the last change that was processed.
    pub last_modified: Option<SystemTime>,
}

/// Turns change notifications for the directive file into [`Directive`]s.
///
/// Each change is processed at most once: the file's modification time is the
/// identity of a write, so repeated notifications for the same write collapse.
#[derive(Debug)]
pub struct ConfigWatcher {
    directory: PathBuf,
    file_name: String,
    backup_directory: Option<PathBuf>,
    state: WatchState,
}

impl ConfigWatcher {
    /// The debounce state starts at the target's current modification time,
    /// so the file already on disk is not replayed.
    pub fn new(cfg: &WatchConfig) -> Self {
        let mut watcher = Self {
            directory: cfg.directory.clone(),
            file_name: cfg.file_name.clone(),
            backup_directory: cfg.backup_directory.clone(),
            state: WatchState::default(),
        };
        let target = watcher.target();
        watcher.state.last_modified = modified(&target).ok();
        debug!(
            target = %target.display(),
            initial_mtime = ?watcher.state.last_modified,
            "directive watcher initialized"
        );
        watcher
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    /// The directive file on disk. The configured spelling wins; otherwise
    /// the first directory entry whose name matches ignoring case.
    pub fn target(&self) -> PathBuf {
        let exact = self.directory.join(&self.file_name);
        if exact.is_file() {
            return exact;
        }
        fs::read_dir(&self.directory)
            .into_iter()
            .flatten()
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .find(|path| self.matches(path) && path.is_file())
            .unwrap_or(exact)
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(OsStr::to_str)
            .is_some_and(|name| name.eq_ignore_ascii_case(&self.file_name))
    }

    /// Handle one change notification. Returns a directive only for a new
    /// write of the target that decoded and named a known mode; every other
    /// outcome is logged and leaves the display untouched.
    pub fn on_file_changed(&mut self, path: &Path) -> Option<Directive> {
        if !self.matches(path) {
            trace!(path = %path.display(), "ignoring change to unrelated file");
            return None;
        }
        self.process(path)
    }

    /// Process the target regardless of the debounce state.
    pub fn read_current(&mut self) -> Option<Directive> {
        self.state.last_modified = None;
        let target = self.target();
        self.process(&target)
    }

    fn process(&mut self, path: &Path) -> Option<Directive> {
        match self.try_process(path) {
            Ok(directive) => directive,
            Err(err) => {
                error!(path = %path.display(), error = %err, "directive cycle aborted");
                None
            }
        }
    }

    fn try_process(&mut self, path: &Path) -> Result<Option<Directive>, WatchError> {
        let mtime = modified(path).map_err(|source| WatchError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
        if self.state.last_modified == Some(mtime) {
            debug!(path = %path.display(), "duplicate change notification");
            return Ok(None);
        }
        // Recorded before parsing so notifications arriving mid-parse are dropped.
        self.state.last_modified = Some(mtime);

        if let Some(dir) = &self.backup_directory {
            if let Err(err) = backup::backup_copy(path, dir, Local::now()) {
                warn!(error = %err, "directive backup failed");
            }
        }

        let bytes = fs::read(path).map_err(|source| WatchError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let directive = Directive::parse(&bytes)?;
        info!(path = %path.display(), mode = %directive.mode, "directive parsed");
        Ok(Some(directive))
    }
}

fn modified(path: &Path) -> std::io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}
