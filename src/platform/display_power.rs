use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::config::DisplayPowerConfig;

/// The power intent surface the screen controller drives. Implementations
/// are best-effort: failures are logged, never returned. Calls may block.
pub trait DisplayPower: Send + Sync {
    fn set_power(&self, on: bool);
}

#[derive(Debug, Clone, Default)]
pub struct DisplayPowerPlan {
    pub sysfs: Option<BacklightSysfs>,
    pub sleep_command: Option<String>,
    pub wake_command: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BacklightSysfs {
    pub path: PathBuf,
    pub sleep_value: String,
    pub wake_value: String,
}

#[derive(Debug, Clone)]
pub struct DisplayPowerController {
    inner: Arc<DisplayPowerInner>,
}

#[derive(Debug, Clone)]
pub struct PowerCommandReport {
    pub action: PowerAction,
    pub sysfs: Vec<SysfsExecution>,
    pub commands: Vec<CommandExecution>,
}

impl PowerCommandReport {
    pub fn success(&self) -> bool {
        self.sysfs.iter().any(|s| s.success) || self.commands.iter().any(|c| c.success)
    }
}

#[derive(Debug, Clone)]
pub struct SysfsExecution {
    pub path: PathBuf,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommandExecution {
    pub command: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Off,
    On,
}

type CommandRunner = Arc<dyn Fn(&str) -> Result<CommandOutput> + Send + Sync>;

struct DisplayPowerInner {
    enabled: bool,
    sysfs: Option<BacklightSysfs>,
    sleep_command: Option<String>,
    wake_command: Option<String>,
    runner: CommandRunner,
}

impl fmt::Debug for DisplayPowerInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayPowerInner")
            .field("enabled", &self.enabled)
            .field("sysfs", &self.sysfs)
            .field("sleep_command", &self.sleep_command)
            .field("wake_command", &self.wake_command)
            .finish()
    }
}

impl DisplayPowerController {
    pub fn new(plan: DisplayPowerPlan, enabled: bool) -> Result<Self> {
        Self::build(plan, enabled, default_runner())
    }

    pub fn from_config(cfg: &DisplayPowerConfig) -> Result<Self> {
        Self::new(cfg.plan(), cfg.enabled)
    }

    pub fn power_off(&self) -> PowerCommandReport {
        self.inner.perform(PowerAction::Off)
    }

    pub fn power_on(&self) -> PowerCommandReport {
        self.inner.perform(PowerAction::On)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    fn build(plan: DisplayPowerPlan, enabled: bool, runner: CommandRunner) -> Result<Self> {
        let DisplayPowerPlan {
            sysfs,
            sleep_command,
            wake_command,
        } = plan;

        if sysfs.is_none() && sleep_command.is_none() && wake_command.is_none() {
            return Err(anyhow!(
                "display power plan must configure at least one sysfs path or command"
            ));
        }
        for (label, command) in [("sleep command", &sleep_command), ("wake command", &wake_command)]
        {
            if let Some(command) = command {
                ensure_not_blank(command, label)?;
            }
        }

        Ok(Self {
            inner: Arc::new(DisplayPowerInner {
                enabled,
                sysfs,
                sleep_command,
                wake_command,
                runner,
            }),
        })
    }

    #[cfg(test)]
    fn with_runner(plan: DisplayPowerPlan, runner: CommandRunner) -> Result<Self> {
        Self::build(plan, true, runner)
    }
}

impl DisplayPower for DisplayPowerController {
    fn set_power(&self, on: bool) {
        let action = if on { PowerAction::On } else { PowerAction::Off };
        if !self.inner.enabled {
            debug!(?action, "display power control disabled; skipping");
            return;
        }
        let report = self.inner.perform(action);
        log_report("set-power", &report);
    }
}

impl DisplayPowerInner {
    fn perform(&self, action: PowerAction) -> PowerCommandReport {
        let mut report = PowerCommandReport {
            action,
            sysfs: Vec::new(),
            commands: Vec::new(),
        };

        if let Some(sysfs) = &self.sysfs {
            report.sysfs.push(sysfs.execute(action));
        }

        if let Some(command) = self.command_for(action) {
            let execution = self.run_shell(command);
            if execution.success {
                debug!(?action, command, "display power command succeeded");
            } else {
                let exit = execution
                    .exit_code
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                warn!(
                    ?action,
                    exit_code = exit,
                    stderr = execution.stderr,
                    command,
                    "display power command failed"
                );
            }
            report.commands.push(execution);
        }

        report
    }

    fn command_for(&self, action: PowerAction) -> Option<&str> {
        match action {
            PowerAction::Off => self.sleep_command.as_deref(),
            PowerAction::On => self.wake_command.as_deref(),
        }
    }

    fn run_shell(&self, command: &str) -> CommandExecution {
        match (self.runner)(command) {
            Ok(output) => CommandExecution {
                command: command.to_string(),
                success: output.status.success(),
                exit_code: output.status.code(),
                stderr: output.stderr,
            },
            Err(err) => CommandExecution {
                command: command.to_string(),
                success: false,
                exit_code: None,
                stderr: err.to_string(),
            },
        }
    }
}

impl BacklightSysfs {
    fn execute(&self, action: PowerAction) -> SysfsExecution {
        let value = match action {
            PowerAction::Off => &self.sleep_value,
            PowerAction::On => &self.wake_value,
        };

        let result = fs::write(&self.path, value);
        if let Err(err) = &result {
            warn!(
                path = %self.path.display(),
                value,
                ?action,
                error = %err,
                "failed to write backlight value"
            );
        } else {
            debug!(path = %self.path.display(), value, ?action, "wrote backlight value");
        }
        SysfsExecution {
            path: self.path.clone(),
            success: result.is_ok(),
            error: result.err().map(|err| err.to_string()),
        }
    }
}

/// Summarize a report at info/warn and dump the individual steps at debug.
pub fn log_report(attempt: &str, report: &PowerCommandReport) {
    if report.success() {
        info!(action = ?report.action, attempt, "display power action succeeded");
    } else {
        let stderr: Vec<&str> = report
            .commands
            .iter()
            .map(|cmd| cmd.stderr.trim())
            .filter(|stderr| !stderr.is_empty())
            .collect();
        warn!(
            action = ?report.action,
            attempt,
            stderr = stderr.join("; "),
            "display power action failed"
        );
    }

    for cmd in &report.commands {
        debug!(
            action = ?report.action,
            attempt,
            command = cmd.command,
            success = cmd.success,
            exit_code = cmd.exit_code,
            "display power command detail"
        );
    }
    for sysfs in &report.sysfs {
        debug!(
            action = ?report.action,
            attempt,
            path = %sysfs.path.display(),
            success = sysfs.success,
            error = ?sysfs.error,
            "display power sysfs detail"
        );
    }
}

#[derive(Debug)]
struct CommandOutput {
    status: ExitStatus,
    stderr: String,
}

fn ensure_not_blank(value: &str, label: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(anyhow!("{label} must not be blank"))
    } else {
        Ok(())
    }
}

fn default_runner() -> CommandRunner {
    Arc::new(|command| run_shell(command))
}

fn run_shell(command: &str) -> Result<CommandOutput> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .with_context(|| format!("failed to spawn shell for command: {command}"))?;

    Ok(CommandOutput {
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
