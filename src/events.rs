use config_model::Directive;

/// Work items for the station loop. Everything that changes what is on screen
/// goes through this queue so only the station loop touches the screens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationCommand {
    /// A freshly parsed directive from the watcher.
    Apply(Directive),
    /// The idle auto-revert timer armed at `generation` elapsed.
    RevertIdle { generation: u64 },
    /// The auto-power-off timer armed at `generation` elapsed.
    PowerOffElapsed { generation: u64 },
    /// Operator reset (SIGUSR1): show the default screen.
    ResetToDefault,
}
