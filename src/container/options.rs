use std::time::Duration;

/// Cadence used by the performance monitor when none is configured.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// Verbosity of the performance monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    /// Skip entries whose queue depth is zero.
    Succinct,
    /// Log every entry, including zero depths.
    Verbose,
}

/// Behavior knobs of a container.
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// Log the container-level queue depth on every monitor tick.
    pub container_monitor_enabled: bool,
    /// Log each underlying block's queue depth on every monitor tick.
    pub block_monitor_enabled: bool,
    /// Monitor cadence; [`DEFAULT_MONITOR_INTERVAL`] when unset.
    pub monitor_interval: Option<Duration>,
    /// Whether zero queue depths are logged.
    pub monitor_mode: MonitorMode,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            container_monitor_enabled: false,
            block_monitor_enabled: false,
            monitor_interval: None,
            monitor_mode: MonitorMode::Succinct,
        }
    }
}

impl ContainerOptions {
    /// Returns true when any monitor output is enabled.
    pub fn monitor_enabled(&self) -> bool {
        self.container_monitor_enabled || self.block_monitor_enabled
    }
}
