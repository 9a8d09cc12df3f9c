//! Interpreter configuration.

use std::time::Duration;

/// Largest heap addressable by 16-bit addresses.
pub const MAX_HEAP_SIZE: usize = 0x10000;

/// Settings for an [`crate::Executable`].
#[derive(Debug, Clone, PartialEq)]
pub struct VmConfig {
    /// Frame heap size in bytes. Values above 64 KiB are clamped.
    pub heap_size: usize,
    /// Maximum number of live procedure activations.
    pub max_call_depth: usize,
    /// Minimum time between host composite calls while running.
    pub composite_interval: Duration,
    /// Instructions to execute per `run` call before yielding with
    /// [`crate::Outcome::StepLimit`]. `None` runs until the program ends
    /// or waits.
    pub max_steps: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            heap_size: MAX_HEAP_SIZE,
            max_call_depth: 256,
            composite_interval: Duration::from_secs(1) / 15,
            max_steps: None,
        }
    }
}

impl VmConfig {
    pub(crate) fn effective_heap_size(&self) -> usize {
        self.heap_size.min(MAX_HEAP_SIZE)
    }
}
