use serde::{Deserialize, Serialize};

/// Target number of service instances across the fleet.
///
/// Never negative: scaling down by more than the current value clamps at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesiredReplicas(u32);

impl DesiredReplicas {
    pub const fn new(count: u32) -> Self {
        Self(count)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Increase by `count`, saturating at `u32::MAX`.
    pub fn scale_up(&mut self, count: u32) {
        self.0 = self.0.saturating_add(count);
    }

    /// Decrease by `count`, clamping at zero.
    pub fn scale_down(&mut self, count: u32) {
        self.0 = self.0.saturating_sub(count);
    }
}

impl std::fmt::Display for DesiredReplicas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
