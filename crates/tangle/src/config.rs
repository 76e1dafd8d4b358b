use serde::{Deserialize, Serialize};

/// Largest plot side in pixels.
pub const MAX_PLOT_SIDE: u32 = 4096;

/// Settings shared by every cell call in a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Width in pixels of images produced by `Plot/*` calls.
    pub plot_width: u32,
    pub plot_height: u32,
}

impl WorkspaceConfig {
    /// Plots must be at least one pixel and at most `MAX_PLOT_SIDE` on each side.
    pub fn check_plot_size(&self) -> Result<(), String> {
        let valid = 1..=MAX_PLOT_SIDE;
        if valid.contains(&self.plot_width) && valid.contains(&self.plot_height) {
            Ok(())
        } else {
            Err(format!(
                "plot size {}x{} is outside 1x1 to {MAX_PLOT_SIDE}x{MAX_PLOT_SIDE}",
                self.plot_width, self.plot_height
            ))
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            plot_width: 480,
            plot_height: 320,
        }
    }
}
