use std::{collections::HashSet, fs, path::Path, time::Duration};

use anyhow::{ensure, Context};
use clipgif_encoders::Backend;
use serde::{Deserialize, Serialize};

/// Auto-selection order: broad compatibility first, then speed, then
/// quality.
pub const DEFAULT_PRIORITY: [Backend; 3] = [Backend::Worker, Backend::Fast, Backend::Fidelity];

/// Knobs shared by every job a pipeline runs. Every field has a default, so
/// a config file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Hard limit on one relay round trip.
    pub relay_timeout_ms:    u64,
    /// Relay requests for more frames than this are logged as suspicious.
    pub relay_frame_warning: usize,
    /// Frames captured between cooperative yields.
    pub yield_every:         usize,
    pub priority:            Vec<Backend>,
    pub max_width:           Option<u32>,
    pub max_height:          Option<u32>,
    /// Parse every result with the bitstream reader before returning it.
    pub validate_output:     bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            relay_timeout_ms:    60_000,
            relay_frame_warning: 2000,
            yield_every:         10,
            priority:            DEFAULT_PRIORITY.to_vec(),
            max_width:           None,
            max_height:          None,
            validate_output:     true,
        }
    }
}

impl PipelineSettings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.relay_timeout_ms > 0, "relay_timeout_ms must be positive");
        ensure!(self.yield_every > 0, "yield_every must be positive");
        ensure!(
            !self.priority.is_empty(),
            "priority must name at least one encoder"
        );

        let mut seen = HashSet::new();
        for backend in &self.priority {
            ensure!(
                seen.insert(backend),
                "encoder {backend} appears more than once in priority"
            );
        }

        for (name, limit) in [("max_width", self.max_width), ("max_height", self.max_height)] {
            if let Some(limit) = limit {
                ensure!(limit >= 2, "{name} must be at least 2, got {limit}");
            }
        }

        Ok(())
    }

    pub const fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }
}

#[cfg(test)]
mod tests;
