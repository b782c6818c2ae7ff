use serde::{Deserialize, Serialize};

use crate::caps::DeviceCaps;
use crate::error::CoreError;

/// Top-level engine configuration, loaded from vkgl.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub caps: CapsOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Mirror dropped-command diagnostics to the log
    #[serde(default = "default_true")]
    pub log_dropped_commands: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Emit a trace event per replayed opcode (very verbose)
    #[serde(default)]
    pub trace_opcodes: bool,
}

/// Force-disable individual backend capabilities, regardless of what the
/// live context reports. Used to exercise the gated fallback paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapsOverrides {
    #[serde(default)]
    pub disable_multi_draw_indirect: bool,
    #[serde(default)]
    pub disable_base_instance: bool,
    #[serde(default)]
    pub disable_compute_shaders: bool,
    #[serde(default)]
    pub disable_storage_image_atomics: bool,
    #[serde(default)]
    pub disable_timer_queries: bool,
}

impl CapsOverrides {
    pub fn apply(&self, mut caps: DeviceCaps) -> DeviceCaps {
        if self.disable_multi_draw_indirect {
            caps.multi_draw_indirect = false;
        }
        if self.disable_base_instance {
            caps.base_instance = false;
        }
        if self.disable_compute_shaders {
            caps.compute_shaders = false;
        }
        if self.disable_storage_image_atomics {
            caps.storage_image_atomics = false;
        }
        if self.disable_timer_queries {
            caps.timer_queries = false;
        }
        caps
    }
}

impl EngineConfig {
    /// Load configuration from a toml file.
    pub fn load(path: &std::path::Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, CoreError> {
        toml::from_str(text).map_err(|e| CoreError::ConfigError(e.to_string()))
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            log_dropped_commands: true,
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            trace_opcodes: false,
        }
    }
}

fn default_true() -> bool {
    true
}
