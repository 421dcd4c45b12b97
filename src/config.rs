use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound of battery modules a table can be generated for.
pub const MAX_MODULES: usize = 25;
/// Upper bound of balancing columns.
pub const MAX_COLUMNS: usize = 6;
/// Modules 0..8 form the standard range, everything above is the extended range.
pub const STANDARD_MODULES: usize = 8;

pub const CELLS_PER_MODULE: usize = 12;
pub const TEMP_SENSORS_PER_MODULE: usize = 12;
pub const CELLS_PER_GROUP: usize = 3;
pub const GROUPS_PER_MODULE: usize = CELLS_PER_MODULE / CELLS_PER_GROUP;

/// Bits available for the module/column command after the debug sub-command byte.
pub const MODULE_COLUMN_COMMAND_BITS: usize = 56;

pub const FRAME_BYTES: usize = 8;
pub const FRAME_BITS: u8 = 64;

/// Runtime selection of the optional table blocks and timing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanSignalConfig {
    pub module_count: usize,
    pub column_count: usize,
    pub has_extended_modules: bool,
    pub has_trigger_sensor: bool,
    pub has_heartbeat: bool,
    pub heartbeat_timeout_ms: u32,
    pub skip_safe_state_if_disabled: bool,
    pub tick_ms: u32,
    pub state_request_repeat_ms: u32,
    pub fuse_in_normal_path: bool,
    pub fuse_in_charge_path: bool,
}

impl CanSignalConfig {
    pub fn new() -> Self {
        Self {
            module_count: MAX_MODULES,
            column_count: MAX_COLUMNS,
            has_extended_modules: true,
            has_trigger_sensor: false,
            has_heartbeat: true,
            heartbeat_timeout_ms: 2100,
            skip_safe_state_if_disabled: true,
            tick_ms: 10,
            state_request_repeat_ms: 3000,
            fuse_in_normal_path: true,
            fuse_in_charge_path: false,
        }
    }

    /// Standard-range layout without any of the optional blocks.
    pub fn standard(module_count: usize) -> Self {
        Self {
            module_count,
            has_extended_modules: false,
            ..Self::new()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.module_count == 0 || self.module_count > MAX_MODULES {
            return Err(ConfigError::InvalidModuleCount(self.module_count));
        }
        if self.column_count == 0 || self.column_count > MAX_COLUMNS {
            return Err(ConfigError::InvalidColumnCount(self.column_count));
        }
        if self.module_count > STANDARD_MODULES && !self.has_extended_modules {
            return Err(ConfigError::ExtendedModulesDisabled(self.module_count));
        }
        if 2 * self.module_count + self.column_count > MODULE_COLUMN_COMMAND_BITS {
            return Err(ConfigError::ModuleColumnOverflow {
                modules: self.module_count,
                columns: self.column_count,
            });
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::ZeroDuration { field: "tick_ms" });
        }
        if self.heartbeat_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "heartbeat_timeout_ms",
            });
        }
        Ok(())
    }

    /// Modules placed before the optional trigger signal.
    pub fn standard_module_count(&self) -> usize {
        self.module_count.min(STANDARD_MODULES)
    }

    pub fn cell_count(&self) -> usize {
        self.module_count * CELLS_PER_MODULE
    }

    pub fn temperature_sensor_count(&self) -> usize {
        self.module_count * TEMP_SENSORS_PER_MODULE
    }
}

impl Default for CanSignalConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CanSignalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cell_count(), 300);
        assert_eq!(config.standard_module_count(), 8);
    }

    #[test]
    fn test_extended_modules_required_above_eight() {
        let mut config = CanSignalConfig::standard(9);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ExtendedModulesDisabled(9))
        );

        config.has_extended_modules = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_module_column_command_must_fit() {
        // 25 modules use 50 bits, leaving room for exactly 6 columns
        let config = CanSignalConfig {
            column_count: MAX_COLUMNS,
            ..CanSignalConfig::new()
        };
        assert!(config.validate().is_ok());

        let config = CanSignalConfig {
            column_count: MAX_COLUMNS + 1,
            ..CanSignalConfig::new()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidColumnCount(MAX_COLUMNS + 1))
        );
    }

    #[test]
    fn test_json_defaults_fill_missing_fields() {
        let config = CanSignalConfig::from_json_str(
            r#"{ "module_count": 4, "has_extended_modules": false, "has_trigger_sensor": true }"#,
        )
        .unwrap();
        assert_eq!(config.module_count, 4);
        assert!(config.has_trigger_sensor);
        assert_eq!(config.heartbeat_timeout_ms, 2100);
        assert_eq!(config.tick_ms, 10);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(matches!(
            CanSignalConfig::from_json_str("{ module_count: }"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            CanSignalConfig::from_json_str(r#"{ "module_count": 0 }"#),
            Err(ConfigError::InvalidModuleCount(0))
        ));
    }
}
