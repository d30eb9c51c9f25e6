use clap::ArgMatches;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::transport::LineSettings;
use crate::utils::error::{ModbusError, ModbusResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    // Connection settings
    pub serial_port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64, // open and reply timeout
    pub data_bits: u8,
    pub stop_bits: StopBitsConfig,
    pub parity: ParityConfig,
    pub flow_control: FlowControlConfig,

    // Reject replies whose address byte differs from the request's
    pub verify_slave_address: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBitsConfig {
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowControlConfig {
    None,
    Software,
    Hardware,
}

impl std::str::FromStr for ParityConfig {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(ParityConfig::None),
            "even" | "e" => Ok(ParityConfig::Even),
            "odd" | "o" => Ok(ParityConfig::Odd),
            other => Err(ModbusError::ConfigError(format!("Unknown parity: {}", other))),
        }
    }
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            serial_port: default_port().to_string(),
            baud_rate: 9600,
            timeout_ms: 1000,
            data_bits: 8,
            stop_bits: StopBitsConfig::One,
            parity: ParityConfig::None,
            flow_control: FlowControlConfig::None,
            verify_slave_address: true,
        }
    }
}

fn default_port() -> &'static str {
    if cfg!(target_os = "windows") {
        "COM1"
    } else if cfg!(target_os = "macos") {
        "/dev/tty.usbserial-0001"
    } else {
        "/dev/ttyUSB0"
    }
}

impl MasterConfig {
    /// Overrides file/default values with whatever was given on the command line.
    pub fn apply_matches(&mut self, matches: &ArgMatches) -> ModbusResult<()> {
        if let Some(port) = matches.get_one::<String>("port") {
            self.serial_port = port.clone();
        }
        if let Some(baud) = matches.get_one::<String>("baud") {
            self.baud_rate = baud
                .parse()
                .map_err(|e| ModbusError::ConfigError(format!("Invalid baud rate '{}': {}", baud, e)))?;
        }
        if let Some(timeout) = matches.get_one::<String>("timeout") {
            self.timeout_ms = timeout
                .parse()
                .map_err(|e| ModbusError::ConfigError(format!("Invalid timeout '{}': {}", timeout, e)))?;
        }
        if let Some(parity) = matches.get_one::<String>("parity") {
            self.parity = parity.parse()?;
        }
        if matches.get_flag("no-address-check") {
            self.verify_slave_address = false;
        }

        self.validate()
    }

    pub fn from_matches(matches: &ArgMatches) -> ModbusResult<Self> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_matches(matches)?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ModbusResult<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            ModbusError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: MasterConfig = toml::from_str(&content)?;
        config.validate()?;

        info!("📄 Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ModbusResult<()> {
        let path = path.as_ref();
        // Create directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ModbusError::ConfigError(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| ModbusError::ConfigError(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn validate(&self) -> ModbusResult<()> {
        if self.serial_port.trim().is_empty() {
            return Err(ModbusError::ConfigError("serial_port must not be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(ModbusError::ConfigError("baud_rate must be positive".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ModbusError::ConfigError("timeout_ms must be positive".to_string()));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ModbusError::ConfigError(format!(
                "data_bits must be 5..=8, got {}",
                self.data_bits
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn line_settings(&self) -> LineSettings {
        LineSettings {
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            flow_control: self.flow_control,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MasterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_millis(1000));
        assert_eq!(config.line_settings().baud_rate, 9600);
        assert!(config.verify_slave_address);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: MasterConfig = toml::from_str(
            r#"
            serial_port = "/dev/ttyS1"
            baud_rate = 19200
            parity = "Even"
            "#,
        )
        .unwrap();
        assert_eq!(config.serial_port, "/dev/ttyS1");
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.parity, ParityConfig::Even);
        assert_eq!(config.data_bits, 8);
        assert_eq!(config.flow_control, FlowControlConfig::None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = MasterConfig { data_bits: 9, ..MasterConfig::default() };
        assert!(matches!(config.validate(), Err(ModbusError::ConfigError(_))));

        let config = MasterConfig { timeout_ms: 0, ..MasterConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("rtu_master_config_{}", std::process::id()));
        let path = dir.join("master.toml");

        let config = MasterConfig {
            serial_port: "/dev/ttyAMA0".to_string(),
            stop_bits: StopBitsConfig::Two,
            verify_slave_address: false,
            ..MasterConfig::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = MasterConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_parity_from_str() {
        assert_eq!("E".parse::<ParityConfig>().unwrap(), ParityConfig::Even);
        assert_eq!("none".parse::<ParityConfig>().unwrap(), ParityConfig::None);
        assert!("mark".parse::<ParityConfig>().is_err());
    }
}
