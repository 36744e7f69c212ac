//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TeleinfoError};
use crate::serial::{HISTORIC_BAUD_RATE, STANDARD_BAUD_RATE};
use crate::storage::retry::DEFAULT_RETRY_DELAY;
use crate::teleinfo::decimator::DEFAULT_IGNORE_FRAMES;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/linky-teleinfo.toml";

/// Expected configuration shape, shown when the file is missing or incomplete
pub const CONFIG_HELP: &str = r#"Config file must be like:
[influxdb]
host = "domain.tld"
port = 443              # optional
path = "influxdb"       # optional
ssl = true              # optional
verify_ssl = true       # optional
username = "user"
password = "pass"
db = "teleinfo"

[serial]                # optional
port = "/dev/ttyAMA0"
baud_rate = 9600
timeout_ms = 5000

[teleinfo]              # optional
ignore_frames = 10

[tags]                  # optional
host = "home"
region = "linky"

[logging]               # optional
level = "info"
directory = "/var/log/linky-teleinfo"
"#;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub influxdb: InfluxDbConfig,

    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub teleinfo: TeleinfoConfig,

    /// Operator-supplied tags added to every point
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// InfluxDB connection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct InfluxDbConfig {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_influx_port")]
    pub port: u16,

    #[serde(default)]
    pub path: String,

    #[serde(default = "default_true")]
    pub ssl: bool,

    #[serde(default = "default_true")]
    pub verify_ssl: bool,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub db: String,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Frame handling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TeleinfoConfig {
    /// Frames skipped between two stored frames
    #[serde(default = "default_ignore_frames")]
    pub ignore_frames: u32,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write a daily rotated log file here in addition to stdout
    #[serde(default)]
    pub directory: Option<String>,
}

// Default value functions
fn default_true() -> bool { true }
fn default_influx_port() -> u16 { 443 }
fn default_retry_delay_ms() -> u64 { DEFAULT_RETRY_DELAY.as_millis() as u64 }

fn default_serial_port() -> String { "/dev/ttyAMA0".to_string() }
fn default_baud_rate() -> u32 { STANDARD_BAUD_RATE }
fn default_timeout_ms() -> u64 { 5000 }

fn default_ignore_frames() -> u32 { DEFAULT_IGNORE_FRAMES }

fn default_log_level() -> String { "info".to_string() }

impl Default for InfluxDbConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_influx_port(),
            path: String::new(),
            ssl: default_true(),
            verify_ssl: default_true(),
            username: String::new(),
            password: String::new(),
            db: String::new(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for TeleinfoConfig {
    fn default() -> Self {
        Self { ignore_frames: default_ignore_frames() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), directory: None }
    }
}

impl InfluxDbConfig {
    /// Base URL of the HTTP API, e.g. `https://domain.tld:443/influxdb`
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        let path = self.path.trim_matches('/');
        if path.is_empty() {
            format!("{}://{}:{}", scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}/{}", scheme, self.host, self.port, path)
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Required keys are missing ([`TeleinfoError::MissingConfig`])
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use linky_teleinfo::config::Config;
    ///
    /// let config = Config::load("/etc/linky-teleinfo.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Required keys that are absent or empty, as `section/key`
    pub fn missing_keys(&self) -> Vec<String> {
        [
            ("host", &self.influxdb.host),
            ("username", &self.influxdb.username),
            ("password", &self.influxdb.password),
            ("db", &self.influxdb.db),
        ]
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(key, _)| format!("influxdb/{}", key))
        .collect()
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if a required key is missing or a value is out of range
    fn validate(&self) -> Result<()> {
        let missing = self.missing_keys();
        if !missing.is_empty() {
            return Err(TeleinfoError::MissingConfig(missing));
        }

        if self.serial.port.is_empty() {
            return Err(TeleinfoError::Config(
                toml::de::Error::custom("serial port cannot be empty")
            ));
        }

        if ![HISTORIC_BAUD_RATE, STANDARD_BAUD_RATE].contains(&self.serial.baud_rate) {
            return Err(TeleinfoError::Config(toml::de::Error::custom(format!(
                "baud_rate must be one of: {}, {}",
                HISTORIC_BAUD_RATE, STANDARD_BAUD_RATE
            ))));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 60000 {
            return Err(TeleinfoError::Config(
                toml::de::Error::custom("timeout_ms must be between 1 and 60000")
            ));
        }

        if self.influxdb.retry_delay_ms == 0 || self.influxdb.retry_delay_ms > 600000 {
            return Err(TeleinfoError::Config(
                toml::de::Error::custom("retry_delay_ms must be between 1 and 600000")
            ));
        }

        if self.influxdb.port == 0 {
            return Err(TeleinfoError::Config(
                toml::de::Error::custom("influxdb port must be greater than 0")
            ));
        }

        for (key, value) in &self.tags {
            if key.is_empty() || value.is_empty() {
                return Err(TeleinfoError::Config(
                    toml::de::Error::custom(format!("tag '{}' must have a non-empty name and value", key))
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_TOML: &str = r#"
[influxdb]
host = "domain.tld"
path = "influxdb"
username = "user"
password = "pass"
db = "teleinfo"
"#;

    fn create_valid_config() -> Config {
        Config::from_toml(MINIMAL_TOML).unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = create_valid_config();

        assert_eq!(config.influxdb.host, "domain.tld");
        assert_eq!(config.influxdb.port, 443);
        assert!(config.influxdb.ssl);
        assert!(config.influxdb.verify_ssl);
        assert_eq!(config.influxdb.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.serial.port, "/dev/ttyAMA0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.timeout(), Duration::from_secs(5));
        assert_eq!(config.teleinfo.ignore_frames, 10);
        assert!(config.tags.is_empty());
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[influxdb]
host = "localhost"
port = 8086
ssl = false
verify_ssl = false
username = "user"
password = "pass"
db = "linky"
retry_delay_ms = 1000

[serial]
port = "/dev/ttyUSB0"
baud_rate = 1200
timeout_ms = 2000

[teleinfo]
ignore_frames = 0

[tags]
host = "home"
region = "linky"

[logging]
level = "debug"
directory = "/var/log/linky-teleinfo"
"#;
        let config = Config::from_toml(toml_content).unwrap();

        assert_eq!(config.influxdb.base_url(), "http://localhost:8086");
        assert_eq!(config.influxdb.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.serial.baud_rate, 1200);
        assert_eq!(config.teleinfo.ignore_frames, 0);
        assert_eq!(config.tags.len(), 2);
        assert_eq!(config.tags["region"], "linky");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.directory.as_deref(), Some("/var/log/linky-teleinfo"));
    }

    #[test]
    fn test_base_url() {
        let config = create_valid_config();
        assert_eq!(config.influxdb.base_url(), "https://domain.tld:443/influxdb");

        let mut influxdb = config.influxdb.clone();
        influxdb.path = "/nested/path/".to_string();
        assert_eq!(influxdb.base_url(), "https://domain.tld:443/nested/path");
    }

    #[test]
    fn test_missing_keys_are_listed() {
        let result = Config::from_toml("[influxdb]\nhost = \"domain.tld\"\n");

        match result {
            Err(TeleinfoError::MissingConfig(keys)) => {
                assert_eq!(keys, vec!["influxdb/username", "influxdb/password", "influxdb/db"]);
            }
            other => panic!("Expected MissingConfig error, got: {:?}", other),
        }
    }

    #[test]
    fn test_empty_file_lists_all_required_keys() {
        match Config::from_toml("") {
            Err(TeleinfoError::MissingConfig(keys)) => assert_eq!(keys.len(), 4),
            other => panic!("Expected MissingConfig error, got: {:?}", other),
        }
    }

    #[test]
    fn test_missing_config_message() {
        let err = TeleinfoError::MissingConfig(vec!["influxdb/host".to_string(), "influxdb/db".to_string()]);
        assert_eq!(err.to_string(), "Missing config keys: influxdb/host, influxdb/db");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(Config::from_toml("[influxdb"), Err(TeleinfoError::Config(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL_TOML.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let result = Config::load(temp_file.path());
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/linky-teleinfo.toml");
        assert!(matches!(result, Err(TeleinfoError::Io(_))));
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = create_valid_config();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = create_valid_config();
        config.serial.baud_rate = 115200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_ms_zero() {
        let mut config = create_valid_config();
        config.serial.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_ms_too_high() {
        let mut config = create_valid_config();
        config.serial.timeout_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_delay_zero() {
        let mut config = create_valid_config();
        config.influxdb.retry_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_influx_port_zero() {
        let mut config = create_valid_config();
        config.influxdb.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_tag_value() {
        let mut config = create_valid_config();
        config.tags.insert("host".to_string(), String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ignore_frames_is_valid() {
        let mut config = create_valid_config();
        config.teleinfo.ignore_frames = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_influx_port(), 443);
        assert_eq!(default_retry_delay_ms(), 5000);
        assert_eq!(default_serial_port(), "/dev/ttyAMA0");
        assert_eq!(default_baud_rate(), 9600);
        assert_eq!(default_timeout_ms(), 5000);
        assert_eq!(default_ignore_frames(), 10);
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn test_defaults_follow_runtime_constants() {
        let config = Config::default();
        assert_eq!(config.serial.baud_rate, STANDARD_BAUD_RATE);
        assert_eq!(config.influxdb.retry_delay(), DEFAULT_RETRY_DELAY);
        assert_eq!(config.teleinfo.ignore_frames, DEFAULT_IGNORE_FRAMES);
    }

    #[test]
    fn test_historic_baud_rate_is_valid() {
        let mut config = create_valid_config();
        config.serial.baud_rate = HISTORIC_BAUD_RATE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_help_mentions_required_keys() {
        for key in ["host", "username", "password", "db"] {
            assert!(CONFIG_HELP.contains(&format!("{} = ", key)), "{}", key);
        }
    }
}
