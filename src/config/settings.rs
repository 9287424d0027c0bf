use clap::ArgMatches;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Connection settings
    pub serial_port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    pub timeout_ms: u64,
    pub quiet_ms: u64,

    // Message input and output
    pub message: Option<String>,
    pub file: Option<PathBuf>,
    pub destination: Option<PathBuf>,

    // Run settings
    pub interval_ms: u64,
    pub continuous: bool,
    pub skip_crc: bool,
    pub verbose: bool,
    pub crc_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

/// Where the messages of a session come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Inline(String),
    File(PathBuf),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: default_port().to_string(),
            baud_rate: 9600,
            parity: ParityConfig::None,
            timeout_ms: 1000,
            quiet_ms: 20,

            message: None,
            file: None,
            destination: None,

            interval_ms: 50,
            continuous: false,
            skip_crc: false,
            verbose: false,
            crc_only: false,
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

impl Config {
    /// Build the configuration from command-line arguments, on top of the
    /// `--config` file when one is given.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ModbusError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(port) = matches.get_one::<String>("port") {
            config.serial_port = port.clone();
        }
        if let Some(baud) = matches.get_one::<String>("baudrate") {
            config.baud_rate = parse_number(baud, "baudrate")?;
        }
        if let Some(parity) = matches.get_one::<String>("parity") {
            config.parity = parity.parse()?;
        }
        if let Some(timeout) = matches.get_one::<String>("timeout") {
            config.timeout_ms = parse_number(timeout, "timeout")?;
        }
        if let Some(interval) = matches.get_one::<String>("interval") {
            config.interval_ms = parse_number(interval, "interval")?;
        }
        if let Some(message) = matches.get_one::<String>("message") {
            config.message = Some(message.clone());
        }
        if let Some(file) = matches.get_one::<String>("file") {
            config.file = Some(PathBuf::from(file));
        }
        if let Some(destination) = matches.get_one::<String>("destination") {
            config.destination = Some(PathBuf::from(destination));
        }

        config.continuous |= matches.get_flag("continuous");
        config.skip_crc |= matches.get_flag("skip-crc");
        config.verbose |= matches.get_flag("verbose");
        config.crc_only |= matches.get_flag("crc");

        config.validate()?;
        debug!("Effective configuration: {:?}", config);
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModbusError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ModbusError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ModbusError> {
        if self.serial_port.trim().is_empty() {
            return Err(ModbusError::ConfigError("serial port must not be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(ModbusError::ConfigError("baud rate must be positive".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ModbusError::ConfigError("timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// The message source to use. An inline message wins over a file.
    pub fn input_source(&self) -> Result<InputSource, ModbusError> {
        if let Some(message) = &self.message {
            return Ok(InputSource::Inline(message.clone()));
        }
        match &self.file {
            Some(file) if file.exists() => Ok(InputSource::File(file.clone())),
            Some(file) => Err(ModbusError::ConfigError(format!(
                "File '{}' does not exist",
                absolute(file).display()
            ))),
            None => Err(ModbusError::ConfigError(
                "You must provide a message or a file".to_string(),
            )),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn parse_number<T: FromStr>(value: &str, name: &str) -> Result<T, ModbusError> {
    value
        .trim()
        .parse()
        .map_err(|_| ModbusError::ConfigError(format!("invalid {}: '{}'", name, value)))
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|dir| dir.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

impl FromStr for ParityConfig {
    type Err = ModbusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(ParityConfig::None),
            "even" | "e" => Ok(ParityConfig::Even),
            "odd" | "o" => Ok(ParityConfig::Odd),
            other => Err(ModbusError::ConfigError(format!("unknown parity '{}'", other))),
        }
    }
}

impl fmt::Display for ParityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParityConfig::None => f.write_str("no"),
            ParityConfig::Even => f.write_str("even"),
            ParityConfig::Odd => f.write_str("odd"),
        }
    }
}

impl From<&ParityConfig> for serialport::Parity {
    fn from(parity: &ParityConfig) -> Self {
        match parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::build_cli;
    use std::io::Write;

    fn matches(args: &[&str]) -> ArgMatches {
        let mut argv = vec!["modbus-sender"];
        argv.extend_from_slice(args);
        build_cli().try_get_matches_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.interval(), Duration::from_millis(50));
        assert_eq!(config.parity, ParityConfig::None);
        assert!(!config.continuous);
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::from_matches(&matches(&[
            "-m", "0x01 0x03", "-p", "/dev/ttyS1", "-b", "19200", "--parity", "even", "-c", "-s", "-v",
        ]))
        .unwrap();

        assert_eq!(config.serial_port, "/dev/ttyS1");
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.parity, ParityConfig::Even);
        assert!(config.continuous && config.skip_crc && config.verbose);
        assert_eq!(config.input_source().unwrap(), InputSource::Inline("0x01 0x03".to_string()));
    }

    #[test]
    fn test_invalid_baud_rate() {
        let err = Config::from_matches(&matches(&["-m", "1", "-b", "fast"])).unwrap_err();
        assert!(matches!(err, ModbusError::ConfigError(_)));

        let err = Config::from_matches(&matches(&["-m", "1", "-b", "0"])).unwrap_err();
        assert!(matches!(err, ModbusError::ConfigError(_)));
    }

    #[test]
    fn test_message_wins_over_file() {
        let config = Config::from_matches(&matches(&["-m", "0x01", "-f", "missing.txt"])).unwrap();
        assert_eq!(config.input_source().unwrap(), InputSource::Inline("0x01".to_string()));
    }

    #[test]
    fn test_missing_input_is_rejected() {
        let config = Config::default();
        let err = config.input_source().unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: You must provide a message or a file");
    }

    #[test]
    fn test_missing_file_reports_absolute_path() {
        let config = Config {
            file: Some(PathBuf::from("surely-not-here.txt")),
            ..Config::default()
        };
        let err = config.input_source().unwrap_err().to_string();
        assert!(err.contains("does not exist"));
        assert!(err.contains(&absolute(Path::new("surely-not-here.txt")).display().to_string()));
    }

    #[test]
    fn test_config_file_is_overridden_by_cli() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "serial_port = \"/dev/ttyAMA0\"").unwrap();
        writeln!(file, "baud_rate = 115200").unwrap();
        writeln!(file, "parity = \"odd\"").unwrap();
        writeln!(file, "continuous = true").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = Config::from_matches(&matches(&["--config", &path, "-b", "38400", "-m", "1"])).unwrap();

        assert_eq!(config.serial_port, "/dev/ttyAMA0");
        assert_eq!(config.baud_rate, 38400);
        assert_eq!(config.parity, ParityConfig::Odd);
        assert!(config.continuous);
        assert_eq!(config.timeout_ms, 1000);
    }

    #[test]
    fn test_parity_parsing() {
        assert_eq!("N".parse::<ParityConfig>().unwrap(), ParityConfig::None);
        assert_eq!("Even".parse::<ParityConfig>().unwrap(), ParityConfig::Even);
        assert!("mark".parse::<ParityConfig>().is_err());
    }
}
