use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::data_source::DataSourceConfig;
use crate::error::SpectrometerError;

#[derive(Parser, Debug)]
#[command(name = "espectro")]
#[command(about = "Serial spectrometer capture, live view and capture statistics")]
#[command(version)]
pub struct Cli {
    /// Sensor profile TOML file (defaults to the C12880MA board)
    #[arg(long, env = "ESPECTRO_PROFILE")]
    pub profile: Option<PathBuf>,

    /// List available serial ports and exit
    #[arg(long)]
    pub list_ports: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Capture one spectrum and save it as PNG and text table
    Capture(CaptureArgs),

    /// Plot spectra continuously until 'q' is pressed
    Live(LiveArgs),

    /// Per-wavelength mean and deviation across saved captures
    Stats(StatsArgs),

    /// Overlay every saved capture of a directory on one plot
    Overlay(OverlayArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CaptureArgs {
    /// Directory for the captured image and table
    #[arg(long, default_value = "datos")]
    pub data_dir: PathBuf,

    /// Seconds to wait for a valid spectrum line
    #[arg(long, default_value = "10")]
    pub timeout: f64,

    /// Resolution of the saved image
    #[arg(long, default_value = "300")]
    pub dpi: u32,

    #[command(subcommand)]
    pub source: Mode,
}

#[derive(Args, Debug, Clone)]
pub struct LiveArgs {
    #[command(subcommand)]
    pub source: Mode,
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    /// Directory holding saved capture tables
    #[arg(long, default_value = "datos")]
    pub dir: PathBuf,

    /// Histogram bins for the peak pixel distribution
    #[arg(long, default_value = "10")]
    pub bins: usize,

    /// Resolution of the saved histogram
    #[arg(long, default_value = "300")]
    pub dpi: u32,
}

#[derive(Args, Debug, Clone)]
pub struct OverlayArgs {
    /// Directory holding saved capture tables
    #[arg(long, default_value = "datos")]
    pub dir: PathBuf,

    /// Label used in the output file name
    #[arg(long, default_value = "Spectra")]
    pub title: String,

    /// Resolution of the saved overlay
    #[arg(long, default_value = "300")]
    pub dpi: u32,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Mode {
    /// Connect to real hardware via serial port
    Serial(SerialArgs),

    /// Playback from log file
    Playback(PlaybackArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SerialArgs {
    /// Serial port device path (e.g., COM10 on Windows, /dev/ttyUSB0 on Linux)
    #[arg(short, long, env = "ESPECTRO_PORT")]
    pub device: String,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    pub baud: u32,

    /// Milliseconds to wait after opening the port (the board resets on connect)
    #[arg(long, default_value = "2000")]
    pub settle_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct PlaybackArgs {
    /// Path to log file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Playback speed multiplier (1.0 = real-time, 2.0 = 2x speed)
    #[arg(short, long, default_value = "1.0")]
    pub speed: f64,

    /// Loop playback when file ends
    #[arg(long, default_value = "false")]
    pub loop_playback: bool,

    /// Milliseconds between lines that carry no timestamp
    #[arg(long, default_value = "100")]
    pub interval_ms: u64,
}

impl Mode {
    /// Convert CLI args to DataSourceConfig
    pub fn to_data_source_config(&self) -> DataSourceConfig {
        match self {
            Mode::Serial(args) => DataSourceConfig::Serial {
                port: args.device.clone(),
                baud_rate: args.baud,
                settle: Duration::from_millis(args.settle_ms),
            },
            Mode::Playback(args) => DataSourceConfig::Playback {
                log_file: args.file.clone(),
                speed_multiplier: args.speed,
                loop_playback: args.loop_playback,
                line_interval: Duration::from_millis(args.interval_ms),
            },
        }
    }
}

impl CaptureArgs {
    pub fn to_settings(&self) -> Result<AcquisitionSettings, SpectrometerError> {
        if !self.timeout.is_finite() || self.timeout <= 0.0 {
            return Err(SpectrometerError::Config(format!(
                "timeout must be a positive number of seconds, got {}",
                self.timeout
            )));
        }
        Ok(AcquisitionSettings {
            capture_timeout: Duration::from_secs_f64(self.timeout),
            ..AcquisitionSettings::default()
        })
    }
}

/// Fixed characteristics of one spectrometer sensor and its ADC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorProfile {
    pub sensor_name: String,
    /// Pixels per line
    pub sample_count: usize,
    /// Wavelength of the first pixel, nm
    pub wavelength_min: f64,
    /// Wavelength of the last pixel, nm
    pub wavelength_max: f64,
    /// Dark/bias count subtracted from every pixel
    pub offset: u32,
    /// Nominal ADC full scale
    pub adc_max: u32,
}

impl Default for SensorProfile {
    fn default() -> Self {
        Self {
            sensor_name: "C12880MA".to_string(),
            sample_count: 288,
            wavelength_min: 380.0,
            wavelength_max: 850.0,
            offset: 127,
            adc_max: 1000,
        }
    }
}

impl SensorProfile {
    /// Upper clip bound of calibrated intensities
    pub fn y_max(&self) -> u32 {
        self.adc_max.saturating_sub(self.offset)
    }

    pub fn validate(&self) -> Result<(), SpectrometerError> {
        if self.sample_count < 2 {
            return Err(SpectrometerError::Config(format!(
                "sample_count must be at least 2, got {}",
                self.sample_count
            )));
        }
        if !(self.wavelength_min < self.wavelength_max) {
            return Err(SpectrometerError::Config(format!(
                "wavelength_min ({}) must be below wavelength_max ({})",
                self.wavelength_min, self.wavelength_max
            )));
        }
        if self.offset >= self.adc_max {
            return Err(SpectrometerError::Config(format!(
                "offset ({}) must be below adc_max ({})",
                self.offset, self.adc_max
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SpectrometerError> {
        let profile: SensorProfile = toml::from_str(text)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn load(path: &Path) -> Result<Self, SpectrometerError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Timing of the acquisition loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionSettings {
    /// How long a single-shot capture waits for a valid line
    pub capture_timeout: Duration,
    /// How long one continuous-mode iteration waits before rechecking the stop flag
    pub poll_interval: Duration,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            capture_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl Cli {
    /// Sensor profile from `--profile`, or the built-in default
    pub fn sensor_profile(&self) -> Result<SensorProfile, SpectrometerError> {
        match &self.profile {
            Some(path) => SensorProfile::load(path),
            None => Ok(SensorProfile::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_capture_serial() {
        let cli = Cli::parse_from([
            "espectro",
            "capture",
            "--data-dir",
            "datos/laser_verde",
            "serial",
            "--device",
            "COM10",
        ]);

        let Some(Command::Capture(args)) = cli.command else {
            panic!("Expected capture command");
        };
        assert_eq!(args.data_dir, PathBuf::from("datos/laser_verde"));
        assert_eq!(args.timeout, 10.0);
        assert_eq!(args.dpi, 300);

        let Mode::Serial(serial) = args.source else {
            panic!("Expected serial source");
        };
        assert_eq!(serial.device, "COM10");
        assert_eq!(serial.baud, 115200);
        assert_eq!(serial.settle_ms, 2000);
    }

    #[test]
    fn test_cli_parse_live_playback() {
        let cli = Cli::parse_from([
            "espectro",
            "live",
            "playback",
            "--file",
            "test.log",
            "--speed",
            "2.0",
            "--loop-playback",
        ]);

        let Some(Command::Live(args)) = cli.command else {
            panic!("Expected live command");
        };
        let config = args.source.to_data_source_config();
        assert_eq!(config, DataSourceConfig::Playback {
            log_file: PathBuf::from("test.log"),
            speed_multiplier: 2.0,
            loop_playback: true,
            line_interval: Duration::from_millis(100),
        });
    }

    #[test]
    fn test_cli_parse_list_ports() {
        let cli = Cli::parse_from(["espectro", "--list-ports"]);

        assert!(cli.list_ports);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_stats_and_overlay() {
        let cli = Cli::parse_from(["espectro", "stats", "--dir", "datos/diurna", "--bins", "20"]);
        let Some(Command::Stats(args)) = cli.command else {
            panic!("Expected stats command");
        };
        assert_eq!(args.dir, PathBuf::from("datos/diurna"));
        assert_eq!(args.bins, 20);

        let cli = Cli::parse_from(["espectro", "overlay", "--title", "Green Laser"]);
        let Some(Command::Overlay(args)) = cli.command else {
            panic!("Expected overlay command");
        };
        assert_eq!(args.title, "Green Laser");
        assert_eq!(args.dir, PathBuf::from("datos"));
    }

    #[test]
    fn test_serial_mode_to_config() {
        let mode = Mode::Serial(SerialArgs {
            device: "/dev/ttyUSB0".to_string(),
            baud: 57600,
            settle_ms: 0,
        });

        assert_eq!(mode.to_data_source_config(), DataSourceConfig::Serial {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 57600,
            settle: Duration::ZERO,
        });
    }

    #[test]
    fn test_capture_timeout_validation() {
        let cli = Cli::parse_from([
            "espectro", "capture", "--timeout", "2.5", "serial", "--device", "COM3",
        ]);
        let Some(Command::Capture(mut args)) = cli.command else {
            panic!("Expected capture command");
        };

        let settings = args.to_settings().unwrap();
        assert_eq!(settings.capture_timeout, Duration::from_millis(2500));
        assert_eq!(settings.poll_interval, Duration::from_millis(10));

        args.timeout = 0.0;
        assert!(args.to_settings().is_err());
        args.timeout = f64::NAN;
        assert!(args.to_settings().is_err());
    }

    #[test]
    fn test_default_profile() {
        let profile = SensorProfile::default();

        assert_eq!(profile.sample_count, 288);
        assert_eq!(profile.offset, 127);
        assert_eq!(profile.adc_max, 1000);
        assert_eq!(profile.y_max(), 873);
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_profile_from_partial_toml() {
        let profile = SensorProfile::from_toml_str("offset = 100\nadc_max = 4095\n").unwrap();

        assert_eq!(profile.offset, 100);
        assert_eq!(profile.y_max(), 3995);
        assert_eq!(profile.sample_count, 288);
        assert_eq!(profile.sensor_name, "C12880MA");
    }

    #[test]
    fn test_profile_rejects_bad_values() {
        assert!(SensorProfile::from_toml_str("offset = 1000").is_err());
        assert!(SensorProfile::from_toml_str("sample_count = 1").is_err());
        assert!(
            SensorProfile::from_toml_str("wavelength_min = 900.0\nwavelength_max = 400.0").is_err()
        );
        assert!(matches!(
            SensorProfile::from_toml_str("offset = \"high\""),
            Err(SpectrometerError::Profile(_))
        ));
    }

    #[test]
    fn test_profile_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensor.toml");
        std::fs::write(&path, "sensor_name = \"bench\"\nsample_count = 128\n").unwrap();

        let cli = Cli::parse_from([
            "espectro".to_string(),
            "--profile".to_string(),
            path.display().to_string(),
        ]);
        let profile = cli.sensor_profile().unwrap();

        assert_eq!(profile.sensor_name, "bench");
        assert_eq!(profile.sample_count, 128);
    }
}
