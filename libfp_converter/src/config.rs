use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::behavior::DEFAULT_BALL_DIAMETER_M;
use super::downsample::{BehaviorChannel, ChannelKind};
use super::error::ConfigError;
use super::session::STUB_FRAMES;

/// Sample rate of the behavior rig, used when a telemetry file has no timestamp vector
pub const DEFAULT_TELEMETRY_RATE: f64 = 2000.0;

fn default_behavior_channels() -> Vec<BehaviorChannel> {
    vec![
        BehaviorChannel::new("ballYaw", ChannelKind::Continuous),
        BehaviorChannel::new("ballRoll", ChannelKind::Continuous),
        BehaviorChannel::new("ballPitch", ChannelKind::Continuous),
        BehaviorChannel::new("lick", ChannelKind::Binary),
        BehaviorChannel::new("reward", ChannelKind::Binary),
        BehaviorChannel::new("stimulus_led", ChannelKind::Binary),
        BehaviorChannel::new("stimulus_led2", ChannelKind::Binary),
        BehaviorChannel::new("stimulus_sound", ChannelKind::Binary),
    ]
}

fn default_telemetry_rate() -> f64 {
    DEFAULT_TELEMETRY_RATE
}

/// Structure representing the application configuration. Contains pathing and conversion information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub manifest_path: PathBuf,
    pub data_path: PathBuf,
    pub output_path: PathBuf,
    pub instrument_path: Option<PathBuf>,
    pub overwrite: bool,
    pub stub_test: bool,
    pub timezone: String,
    pub ball_diameter_m: Option<f64>,
    #[serde(default = "default_telemetry_rate")]
    pub telemetry_sample_rate: f64,
    #[serde(default = "default_behavior_channels")]
    pub behavior_channels: Vec<BehaviorChannel>,
    pub n_threads: i32,
}

impl Default for Config {
    /// Generate a new Config object. All paths will be empty/invalid
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("None"),
            data_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            instrument_path: None,
            overwrite: false,
            stub_test: false,
            timezone: String::from("US/Eastern"),
            ball_diameter_m: None,
            telemetry_sample_rate: DEFAULT_TELEMETRY_RATE,
            behavior_channels: default_behavior_channels(),
            n_threads: 1,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        let config = serde_yaml::from_str::<Self>(&yaml_str)?;
        if !config.is_n_threads_valid() {
            return Err(ConfigError::BadThreadCount(config.n_threads));
        }
        Ok(config)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        std::fs::write(config_path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Resolve a manifest path against the data directory
    pub fn get_data_file(&self, relative: &Path) -> PathBuf {
        self.data_path.join(relative)
    }

    /// Get the path to the output file of a session
    pub fn get_output_file_name(&self, subject_id: &str, date: &str) -> Result<PathBuf, ConfigError> {
        if self.output_path.exists() {
            Ok(self.output_path.join(format!("{subject_id}-{date}.nwb")))
        } else {
            Err(ConfigError::BadFilePath(self.output_path.clone()))
        }
    }

    pub fn ball_diameter(&self) -> f64 {
        self.ball_diameter_m.unwrap_or(DEFAULT_BALL_DIAMETER_M)
    }

    /// Number of frames written per series, None for the whole session
    pub fn stub_frames(&self) -> Option<usize> {
        if self.stub_test {
            Some(STUB_FRAMES)
        } else {
            None
        }
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }
}
