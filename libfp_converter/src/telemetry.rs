use fxhash::FxHashMap;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::PrimitiveDateTime;

use super::error::{TelemetryError, TtlError};
use super::mat_file::MatFile;
use super::timestamps::SampleClock;
use super::ttl::{TtlChannel, TtlStream};

const TIMESTAMP_VARIABLE: &str = "timestamp";
const START_TIME_VARIABLE: &str = "starttime";

/// Everything recorded by the behavioral acquisition board for one session
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub path: PathBuf,
    pub clock: SampleClock,
    pub start_time: Option<PrimitiveDateTime>,
    pub channels: FxHashMap<String, Vec<f64>>,
}

impl Telemetry {
    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.channels.get(name).map(|v| v.as_slice())
    }

    /// Pull out the digital channel for a TTL stream.
    ///
    /// A stream that was not recorded is a configuration error, caught before any
    /// synchronization is attempted.
    pub fn ttl_channel(&self, stream: TtlStream) -> Result<TtlChannel, TtlError> {
        let name = stream.variable_name();
        let levels = self
            .channel(name)
            .ok_or_else(|| TtlError::UndefinedStream(name.to_string(), self.path.clone()))?;
        let rate = self.clock.rate().unwrap_or(f64::NAN);
        TtlChannel::from_levels(name, levels, rate)
    }

    /// Check that every TTL stream was recorded, without decoding any of them
    pub fn check_ttl_streams(&self, streams: &[TtlStream]) -> Result<(), TtlError> {
        match streams
            .iter()
            .find(|stream| self.channel(stream.variable_name()).is_none())
        {
            Some(stream) => Err(TtlError::UndefinedStream(
                stream.variable_name().to_string(),
                self.path.clone(),
            )),
            None => Ok(()),
        }
    }
}

/// Anything that can produce the telemetry of a session
pub trait TelemetrySource {
    fn read(&self) -> Result<Telemetry, TelemetryError>;
}

/// Parse the acquisition start time, e.g. `10-Nov-2021 16:12:31`
pub fn parse_start_time(value: &str) -> Result<PrimitiveDateTime, TelemetryError> {
    let format = format_description!("[day]-[month repr:short]-[year] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(value.trim(), &format)
        .map_err(|e| TelemetryError::BadStartTime(value.to_string(), e))
}

/// Telemetry stored in a MATLAB v7.3 file by the behavior rig.
///
/// Only the named channels are loaded. Channels missing from the file are skipped here;
/// whether they were required is decided by the caller.
#[derive(Debug, Clone)]
pub struct MatTelemetry {
    path: PathBuf,
    channel_names: Vec<String>,
    sample_rate: f64,
}

impl MatTelemetry {
    /// `sample_rate` is used only when the file carries no timestamp vector
    pub fn new(path: &Path, channel_names: Vec<String>, sample_rate: f64) -> Self {
        Self {
            path: path.to_path_buf(),
            channel_names,
            sample_rate,
        }
    }
}

impl TelemetrySource for MatTelemetry {
    fn read(&self) -> Result<Telemetry, TelemetryError> {
        let mat = MatFile::open(&self.path)?;

        let mut channels = FxHashMap::default();
        for name in self.channel_names.iter() {
            if mat.has_variable(name) {
                channels.insert(name.clone(), mat.read_vector(name)?);
            } else {
                spdlog::debug!(
                    "Channel {} not found in {}",
                    name,
                    self.path.to_string_lossy()
                );
            }
        }

        let clock = if mat.has_variable(TIMESTAMP_VARIABLE) {
            let times = mat.read_vector(TIMESTAMP_VARIABLE)?;
            for (name, samples) in channels.iter() {
                if samples.len() != times.len() {
                    return Err(TelemetryError::ClockLengthMismatch(
                        times.len(),
                        name.clone(),
                        samples.len(),
                    ));
                }
            }
            SampleClock::Recorded { times }
        } else {
            let n_samples = channels.values().map(|v| v.len()).max().unwrap_or(0);
            SampleClock::Uniform {
                rate: self.sample_rate,
                n_samples,
            }
        };

        let start_time = if mat.has_variable(START_TIME_VARIABLE) {
            Some(parse_start_time(&mat.read_string(START_TIME_VARIABLE)?)?)
        } else {
            spdlog::warn!(
                "No start time found in {}; session start time will be left unset.",
                self.path.to_string_lossy()
            );
            None
        };

        Ok(Telemetry {
            path: self.path.clone(),
            clock,
            start_time,
            channels,
        })
    }
}
