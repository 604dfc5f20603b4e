use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum TtlError {
    #[error("TTL stream {0} is not defined in telemetry file {1:?}")]
    UndefinedStream(String, PathBuf),
    #[error("TTL stream {0} has an invalid sample rate {1}")]
    BadSampleRate(String, f64),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Edge index {0} lies outside of the sample clock with {1} samples")]
    EdgeOutOfRange(usize, usize),
    #[error("Frame timestamps decrease at frame {0} ({1} s after {2} s)")]
    NonMonotonic(usize, f64, f64),
    #[error("Cannot downsample behavior channel {0}: it has no samples")]
    EmptyChannel(String),
}

#[derive(Debug, Error)]
pub enum DemuxError {
    #[error("Expected 1 or 2 excitation wavelengths per imaging stream, found {0}")]
    UnsupportedWavelengthCount(usize),
    #[error("Configured {wavelengths} wavelengths but the stream declares {sources} excitation sources")]
    SourceCountMismatch { wavelengths: usize, sources: usize },
    #[error("Wavelength {0} nm is configured more than once for one imaging stream")]
    DuplicateWavelength(u32),
    #[error("Interleaving requires branches of length n or n+1 in order; branch {0} has {1} frames")]
    BadBranchLength(usize, usize),
}

#[derive(Debug, Error)]
pub enum MovieError {
    #[error("Could not open imaging movie because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Imaging movie failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Imaging movie {0:?} has {1} bytes which is not a whole number of {2} byte frames")]
    PartialFrame(PathBuf, u64, u64),
    #[error("Imaging movie was given invalid frame geometry {0}x{1}")]
    BadGeometry(usize, usize),
    #[error("Imaging movie has invalid frame rate {0}")]
    BadFrameRate(f64),
    #[error("Imaging movie failed to shape frames: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
    #[error("Frame index {0} is out of range for a movie of {1} frames")]
    FrameOutOfRange(usize, usize),
}

#[derive(Debug, Error)]
pub enum MatFileError {
    #[error("Could not open MATLAB file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("MATLAB file failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Expected variable '{0}' is not in MATLAB file {1:?}")]
    MissingVariable(String, PathBuf),
    #[error("Variable '{0}' has shape {1:?}; expected {2}")]
    BadShape(String, Vec<usize>, &'static str),
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Telemetry failed due to MATLAB file error: {0}")]
    MatError(#[from] MatFileError),
    #[error("Telemetry failed to parse start time '{0}': {1}")]
    BadStartTime(String, time::error::Parse),
    #[error("Telemetry timestamp vector has {0} samples but channel {1} has {2}")]
    ClockLengthMismatch(usize, String, usize),
}

#[derive(Debug, Error)]
pub enum FluorescenceError {
    #[error("Fluorescence failed due to MATLAB file error: {0}")]
    MatError(#[from] MatFileError),
    #[error("Fluorescence series {0} has {1} ROIs, expected {2}")]
    RoiCountMismatch(&'static str, usize, usize),
    #[error("Fluorescence series {0} has {1} frames, expected {2}")]
    FrameCountMismatch(&'static str, usize, usize),
}

#[derive(Debug, Error)]
pub enum FiberLocationError {
    #[error("Could not open fiber location table because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("FiberLocationTable failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("FiberLocationTable failed to parse an integer: {0}")]
    ParseIntError(#[from] std::num::ParseIntError),
    #[error("FiberLocationTable failed to parse a coordinate: {0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),
    #[error("FiberLocationTable was given a file with the incorrect format; most likely the number of columns is incorrect")]
    BadFileFormat,
    #[error("FiberLocationTable contains ROI {0} more than once")]
    DuplicateRoi(usize),
}

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("Failed to load instrument template as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Instrument template failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Instrument template failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("No dichroic mirror is known for {0} nm excitation")]
    UnknownWavelength(u32),
    #[error("Instrument template has no {0} named '{1}'")]
    MissingDevice(&'static str, String),
    #[error("No known indicator found in '{0}'")]
    UnknownIndicator(String),
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to load session manifest as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Manifest failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Manifest failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Session {0} declares no imaging streams")]
    NoStreams(String),
    #[error("Session {0} stream {1} has {2} fluorescence files for {3} wavelengths")]
    FluorescenceCount(String, usize, usize, usize),
    #[error("Session {0} stream {1} has {2} constructs for {3} wavelengths")]
    ConstructCount(String, usize, usize, usize),
    #[error("Session {0} uses TTL stream {1} for more than one imaging stream")]
    DuplicateTtlStream(String, String),
    #[error("Session {0} is listed more than once in the manifest")]
    DuplicateSession(String),
    #[error("Session {0} requires file {1:?} which does not exist")]
    MissingFile(String, PathBuf),
    #[error("Session {0} has invalid date of birth '{1}': {2}")]
    BadDateOfBirth(String, String, time::error::Parse),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config requires at least one worker thread, found {0}")]
    BadThreadCount(i32),
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Assembly failed due to TTL error: {0}")]
    TtlError(#[from] TtlError),
    #[error("Assembly failed due to synchronization error: {0}")]
    SyncError(#[from] SyncError),
    #[error("Assembly failed due to demultiplexing error: {0}")]
    DemuxError(#[from] DemuxError),
    #[error("Assembly failed due to imaging movie error: {0}")]
    MovieError(#[from] MovieError),
    #[error("Assembly failed due to instrument error: {0}")]
    InstrumentError(#[from] InstrumentError),
    #[error("{component} for {wavelength} nm has {found} frames but its timestamps have {expected}")]
    LengthMismatch {
        component: String,
        wavelength: u32,
        found: usize,
        expected: usize,
    },
    #[error("Fiber location table has {0} fibers but the fluorescence data has {1} ROIs")]
    FiberCountMismatch(usize, usize),
    #[error("Fiber location table has no entry for ROI {0}")]
    MissingFiber(usize),
}

#[derive(Debug, Error)]
pub enum HDF5WriterError {
    #[error("HDF5Writer failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("HDF5Writer failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("HDF5Writer failed to encode string: {0}")]
    StringError(#[from] hdf5::types::StringError),
    #[error("HDF5Writer failed to format a date: {0}")]
    FormatError(#[from] time::error::Format),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Manifest error: {0}")]
    ManifestError(#[from] ManifestError),
    #[error("Processor failed due to Instrument error: {0}")]
    InstrumentError(#[from] InstrumentError),
    #[error("Processor failed due to TTL error: {0}")]
    TtlError(#[from] TtlError),
    #[error("Processor failed due to Telemetry error: {0}")]
    TelemetryError(#[from] TelemetryError),
    #[error("Processor failed due to imaging movie error: {0}")]
    MovieError(#[from] MovieError),
    #[error("Processor failed due to Fluorescence error: {0}")]
    FluorescenceError(#[from] FluorescenceError),
    #[error("Processor failed due to FiberLocationTable error: {0}")]
    FiberLocationError(#[from] FiberLocationError),
    #[error("Processor failed due to Assembly error: {0}")]
    AssemblyError(#[from] AssemblyError),
    #[error("Processor failed due to HDF5Writer error: {0}")]
    HDFError(#[from] HDF5WriterError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
