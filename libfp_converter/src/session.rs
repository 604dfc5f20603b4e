use time::PrimitiveDateTime;

use super::behavior::{
    angular_velocity, event_intervals, planar_velocity, EventInterval, PITCH_CHANNEL,
    ROLL_CHANNEL, YAW_CHANNEL,
};
use super::demux::{
    assign_wavelengths, demultiplex, validate_wavelengths, ExcitationMode, Wavelength,
    WavelengthBranch,
};
use super::downsample::{downsample, AlignedBehaviorTable, AlignedChannel, BehaviorChannel};
use super::error::AssemblyError;
use super::fiber_locations::FiberLocationTable;
use super::fluorescence::RoiTraces;
use super::instrument::{indicator_from_construct, ChannelDevices, InstrumentTemplate};
use super::manifest::SubjectEntry;
use super::movie::ImagingMovie;
use super::telemetry::Telemetry;
use super::timestamps::{build_frame_timestamps, FrameMismatch};
use super::ttl::{extract_rising_edges, TtlStream};

/// Number of frames kept per series in stub mode
pub const STUB_FRAMES: usize = 6000;

/// Everything read from disk for one imaging stream
#[derive(Debug, Clone)]
pub struct StreamInputs {
    pub ttl_stream: TtlStream,
    pub wavelengths: Vec<Wavelength>,
    pub excitation_mode: ExcitationMode,
    /// Injected construct per wavelength
    pub constructs: Vec<String>,
    /// Number of frames in the movie file. The loaded movie may hold only a prefix of these
    /// in stub mode
    pub frame_count: usize,
    pub raw: ImagingMovie,
    pub motion_corrected: Option<ImagingMovie>,
    /// ROI traces per wavelength
    pub traces: Vec<RoiTraces>,
}

#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    pub behavior_channels: Vec<BehaviorChannel>,
    pub ball_diameter_m: f64,
    pub stub_frames: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SessionMetadata {
    pub session_id: String,
    pub subject: SubjectEntry,
    pub description: Option<String>,
    pub start_time: Option<PrimitiveDateTime>,
    pub timezone: String,
}

/// Frame timing of one imaging stream before it is split by wavelength
#[derive(Debug, Clone, PartialEq)]
pub struct StreamTiming {
    pub ttl_stream: TtlStream,
    pub timestamps: Vec<f64>,
    /// Excitation wavelength of every frame, in acquisition order
    pub assignment: Vec<Wavelength>,
    pub mismatch: Option<FrameMismatch>,
}

/// All data of one excitation wavelength of one imaging stream
#[derive(Debug, Clone)]
pub struct ChannelBundle {
    pub ttl_stream: TtlStream,
    pub wavelength: Wavelength,
    pub rate: f64,
    pub timestamps: Vec<f64>,
    /// Position of each frame in the interleaved movie
    pub frame_indices: Vec<usize>,
    pub raw: ImagingMovie,
    pub motion_corrected: Option<ImagingMovie>,
    pub traces: RoiTraces,
    pub behavior: AlignedBehaviorTable,
    pub angular_velocity: Option<Vec<f64>>,
    pub velocity: Option<Vec<[f64; 2]>>,
    pub events: Vec<EventInterval>,
    pub devices: ChannelDevices,
}

impl ChannelBundle {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// A fully synchronized session, ready to be written
#[derive(Debug, Clone)]
pub struct SessionBundle {
    pub metadata: SessionMetadata,
    pub streams: Vec<StreamTiming>,
    pub channels: Vec<ChannelBundle>,
    pub fibers: FiberLocationTable,
}

/// Check the wavelength list of a stream against its declared excitation mode and resolve the
/// light path of every wavelength. Touches no data, so it can run before any large file is
/// read
pub fn resolve_stream_devices(
    wavelengths: &[Wavelength],
    excitation_mode: ExcitationMode,
    constructs: &[String],
    instrument: &InstrumentTemplate,
) -> Result<(Vec<ChannelDevices>, usize), AssemblyError> {
    let declared_sources = excitation_mode.n_sources();
    validate_wavelengths(wavelengths, declared_sources)?;
    let devices = wavelengths
        .iter()
        .zip(constructs.iter())
        .map(|(wavelength, construct)| {
            let indicator = indicator_from_construct(construct)?;
            instrument.resolve(*wavelength, indicator)
        })
        .collect::<Result<Vec<ChannelDevices>, _>>()?;
    Ok((devices, declared_sources))
}

/// Length of a branch had no frames been dropped for missing edges
fn untruncated_branch_len(frame_count: usize, phase: usize, k: usize) -> usize {
    if frame_count <= phase {
        0
    } else {
        (frame_count - phase).div_ceil(k)
    }
}

fn check_traces(
    traces: &mut RoiTraces,
    branch: &WavelengthBranch,
    untruncated_len: usize,
) -> Result<(), AssemblyError> {
    let found = traces.n_frames();
    if found == branch.len() {
        return Ok(());
    }
    if found == untruncated_len && found > branch.len() {
        spdlog::info!(
            "Truncating {} nm traces from {} to {} frames to match the movie.",
            branch.wavelength,
            found,
            branch.len()
        );
        traces.truncate(branch.len());
        return Ok(());
    }
    Err(AssemblyError::LengthMismatch {
        component: String::from("Fluorescence traces"),
        wavelength: branch.wavelength.0,
        found,
        expected: branch.len(),
    })
}

fn check_fibers(fibers: &FiberLocationTable, n_rois: usize) -> Result<(), AssemblyError> {
    if fibers.len() != n_rois {
        return Err(AssemblyError::FiberCountMismatch(fibers.len(), n_rois));
    }
    if let Some(missing) = (0..n_rois).find(|roi| fibers.get(*roi).is_none()) {
        return Err(AssemblyError::MissingFiber(missing));
    }
    Ok(())
}

fn align_behavior(
    telemetry: &Telemetry,
    channels: &[BehaviorChannel],
    timestamps: &[f64],
) -> Result<AlignedBehaviorTable, AssemblyError> {
    let mut table = AlignedBehaviorTable::new(timestamps.len());
    for channel in channels.iter() {
        let Some(samples) = telemetry.channel(&channel.name) else {
            spdlog::warn!(
                "Behavior channel {} is not in the telemetry file and will be skipped.",
                channel.name
            );
            continue;
        };
        let reduced = downsample(
            &channel.name,
            samples,
            channel.kind,
            &telemetry.clock,
            timestamps,
        )?;
        table.insert(AlignedChannel {
            name: channel.name.clone(),
            kind: channel.kind,
            values: reduced.values,
        });
    }
    Ok(table)
}

fn check_movie_length(
    component: &str,
    movie: &ImagingMovie,
    frame_count: usize,
    wavelength: Wavelength,
) -> Result<(), AssemblyError> {
    if movie.n_frames() != frame_count {
        return Err(AssemblyError::LengthMismatch {
            component: component.to_string(),
            wavelength: wavelength.0,
            found: movie.n_frames(),
            expected: frame_count,
        });
    }
    Ok(())
}

fn assemble_stream(
    telemetry: &Telemetry,
    mut inputs: StreamInputs,
    instrument: &InstrumentTemplate,
    options: &AssemblyOptions,
) -> Result<(StreamTiming, Vec<ChannelBundle>), AssemblyError> {
    let (devices, declared_sources) = resolve_stream_devices(
        &inputs.wavelengths,
        inputs.excitation_mode,
        &inputs.constructs,
        instrument,
    )?;
    let k = inputs.wavelengths.len();
    if inputs.traces.len() != k {
        return Err(AssemblyError::LengthMismatch {
            component: String::from("Fluorescence files"),
            wavelength: inputs.wavelengths[0].0,
            found: inputs.traces.len(),
            expected: k,
        });
    }
    if options.stub_frames.is_none() {
        check_movie_length("Raw movie", &inputs.raw, inputs.frame_count, inputs.wavelengths[0])?;
    }
    if let Some(mc) = inputs.motion_corrected.as_ref() {
        check_movie_length(
            "Motion corrected movie",
            mc,
            inputs.raw.n_frames(),
            inputs.wavelengths[0],
        )?;
    }

    let ttl = telemetry.ttl_channel(inputs.ttl_stream)?;
    let edges = extract_rising_edges(&ttl);
    spdlog::info!(
        "Found {} exposure edges on {} for a movie of {} frames.",
        edges.len(),
        inputs.ttl_stream,
        inputs.frame_count
    );
    let frame_ts = build_frame_timestamps(&edges, &telemetry.clock, inputs.frame_count)?;
    if frame_ts.truncates_movie() {
        inputs.raw.truncate(frame_ts.len());
        if let Some(mc) = inputs.motion_corrected.as_mut() {
            mc.truncate(frame_ts.len());
        }
    }

    let branches = demultiplex(
        &frame_ts.timestamps,
        &inputs.wavelengths,
        declared_sources,
        inputs.raw.frame_rate,
    )?;
    let timing = StreamTiming {
        ttl_stream: inputs.ttl_stream,
        assignment: assign_wavelengths(frame_ts.len(), &inputs.wavelengths),
        timestamps: frame_ts.timestamps.clone(),
        mismatch: frame_ts.mismatch,
    };

    let mut bundles = Vec::with_capacity(k);
    for (phase, ((mut branch, mut traces), devices)) in branches
        .into_iter()
        .zip(inputs.traces.into_iter())
        .zip(devices.into_iter())
        .enumerate()
    {
        let untruncated_len = untruncated_branch_len(frame_ts.original_frame_count, phase, k);
        check_traces(&mut traces, &branch, untruncated_len)?;

        let mut behavior =
            align_behavior(telemetry, &options.behavior_channels, &branch.timestamps)?;

        if let Some(stub) = options.stub_frames {
            branch.truncate(stub);
            traces.truncate(stub);
            behavior.truncate(stub);
        }

        let raw = inputs.raw.select_frames(&branch.frame_indices, branch.rate)?;
        let motion_corrected = match inputs.motion_corrected.as_ref() {
            Some(mc) => Some(mc.select_frames(&branch.frame_indices, branch.rate)?),
            None => None,
        };

        let angular = behavior
            .get(YAW_CHANNEL)
            .map(|yaw| angular_velocity(&yaw.values, options.ball_diameter_m));
        let velocity = match (behavior.get(ROLL_CHANNEL), behavior.get(PITCH_CHANNEL)) {
            (Some(roll), Some(pitch)) => Some(planar_velocity(&roll.values, &pitch.values)),
            _ => None,
        };
        let events = event_intervals(&behavior, &branch.timestamps);

        spdlog::info!(
            "{} nm: {} frames at {:.3} Hz, {} ROIs, {} behavior events.",
            branch.wavelength,
            branch.len(),
            branch.rate,
            traces.n_rois(),
            events.len()
        );

        bundles.push(ChannelBundle {
            ttl_stream: inputs.ttl_stream,
            wavelength: branch.wavelength,
            rate: branch.rate,
            timestamps: branch.timestamps,
            frame_indices: branch.frame_indices,
            raw,
            motion_corrected,
            traces,
            behavior,
            angular_velocity: angular,
            velocity,
            events,
            devices,
        });
    }

    Ok((timing, bundles))
}

/// Synchronize every imaging stream of a session against its telemetry and join the results
/// with the fluorescence traces, behavior, fiber locations and instrument metadata.
///
/// Any length disagreement not explained by missing exposure edges rejects the whole session.
pub fn assemble_session(
    metadata: SessionMetadata,
    telemetry: &Telemetry,
    streams: Vec<StreamInputs>,
    fibers: FiberLocationTable,
    instrument: &InstrumentTemplate,
    options: &AssemblyOptions,
) -> Result<SessionBundle, AssemblyError> {
    let mut timings = Vec::with_capacity(streams.len());
    let mut channels = Vec::new();
    for inputs in streams {
        let (timing, bundles) = assemble_stream(telemetry, inputs, instrument, options)?;
        timings.push(timing);
        channels.extend(bundles);
    }

    for channel in channels.iter() {
        check_fibers(&fibers, channel.traces.n_rois())?;
    }

    Ok(SessionBundle {
        metadata,
        streams: timings,
        channels,
        fibers,
    })
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::downsample::ChannelKind;
    use crate::fluorescence::test_utils::synthetic_traces;
    use crate::timestamps::SampleClock;
    use fxhash::FxHashMap;
    use ndarray::Array3;
    use std::path::PathBuf;

    pub const RATE: f64 = 2000.0;

    /// Telemetry with an exposure pulse on ttlIn1 every 100 samples, constant ball motion
    /// and a lick bout
    pub fn synthetic_telemetry(n_edges: usize) -> Telemetry {
        let n_samples = 100 * (n_edges + 1);
        let mut ttl = vec![0.0; n_samples];
        for frame in 0..n_edges {
            let edge = 5 + 100 * frame;
            ttl[edge] = 1.0;
            ttl[edge + 1] = 1.0;
        }
        let mut lick = vec![0.0; n_samples];
        for sample in lick.iter_mut().skip(200).take(200) {
            *sample = 1.0;
        }
        let mut channels = FxHashMap::default();
        channels.insert(String::from("ttlIn1"), ttl);
        channels.insert(String::from("ballYaw"), vec![0.2032; n_samples]);
        channels.insert(String::from("ballRoll"), vec![0.25; n_samples]);
        channels.insert(String::from("ballPitch"), vec![-0.25; n_samples]);
        channels.insert(String::from("lick"), lick);
        Telemetry {
            path: PathBuf::from("behavior.mat"),
            clock: SampleClock::Uniform {
                rate: RATE,
                n_samples,
            },
            start_time: None,
            channels,
        }
    }

    pub fn synthetic_stream(n_frames: usize, wavelengths: &[u32], n_rois: usize) -> StreamInputs {
        let k = wavelengths.len();
        let frames = Array3::from_shape_fn((n_frames, 2, 2), |(f, _, _)| f as u16);
        StreamInputs {
            ttl_stream: TtlStream::TtlIn1,
            wavelengths: wavelengths.iter().map(|w| Wavelength(*w)).collect(),
            excitation_mode: if k == 2 {
                ExcitationMode::DualWavelength
            } else {
                ExcitationMode::SingleWavelength
            },
            constructs: vec![String::from("pAAV-CAG-dLight1.3b"); k],
            frame_count: n_frames,
            raw: ImagingMovie::new(frames, 20.0).unwrap(),
            motion_corrected: None,
            traces: (0..k)
                .map(|phase| synthetic_traces((n_frames - phase).div_ceil(k), n_rois))
                .collect(),
        }
    }

    pub fn synthetic_fibers(n_rois: usize) -> FiberLocationTable {
        let mut csv = String::from("header\n");
        for roi in 0..n_rois {
            csv.push_str(&format!("{roi},0.5,1.0,-3.0,500,300,400,Caudoputamen\n"));
        }
        FiberLocationTable::parse(&csv).unwrap()
    }

    pub fn metadata() -> SessionMetadata {
        SessionMetadata {
            session_id: String::from("759-20211110"),
            subject: SubjectEntry {
                subject_id: String::from("759"),
                date_of_birth: None,
                sex: String::from("U"),
                genotype: None,
                strain: None,
            },
            description: None,
            start_time: None,
            timezone: String::from("US/Eastern"),
        }
    }

    pub fn options() -> AssemblyOptions {
        AssemblyOptions {
            behavior_channels: vec![
                BehaviorChannel::new("ballYaw", ChannelKind::Continuous),
                BehaviorChannel::new("ballRoll", ChannelKind::Continuous),
                BehaviorChannel::new("ballPitch", ChannelKind::Continuous),
                BehaviorChannel::new("lick", ChannelKind::Binary),
                BehaviorChannel::new("reward", ChannelKind::Binary),
            ],
            ball_diameter_m: crate::behavior::DEFAULT_BALL_DIAMETER_M,
            stub_frames: None,
        }
    }
}
