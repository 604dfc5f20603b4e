use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use super::config::Config;
use super::error::ProcessorError;
use super::fiber_locations::FiberLocationTable;
use super::fluorescence::{FluorescenceSource, MatFluorescence};
use super::hdf_writer::HDFWriter;
use super::instrument::InstrumentTemplate;
use super::manifest::SessionEntry;
use super::movie::{ImagingSource, RawFrameStack};
use super::session::{
    assemble_session, resolve_stream_devices, AssemblyOptions, SessionBundle, SessionMetadata,
    StreamInputs,
};
use super::telemetry::{MatTelemetry, TelemetrySource};
use super::ttl::TtlStream;
use super::worker_status::{BarColor, WorkerStatus};

/// Outcome of a single session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Converted,
    /// Output already existed and overwrite was off
    Skipped,
}

/// Names of every telemetry variable a session needs
fn telemetry_channel_names(config: &Config, session: &SessionEntry) -> Vec<String> {
    let mut names: Vec<String> = session
        .streams
        .iter()
        .map(|s| s.ttl_stream.variable_name().to_string())
        .collect();
    names.extend(config.behavior_channels.iter().map(|c| c.name.clone()));
    names
}

/// Read every input of the session and synchronize it
fn read_and_assemble(
    config: &Config,
    session: &SessionEntry,
    instrument: &InstrumentTemplate,
    tx: &Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<SessionBundle, ProcessorError> {
    let session_id = session.session_id();
    let n_steps = (1 + session.streams.len()) as f32;
    let mut step = 0.0;

    let telemetry = MatTelemetry::new(
        &config.get_data_file(&session.telemetry_file),
        telemetry_channel_names(config, session),
        config.telemetry_sample_rate,
    )
    .read()?;
    // Fail on a missing exposure line before any movie is loaded
    let ttl_streams: Vec<TtlStream> = session.streams.iter().map(|s| s.ttl_stream).collect();
    telemetry.check_ttl_streams(&ttl_streams)?;
    step += 1.0;
    tx.send(WorkerStatus::new(
        step / n_steps,
        &session_id,
        worker_id,
        BarColor::CYAN,
    ))?;

    let fibers = FiberLocationTable::read(&config.get_data_file(&session.fiber_locations_file))?;

    let mut streams = Vec::with_capacity(session.streams.len());
    for entry in session.streams.iter() {
        let mut stack = RawFrameStack::new(
            &config.get_data_file(&entry.imaging_file),
            entry.rows,
            entry.columns,
            entry.frame_rate,
        )?;
        let frame_count = stack.n_frames()?;
        if let Some(stub) = config.stub_frames() {
            // Enough interleaved frames to fill every wavelength
            stack = stack.with_max_frames(stub * entry.wavelengths.len());
        }
        let raw = stack.read()?;
        let motion_corrected = match entry.motion_corrected_file.as_ref() {
            Some(mc_path) => {
                let mut mc_stack = RawFrameStack::new(
                    &config.get_data_file(mc_path),
                    entry.rows,
                    entry.columns,
                    entry.frame_rate,
                )?;
                if let Some(stub) = config.stub_frames() {
                    mc_stack = mc_stack.with_max_frames(stub * entry.wavelengths.len());
                }
                Some(mc_stack.read()?)
            }
            None => None,
        };
        let traces = entry
            .fluorescence_files
            .iter()
            .map(|path| MatFluorescence::new(&config.get_data_file(path)).read())
            .collect::<Result<Vec<_>, _>>()?;

        streams.push(StreamInputs {
            ttl_stream: entry.ttl_stream,
            wavelengths: entry.wavelengths.clone(),
            excitation_mode: entry.excitation_mode,
            constructs: entry.constructs.clone(),
            frame_count,
            raw,
            motion_corrected,
            traces,
        });
        step += 1.0;
        tx.send(WorkerStatus::new(
            step / n_steps,
            &session_id,
            worker_id,
            BarColor::CYAN,
        ))?;
    }

    let metadata = SessionMetadata {
        session_id: session_id.clone(),
        subject: session.subject.clone(),
        description: session.description.clone(),
        start_time: telemetry.start_time,
        timezone: config.timezone.clone(),
    };
    let options = AssemblyOptions {
        behavior_channels: config.behavior_channels.clone(),
        ball_diameter_m: config.ball_diameter(),
        stub_frames: config.stub_frames(),
    };
    tx.send(WorkerStatus::new(0.0, &session_id, worker_id, BarColor::MAGENTA))?;
    let bundle = assemble_session(metadata, &telemetry, streams, fibers, instrument, &options)?;
    tx.send(WorkerStatus::new(1.0, &session_id, worker_id, BarColor::MAGENTA))?;
    Ok(bundle)
}

/// Write the bundle to `path`, reporting progress per channel
fn write_bundle(
    bundle: &SessionBundle,
    path: &Path,
    tx: &Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<(), ProcessorError> {
    let session_id = &bundle.metadata.session_id;
    let mut writer = HDFWriter::new(path)?;
    writer.write_metadata(&bundle.metadata)?;
    writer.write_fiber_table(&bundle.fibers)?;
    for timing in bundle.streams.iter() {
        writer.write_stream_timing(timing)?;
    }
    tx.send(WorkerStatus::new(0.0, session_id, worker_id, BarColor::GREEN))?;
    let n_channels = bundle.channels.len() as f32;
    for (idx, channel) in bundle.channels.iter().enumerate() {
        writer.write_channel(channel)?;
        tx.send(WorkerStatus::new(
            (idx + 1) as f32 / n_channels,
            session_id,
            worker_id,
            BarColor::GREEN,
        ))?;
    }
    writer.close()?;
    Ok(())
}

fn partial_path(output_path: &Path) -> PathBuf {
    let mut name = output_path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Convert one session.
///
/// Configuration problems are caught before any large file is read. The output is written to a
/// temporary file next to the final path and renamed only once it is complete, so a failed
/// session leaves nothing behind.
pub fn process_session(
    config: &Config,
    session: &SessionEntry,
    instrument: &InstrumentTemplate,
    tx: &Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<SessionOutcome, ProcessorError> {
    let session_id = session.session_id();
    let output_path = config.get_output_file_name(&session.subject.subject_id, &session.date)?;
    if output_path.exists() && !config.overwrite {
        spdlog::info!(
            "Output {} already exists and overwrite is off, skipping session {}.",
            output_path.to_string_lossy(),
            session_id
        );
        return Ok(SessionOutcome::Skipped);
    }

    session.validate(&config.data_path)?;
    for stream in session.streams.iter() {
        resolve_stream_devices(
            &stream.wavelengths,
            stream.excitation_mode,
            &stream.constructs,
            instrument,
        )?;
    }

    tx.send(WorkerStatus::new(0.0, &session_id, worker_id, BarColor::CYAN))?;
    let bundle = read_and_assemble(config, session, instrument, tx, worker_id)?;

    let temp_path = partial_path(&output_path);
    if let Err(e) = write_bundle(&bundle, &temp_path, tx, worker_id) {
        if temp_path.exists() {
            std::fs::remove_file(&temp_path)?;
        }
        return Err(e);
    }
    if let Err(e) = std::fs::rename(&temp_path, &output_path) {
        std::fs::remove_file(&temp_path)?;
        return Err(e.into());
    }
    Ok(SessionOutcome::Converted)
}

/// Process a subset of sessions.
///
/// A failed session is logged and skipped; the worker moves on to the next one.
pub fn process_subset(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<SessionEntry>,
) -> Result<(), ProcessorError> {
    let instrument = InstrumentTemplate::load(config.instrument_path.as_deref())?;
    let mut n_failed = 0;
    for session in subset.iter() {
        let session_id = session.session_id();
        spdlog::info!("Processing session {}...", session_id);
        match process_session(&config, session, &instrument, &tx, worker_id) {
            Ok(SessionOutcome::Converted) => {
                spdlog::info!("Finished processing session {}.", session_id)
            }
            Ok(SessionOutcome::Skipped) => (),
            Err(ProcessorError::SendError(e)) => return Err(ProcessorError::SendError(e)),
            Err(e) => {
                n_failed += 1;
                spdlog::error!("Session {} failed and was skipped: {}", session_id, e);
                tx.send(WorkerStatus::new(1.0, &session_id, worker_id, BarColor::RED))?;
            }
        }
    }
    if n_failed > 0 {
        spdlog::warn!(
            "Worker {} finished with {} failed sessions out of {}.",
            worker_id,
            n_failed,
            subset.len()
        );
    }
    Ok(())
}

/// Divide the manifest sessions into a set of subsets (per thread/worker)
pub fn create_subsets(config: &Config, sessions: &[SessionEntry]) -> Vec<Vec<SessionEntry>> {
    let mut subsets: Vec<Vec<SessionEntry>> = vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for (idx, session) in sessions.iter().enumerate() {
        subsets[idx % n_subsets].push(session.clone())
    }

    subsets.retain(|subset| !subset.is_empty());
    subsets
}
