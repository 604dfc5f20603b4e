use hdf5::types::VarLenUnicode;
use hdf5::{File, Group, Location};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use time::macros::format_description;

use super::downsample::ChannelKind;
use super::error::HDF5WriterError;
use super::fiber_locations::FiberLocationTable;
use super::instrument::{ChannelDevices, Device};
use super::manifest::SPECIES;
use super::session::{ChannelBundle, SessionMetadata, StreamTiming};
use super::timestamps::FrameMismatch;

const GENERAL_NAME: &str = "general";
const SUBJECT_NAME: &str = "subject";
const DEVICES_NAME: &str = "devices";
const FIBER_TABLE_NAME: &str = "fiber_photometry_table";
const ACQUISITION_NAME: &str = "acquisition";
const PROCESSING_NAME: &str = "processing";
const OPHYS_NAME: &str = "ophys";
const BEHAVIOR_NAME: &str = "behavior";
const DATA_NAME: &str = "data";
const TIMESTAMPS_NAME: &str = "timestamps";

/// This is the version of the output format
const FORMAT_VERSION: &str = "1.0";

fn write_str_attr(location: &Location, name: &str, value: &str) -> Result<(), HDF5WriterError> {
    location
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&VarLenUnicode::from_str(value)?)?;
    Ok(())
}

fn write_f64_attr(location: &Location, name: &str, value: f64) -> Result<(), HDF5WriterError> {
    location
        .new_attr::<f64>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn to_unicode(values: &[String]) -> Result<Vec<VarLenUnicode>, HDF5WriterError> {
    values
        .iter()
        .map(|v| VarLenUnicode::from_str(v).map_err(HDF5WriterError::from))
        .collect()
}

/// A series group with a data set and its timestamps
fn create_series<'d, A, T, D>(
    parent: &Group,
    name: &str,
    data: A,
    timestamps: &[f64],
) -> Result<Group, HDF5WriterError>
where
    A: Into<ndarray::ArrayView<'d, T, D>>,
    T: hdf5::H5Type + 'd,
    D: ndarray::Dimension,
{
    let group = parent.create_group(name)?;
    group.new_dataset_builder().with_data(data).create(DATA_NAME)?;
    group
        .new_dataset_builder()
        .with_data(timestamps)
        .create(TIMESTAMPS_NAME)?;
    Ok(group)
}

fn write_device_attrs(group: &Group, device: &Device) -> Result<(), HDF5WriterError> {
    write_str_attr(group, "description", &device.description)?;
    if let Some(manufacturer) = device.manufacturer.as_ref() {
        write_str_attr(group, "manufacturer", manufacturer)?;
    }
    if let Some(model) = device.model.as_ref() {
        write_str_attr(group, "model", model)?;
    }
    Ok(())
}

/// A simple struct which wraps around the hdf5-rust library.
///
/// Opens an HDF5 file for writing one converted session. Device groups are written once even
/// when several wavelengths share them.
#[allow(dead_code)]
#[derive(Debug)]
pub struct HDFWriter {
    file_handle: File,
    path: PathBuf,
    devices_group: Group,
    acquisition_group: Group,
    ophys_group: Group,
    behavior_group: Group,
    n_series: usize,
}
// Structure
// / - session_start_time, timezone, subject_id, session_id, session_description, version
// |---- general
// |    |---- subject - subject_id, sex, species, date_of_birth, genotype, strain
// |    |---- devices
// |    |    |---- <device> - description, manufacturer, model, ...
// |    |---- fiber_photometry_table
// |    |    |---- roi, location, coordinates, allen_atlas_coordinates, is_good_fiber(dset)
// |---- acquisition
// |    |---- FrameTiming_<ttl> - edge_frame_mismatch, original_frame_count
// |    |    |---- timestamps, wavelength(dset)
// |    |---- OnePhotonSeries_<nm> - rate, starting_time, ttl_stream, excitation_source, indicator
// |    |    |---- data, timestamps, frame_indices(dset)
// |    |---- FiberPhotometryResponseSeries_<nm> - light path device names
// |    |    |---- data, timestamps(dset)
// |---- processing
// |    |---- ophys
// |    |    |---- MotionCorrectedSeries_<nm>, BaselineResponseSeries_<nm>, DfOverFResponseSeries_<nm>
// |    |    |---- ImageSegmentation_<nm> - radius
// |    |    |    |---- image_masks, centers(dset)
// |    |---- behavior
// |    |    |---- <channel>_<nm>, AngularVelocity_<nm>, Velocity_<nm> - kind, unit
// |    |    |---- TimeIntervals_<nm>
// |    |    |    |---- start_time, stop_time, event_type(dset)

impl HDFWriter {
    /// Create the writer, opening a file at path and creating the data groups
    pub fn new(path: &Path) -> Result<Self, HDF5WriterError> {
        let file_handle = File::create(path)?;
        let general = file_handle.create_group(GENERAL_NAME)?;
        let devices_group = general.create_group(DEVICES_NAME)?;
        let acquisition_group = file_handle.create_group(ACQUISITION_NAME)?;
        let processing = file_handle.create_group(PROCESSING_NAME)?;
        let ophys_group = processing.create_group(OPHYS_NAME)?;
        let behavior_group = processing.create_group(BEHAVIOR_NAME)?;

        let converter_version = format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION);
        write_str_attr(&file_handle, "version", &converter_version)?;

        Ok(Self {
            file_handle,
            path: path.to_path_buf(),
            devices_group,
            acquisition_group,
            ophys_group,
            behavior_group,
            n_series: 0,
        })
    }

    /// Write the session and subject level metadata
    pub fn write_metadata(&self, metadata: &SessionMetadata) -> Result<(), HDF5WriterError> {
        let start_time = match metadata.start_time {
            Some(start) => start.format(format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second]"
            ))?,
            None => String::from("unknown"),
        };
        write_str_attr(&self.file_handle, "session_start_time", &start_time)?;
        write_str_attr(&self.file_handle, "timezone", &metadata.timezone)?;
        write_str_attr(&self.file_handle, "session_id", &metadata.session_id)?;
        write_str_attr(
            &self.file_handle,
            "subject_id",
            &metadata.subject.subject_id,
        )?;
        if let Some(description) = metadata.description.as_ref() {
            write_str_attr(&self.file_handle, "session_description", description)?;
        }

        let subject = self.file_handle.group(GENERAL_NAME)?.create_group(SUBJECT_NAME)?;
        let entry = &metadata.subject;
        write_str_attr(&subject, "subject_id", &entry.subject_id)?;
        write_str_attr(&subject, "sex", &entry.sex)?;
        write_str_attr(&subject, "species", SPECIES)?;
        if let Some(dob) = entry.date_of_birth.as_ref() {
            write_str_attr(&subject, "date_of_birth", dob)?;
        }
        if let Some(genotype) = entry.genotype.as_ref() {
            write_str_attr(&subject, "genotype", genotype)?;
        }
        if let Some(strain) = entry.strain.as_ref() {
            write_str_attr(&subject, "strain", strain)?;
        }
        Ok(())
    }

    fn device_group(&self, name: &str) -> Result<Option<Group>, HDF5WriterError> {
        if self.devices_group.link_exists(name) {
            Ok(None)
        } else {
            Ok(Some(self.devices_group.create_group(name)?))
        }
    }

    /// Write every device in the light path of a channel that was not already written
    pub fn write_devices(&self, devices: &ChannelDevices) -> Result<(), HDF5WriterError> {
        let source = &devices.excitation_source;
        if let Some(group) = self.device_group(&source.name)? {
            write_str_attr(&group, "description", &source.description)?;
            if let Some(manufacturer) = source.manufacturer.as_ref() {
                write_str_attr(&group, "manufacturer", manufacturer)?;
            }
            if let Some(model) = source.model.as_ref() {
                write_str_attr(&group, "model", model)?;
            }
            write_str_attr(&group, "illumination_type", &source.illumination_type)?;
            write_f64_attr(
                &group,
                "excitation_wavelength_in_nm",
                source.excitation_wavelength_in_nm as f64,
            )?;
        }

        let filter = &devices.excitation_filter;
        if let Some(group) = self.device_group(&filter.name)? {
            write_str_attr(&group, "description", &filter.description)?;
            if let Some(manufacturer) = filter.manufacturer.as_ref() {
                write_str_attr(&group, "manufacturer", manufacturer)?;
            }
            if let Some(model) = filter.model.as_ref() {
                write_str_attr(&group, "model", model)?;
            }
            write_f64_attr(&group, "center_wavelength_in_nm", filter.center_wavelength_in_nm)?;
            write_f64_attr(&group, "bandwidth_in_nm", filter.bandwidth_in_nm)?;
            write_str_attr(&group, "filter_type", &filter.filter_type)?;
        }

        let indicator = &devices.indicator;
        if let Some(group) = self.device_group(&indicator.name)? {
            write_str_attr(&group, "description", &indicator.description)?;
            write_str_attr(&group, "label", &indicator.label)?;
        }

        for device in [
            &devices.dichroic_mirror,
            &devices.photodetector,
            &devices.optical_fiber,
        ] {
            if let Some(group) = self.device_group(&device.name)? {
                write_device_attrs(&group, device)?;
            }
        }
        Ok(())
    }

    /// Write the fiber location table, one row per ROI
    pub fn write_fiber_table(&self, fibers: &FiberLocationTable) -> Result<(), HDF5WriterError> {
        let table = self
            .file_handle
            .group(GENERAL_NAME)?
            .create_group(FIBER_TABLE_NAME)?;
        let locations = fibers.locations();
        let good = fibers.good_fibers();
        let n_fibers = locations.len();

        let rois: Vec<u64> = locations.iter().map(|loc| loc.roi as u64).collect();
        let areas: Vec<String> = locations
            .iter()
            .map(|loc| loc.brain_area.clone().unwrap_or_default())
            .collect();
        let coordinates = Array2::from_shape_fn((n_fibers, 3), |(row, col)| {
            locations[row].coordinates[col]
        });
        let allen = Array2::from_shape_fn((n_fibers, 3), |(row, col)| {
            locations[row].allen_atlas_coordinates[col]
        });
        let is_good: Vec<u8> = locations
            .iter()
            .map(|loc| good.contains(loc.roi) as u8)
            .collect();

        table.new_dataset_builder().with_data(rois.as_slice()).create("roi")?;
        table
            .new_dataset_builder()
            .with_data(to_unicode(&areas)?.as_slice())
            .create("location")?;
        table
            .new_dataset_builder()
            .with_data(&coordinates)
            .create("coordinates")?;
        table
            .new_dataset_builder()
            .with_data(&allen)
            .create("allen_atlas_coordinates")?;
        table
            .new_dataset_builder()
            .with_data(is_good.as_slice())
            .create("is_good_fiber")?;
        spdlog::info!(
            "Wrote {} fibers, {} located in the brain.",
            n_fibers,
            good.len()
        );
        Ok(())
    }

    /// Write the interleaved frame timing of one imaging stream
    pub fn write_stream_timing(&self, timing: &StreamTiming) -> Result<(), HDF5WriterError> {
        let group = self
            .acquisition_group
            .create_group(&format!("FrameTiming_{}", timing.ttl_stream))?;
        group
            .new_dataset_builder()
            .with_data(timing.timestamps.as_slice())
            .create(TIMESTAMPS_NAME)?;
        let assignment: Vec<u32> = timing.assignment.iter().map(|w| w.0).collect();
        group
            .new_dataset_builder()
            .with_data(assignment.as_slice())
            .create("wavelength")?;
        let (mismatch, original) = match timing.mismatch {
            None => ("none", timing.timestamps.len()),
            Some(FrameMismatch::MissingEdges { frames, .. }) => ("missing_edges", frames),
            Some(FrameMismatch::ExtraEdges { kept, .. }) => ("extra_edges", kept),
        };
        write_str_attr(&group, "edge_frame_mismatch", mismatch)?;
        group
            .new_attr::<u64>()
            .create("original_frame_count")?
            .write_scalar(&(original as u64))?;
        Ok(())
    }

    /// Write every series of one wavelength
    pub fn write_channel(&mut self, channel: &ChannelBundle) -> Result<(), HDF5WriterError> {
        let nm = channel.wavelength;
        let ts = channel.timestamps.as_slice();
        let starting_time = ts.first().copied().unwrap_or(0.0);
        let devices = &channel.devices;

        self.write_devices(devices)?;

        // Imaging
        let one_photon = create_series(
            &self.acquisition_group,
            &format!("OnePhotonSeries_{nm}"),
            &channel.raw.frames,
            ts,
        )?;
        let frame_indices: Vec<u64> = channel.frame_indices.iter().map(|i| *i as u64).collect();
        one_photon
            .new_dataset_builder()
            .with_data(frame_indices.as_slice())
            .create("frame_indices")?;
        write_f64_attr(&one_photon, "rate", channel.rate)?;
        write_f64_attr(&one_photon, "starting_time", starting_time)?;
        write_str_attr(&one_photon, "ttl_stream", &channel.ttl_stream.to_string())?;
        write_str_attr(&one_photon, "excitation_source", &devices.excitation_source.name)?;
        write_str_attr(&one_photon, "indicator", &devices.indicator.name)?;
        self.n_series += 1;

        if let Some(mc) = channel.motion_corrected.as_ref() {
            let series = create_series(
                &self.ophys_group,
                &format!("MotionCorrectedSeries_{nm}"),
                &mc.frames,
                ts,
            )?;
            write_f64_attr(&series, "rate", channel.rate)?;
            self.n_series += 1;
        }

        // Fluorescence
        let response = create_series(
            &self.acquisition_group,
            &format!("FiberPhotometryResponseSeries_{nm}"),
            &channel.traces.raw,
            ts,
        )?;
        write_str_attr(&response, "unit", "a.u.")?;
        write_str_attr(&response, "excitation_source", &devices.excitation_source.name)?;
        write_str_attr(&response, "excitation_filter", &devices.excitation_filter.name)?;
        write_str_attr(&response, "dichroic_mirror", &devices.dichroic_mirror.name)?;
        write_str_attr(&response, "photodetector", &devices.photodetector.name)?;
        write_str_attr(&response, "optical_fiber", &devices.optical_fiber.name)?;
        write_str_attr(&response, "indicator", &devices.indicator.name)?;
        let baseline = create_series(
            &self.ophys_group,
            &format!("BaselineResponseSeries_{nm}"),
            &channel.traces.baseline,
            ts,
        )?;
        write_str_attr(&baseline, "unit", "a.u.")?;
        let dff = create_series(
            &self.ophys_group,
            &format!("DfOverFResponseSeries_{nm}"),
            &channel.traces.df_over_f,
            ts,
        )?;
        write_str_attr(&dff, "unit", "n.a.")?;
        self.n_series += 3;

        let segmentation = self
            .ophys_group
            .create_group(&format!("ImageSegmentation_{nm}"))?;
        segmentation
            .new_dataset_builder()
            .with_data(&channel.traces.masks)
            .create("image_masks")?;
        segmentation
            .new_dataset_builder()
            .with_data(&channel.traces.centers)
            .create("centers")?;
        if let Some(radius) = channel.traces.radius {
            write_f64_attr(&segmentation, "radius", radius)?;
        }

        // Behavior
        for aligned in channel.behavior.channels() {
            let series = create_series(
                &self.behavior_group,
                &format!("{}_{nm}", aligned.name),
                aligned.values.as_slice(),
                ts,
            )?;
            let kind = match aligned.kind {
                ChannelKind::Continuous => "continuous",
                ChannelKind::Binary => "binary",
            };
            write_str_attr(&series, "kind", kind)?;
            self.n_series += 1;
        }
        if let Some(angular) = channel.angular_velocity.as_ref() {
            let series = create_series(
                &self.behavior_group,
                &format!("AngularVelocity_{nm}"),
                angular.as_slice(),
                ts,
            )?;
            write_str_attr(&series, "unit", "radians/s")?;
            self.n_series += 1;
        }
        if let Some(velocity) = channel.velocity.as_ref() {
            let planar = Array2::from_shape_fn((velocity.len(), 2), |(row, col)| velocity[row][col]);
            let series = create_series(
                &self.behavior_group,
                &format!("Velocity_{nm}"),
                &planar,
                ts,
            )?;
            write_str_attr(&series, "unit", "m/s")?;
            self.n_series += 1;
        }
        if !channel.events.is_empty() {
            let intervals = self
                .behavior_group
                .create_group(&format!("TimeIntervals_{nm}"))?;
            let starts: Vec<f64> = channel.events.iter().map(|e| e.start_time).collect();
            let stops: Vec<f64> = channel.events.iter().map(|e| e.stop_time).collect();
            let types: Vec<String> = channel
                .events
                .iter()
                .map(|e| e.event_type.to_string())
                .collect();
            intervals
                .new_dataset_builder()
                .with_data(starts.as_slice())
                .create("start_time")?;
            intervals
                .new_dataset_builder()
                .with_data(stops.as_slice())
                .create("stop_time")?;
            intervals
                .new_dataset_builder()
                .with_data(to_unicode(&types)?.as_slice())
                .create("event_type")?;
        }

        spdlog::info!(
            "Wrote {} nm channel with {} frames from {}.",
            nm,
            channel.len(),
            channel.ttl_stream
        );
        Ok(())
    }

    /// Flush the file and report what was written, consume the writer
    pub fn close(self) -> Result<(), HDF5WriterError> {
        self.file_handle.flush()?;
        let size = self.path.metadata()?.len();
        spdlog::info!(
            "{} series written to {} ({}).",
            self.n_series,
            self.path.to_string_lossy(),
            human_bytes::human_bytes(size as f64)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::InstrumentTemplate;
    use crate::session::assemble_session;
    use crate::session::test_utils::*;

    #[test]
    fn test_write_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("759-20211110.nwb");
        let instrument = InstrumentTemplate::load(None).unwrap();
        let bundle = assemble_session(
            metadata(),
            &synthetic_telemetry(10),
            vec![synthetic_stream(10, &[470, 405], 2)],
            synthetic_fibers(2),
            &instrument,
            &options(),
        )
        .unwrap();

        let mut writer = HDFWriter::new(&path).unwrap();
        writer.write_metadata(&bundle.metadata).unwrap();
        writer.write_fiber_table(&bundle.fibers).unwrap();
        for timing in bundle.streams.iter() {
            writer.write_stream_timing(timing).unwrap();
        }
        for channel in bundle.channels.iter() {
            writer.write_channel(channel).unwrap();
        }
        writer.close().unwrap();

        let file = File::open(&path).unwrap();
        let sid: VarLenUnicode = file.attr("session_id").unwrap().read_scalar().unwrap();
        assert_eq!(sid.as_str(), "759-20211110");
        let movie = file.dataset("acquisition/OnePhotonSeries_405/data").unwrap();
        assert_eq!(movie.shape(), vec![5, 2, 2]);
        let ts = file
            .dataset("acquisition/FiberPhotometryResponseSeries_470/timestamps")
            .unwrap()
            .read_raw::<f64>()
            .unwrap();
        assert_eq!(ts.len(), 5);
        let wl = file
            .dataset("acquisition/FrameTiming_ttlIn1/wavelength")
            .unwrap()
            .read_raw::<u32>()
            .unwrap();
        assert_eq!(&wl[..4], &[470, 405, 470, 405]);
        assert!(file.link_exists("general/devices/DichroicMirror2"));
        assert!(file.link_exists("general/devices/ExcitationSource405"));
        assert!(file.link_exists("processing/behavior/AngularVelocity_470"));
        assert!(file.link_exists("processing/behavior/TimeIntervals_470"));
        let good = file
            .dataset("general/fiber_photometry_table/is_good_fiber")
            .unwrap()
            .read_raw::<u8>()
            .unwrap();
        assert_eq!(good, vec![1, 1]);
    }
}
