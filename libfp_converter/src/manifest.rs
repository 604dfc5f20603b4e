//! The session manifest lists every session to convert, with all of its input files.
//!
//! ```yml
//! sessions:
//!   - subject:
//!       subject_id: '759'
//!       date_of_birth: '2021-03-02'
//!       sex: M
//!       genotype: DAT-Cre
//!     date: '20211110'
//!     telemetry_file: 759/20211110/Data00217_behavior.mat
//!     fiber_locations_file: 759/fiber_locations.csv
//!     streams:
//!       - imaging_file: 759/20211110/Data00217_crop.raw
//!         motion_corrected_file: 759/20211110/Data00217_crop_MC.raw
//!         rows: 256
//!         columns: 256
//!         frame_rate: 18.0
//!         ttl_stream: ttlIn1
//!         excitation_mode: dual-wavelength
//!         wavelengths: [470, 405]
//!         constructs: [pAAV-CAG-dLight1.3b, pAAV-CAG-dLight1.3b]
//!         fluorescence_files:
//!           - 759/20211110/Data00217_crop_MC_ROIs_470.mat
//!           - 759/20211110/Data00217_crop_MC_ROIs_405.mat
//! ```
//!
//! `excitation_mode` states how many LEDs alternate on the camera trigger
//! (`single-wavelength` or `dual-wavelength`); it must agree with `wavelengths`.
//! Every session (`{subject_id}-{date}`) may appear only once.
//!
//! All paths are relative to the `data_path` of the [`Config`](crate::config::Config).
use fxhash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::Date;

use super::demux::{ExcitationMode, Wavelength};
use super::error::ManifestError;
use super::ttl::TtlStream;

pub const DEFAULT_SEX: &str = "U";
pub const SPECIES: &str = "Mus musculus";

fn default_sex() -> String {
    String::from(DEFAULT_SEX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectEntry {
    pub subject_id: String,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default = "default_sex")]
    pub sex: String,
    #[serde(default)]
    pub genotype: Option<String>,
    #[serde(default)]
    pub strain: Option<String>,
}

impl SubjectEntry {
    /// Date of birth in ISO format (YYYY-MM-DD), if known
    pub fn parse_date_of_birth(&self) -> Result<Option<Date>, ManifestError> {
        let Some(dob) = self.date_of_birth.as_ref() else {
            return Ok(None);
        };
        let format = format_description!("[year]-[month]-[day]");
        Date::parse(dob.trim(), &format)
            .map(Some)
            .map_err(|e| ManifestError::BadDateOfBirth(self.subject_id.clone(), dob.clone(), e))
    }
}

/// One camera and the TTL line that records its exposures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingStreamEntry {
    pub imaging_file: PathBuf,
    #[serde(default)]
    pub motion_corrected_file: Option<PathBuf>,
    pub rows: usize,
    pub columns: usize,
    pub frame_rate: f64,
    pub ttl_stream: TtlStream,
    pub excitation_mode: ExcitationMode,
    /// Excitation wavelengths in the order the LEDs fire
    pub wavelengths: Vec<Wavelength>,
    /// Injected construct imaged at each wavelength
    pub constructs: Vec<String>,
    /// Extracted ROI traces, one file per wavelength
    pub fluorescence_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub subject: SubjectEntry,
    pub date: String,
    #[serde(default)]
    pub description: Option<String>,
    pub telemetry_file: PathBuf,
    pub fiber_locations_file: PathBuf,
    pub streams: Vec<ImagingStreamEntry>,
}

impl SessionEntry {
    /// Name used for logging and output files, `{subject}-{date}`
    pub fn session_id(&self) -> String {
        format!("{}-{}", self.subject.subject_id, self.date)
    }

    /// Every input file of the session, in the order they are read
    pub fn required_files(&self) -> Vec<&Path> {
        let mut files: Vec<&Path> = vec![&self.telemetry_file, &self.fiber_locations_file];
        for stream in self.streams.iter() {
            files.push(&stream.imaging_file);
            if let Some(mc) = stream.motion_corrected_file.as_ref() {
                files.push(mc);
            }
            files.extend(stream.fluorescence_files.iter().map(|p| p.as_path()));
        }
        files
    }

    /// Check the session for configuration errors. Nothing is read except file existence
    pub fn validate(&self, data_path: &Path) -> Result<(), ManifestError> {
        let id = self.session_id();
        if self.streams.is_empty() {
            return Err(ManifestError::NoStreams(id));
        }
        for (idx, stream) in self.streams.iter().enumerate() {
            let n_wavelengths = stream.wavelengths.len();
            if stream.fluorescence_files.len() != n_wavelengths {
                return Err(ManifestError::FluorescenceCount(
                    id,
                    idx,
                    stream.fluorescence_files.len(),
                    n_wavelengths,
                ));
            }
            if stream.constructs.len() != n_wavelengths {
                return Err(ManifestError::ConstructCount(
                    id,
                    idx,
                    stream.constructs.len(),
                    n_wavelengths,
                ));
            }
            if self.streams[..idx]
                .iter()
                .any(|other| other.ttl_stream == stream.ttl_stream)
            {
                return Err(ManifestError::DuplicateTtlStream(
                    id,
                    stream.ttl_stream.to_string(),
                ));
            }
        }
        self.subject.parse_date_of_birth()?;
        for file in self.required_files() {
            let full_path = data_path.join(file);
            if !full_path.exists() {
                return Err(ManifestError::MissingFile(id, full_path));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub sessions: Vec<SessionEntry>,
}

impl SessionManifest {
    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::BadFilePath(path.to_path_buf()));
        }
        let yaml_str = std::fs::read_to_string(path)?;
        Self::parse(&yaml_str)
    }

    /// Parse a manifest. Two rows for the same session would be written to the same output
    /// file, so they are rejected
    pub fn parse(yaml_str: &str) -> Result<Self, ManifestError> {
        let manifest = serde_yaml::from_str::<Self>(yaml_str)?;
        let mut seen = FxHashSet::default();
        for session in manifest.sessions.iter() {
            let id = session.session_id();
            if seen.contains(&id) {
                return Err(ManifestError::DuplicateSession(id));
            }
            seen.insert(id);
        }
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "
sessions:
  - subject:
      subject_id: '759'
      date_of_birth: '2021-03-02'
    date: '20211110'
    telemetry_file: behavior.mat
    fiber_locations_file: fibers.csv
    streams:
      - imaging_file: movie.raw
        rows: 4
        columns: 4
        frame_rate: 18.0
        ttl_stream: ttlIn1
        excitation_mode: dual-wavelength
        wavelengths: [470, 405]
        constructs: [pAAV-CAG-dLight1.3b, pAAV-CAG-dLight1.3b]
        fluorescence_files: [rois_470.mat, rois_405.mat]
";

    fn touch_all(dir: &Path, session: &SessionEntry) {
        for file in session.required_files() {
            std::fs::write(dir.join(file), b"").unwrap();
        }
    }

    #[test]
    fn test_parse_manifest() {
        let manifest: SessionManifest = serde_yaml::from_str(MANIFEST).unwrap();
        assert_eq!(manifest.len(), 1);
        let session = &manifest.sessions[0];
        assert_eq!(session.session_id(), "759-20211110");
        assert_eq!(session.subject.sex, "U");
        assert_eq!(session.streams[0].ttl_stream, TtlStream::TtlIn1);
        assert_eq!(
            session.streams[0].wavelengths,
            vec![Wavelength(470), Wavelength(405)]
        );
        assert_eq!(
            session.streams[0].excitation_mode,
            ExcitationMode::DualWavelength
        );
        let dob = session.subject.parse_date_of_birth().unwrap().unwrap();
        assert_eq!(dob.year(), 2021);
    }

    #[test]
    fn test_duplicate_session_rejected() {
        assert_eq!(SessionManifest::parse(MANIFEST).unwrap().len(), 1);

        let mut manifest: SessionManifest = serde_yaml::from_str(MANIFEST).unwrap();
        manifest.sessions.push(manifest.sessions[0].clone());
        let doubled = serde_yaml::to_string(&manifest).unwrap();
        assert!(matches!(
            SessionManifest::parse(&doubled).unwrap_err(),
            ManifestError::DuplicateSession(id) if id == "759-20211110"
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.yml");
        std::fs::write(&path, doubled).unwrap();
        assert!(SessionManifest::read(&path).is_err());
    }

    #[test]
    fn test_missing_excitation_mode() {
        let without_mode = MANIFEST.replace("        excitation_mode: dual-wavelength\n", "");
        assert!(matches!(
            SessionManifest::parse(&without_mode).unwrap_err(),
            ManifestError::ParsingError(..)
        ));
    }

    #[test]
    fn test_validate_session() {
        let dir = tempfile::tempdir().unwrap();
        let manifest: SessionManifest = serde_yaml::from_str(MANIFEST).unwrap();
        let session = &manifest.sessions[0];
        assert!(matches!(
            session.validate(dir.path()).unwrap_err(),
            ManifestError::MissingFile(..)
        ));
        touch_all(dir.path(), session);
        assert!(session.validate(dir.path()).is_ok());

        let mut bad = session.clone();
        bad.streams[0].fluorescence_files.pop();
        assert!(matches!(
            bad.validate(dir.path()).unwrap_err(),
            ManifestError::FluorescenceCount(_, 0, 1, 2)
        ));

        let mut dup = session.clone();
        dup.streams.push(session.streams[0].clone());
        assert!(matches!(
            dup.validate(dir.path()).unwrap_err(),
            ManifestError::DuplicateTtlStream(..)
        ));

        let mut empty = session.clone();
        empty.streams.clear();
        assert!(matches!(
            empty.validate(dir.path()).unwrap_err(),
            ManifestError::NoStreams(..)
        ));
    }

    #[test]
    fn test_bad_date_of_birth() {
        let subject = SubjectEntry {
            subject_id: String::from("759"),
            date_of_birth: Some(String::from("03/02/2021")),
            sex: default_sex(),
            genotype: None,
            strain: None,
        };
        assert!(subject.parse_date_of_birth().is_err());
    }
}
