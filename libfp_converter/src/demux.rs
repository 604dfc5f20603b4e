use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::error::DemuxError;
use super::timestamps::regular_series_rate;

/// Maximum number of excitation LEDs that can share one camera trigger
pub const MAX_INTERLEAVED_WAVELENGTHS: usize = 2;

/// An excitation wavelength in nanometers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wavelength(pub u32);

impl Display for Wavelength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of LEDs that alternate on the camera trigger of one imaging stream, as wired on
/// the rig. Declared independently of the wavelength list it is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExcitationMode {
    SingleWavelength,
    DualWavelength,
}

impl ExcitationMode {
    pub fn n_sources(&self) -> usize {
        match self {
            Self::SingleWavelength => 1,
            Self::DualWavelength => 2,
        }
    }
}

impl Display for ExcitationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingleWavelength => write!(f, "single-wavelength"),
            Self::DualWavelength => write!(f, "dual-wavelength"),
        }
    }
}

/// The frames of one excitation wavelength, in acquisition order
#[derive(Debug, Clone, PartialEq)]
pub struct WavelengthBranch {
    pub wavelength: Wavelength,
    /// Index of each frame in the interleaved movie
    pub frame_indices: Vec<usize>,
    pub timestamps: Vec<f64>,
    /// Frame rate of this branch alone
    pub rate: f64,
}

impl WavelengthBranch {
    pub fn len(&self) -> usize {
        self.frame_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_indices.is_empty()
    }

    /// Keep only the first `n_frames` frames
    pub fn truncate(&mut self, n_frames: usize) {
        self.frame_indices.truncate(n_frames);
        self.timestamps.truncate(n_frames);
    }
}

/// Check the configured wavelengths against the excitation sources declared for the stream.
///
/// Runs before any frame is split; a wrong count would silently attribute every other frame
/// to the wrong LED.
pub fn validate_wavelengths(
    wavelengths: &[Wavelength],
    declared_sources: usize,
) -> Result<(), DemuxError> {
    let k = wavelengths.len();
    if k == 0 || k > MAX_INTERLEAVED_WAVELENGTHS {
        return Err(DemuxError::UnsupportedWavelengthCount(k));
    }
    if k != declared_sources {
        return Err(DemuxError::SourceCountMismatch {
            wavelengths: k,
            sources: declared_sources,
        });
    }
    for (idx, wavelength) in wavelengths.iter().enumerate() {
        if wavelengths[..idx].contains(wavelength) {
            return Err(DemuxError::DuplicateWavelength(wavelength.0));
        }
    }
    Ok(())
}

/// The wavelength assigned to every frame: frame `i` gets `wavelengths[i % K]`
pub fn assign_wavelengths(n_frames: usize, wavelengths: &[Wavelength]) -> Vec<Wavelength> {
    (0..n_frames)
        .map(|idx| wavelengths[idx % wavelengths.len()])
        .collect()
}

/// Split an interleaved frame sequence into one branch per wavelength.
///
/// The LEDs toggle in lock step with the shared trigger, so the assignment is purely by frame
/// position; no phase detection is done. With a single wavelength the one branch is the input.
/// Each branch rate is the regular rate of its own timestamps, falling back to
/// `nominal_rate / K` when the timestamps are irregular.
pub fn demultiplex(
    timestamps: &[f64],
    wavelengths: &[Wavelength],
    declared_sources: usize,
    nominal_rate: f64,
) -> Result<Vec<WavelengthBranch>, DemuxError> {
    validate_wavelengths(wavelengths, declared_sources)?;
    let k = wavelengths.len();

    let branches = wavelengths
        .iter()
        .enumerate()
        .map(|(phase, wavelength)| {
            let frame_indices: Vec<usize> = (phase..timestamps.len()).step_by(k).collect();
            let branch_ts: Vec<f64> = frame_indices.iter().map(|idx| timestamps[*idx]).collect();
            let rate = regular_series_rate(&branch_ts).unwrap_or(nominal_rate / k as f64);
            WavelengthBranch {
                wavelength: *wavelength,
                frame_indices,
                timestamps: branch_ts,
                rate,
            }
        })
        .collect();
    Ok(branches)
}

/// Merge branches back into acquisition order. Inverse of [`demultiplex`].
pub fn interleave<T: Clone>(branches: &[Vec<T>]) -> Result<Vec<T>, DemuxError> {
    let Some(first) = branches.first() else {
        return Ok(Vec::new());
    };
    let n = first.len();
    // Earlier phases may hold one extra frame when the total is not a multiple of K
    for (idx, branch) in branches.iter().enumerate() {
        let prev = if idx == 0 { n } else { branches[idx - 1].len() };
        if branch.len() > prev || branch.len() + 1 < n {
            return Err(DemuxError::BadBranchLength(idx, branch.len()));
        }
    }

    let total = branches.iter().map(|b| b.len()).sum();
    let mut merged = Vec::with_capacity(total);
    for row in 0..n {
        for branch in branches.iter() {
            if let Some(item) = branch.get(row) {
                merged.push(item.clone());
            }
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 * 0.05).collect()
    }

    #[test]
    fn test_dual_wavelength_split() {
        let ts = grid(10);
        let branches = demultiplex(&ts, &[Wavelength(470), Wavelength(405)], 2, 20.0).unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].wavelength, Wavelength(470));
        assert_eq!(branches[0].frame_indices, vec![0, 2, 4, 6, 8]);
        assert_eq!(branches[1].wavelength, Wavelength(405));
        assert_eq!(branches[1].frame_indices, vec![1, 3, 5, 7, 9]);
        assert!((branches[0].rate - 10.0).abs() < 1e-6);

        let rebuilt = interleave(&[branches[0].timestamps.clone(), branches[1].timestamps.clone()])
            .unwrap();
        assert_eq!(rebuilt, ts);
    }

    #[test]
    fn test_odd_frame_count_round_trip() {
        let ts = grid(7);
        let branches = demultiplex(&ts, &[Wavelength(470), Wavelength(570)], 2, 20.0).unwrap();
        assert_eq!(branches[0].len(), 4);
        assert_eq!(branches[1].len(), 3);
        let rebuilt = interleave(&[
            branches[0].frame_indices.clone(),
            branches[1].frame_indices.clone(),
        ])
        .unwrap();
        assert_eq!(rebuilt, (0..7).collect::<Vec<usize>>());
    }

    #[test]
    fn test_single_wavelength_identity() {
        let ts = grid(10);
        let branches = demultiplex(&ts, &[Wavelength(470)], 1, 20.0).unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].timestamps, ts);
        assert_eq!(branches[0].frame_indices, (0..10).collect::<Vec<usize>>());
    }

    #[test]
    fn test_source_count_mismatch() {
        let ts = grid(10);
        let err = demultiplex(&ts, &[Wavelength(470), Wavelength(405)], 1, 20.0).unwrap_err();
        assert!(matches!(err, DemuxError::SourceCountMismatch { .. }));
        assert!(demultiplex(&ts, &[], 0, 20.0).is_err());
        let three = [Wavelength(470), Wavelength(405), Wavelength(570)];
        assert!(matches!(
            demultiplex(&ts, &three, 3, 20.0).unwrap_err(),
            DemuxError::UnsupportedWavelengthCount(3)
        ));
        assert!(matches!(
            demultiplex(&ts, &[Wavelength(470), Wavelength(470)], 2, 20.0).unwrap_err(),
            DemuxError::DuplicateWavelength(470)
        ));
    }

    #[test]
    fn test_declared_mode_must_match_wavelengths() {
        let single = [Wavelength(470)];
        let dual = ExcitationMode::DualWavelength;
        assert!(matches!(
            validate_wavelengths(&single, dual.n_sources()).unwrap_err(),
            DemuxError::SourceCountMismatch {
                wavelengths: 1,
                sources: 2
            }
        ));
        assert!(validate_wavelengths(&single, ExcitationMode::SingleWavelength.n_sources()).is_ok());
        assert_eq!(dual.to_string(), "dual-wavelength");
    }

    #[test]
    fn test_irregular_rate_falls_back_to_nominal() {
        let ts = vec![0.0, 0.05, 0.1, 0.4, 0.45, 0.5];
        let branches = demultiplex(&ts, &[Wavelength(470), Wavelength(405)], 2, 20.0).unwrap();
        assert!((branches[0].rate - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_assignment() {
        let labels = assign_wavelengths(5, &[Wavelength(470), Wavelength(405)]);
        assert_eq!(
            labels,
            vec![
                Wavelength(470),
                Wavelength(405),
                Wavelength(470),
                Wavelength(405),
                Wavelength(470)
            ]
        );
    }

    #[test]
    fn test_interleave_rejects_ragged() {
        assert!(interleave(&[vec![1, 2], vec![3, 4, 5]]).is_err());
        assert!(interleave(&[vec![1, 2, 3], vec![4]]).is_err());
    }
}
