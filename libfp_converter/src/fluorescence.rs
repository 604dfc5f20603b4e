use ndarray::{s, Array2, Array3, Axis, Ix3};
use std::path::{Path, PathBuf};

use super::error::{FluorescenceError, MatFileError};
use super::mat_file::MatFile;

const RAW_VARIABLE: &str = "F";
const BASELINE_VARIABLE: &str = "F_baseline";
const DF_OVER_F_VARIABLE: &str = "Fc";
const MASKS_VARIABLE: &str = "ROImasks";
const CENTERS_VARIABLE: &str = "ROIs";
const RADIUS_VARIABLE: &str = "radius";

/// Per-ROI fluorescence extracted upstream for one excitation wavelength.
///
/// Traces are (frames x ROIs). Masks are (ROIs x rows x columns); centers are (ROIs x 2) as
/// (x, y) pixel positions.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiTraces {
    pub raw: Array2<f64>,
    pub baseline: Array2<f64>,
    pub df_over_f: Array2<f64>,
    pub masks: Array3<f64>,
    pub centers: Array2<f64>,
    pub radius: Option<f64>,
}

impl RoiTraces {
    pub fn n_frames(&self) -> usize {
        self.raw.len_of(Axis(0))
    }

    pub fn n_rois(&self) -> usize {
        self.raw.len_of(Axis(1))
    }

    /// Every trace series with its name, for checks and output
    pub fn series(&self) -> [(&'static str, &Array2<f64>); 3] {
        [
            (RAW_VARIABLE, &self.raw),
            (BASELINE_VARIABLE, &self.baseline),
            (DF_OVER_F_VARIABLE, &self.df_over_f),
        ]
    }

    /// Keep only the first `n_frames` frames of every series
    pub fn truncate(&mut self, n_frames: usize) {
        if n_frames >= self.n_frames() {
            return;
        }
        self.raw = self.raw.slice(s![..n_frames, ..]).to_owned();
        self.baseline = self.baseline.slice(s![..n_frames, ..]).to_owned();
        self.df_over_f = self.df_over_f.slice(s![..n_frames, ..]).to_owned();
    }

    /// All series must agree on the frame and ROI counts
    pub fn validate(&self) -> Result<(), FluorescenceError> {
        let (n_frames, n_rois) = (self.n_frames(), self.n_rois());
        for (name, series) in self.series() {
            if series.ncols() != n_rois {
                return Err(FluorescenceError::RoiCountMismatch(name, series.ncols(), n_rois));
            }
            if series.nrows() != n_frames {
                return Err(FluorescenceError::FrameCountMismatch(
                    name,
                    series.nrows(),
                    n_frames,
                ));
            }
        }
        if self.masks.len_of(Axis(0)) != n_rois {
            return Err(FluorescenceError::RoiCountMismatch(
                MASKS_VARIABLE,
                self.masks.len_of(Axis(0)),
                n_rois,
            ));
        }
        if self.centers.nrows() != n_rois {
            return Err(FluorescenceError::RoiCountMismatch(
                CENTERS_VARIABLE,
                self.centers.nrows(),
                n_rois,
            ));
        }
        Ok(())
    }
}

/// Anything that can produce the ROI traces of one wavelength
pub trait FluorescenceSource {
    fn read(&self) -> Result<RoiTraces, FluorescenceError>;
}

/// ROI traces saved by the lab's MATLAB extraction scripts
#[derive(Debug, Clone)]
pub struct MatFluorescence {
    path: PathBuf,
}

impl MatFluorescence {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl FluorescenceSource for MatFluorescence {
    fn read(&self) -> Result<RoiTraces, FluorescenceError> {
        let mat = MatFile::open(&self.path)?;

        // rows x columns x ROIs in MATLAB, stored here ROI first
        let masks = mat.read_array(MASKS_VARIABLE)?;
        let mask_shape = masks.shape().to_vec();
        let masks = masks
            .into_dimensionality::<Ix3>()
            .map_err(|_| {
                MatFileError::BadShape(MASKS_VARIABLE.to_string(), mask_shape, "rows x columns x ROIs")
            })?
            .permuted_axes([2, 0, 1])
            .as_standard_layout()
            .to_owned();

        // 2 x ROIs in MATLAB
        let centers = mat.read_matrix(CENTERS_VARIABLE)?.reversed_axes();

        let radius = if mat.has_variable(RADIUS_VARIABLE) {
            mat.read_vector(RADIUS_VARIABLE)?.first().copied()
        } else {
            None
        };

        let traces = RoiTraces {
            raw: mat.read_matrix(RAW_VARIABLE)?,
            baseline: mat.read_matrix(BASELINE_VARIABLE)?,
            df_over_f: mat.read_matrix(DF_OVER_F_VARIABLE)?,
            masks,
            centers: centers.as_standard_layout().to_owned(),
            radius,
        };
        traces.validate()?;
        spdlog::info!(
            "Loaded {} ROIs x {} frames from {}",
            traces.n_rois(),
            traces.n_frames(),
            self.path.to_string_lossy()
        );
        Ok(traces)
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::synthetic_traces;
    use super::*;
    use crate::mat_file::test_utils::write_matlab_array;
    use ndarray::ArrayD;

    #[test]
    fn test_truncate() {
        let mut traces = synthetic_traces(10, 3);
        traces.truncate(7);
        assert_eq!(traces.n_frames(), 7);
        assert_eq!(traces.df_over_f.nrows(), 7);
        assert!(traces.validate().is_ok());
    }

    #[test]
    fn test_validate_catches_mismatch() {
        let mut traces = synthetic_traces(10, 3);
        traces.baseline = Array2::zeros((9, 3));
        assert!(matches!(
            traces.validate().unwrap_err(),
            FluorescenceError::FrameCountMismatch("F_baseline", 9, 10)
        ));
    }

    #[test]
    fn test_read_mat_fluorescence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Data00217_crop_MC_ROIs.mat");
        {
            let file = hdf5::File::create(&path).unwrap();
            let f = Array2::from_shape_fn((6, 2), |(f, r)| (f + r) as f64).into_dyn();
            write_matlab_array(&file, "F", &f);
            write_matlab_array(&file, "F_baseline", &f);
            write_matlab_array(&file, "Fc", &f);
            let masks = ArrayD::<f64>::zeros(ndarray::IxDyn(&[5, 4, 2]));
            write_matlab_array(&file, "ROImasks", &masks);
            let centers = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0])
                .unwrap()
                .into_dyn();
            write_matlab_array(&file, "ROIs", &centers);
        }
        let traces = MatFluorescence::new(&path).read().unwrap();
        assert_eq!(traces.n_frames(), 6);
        assert_eq!(traces.n_rois(), 2);
        assert_eq!(traces.masks.dim(), (2, 5, 4));
        // x of ROI 1 is MATLAB ROIs(1, 2)
        assert_eq!(traces.centers[[1, 0]], 2.0);
        assert!(traces.radius.is_none());
    }
}
