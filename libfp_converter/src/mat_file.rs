//! Minimal reader for MATLAB v7.3 `.mat` files.
//!
//! v7.3 files are HDF5 files where every top level variable is a dataset. MATLAB is
//! column-major, so an `m x n` variable is stored with HDF5 shape `(n, m)`. The readers here
//! undo that so arrays come back in the dimension order MATLAB shows.
use hdf5::File;
use ndarray::{Array2, ArrayD, Ix2};
use std::path::{Path, PathBuf};

use super::error::MatFileError;

#[derive(Debug)]
pub struct MatFile {
    file_handle: File,
    path: PathBuf,
}

impl MatFile {
    pub fn open(path: &Path) -> Result<Self, MatFileError> {
        if !path.exists() {
            return Err(MatFileError::BadFilePath(path.to_path_buf()));
        }
        Ok(Self {
            file_handle: File::open(path)?,
            path: path.to_path_buf(),
        })
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.file_handle.link_exists(name)
    }

    fn dataset(&self, name: &str) -> Result<hdf5::Dataset, MatFileError> {
        if !self.has_variable(name) {
            return Err(MatFileError::MissingVariable(
                name.to_string(),
                self.path.clone(),
            ));
        }
        Ok(self.file_handle.dataset(name)?)
    }

    /// Read a row or column vector (or a scalar) as a flat list of values
    pub fn read_vector(&self, name: &str) -> Result<Vec<f64>, MatFileError> {
        let dset = self.dataset(name)?;
        let shape = dset.shape();
        let n_long_dims = shape.iter().filter(|d| **d > 1).count();
        if n_long_dims > 1 {
            return Err(MatFileError::BadShape(name.to_string(), shape, "a vector"));
        }
        Ok(dset.read_raw::<f64>()?)
    }

    /// Read any numeric variable in MATLAB dimension order
    pub fn read_array(&self, name: &str) -> Result<ArrayD<f64>, MatFileError> {
        let data = self.dataset(name)?.read_dyn::<f64>()?;
        Ok(data.reversed_axes().as_standard_layout().to_owned())
    }

    /// Read a 2-D matrix in MATLAB dimension order (rows x columns)
    pub fn read_matrix(&self, name: &str) -> Result<Array2<f64>, MatFileError> {
        let data = self.read_array(name)?;
        let shape = data.shape().to_vec();
        data.into_dimensionality::<Ix2>()
            .map_err(|_| MatFileError::BadShape(name.to_string(), shape, "a 2-D matrix"))
    }

    /// Read a MATLAB char array (stored as UTF-16 code units)
    pub fn read_string(&self, name: &str) -> Result<String, MatFileError> {
        let units = self.dataset(name)?.read_raw::<u16>()?;
        Ok(String::from_utf16_lossy(&units))
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use hdf5::File;
    use ndarray::{ArrayD, IxDyn};

    /// Store `data` (given in MATLAB order) the way MATLAB v7.3 would
    pub fn write_matlab_array(file: &File, name: &str, data: &ArrayD<f64>) {
        let stored = data.t().as_standard_layout().to_owned();
        file.new_dataset_builder()
            .with_data(&stored)
            .create(name)
            .unwrap();
    }

    pub fn write_matlab_vector(file: &File, name: &str, data: &[f64]) {
        let column = ArrayD::from_shape_vec(IxDyn(&[data.len(), 1]), data.to_vec()).unwrap();
        write_matlab_array(file, name, &column);
    }

    pub fn write_matlab_string(file: &File, name: &str, value: &str) {
        let units: Vec<u16> = value.encode_utf16().collect();
        let stored = ndarray::Array2::from_shape_vec((units.len(), 1), units).unwrap();
        file.new_dataset_builder()
            .with_data(&stored)
            .create(name)
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use ndarray::array;

    #[test]
    fn test_round_trip_matlab_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.mat");
        {
            let file = File::create(&path).unwrap();
            write_matlab_vector(&file, "ttlIn1", &[0.0, 1.0, 1.0, 0.0]);
            let f = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]].into_dyn();
            write_matlab_array(&file, "F", &f);
            write_matlab_string(&file, "starttime", "10-Nov-2021 16:12:31");
        }

        let mat = MatFile::open(&path).unwrap();
        assert!(mat.has_variable("ttlIn1"));
        assert!(!mat.has_variable("ttlIn4"));
        assert_eq!(mat.read_vector("ttlIn1").unwrap(), vec![0.0, 1.0, 1.0, 0.0]);
        let f = mat.read_matrix("F").unwrap();
        assert_eq!(f.dim(), (3, 2));
        assert_eq!(f[[2, 0]], 5.0);
        assert_eq!(mat.read_string("starttime").unwrap(), "10-Nov-2021 16:12:31");
        assert!(matches!(
            mat.read_vector("F").unwrap_err(),
            MatFileError::BadShape(..)
        ));
        assert!(matches!(
            mat.read_vector("lick").unwrap_err(),
            MatFileError::MissingVariable(..)
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(MatFile::open(Path::new("/does/not/exist.mat")).is_err());
    }
}
