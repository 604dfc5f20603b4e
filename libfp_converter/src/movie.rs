use byteorder::{LittleEndian, ReadBytesExt};
use ndarray::{s, Array3, Axis};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::error::MovieError;

/// An ordered stack of 2-D frames with its nominal frame rate.
///
/// Frames are stored as (frame, row, column).
#[derive(Debug, Clone, PartialEq)]
pub struct ImagingMovie {
    pub frames: Array3<u16>,
    pub frame_rate: f64,
}

impl ImagingMovie {
    pub fn new(frames: Array3<u16>, frame_rate: f64) -> Result<Self, MovieError> {
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return Err(MovieError::BadFrameRate(frame_rate));
        }
        Ok(Self { frames, frame_rate })
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len_of(Axis(0))
    }

    /// Drop every frame past `n_frames`
    pub fn truncate(&mut self, n_frames: usize) {
        if n_frames < self.n_frames() {
            self.frames = self.frames.slice(s![..n_frames, .., ..]).to_owned();
        }
    }

    /// Build a new movie from the given frames, in the given order
    pub fn select_frames(&self, indices: &[usize], frame_rate: f64) -> Result<Self, MovieError> {
        let n_frames = self.n_frames();
        if let Some(bad) = indices.iter().find(|idx| **idx >= n_frames) {
            return Err(MovieError::FrameOutOfRange(*bad, n_frames));
        }
        Self::new(self.frames.select(Axis(0), indices), frame_rate)
    }
}

/// Anything that can produce an imaging movie
pub trait ImagingSource {
    fn read(&self) -> Result<ImagingMovie, MovieError>;
}

/// A headerless stack of little-endian u16 frames, as dumped by the camera software.
///
/// The frame geometry and rate are not stored in the file and must be supplied.
#[derive(Debug, Clone)]
pub struct RawFrameStack {
    path: PathBuf,
    rows: usize,
    columns: usize,
    frame_rate: f64,
    max_frames: Option<usize>,
}

impl RawFrameStack {
    pub fn new(
        path: &Path,
        rows: usize,
        columns: usize,
        frame_rate: f64,
    ) -> Result<Self, MovieError> {
        if !path.exists() {
            return Err(MovieError::BadFilePath(path.to_path_buf()));
        }
        if rows == 0 || columns == 0 {
            return Err(MovieError::BadGeometry(rows, columns));
        }
        Ok(Self {
            path: path.to_path_buf(),
            rows,
            columns,
            frame_rate,
            max_frames: None,
        })
    }

    /// Only read the first `max_frames` frames
    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    fn frame_size_bytes(&self) -> u64 {
        (self.rows * self.columns * std::mem::size_of::<u16>()) as u64
    }

    /// Number of frames in the file
    pub fn n_frames(&self) -> Result<usize, MovieError> {
        let size = self.path.metadata()?.len();
        let frame_size = self.frame_size_bytes();
        if size % frame_size != 0 {
            return Err(MovieError::PartialFrame(self.path.clone(), size, frame_size));
        }
        Ok((size / frame_size) as usize)
    }
}

impl ImagingSource for RawFrameStack {
    fn read(&self) -> Result<ImagingMovie, MovieError> {
        let mut n_frames = self.n_frames()?;
        if let Some(max) = self.max_frames {
            n_frames = n_frames.min(max);
        }
        spdlog::info!(
            "Reading {} frames of {}x{} from {} ({})",
            n_frames,
            self.rows,
            self.columns,
            self.path.to_string_lossy(),
            human_bytes::human_bytes((n_frames as u64 * self.frame_size_bytes()) as f64)
        );

        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut buffer = vec![0u16; n_frames * self.rows * self.columns];
        reader.read_u16_into::<LittleEndian>(&mut buffer)?;
        let frames = Array3::from_shape_vec((n_frames, self.rows, self.columns), buffer)?;
        ImagingMovie::new(frames, self.frame_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    fn write_stack(n_frames: usize, rows: usize, columns: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for frame in 0..n_frames {
            for pixel in 0..rows * columns {
                file.write_u16::<LittleEndian>((frame * 100 + pixel) as u16)
                    .unwrap();
            }
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_raw_stack() {
        let file = write_stack(4, 2, 3);
        let stack = RawFrameStack::new(file.path(), 2, 3, 20.0).unwrap();
        assert_eq!(stack.n_frames().unwrap(), 4);
        let movie = stack.read().unwrap();
        assert_eq!(movie.n_frames(), 4);
        assert_eq!(movie.frames.dim(), (4, 2, 3));
        assert_eq!(movie.frames[[2, 1, 0]], 203);
    }

    #[test]
    fn test_partial_frame_rejected() {
        let file = write_stack(3, 2, 3);
        let stack = RawFrameStack::new(file.path(), 4, 4, 20.0).unwrap();
        assert!(matches!(
            stack.read().unwrap_err(),
            MovieError::PartialFrame(_, 36, 32)
        ));
    }

    #[test]
    fn test_max_frames() {
        let file = write_stack(5, 2, 2);
        let movie = RawFrameStack::new(file.path(), 2, 2, 20.0)
            .unwrap()
            .with_max_frames(2)
            .read()
            .unwrap();
        assert_eq!(movie.n_frames(), 2);
    }

    #[test]
    fn test_truncate_and_select() {
        let frames = Array3::from_shape_fn((6, 2, 2), |(f, _, _)| f as u16);
        let mut movie = ImagingMovie::new(frames, 20.0).unwrap();
        let odd = movie.select_frames(&[1, 3, 5], 10.0).unwrap();
        assert_eq!(odd.n_frames(), 3);
        assert_eq!(odd.frames[[1, 0, 0]], 3);
        assert!(movie.select_frames(&[6], 10.0).is_err());
        movie.truncate(4);
        assert_eq!(movie.n_frames(), 4);
    }
}
