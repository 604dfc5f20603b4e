use super::error::SyncError;
use super::ttl::EdgeIndexSequence;

/// The clock of the behavioral acquisition board.
///
/// Either a fixed sample rate, or (when the telemetry file stores it) the recorded time of
/// every sample. All times are in seconds from the first sample of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleClock {
    Uniform { rate: f64, n_samples: usize },
    Recorded { times: Vec<f64> },
}

impl SampleClock {
    pub fn n_samples(&self) -> usize {
        match self {
            Self::Uniform { n_samples, .. } => *n_samples,
            Self::Recorded { times } => times.len(),
        }
    }

    /// Nominal sample rate. For a recorded clock this is the mean rate over the session
    pub fn rate(&self) -> Option<f64> {
        match self {
            Self::Uniform { rate, .. } => Some(*rate),
            Self::Recorded { times } => {
                let span = times.last()? - times.first()?;
                if times.len() < 2 || span <= 0.0 {
                    None
                } else {
                    Some((times.len() - 1) as f64 / span)
                }
            }
        }
    }

    /// Time of the sample at `index`
    pub fn time_of(&self, index: usize) -> Result<f64, SyncError> {
        match self {
            Self::Uniform { rate, n_samples } => {
                if index >= *n_samples {
                    Err(SyncError::EdgeOutOfRange(index, *n_samples))
                } else {
                    Ok(index as f64 / rate)
                }
            }
            Self::Recorded { times } => times
                .get(index)
                .copied()
                .ok_or(SyncError::EdgeOutOfRange(index, times.len())),
        }
    }

    /// Index of the first sample whose time is at or after `time`, clamped to the sample count
    pub fn first_index_at_or_after(&self, time: f64) -> usize {
        match self {
            Self::Uniform { rate, n_samples } => {
                // Edge derived times round trip to within float error of an integer index
                let exact = time * rate;
                let nearest = exact.round();
                let index = if (exact - nearest).abs() < 1e-6 {
                    nearest
                } else {
                    exact.ceil()
                };
                (index.max(0.0) as usize).min(*n_samples)
            }
            Self::Recorded { times } => times.partition_point(|t| *t < time),
        }
    }
}

/// Reconciliation between the confirmed exposure edges and the movie frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMismatch {
    /// Fewer edges than frames; the movie must be cut to `kept` frames
    MissingEdges { frames: usize, kept: usize },
    /// More edges than frames; the trailing edges were dropped
    ExtraEdges { edges: usize, kept: usize },
}

/// One timestamp per imaging frame, on the behavioral sample clock
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTimestamps {
    pub timestamps: Vec<f64>,
    pub original_frame_count: usize,
    pub mismatch: Option<FrameMismatch>,
}

impl FrameTimestamps {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// True when the movie must be truncated to match the edges
    pub fn truncates_movie(&self) -> bool {
        matches!(self.mismatch, Some(FrameMismatch::MissingEdges { .. }))
    }
}

/// Pair the exposure edges with the movie frames and produce one timestamp per frame.
///
/// Spurious trailing triggers (edges past `frame_count`) are ignored. When the camera ran
/// without triggers and there are fewer edges than frames, the frame count is reduced to the
/// number of edges and the mismatch is reported to the caller, who must cut the movie.
pub fn build_frame_timestamps(
    edges: &EdgeIndexSequence,
    clock: &SampleClock,
    frame_count: usize,
) -> Result<FrameTimestamps, SyncError> {
    let n_edges = edges.len();
    let mismatch = if n_edges > frame_count {
        spdlog::info!(
            "Found {} exposure edges for {} frames; ignoring {} trailing edges.",
            n_edges,
            frame_count,
            n_edges - frame_count
        );
        Some(FrameMismatch::ExtraEdges {
            edges: n_edges,
            kept: frame_count,
        })
    } else if n_edges < frame_count {
        spdlog::warn!(
            "Found only {} exposure edges for {} frames! The movie will be truncated to {} frames.",
            n_edges,
            frame_count,
            n_edges
        );
        Some(FrameMismatch::MissingEdges {
            frames: frame_count,
            kept: n_edges,
        })
    } else {
        None
    };

    let timestamps = edges
        .as_slice()
        .iter()
        .take(frame_count)
        .map(|edge| clock.time_of(*edge))
        .collect::<Result<Vec<f64>, SyncError>>()?;

    for (idx, pair) in timestamps.windows(2).enumerate() {
        if pair[1] < pair[0] {
            return Err(SyncError::NonMonotonic(idx + 1, pair[1], pair[0]));
        }
    }

    Ok(FrameTimestamps {
        timestamps,
        original_frame_count: frame_count,
        mismatch,
    })
}

/// Rate of a regularly sampled series, or None if the sampling is irregular.
///
/// Regular means every interval is within a relative tolerance of the first interval.
pub fn regular_series_rate(timestamps: &[f64]) -> Option<f64> {
    const REL_TOLERANCE: f64 = 1e-3;
    if timestamps.len() < 2 {
        return None;
    }
    let first_step = timestamps[1] - timestamps[0];
    if first_step <= 0.0 {
        return None;
    }
    let is_regular = timestamps
        .windows(2)
        .all(|w| ((w[1] - w[0]) - first_step).abs() <= first_step * REL_TOLERANCE);
    if is_regular {
        Some(1.0 / first_step)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spaced_edges(n: usize) -> EdgeIndexSequence {
        EdgeIndexSequence::try_from((0..n).map(|i| 5 + i * 100).collect::<Vec<usize>>()).unwrap()
    }

    fn clock() -> SampleClock {
        SampleClock::Uniform {
            rate: 2000.0,
            n_samples: 20_000,
        }
    }

    #[test]
    fn test_matching_counts() {
        let ts = build_frame_timestamps(&spaced_edges(100), &clock(), 100).unwrap();
        assert_eq!(ts.len(), 100);
        assert!(ts.mismatch.is_none());
        assert!((ts.timestamps[0] - 0.0025).abs() < 1e-12);
        assert!((ts.timestamps[1] - 0.0525).abs() < 1e-12);
        assert!(ts.timestamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_missing_edges_truncate() {
        let ts = build_frame_timestamps(&spaced_edges(98), &clock(), 100).unwrap();
        assert_eq!(ts.len(), 98);
        assert!(ts.truncates_movie());
        assert_eq!(
            ts.mismatch,
            Some(FrameMismatch::MissingEdges {
                frames: 100,
                kept: 98
            })
        );
    }

    #[test]
    fn test_extra_edges_dropped() {
        let ts = build_frame_timestamps(&spaced_edges(102), &clock(), 100).unwrap();
        assert_eq!(ts.len(), 100);
        assert!(!ts.truncates_movie());
        assert!((ts.timestamps[99] - 9905.0 / 2000.0).abs() < 1e-12);
    }

    #[test]
    fn test_recorded_clock() {
        let times: Vec<f64> = (0..1000).map(|i| 10.0 + i as f64 * 0.01).collect();
        let clock = SampleClock::Recorded { times };
        let edges = EdgeIndexSequence::try_from(vec![0, 10, 20]).unwrap();
        let ts = build_frame_timestamps(&edges, &clock, 3).unwrap();
        for (given, expected) in ts.timestamps.iter().zip([10.0, 10.1, 10.2]) {
            assert!((given - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_edge_out_of_range() {
        let edges = EdgeIndexSequence::try_from(vec![5, 30_000]).unwrap();
        assert!(build_frame_timestamps(&edges, &clock(), 2).is_err());
    }

    #[test]
    fn test_regular_rate() {
        let ts: Vec<f64> = (0..50).map(|i| i as f64 / 20.0).collect();
        let rate = regular_series_rate(&ts).unwrap();
        assert!((rate - 20.0).abs() < 1e-9);
        assert!(regular_series_rate(&[0.0, 0.1, 0.5]).is_none());
        assert!(regular_series_rate(&[1.0]).is_none());
    }

    #[test]
    fn test_index_lookup() {
        let c = clock();
        assert_eq!(c.first_index_at_or_after(0.0025), 5);
        assert_eq!(c.first_index_at_or_after(0.00251), 6);
        assert_eq!(c.first_index_at_or_after(100.0), 20_000);
    }
}
