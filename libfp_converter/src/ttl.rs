use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::error::TtlError;

/// Samples at or above this value read as a high TTL level
const TTL_HIGH_THRESHOLD: f64 = 0.5;

/// The digital inputs of the behavioral acquisition board.
///
/// Which input carries the camera exposure pulses of a given imaging stream is
/// declared per stream in the session manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TtlStream {
    #[serde(rename = "ttlIn1")]
    TtlIn1,
    #[serde(rename = "ttlIn2")]
    TtlIn2,
    #[serde(rename = "ttlIn3")]
    TtlIn3,
    #[serde(rename = "ttlIn4")]
    TtlIn4,
}

impl TtlStream {
    /// The variable name of this stream in the telemetry file
    pub fn variable_name(&self) -> &'static str {
        match self {
            Self::TtlIn1 => "ttlIn1",
            Self::TtlIn2 => "ttlIn2",
            Self::TtlIn3 => "ttlIn3",
            Self::TtlIn4 => "ttlIn4",
        }
    }
}

impl Display for TtlStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.variable_name())
    }
}

/// A named binary sample sequence recorded at a fixed rate.
#[derive(Debug, Clone, PartialEq)]
pub struct TtlChannel {
    pub name: String,
    pub samples: BitVec,
    pub sample_rate: f64,
}

impl TtlChannel {
    pub fn new(name: &str, samples: BitVec, sample_rate: f64) -> Result<Self, TtlError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(TtlError::BadSampleRate(name.to_string(), sample_rate));
        }
        Ok(Self {
            name: name.to_string(),
            samples,
            sample_rate,
        })
    }

    /// Binarize raw numeric samples (as exported by the acquisition software)
    pub fn from_levels(name: &str, levels: &[f64], sample_rate: f64) -> Result<Self, TtlError> {
        let samples: BitVec = levels.iter().map(|v| *v >= TTL_HIGH_THRESHOLD).collect();
        Self::new(name, samples, sample_rate)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Strictly increasing sample indices of the 0 -> 1 transitions of a TtlChannel
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EdgeIndexSequence {
    indices: Vec<usize>,
}

impl EdgeIndexSequence {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }
}

impl TryFrom<Vec<usize>> for EdgeIndexSequence {
    type Error = Vec<usize>;

    /// Accepts only strictly increasing index lists; hands the input back otherwise
    fn try_from(indices: Vec<usize>) -> Result<Self, Self::Error> {
        if indices.windows(2).all(|w| w[0] < w[1]) {
            Ok(Self { indices })
        } else {
            Err(indices)
        }
    }
}

/// Find every rising edge of the channel.
///
/// An edge is an index `i` where `samples[i - 1]` is low and `samples[i]` is high. The
/// first sample is never an edge, and no debouncing is done: a single-sample glitch
/// counts like any other pulse.
pub fn extract_rising_edges(channel: &TtlChannel) -> EdgeIndexSequence {
    let samples = channel.samples.as_bitslice();
    let indices = samples
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| !pair[0] && pair[1])
        .map(|(idx, _)| idx + 1)
        .collect();
    EdgeIndexSequence { indices }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(levels: &[u8]) -> TtlChannel {
        let levels: Vec<f64> = levels.iter().map(|v| *v as f64).collect();
        TtlChannel::from_levels("ttlIn1", &levels, 2000.0).unwrap()
    }

    fn brute_force_count(levels: &[u8]) -> usize {
        let mut count = 0;
        for i in 1..levels.len() {
            if levels[i - 1] == 0 && levels[i] == 1 {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn test_all_zero_has_no_edges() {
        assert!(extract_rising_edges(&channel(&[0; 64])).is_empty());
        assert!(extract_rising_edges(&channel(&[])).is_empty());
    }

    #[test]
    fn test_first_sample_is_never_an_edge() {
        let edges = extract_rising_edges(&channel(&[1, 1, 0, 1, 0]));
        assert_eq!(edges.as_slice(), &[3]);
    }

    #[test]
    fn test_glitches_count() {
        let edges = extract_rising_edges(&channel(&[0, 1, 0, 0, 1, 1, 0, 1]));
        assert_eq!(edges.as_slice(), &[1, 4, 7]);
    }

    #[test]
    fn test_matches_brute_force() {
        // Deterministic pseudo random pattern
        let mut state: u32 = 0x2545_f491;
        let levels: Vec<u8> = (0..5000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state % 3 == 0) as u8
            })
            .collect();
        let edges = extract_rising_edges(&channel(&levels));
        assert_eq!(edges.len(), brute_force_count(&levels));
        assert!(edges.as_slice().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_bad_sample_rate() {
        assert!(TtlChannel::from_levels("ttlIn2", &[0.0, 1.0], 0.0).is_err());
    }

    #[test]
    fn test_edge_sequence_must_increase() {
        assert!(EdgeIndexSequence::try_from(vec![1, 5, 9]).is_ok());
        assert!(EdgeIndexSequence::try_from(vec![1, 5, 5]).is_err());
    }
}
