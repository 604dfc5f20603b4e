use serde::{Deserialize, Serialize};

use super::error::SyncError;
use super::timestamps::SampleClock;

/// How a behavioral channel is reduced over a frame window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Analog values, reduced by the arithmetic mean
    Continuous,
    /// 0/1 flags, reduced by majority vote (mean rounded to the nearest integer)
    Binary,
}

/// A behavioral channel to pull from the telemetry file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorChannel {
    pub name: String,
    pub kind: ChannelKind,
}

impl BehaviorChannel {
    pub fn new(name: &str, kind: ChannelKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// One behavioral channel resampled onto the frame grid
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedChannel {
    pub name: String,
    pub kind: ChannelKind,
    pub values: Vec<f64>,
}

/// Behavioral channels aligned to one frame timestamp sequence, in configured order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedBehaviorTable {
    channels: Vec<AlignedChannel>,
    n_frames: usize,
}

impl AlignedBehaviorTable {
    pub fn new(n_frames: usize) -> Self {
        Self {
            channels: Vec::new(),
            n_frames,
        }
    }

    pub fn insert(&mut self, channel: AlignedChannel) {
        match self.channels.iter_mut().find(|c| c.name == channel.name) {
            Some(existing) => *existing = channel,
            None => self.channels.push(channel),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AlignedChannel> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn channels(&self) -> &[AlignedChannel] {
        &self.channels
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Keep only the first `n_frames` values of every channel
    pub fn truncate(&mut self, n_frames: usize) {
        for channel in self.channels.iter_mut() {
            channel.values.truncate(n_frames);
        }
        self.n_frames = self.n_frames.min(n_frames);
    }
}

/// Result of reducing a channel, with the number of windows that held no samples
#[derive(Debug, Clone, PartialEq)]
pub struct Downsampled {
    pub values: Vec<f64>,
    pub empty_windows: usize,
}

fn reduce(window: &[f64], kind: ChannelKind) -> f64 {
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    match kind {
        ChannelKind::Continuous => mean,
        ChannelKind::Binary => mean.round(),
    }
}

/// Reduce a high-rate channel to one value per frame.
///
/// Frame `i` owns the samples from its own timestamp up to (not including) the next frame's
/// timestamp. The first window is extended back to the first sample of the session and the
/// last window runs through the final sample. A window with no samples repeats the value of
/// the window before it; a leading empty window takes the sample at its boundary.
pub fn downsample(
    name: &str,
    samples: &[f64],
    kind: ChannelKind,
    clock: &SampleClock,
    frame_timestamps: &[f64],
) -> Result<Downsampled, SyncError> {
    if samples.is_empty() {
        return Err(SyncError::EmptyChannel(name.to_string()));
    }
    let n_samples = samples.len();
    let n_frames = frame_timestamps.len();

    let mut boundaries = Vec::with_capacity(n_frames + 1);
    boundaries.push(0);
    for ts in frame_timestamps.iter().skip(1) {
        let idx = clock.first_index_at_or_after(*ts).min(n_samples);
        // Clamp so boundaries never walk backwards
        let prev = *boundaries.last().unwrap_or(&0);
        boundaries.push(idx.max(prev));
    }
    boundaries.push(n_samples);

    let mut values = Vec::with_capacity(n_frames);
    let mut empty_windows = 0;
    for bounds in boundaries.windows(2).take(n_frames) {
        let (start, stop) = (bounds[0], bounds[1]);
        if start < stop {
            values.push(reduce(&samples[start..stop], kind));
        } else {
            empty_windows += 1;
            let value = match values.last() {
                Some(prev) => *prev,
                None => reduce(&samples[start.min(n_samples - 1)..=start.min(n_samples - 1)], kind),
            };
            values.push(value);
        }
    }

    if empty_windows > 0 {
        spdlog::warn!(
            "Behavior channel {} had {} empty frame windows; previous values were reused.",
            name,
            empty_windows
        );
    }

    Ok(Downsampled {
        values,
        empty_windows,
    })
}
