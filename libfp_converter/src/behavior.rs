use std::f64::consts::PI;
use std::fmt::Display;

use super::downsample::AlignedBehaviorTable;

/// Diameter of the styrofoam ball on the treadmill rig
pub const DEFAULT_BALL_DIAMETER_M: f64 = 0.2032;

pub const YAW_CHANNEL: &str = "ballYaw";
pub const ROLL_CHANNEL: &str = "ballRoll";
pub const PITCH_CHANNEL: &str = "ballPitch";

/// Convert ball yaw from m/s of surface travel to rad/s of rotation
pub fn angular_velocity(yaw: &[f64], ball_diameter_m: f64) -> Vec<f64> {
    yaw.iter()
        .map(|v| v / (PI * ball_diameter_m) * 2.0 * PI)
        .collect()
}

/// Ball roll and pitch as (frames x 2) rows, in m/s
pub fn planar_velocity(roll: &[f64], pitch: &[f64]) -> Vec<[f64; 2]> {
    roll.iter().zip(pitch.iter()).map(|(r, p)| [*r, *p]).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    Light,
    Tone,
    Lick,
    Reward,
}

impl EventType {
    /// The event recorded by a binary behavior channel, if any
    pub fn from_channel(name: &str) -> Option<Self> {
        match name {
            "stimulus_led" | "stimulus_led2" => Some(Self::Light),
            "stimulus_sound" => Some(Self::Tone),
            "lick" => Some(Self::Lick),
            "reward" => Some(Self::Reward),
            _ => None,
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light => write!(f, "Light"),
            Self::Tone => write!(f, "Tone"),
            Self::Lick => write!(f, "Lick"),
            Self::Reward => write!(f, "Reward"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventInterval {
    pub start_time: f64,
    pub stop_time: f64,
    pub event_type: EventType,
}

/// Sample indices of onsets (0 -> 1) and offsets (1 -> 0) of a 0/1 signal.
///
/// An offset before the first onset and an onset after the last offset are dropped so the
/// two lists pair up.
pub fn onsets_and_offsets(values: &[f64]) -> (Vec<usize>, Vec<usize>) {
    let mut onsets = Vec::new();
    let mut offsets = Vec::new();
    for (idx, pair) in values.windows(2).enumerate() {
        let (prev, next) = (pair[0].round() as i64, pair[1].round() as i64);
        match next - prev {
            1 => onsets.push(idx + 1),
            -1 => offsets.push(idx + 1),
            _ => (),
        }
    }
    if onsets.is_empty() {
        return (onsets, Vec::new());
    }
    if let (Some(first_off), Some(first_on)) = (offsets.first(), onsets.first()) {
        if first_off < first_on {
            offsets.remove(0);
        }
    }
    match offsets.last() {
        Some(last_off) => {
            if onsets.last().is_some_and(|on| on > last_off) {
                onsets.pop();
            }
        }
        None => onsets.clear(),
    }
    (onsets, offsets)
}

/// Every event interval in the frame-aligned binary channels, sorted by start time
pub fn event_intervals(table: &AlignedBehaviorTable, timestamps: &[f64]) -> Vec<EventInterval> {
    let mut events = Vec::new();
    for channel in table.channels() {
        let Some(event_type) = EventType::from_channel(&channel.name) else {
            continue;
        };
        let (onsets, offsets) = onsets_and_offsets(&channel.values);
        for (on, off) in onsets.iter().zip(offsets.iter()) {
            if let (Some(start_time), Some(stop_time)) = (timestamps.get(*on), timestamps.get(*off))
            {
                events.push(EventInterval {
                    start_time: *start_time,
                    stop_time: *stop_time,
                    event_type,
                });
            }
        }
    }
    // Stable, so events of one channel keep their order on ties
    events.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downsample::{AlignedChannel, ChannelKind};

    #[test]
    fn test_angular_velocity() {
        let rad = angular_velocity(&[0.0, 0.2032, -0.1016], DEFAULT_BALL_DIAMETER_M);
        assert!((rad[0]).abs() < 1e-12);
        assert!((rad[1] - 2.0).abs() < 1e-12);
        assert!((rad[2] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_onsets_and_offsets() {
        let (on, off) = onsets_and_offsets(&[0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(on, vec![1, 5]);
        assert_eq!(off, vec![3, 6]);

        // Starts high and ends high
        let (on, off) = onsets_and_offsets(&[1.0, 0.0, 1.0, 0.0, 1.0]);
        assert_eq!(on, vec![2]);
        assert_eq!(off, vec![3]);

        let (on, off) = onsets_and_offsets(&[0.0, 0.0, 1.0]);
        assert!(on.is_empty() && off.is_empty());
    }

    #[test]
    fn test_event_intervals_sorted() {
        let mut table = AlignedBehaviorTable::new(6);
        table.insert(AlignedChannel {
            name: String::from("reward"),
            kind: ChannelKind::Binary,
            values: vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
        });
        table.insert(AlignedChannel {
            name: String::from("lick"),
            kind: ChannelKind::Binary,
            values: vec![1.0, 0.0, 0.0, 1.0, 1.0, 0.0],
        });
        table.insert(AlignedChannel {
            name: String::from("ballYaw"),
            kind: ChannelKind::Continuous,
            values: vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0],
        });
        let ts = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5];
        let events = event_intervals(&table, &ts);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::Reward);
        assert_eq!((events[0].start_time, events[0].stop_time), (0.1, 0.2));
        assert_eq!(events[1].event_type, EventType::Lick);
        assert_eq!((events[1].start_time, events[1].stop_time), (0.3, 0.5));
    }
}
