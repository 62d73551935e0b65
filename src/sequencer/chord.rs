// Chord - A labeled interval on the timeline

use serde::{Deserialize, Serialize};

/// A chord label spanning `[start_time, start_time + duration)`.
/// An empty label is an unlabeled placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chord {
    pub label: String,
    pub start_time: f64,
    pub duration: f64,
}

impl Chord {
    pub fn new(label: impl Into<String>, start_time: f64, duration: f64) -> Self {
        Self {
            label: label.into(),
            start_time,
            duration,
        }
    }

    /// Unlabeled placeholder
    pub fn placeholder(start_time: f64, duration: f64) -> Self {
        Self::new(String::new(), start_time, duration)
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    pub fn is_placeholder(&self) -> bool {
        self.label.is_empty()
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time()
    }
}

/// Index of the chord sounding at `time` in a sorted, non-overlapping sequence
pub fn chord_at(chords: &[Chord], time: f64) -> Option<usize> {
    // First chord starting after `time`; the candidate is the one before it
    let after = chords.partition_point(|c| c.start_time <= time);
    let index = after.checked_sub(1)?;
    chords[index].contains(time).then_some(index)
}
