// Timeline editor - Collision-aware edits of the chord sequence
//
// Every operation is copy-on-write: it takes the current sequence and returns a
// new one, never touching the snapshot the event player is reading. Input and
// output are sorted by start time, pairwise non-overlapping, and every chord
// lasts at least `min_duration`. A request that can't satisfy this is an
// invalid edit: the input comes back unchanged. Drag gestures produce plenty of
// those and they must not abort the interaction, so they are not errors.

use std::collections::BTreeSet;

use super::chord::Chord;
use crate::config::TransportConfig;

/// Floor applied to every chord duration (seconds)
pub const MIN_CHORD_DURATION: f64 = 0.1;

/// Duration of the first chord inserted into an empty timeline
pub const DEFAULT_CHORD_DURATION: f64 = 2.0;

const EPSILON: f64 = 1e-9;

/// Where a new chord goes relative to its anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertSide {
    Before,
    After,
}

/// Which edge of a chord to extend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Start,
    End,
}

/// Stateless chord-sequence editor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineEditor {
    min_duration: f64,
    default_duration: f64,
}

impl TimelineEditor {
    pub fn new(min_duration: f64, default_duration: f64) -> Self {
        Self {
            min_duration,
            default_duration: default_duration.max(min_duration),
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.min_chord_duration, config.default_chord_duration)
    }

    pub fn min_duration(&self) -> f64 {
        self.min_duration
    }

    /// Move and/or resize chord `index`.
    ///
    /// The left neighbor is shrunk, then shifted earlier if shrinking is not
    /// enough. The right neighbor is pushed later and shrunk by the overlap.
    /// Edits never cascade more than one hop: if the right neighbor would have
    /// to intrude on the chord after it, nothing changes.
    pub fn apply_move(
        &self,
        chords: &[Chord],
        index: usize,
        new_start: f64,
        new_duration: f64,
    ) -> Vec<Chord> {
        if index >= chords.len() || !new_start.is_finite() || !new_duration.is_finite() {
            return self.reject(chords, "move target out of range");
        }

        let min = self.min_duration;
        let start = new_start.max(0.0);
        let duration = new_duration.max(min);
        let end = start + duration;

        // Wall: the neighbor's neighbor never moves
        if let (Some(next), Some(wall)) = (chords.get(index + 1), chords.get(index + 2)) {
            if end > next.start_time + EPSILON && end + next.duration > wall.start_time + EPSILON {
                return self.reject(chords, "neighbor would cross the next chord");
            }
        }

        let mut result = chords.to_vec();
        result[index].start_time = start;
        result[index].duration = duration;

        if index > 0 {
            let floor = if index >= 2 {
                result[index - 2].end_time()
            } else {
                0.0
            };
            let prev = &mut result[index - 1];
            let overlap = prev.end_time() - start;
            if overlap > EPSILON {
                let shrunk = prev.duration - overlap;
                if shrunk >= min {
                    prev.duration = shrunk;
                } else {
                    prev.duration = min;
                    prev.start_time = (start - min).max(floor);
                }
            }
        }

        if let Some(next) = result.get_mut(index + 1) {
            let overlap = end - next.start_time;
            if overlap > EPSILON {
                next.duration = (next.duration - overlap).max(min);
                next.start_time = end;
            }
        }

        let lo = index.saturating_sub(2);
        let hi = (index + 3).min(result.len());
        if !self.validate(&result[lo..hi]) {
            return self.reject(chords, "move leaves an unresolved overlap");
        }
        result
    }

    /// Insert an unlabeled chord next to chord `index`, using the anchor's
    /// duration. Every chord after the insertion point shifts forward by
    /// that duration.
    pub fn insert_at_index(&self, chords: &[Chord], index: usize, side: InsertSide) -> Vec<Chord> {
        if chords.is_empty() {
            return vec![Chord::placeholder(0.0, self.default_duration)];
        }
        let Some(anchor) = chords.get(index) else {
            return self.reject(chords, "insert anchor out of range");
        };

        let duration = anchor.duration.max(self.min_duration);
        let (position, start) = match side {
            InsertSide::Before => (index, anchor.start_time),
            InsertSide::After => (index + 1, anchor.end_time()),
        };

        let mut result = Vec::with_capacity(chords.len() + 1);
        result.extend_from_slice(&chords[..position]);
        result.push(Chord::placeholder(start, duration));
        result.extend(chords[position..].iter().map(|chord| Chord {
            start_time: chord.start_time + duration,
            ..chord.clone()
        }));
        result
    }

    /// Remove chord `index`. Pair with `Selection::after_delete`.
    pub fn delete_at(&self, chords: &[Chord], index: usize) -> Vec<Chord> {
        if index >= chords.len() {
            return self.reject(chords, "delete index out of range");
        }
        let mut result = chords.to_vec();
        result.remove(index);
        result
    }

    /// Grow chord `index` until it meets its neighbor's edge. At the ends of
    /// the sequence the boundary is 0 (start) or `timeline_end` (end, if known).
    pub fn extend_to_boundary(
        &self,
        chords: &[Chord],
        index: usize,
        boundary: Boundary,
        timeline_end: Option<f64>,
    ) -> Vec<Chord> {
        let Some(chord) = chords.get(index) else {
            return self.reject(chords, "extend index out of range");
        };

        let (start, end) = match boundary {
            Boundary::Start => {
                let edge = if index > 0 {
                    chords[index - 1].end_time()
                } else {
                    0.0
                };
                (edge, chord.end_time())
            }
            Boundary::End => {
                let edge = match (chords.get(index + 1), timeline_end) {
                    (Some(next), _) => next.start_time,
                    (None, Some(end)) => end,
                    (None, None) => return chords.to_vec(),
                };
                (chord.start_time, edge)
            }
        };

        if end - start < self.min_duration - EPSILON {
            return self.reject(chords, "extension below minimum duration");
        }

        let mut result = chords.to_vec();
        result[index].start_time = start;
        result[index].duration = end - start;
        result
    }

    /// Rename chord `index`
    pub fn set_label(&self, chords: &[Chord], index: usize, label: impl Into<String>) -> Vec<Chord> {
        let mut result = chords.to_vec();
        match result.get_mut(index) {
            Some(chord) => chord.label = label.into(),
            None => return self.reject(chords, "label index out of range"),
        }
        result
    }

    /// True if the sequence is sorted, non-overlapping and respects the
    /// minimum duration
    pub fn validate(&self, chords: &[Chord]) -> bool {
        let durations_ok = chords
            .iter()
            .all(|c| c.start_time >= -EPSILON && c.duration >= self.min_duration - EPSILON);
        let ordering_ok = chords
            .windows(2)
            .all(|pair| pair[0].end_time() <= pair[1].start_time + EPSILON);
        durations_ok && ordering_ok
    }

    fn reject(&self, chords: &[Chord], reason: &str) -> Vec<Chord> {
        tracing::debug!("Invalid chord edit ignored: {}", reason);
        chords.to_vec()
    }
}

impl Default for TimelineEditor {
    fn default() -> Self {
        Self::new(MIN_CHORD_DURATION, DEFAULT_CHORD_DURATION)
    }
}

/// Selection over the chord sequence.
///
/// `active_index` is only set while exactly one chord is selected, and then
/// equals that chord's index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    active_index: Option<usize>,
    selected: BTreeSet<usize>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active_index
    }

    /// Selected indices in ascending order
    pub fn selected_indices(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    /// Select a single chord and make it active
    pub fn select_only(&mut self, index: usize) {
        self.selected.clear();
        self.selected.insert(index);
        self.active_index = Some(index);
    }

    /// Add or remove `index` from a multi-selection
    pub fn toggle(&mut self, index: usize) {
        if !self.selected.remove(&index) {
            self.selected.insert(index);
        }
        self.active_index = match self.selected.len() {
            1 => self.selected.first().copied(),
            _ => None,
        };
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.active_index = None;
    }

    /// Renumber after chord `deleted` was removed: higher indices shift down,
    /// and the deleted chord drops out of the selection.
    pub fn after_delete(&mut self, deleted: usize) {
        self.selected = self
            .selected
            .iter()
            .filter(|&&i| i != deleted)
            .map(|&i| if i > deleted { i - 1 } else { i })
            .collect();

        self.active_index = match self.active_index {
            Some(active) if active == deleted => None,
            Some(active) if active > deleted => Some(active - 1),
            other => other,
        };
        self.enforce_invariant();
    }

    /// Renumber after a chord was inserted at `inserted`
    pub fn after_insert(&mut self, inserted: usize) {
        self.selected = self
            .selected
            .iter()
            .map(|&i| if i >= inserted { i + 1 } else { i })
            .collect();
        self.active_index = self
            .active_index
            .map(|i| if i >= inserted { i + 1 } else { i });
        self.enforce_invariant();
    }

    fn enforce_invariant(&mut self) {
        if self.selected.len() != 1 {
            self.active_index = None;
        }
    }
}
