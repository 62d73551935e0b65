// Scheduler - One-shot cues keyed to virtual time
//
// Deadlines are converted to hardware time with the anchor and rate that are
// current when the cue is registered. Any rebase (seek, rate change, pause,
// stop) bumps the scheduling epoch, and cues from an older epoch are dropped
// at drain time, so a stale deadline can never fire after a transition.

use super::clock::ClockSnapshot;

/// Handle returned by the scheduler, used for single cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleHandle(u64);

#[derive(Debug)]
struct ScheduledCallback<T> {
    id: u64,
    target_virtual_time: f64,
    deadline: f64,
    epoch: u64,
    payload: T,
}

/// A cue that came due
#[derive(Debug, Clone, PartialEq)]
pub struct Due<T> {
    pub payload: T,
    pub target_virtual_time: f64,
    /// Hardware time the cue was meant to fire at
    pub deadline: f64,
}

/// Pending-cue set for one timeline
#[derive(Debug)]
pub struct Scheduler<T> {
    pending: Vec<ScheduledCallback<T>>,
    anchor: ClockSnapshot,
    epoch: u64,
    next_id: u64,
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            anchor: ClockSnapshot::stopped(),
            epoch: 0,
            next_id: 0,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn anchor(&self) -> ClockSnapshot {
        self.anchor
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Register `payload` for `virtual_time`.
    ///
    /// Returns `None` when the clock isn't playing or the target is already
    /// behind the anchor: late cues are skipped, never fired retroactively.
    pub fn schedule_at(&mut self, virtual_time: f64, payload: T) -> Option<ScheduleHandle> {
        if !virtual_time.is_finite() || virtual_time < self.anchor.anchor_virtual_time {
            return None;
        }
        let deadline = self.anchor.hardware_time_for(virtual_time)?;
        Some(self.push(virtual_time, deadline, payload))
    }

    /// Register `payload` on a hardware timer: `delay` seconds after
    /// `from_hardware`. Used for note-offs, whose length is fixed by the rate
    /// active when the note started.
    pub fn schedule_after(&mut self, from_hardware: f64, delay: f64, payload: T) -> ScheduleHandle {
        let delay = if delay.is_finite() { delay.max(0.0) } else { 0.0 };
        let deadline = from_hardware + delay;
        let target = self.anchor.position_at(deadline);
        self.push(target, deadline, payload)
    }

    fn push(&mut self, target_virtual_time: f64, deadline: f64, payload: T) -> ScheduleHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push(ScheduledCallback {
            id,
            target_virtual_time,
            deadline,
            epoch: self.epoch,
            payload,
        });
        ScheduleHandle(id)
    }

    /// Cancel one cue. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: ScheduleHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|cb| cb.id != handle.0);
        self.pending.len() != before
    }

    /// Cancel everything and start a new epoch
    pub fn cancel_all(&mut self) {
        self.pending.clear();
        self.epoch += 1;
    }

    /// Cancel everything and adopt a new clock anchor. Owners reschedule their
    /// still-future cues afterwards.
    pub fn rebase(&mut self, snapshot: ClockSnapshot) {
        self.cancel_all();
        self.anchor = snapshot;
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<f64> {
        self.pending
            .iter()
            .filter(|cb| cb.epoch == self.epoch)
            .map(|cb| cb.deadline)
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Remove and return every cue due at hardware time `now`, ordered by
    /// deadline then registration order
    pub fn drain_due(&mut self, now: f64) -> Vec<Due<T>> {
        let epoch = self.epoch;
        let mut due = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            let cb = &self.pending[i];
            if cb.epoch != epoch {
                self.pending.swap_remove(i);
            } else if cb.deadline <= now {
                due.push(self.pending.swap_remove(i));
            } else {
                i += 1;
            }
        }

        due.sort_by(|a, b| a.deadline.total_cmp(&b.deadline).then(a.id.cmp(&b.id)));
        due.into_iter()
            .map(|cb| Due {
                payload: cb.payload,
                target_virtual_time: cb.target_virtual_time,
                deadline: cb.deadline,
            })
            .collect()
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
