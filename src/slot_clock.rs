//! Maps a gateway's [`SlotCounter`] values onto wall-clock time.
//!
//! Grounded on `pytap/core/state.py::SlotClock`: a 48-entry ring (4 epochs
//! x 12 indices per epoch, each spanning 1000 slots / ~5s) of reference
//! times, backfilled with nominal 5ms-per-slot timing as new observations
//! arrive.

use crate::types::{SLOTS_PER_EPOCH, SlotCounter};
use chrono::{DateTime, Duration, Utc};

const SLOTS_PER_INDEX: u32 = 1000;
const NUM_INDICES: usize = 48;
const NOMINAL_MS_PER_SLOT: f64 = 5.0;

fn index_and_offset(sc: SlotCounter) -> (usize, Duration) {
    let absolute = sc.epoch as u32 * SLOTS_PER_EPOCH + sc.slot_number as u32;
    let index = (absolute / SLOTS_PER_INDEX) as usize;
    let offset_ms = (NOMINAL_MS_PER_SLOT * (absolute % SLOTS_PER_INDEX) as f64) as i64;
    (index, Duration::milliseconds(offset_ms))
}

/// Per-gateway slot-to-wall-clock mapping.
#[derive(Debug, Clone)]
pub struct SlotClock {
    times: [Option<DateTime<Utc>>; NUM_INDICES],
    last_index: usize,
    last_time: DateTime<Utc>,
}

impl SlotClock {
    pub fn new(sc: SlotCounter, time: DateTime<Utc>) -> Self {
        let mut clock = SlotClock {
            times: [None; NUM_INDICES],
            last_index: 0,
            last_time: time,
        };
        clock.initialize(sc, time);
        clock
    }

    fn initialize(&mut self, sc: SlotCounter, time: DateTime<Utc>) {
        let (index, offset) = index_and_offset(sc);
        let base = time - offset;
        self.times[index] = Some(base);
        for i in 1..NUM_INDICES {
            let prev = (index + NUM_INDICES - i) % NUM_INDICES;
            self.times[prev] = Some(base - Duration::milliseconds(5000 * i as i64));
        }
        self.last_index = index;
        self.last_time = time;
    }

    /// Records a new observed `(slot, wall-time)` pair.
    ///
    /// A `time` earlier than the last observed time indicates the capture
    /// clock regressed (e.g. host restart); the ring is reinitialized from
    /// scratch rather than attempting to reconcile the inconsistency.
    pub fn set(&mut self, sc: SlotCounter, time: DateTime<Utc>) {
        if time < self.last_time {
            self.initialize(sc, time);
            return;
        }
        let (index, offset) = index_and_offset(sc);
        self.times[index] = Some(time - offset);
        if index != self.last_index {
            let steps = (index + NUM_INDICES - self.last_index) % NUM_INDICES;
            let anchor = self.times[self.last_index];
            if let Some(anchor) = anchor {
                for i in 1..steps {
                    let fill_idx = (self.last_index + i) % NUM_INDICES;
                    self.times[fill_idx] = Some(anchor + Duration::milliseconds(5000 * i as i64));
                }
            }
        }
        self.last_index = index;
        self.last_time = time;
    }

    /// Renders `sc` as wall-clock time. Falls back to the last observed
    /// time if that slot's reference index was never populated.
    pub fn get(&self, sc: SlotCounter) -> DateTime<Utc> {
        let (index, offset) = index_and_offset(sc);
        match self.times[index] {
            Some(base) => base + offset,
            None => self.last_time,
        }
    }
}
