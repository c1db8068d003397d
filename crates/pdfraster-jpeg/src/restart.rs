//! Restart-marker tracking.
//!
//! A DRI segment partitions the entropy stream into runs of `interval` MCUs
//! separated by RST0..RST7 markers in cyclic order. At each boundary the bit
//! reader byte-aligns, the marker is consumed, and every component's DC
//! predictor resets. A marker out of sequence is logged and tolerated;
//! keeping the decode alive recovers more of a damaged image than aborting.

use log::warn;

use crate::bitread::BitReader;
use crate::marker::Marker;

/// Tracks progress towards the next expected restart marker.
#[derive(Debug, Clone)]
pub struct RestartTracker {
    interval: u32,
    remaining: u32,
    expected: u8,
}

impl RestartTracker {
    /// A tracker for one scan; `interval == 0` disables restarts.
    pub fn new(interval: u16) -> Self {
        RestartTracker {
            interval: u32::from(interval),
            remaining: u32::from(interval),
            expected: 0,
        }
    }

    /// Whether restart markers are expected at all.
    #[inline]
    pub fn active(&self) -> bool {
        self.interval != 0
    }

    /// Count one decoded MCU; returns true when a restart marker is due
    /// before the next one.
    #[inline]
    pub fn count_mcu(&mut self) -> bool {
        if self.interval == 0 {
            return false;
        }
        self.remaining -= 1;
        self.remaining == 0
    }

    /// Consume the restart marker at the current byte boundary and reset
    /// decoder state: DC predictors to zero, the counter to a full interval,
    /// the expected marker to the next in the cycle.
    pub fn process_restart(&mut self, bits: &mut BitReader<'_>, predictors: &mut [i32]) {
        match bits.try_read_marker() {
            Some(Marker::RST(n)) => {
                if n != self.expected {
                    warn!("restart marker RST{n} where RST{} was expected", self.expected);
                }
            }
            Some(other) => {
                warn!("marker {other:?} where RST{} was expected", self.expected);
            }
            None => {
                warn!("no restart marker at MCU boundary (RST{} expected)", self.expected);
            }
        }
        predictors.iter_mut().for_each(|p| *p = 0);
        self.remaining = self.interval;
        self.expected = (self.expected + 1) & 7;
    }
}
