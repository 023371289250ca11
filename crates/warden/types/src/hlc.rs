use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bits reserved for the logical counter inside the packed clock word.
const LOGICAL_BITS: u32 = 16;
const LOGICAL_MASK: u64 = (1 << LOGICAL_BITS) - 1;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Hybrid logical clock timestamp.
///
/// Totally ordered: physical → logical. The physical part tracks wall-clock
/// milliseconds; the logical part disambiguates events inside one millisecond
/// and absorbs backwards wall-clock steps.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct HlcTimestamp {
    pub physical_ms: u64,
    pub logical: u32,
}

impl HlcTimestamp {
    pub const fn new(physical_ms: u64, logical: u32) -> Self {
        Self {
            physical_ms,
            logical,
        }
    }

    /// Wall-clock view of the physical component.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(i64::try_from(self.physical_ms).ok()?)
    }

    fn pack(&self) -> u64 {
        (self.physical_ms << LOGICAL_BITS) | (u64::from(self.logical) & LOGICAL_MASK)
    }

    fn unpack(word: u64) -> Self {
        Self {
            physical_ms: word >> LOGICAL_BITS,
            logical: (word & LOGICAL_MASK) as u32,
        }
    }
}

impl fmt::Display for HlcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.physical_ms, self.logical)
    }
}

/// Single-node hybrid logical clock.
///
/// Guarantees every call to [`now`](Self::now) returns a timestamp strictly
/// greater than any previously returned or observed one, even when the wall
/// clock jumps backwards. Lock-free: state is one packed `AtomicU64`
/// (48 bits physical, 16 bits logical) advanced with a CAS loop.
pub struct HybridLogicalClock {
    state: AtomicU64,
}

impl HybridLogicalClock {
    pub fn new() -> Self {
        Self {
            state: AtomicU64::new(HlcTimestamp::new(now_ms(), 0).pack()),
        }
    }

    /// Generate the next timestamp.
    pub fn now(&self) -> HlcTimestamp {
        loop {
            let wall = now_ms();
            let prev_word = self.state.load(Ordering::Acquire);
            let prev = HlcTimestamp::unpack(prev_word);

            let next = if wall > prev.physical_ms {
                HlcTimestamp::new(wall, 0)
            } else if u64::from(prev.logical) < LOGICAL_MASK {
                HlcTimestamp::new(prev.physical_ms, prev.logical + 1)
            } else {
                // Logical counter exhausted inside one millisecond: borrow the next one.
                HlcTimestamp::new(prev.physical_ms + 1, 0)
            };

            if self
                .state
                .compare_exchange(prev_word, next.pack(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return next;
            }
        }
    }

    /// Advance the clock so that subsequent timestamps sort after `ts`.
    ///
    /// Returns how far `ts` is ahead of the local wall clock in milliseconds
    /// (0 when it is not ahead), so callers can flag clock skew.
    pub fn observe(&self, ts: HlcTimestamp) -> u64 {
        let target = ts.pack();
        loop {
            let prev_word = self.state.load(Ordering::Acquire);
            if prev_word >= target {
                break;
            }
            if self
                .state
                .compare_exchange(prev_word, target, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        ts.physical_ms.saturating_sub(now_ms())
    }

    /// Last timestamp handed out or observed.
    pub fn last(&self) -> HlcTimestamp {
        HlcTimestamp::unpack(self.state.load(Ordering::Acquire))
    }
}

impl Default for HybridLogicalClock {
    fn default() -> Self {
        Self::new()
    }
}
