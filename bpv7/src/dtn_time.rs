//! DTN time, counted in milliseconds since 2000-01-01T00:00:00Z.

use std::time::{SystemTime, UNIX_EPOCH};

/// Offset of the DTN epoch from the Unix epoch, in milliseconds.
pub const DTN_EPOCH_OFFSET_MS: u64 = 946_684_800_000;

/// A point in DTN time. The zero value is reserved to mean "the creating
/// node has no synchronized clock" (RFC 9171 §4.2.6).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DtnTime(u64);

impl DtnTime {
    pub const ZERO: DtnTime = DtnTime(0);

    pub fn new(millisecs: u64) -> Self {
        Self(millisecs)
    }

    pub fn millisecs(self) -> u64 {
        self.0
    }

    /// True when this is the "no synchronized clock" sentinel.
    pub fn is_unset(self) -> bool {
        self.0 == 0
    }

    /// The current DTN time, from the system clock.
    pub fn now() -> Self {
        Self(local_millis().saturating_sub(DTN_EPOCH_OFFSET_MS))
    }
}

impl From<DtnTime> for u64 {
    fn from(value: DtnTime) -> Self {
        value.0
    }
}

impl From<u64> for DtnTime {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Node-local wall-clock milliseconds (Unix epoch). Used for `received_at`
/// stamps and peer ages, never on the wire.
pub fn local_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
