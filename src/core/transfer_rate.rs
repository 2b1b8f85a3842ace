use std::{fmt::Display, time::Duration};

use size::Size;

/// Amount of data moved over a period of time
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct TransferRate(pub Size, pub Duration);

impl TransferRate {
    pub const EMPTY: Self = Self(Size::from_const(0), Duration::ZERO);

    pub fn new(bytes: u64, duration: Duration) -> Self {
        Self(Size::from_bytes(bytes), duration)
    }

    /// Bytes per second, zero when no time has elapsed yet
    pub fn bytes_per_second(&self) -> u64 {
        let seconds = self.1.as_secs_f64();
        if seconds == 0.0 {
            return 0;
        }
        ((self.0.bytes() as f64) / seconds) as u64
    }

    /// Time needed to move `remaining` bytes at this rate
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        match self.bytes_per_second() {
            0 => None,
            rate => Some(Duration::from_secs(remaining / rate)),
        }
    }
}

impl Display for TransferRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/s", Size::from_bytes(self.bytes_per_second()))
    }
}
