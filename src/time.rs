//! Monotonic time, modeled the way the teacher's `phy`/`iface` code expects
//! it: milliseconds since an arbitrary epoch, monotonically increasing.

use core::fmt;
use core::ops;

/// A point in monotonic time.
///
/// `Instant` values can only be compared to other `Instant` values obtained
/// from the same clock. No guarantee is made about the zero point.
#[derive(Debug, Default, Hash, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
pub struct Instant {
    micros: i64,
}

impl Instant {
    pub const ZERO: Instant = Instant::from_micros_const(0);

    pub fn from_micros<T: Into<i64>>(micros: T) -> Instant {
        Instant {
            micros: micros.into(),
        }
    }

    pub fn from_millis<T: Into<i64>>(millis: T) -> Instant {
        Instant {
            micros: millis.into() * 1000,
        }
    }

    pub fn from_secs<T: Into<i64>>(secs: T) -> Instant {
        Instant {
            micros: secs.into() * 1_000_000,
        }
    }

    pub const fn from_micros_const(micros: i64) -> Instant {
        Instant { micros }
    }

    pub const fn from_millis_const(millis: i64) -> Instant {
        Instant {
            micros: millis * 1000,
        }
    }

    /// Returns the current monotonic time, sourced from the OS steady clock.
    ///
    /// Ingress/timer callbacks never call this directly; a `CoreContext` reads
    /// it once per poll batch and threads the same `Instant` through the whole
    /// batch so ordering within a batch stays reproducible in tests.
    pub fn now() -> Instant {
        use std::time::SystemTime;
        let d = SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Instant::from_micros(d.as_micros() as i64)
    }

    pub const fn total_micros(&self) -> i64 {
        self.micros
    }

    pub const fn millis(&self) -> i64 {
        self.micros / 1000
    }

    pub const fn secs(&self) -> i64 {
        self.micros / 1_000_000
    }

    pub fn checked_duration_since(&self, rhs: Instant) -> Option<Duration> {
        if self.micros < rhs.micros {
            None
        } else {
            Some(Duration::from_micros((self.micros - rhs.micros) as u64))
        }
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:06}s", self.secs(), self.micros % 1_000_000)
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;
    fn add(self, rhs: Duration) -> Instant {
        Instant::from_micros(self.micros + rhs.total_micros() as i64)
    }
}

impl ops::Sub<Duration> for Instant {
    type Output = Instant;
    fn sub(self, rhs: Duration) -> Instant {
        Instant::from_micros(self.micros - rhs.total_micros() as i64)
    }
}

impl ops::Sub<Instant> for Instant {
    type Output = Duration;
    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_micros((self.micros - rhs.micros).unsigned_abs())
    }
}

/// A length of time, microsecond-precision internally, millisecond-precision
/// at the RFC 6298 timer surface (spec.md §9 Open Questions: "ms externally,
/// µs internally for RTT").
#[derive(Debug, Default, Hash, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
pub struct Duration {
    micros: u64,
}

impl Duration {
    pub const ZERO: Duration = Duration { micros: 0 };

    pub const fn from_micros(micros: u64) -> Duration {
        Duration { micros }
    }

    pub const fn from_millis(millis: u64) -> Duration {
        Duration {
            micros: millis * 1000,
        }
    }

    pub const fn from_secs(secs: u64) -> Duration {
        Duration {
            micros: secs * 1_000_000,
        }
    }

    pub const fn total_micros(&self) -> u64 {
        self.micros
    }

    pub const fn total_millis(&self) -> u64 {
        self.micros / 1000
    }

    pub const fn secs(&self) -> u64 {
        self.micros / 1_000_000
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:06}s", self.secs(), self.micros % 1_000_000)
    }
}

impl ops::Add<Duration> for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration::from_micros(self.micros + rhs.micros)
    }
}

impl ops::Mul<u32> for Duration {
    type Output = Duration;
    fn mul(self, rhs: u32) -> Duration {
        Duration::from_micros(self.micros * rhs as u64)
    }
}

impl From<::core::time::Duration> for Duration {
    fn from(other: ::core::time::Duration) -> Duration {
        Duration::from_micros(other.as_micros() as u64)
    }
}

impl From<Duration> for ::core::time::Duration {
    fn from(val: Duration) -> Self {
        ::core::time::Duration::from_micros(val.total_micros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_arithmetic() {
        let a = Instant::from_millis(1000);
        let b = Instant::from_millis(1500);
        assert_eq!(b - a, Duration::from_millis(500));
        assert_eq!(a + Duration::from_millis(500), b);
    }

    #[test]
    fn duration_conversions() {
        assert_eq!(Duration::from_secs(1).total_millis(), 1000);
        assert_eq!(Duration::from_millis(1500).secs(), 1);
    }
}
