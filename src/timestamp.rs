//! OpenVMS 64-bit time values.
//!
//! A VMS time is a signed count of 100 ns ticks since 1858-11-17 00:00 UTC
//! (Modified Julian Day zero).  Zero means "not specified".

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Ticks between the VMS epoch and 1970-01-01.
pub const VMS_UNIX_EPOCH_OFFSET: i64 = 0x07C9_5674_BEB4_000;
pub const TICKS_PER_SECOND:      i64 = 10_000_000;

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN",
    "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct VmsTime(pub i64);

impl VmsTime {
    pub fn is_specified(self) -> bool {
        self.0 != 0
    }

    /// Whole seconds since the Unix epoch (floor division), or `None` when
    /// the tick count lies outside the representable range.
    pub fn to_unix_seconds(self) -> Option<i64> {
        Some(self.0.checked_sub(VMS_UNIX_EPOCH_OFFSET)?.div_euclid(TICKS_PER_SECOND))
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        if !self.is_specified() {
            return None;
        }
        DateTime::from_timestamp(self.to_unix_seconds()?, 0)
    }

    /// `D-MON-YYYY HH:MM:SS`, optionally followed by `subsec_digits` digits
    /// of the fractional second, as DIRECTORY prints it.
    pub fn format(self, subsec_digits: u32) -> String {
        if !self.is_specified() {
            return "<None Specified>".to_string();
        }
        let Some(dt) = self.to_datetime() else {
            return "<Invalid Date>".to_string();
        };
        let base = format!(
            "{}-{}-{} {:02}:{:02}:{:02}",
            dt.day(),
            MONTHS[dt.month0() as usize],
            dt.year(),
            dt.hour(),
            dt.minute(),
            dt.second(),
        );
        if subsec_digits == 0 {
            return base;
        }
        let digits = subsec_digits.min(7);
        let frac = self.0.rem_euclid(TICKS_PER_SECOND) / 10i64.pow(7 - digits);
        format!("{base}.{frac:0width$}", width = digits as usize)
    }
}
