use chrono::{DateTime, Datelike, NaiveDate};
use keyguard_contracts::IAccount;
use serde::{Deserialize, Serialize};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Calendar window a spend limit accumulates over.
///
/// Windows are fixed and aligned to UTC wall-clock boundaries: weeks start on Monday, months
/// on the first and years on January 1st. `Forever` never rolls over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum SpendPeriod {
    Minute = 0,
    Hour = 1,
    Day = 2,
    Week = 3,
    Month = 4,
    Year = 5,
    Forever = 6,
}

impl SpendPeriod {
    /// Start of the window containing `timestamp`.
    pub fn window_start(self, timestamp: u64) -> u64 {
        match self {
            Self::Minute => timestamp - timestamp % MINUTE,
            Self::Hour => timestamp - timestamp % HOUR,
            Self::Day => timestamp - timestamp % DAY,
            Self::Week | Self::Month | Self::Year => {
                calendar_window_start(self, timestamp).unwrap_or(timestamp - timestamp % DAY)
            }
            Self::Forever => 0,
        }
    }

    /// Whether `window_start` belongs to an earlier window than `timestamp`.
    pub fn has_rolled_over(self, window_start: u64, timestamp: u64) -> bool {
        self.window_start(timestamp) > window_start
    }
}

fn calendar_window_start(period: SpendPeriod, timestamp: u64) -> Option<u64> {
    let date = DateTime::from_timestamp(i64::try_from(timestamp).ok()?, 0)?.date_naive();
    let start = match period {
        SpendPeriod::Week => {
            let days_from_monday = u64::from(date.weekday().num_days_from_monday());
            let day_start = timestamp - timestamp % DAY;
            return Some(day_start.saturating_sub(days_from_monday * DAY));
        }
        SpendPeriod::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?,
        SpendPeriod::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1)?,
        _ => return None,
    };
    u64::try_from(start.and_hms_opt(0, 0, 0)?.and_utc().timestamp()).ok()
}

impl TryFrom<u8> for SpendPeriod {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Minute),
            1 => Ok(Self::Hour),
            2 => Ok(Self::Day),
            3 => Ok(Self::Week),
            4 => Ok(Self::Month),
            5 => Ok(Self::Year),
            6 => Ok(Self::Forever),
            other => Err(other),
        }
    }
}

impl From<SpendPeriod> for IAccount::SpendPeriod {
    fn from(value: SpendPeriod) -> Self {
        match value {
            SpendPeriod::Minute => Self::Minute,
            SpendPeriod::Hour => Self::Hour,
            SpendPeriod::Day => Self::Day,
            SpendPeriod::Week => Self::Week,
            SpendPeriod::Month => Self::Month,
            SpendPeriod::Year => Self::Year,
            SpendPeriod::Forever => Self::Forever,
        }
    }
}

impl TryFrom<IAccount::SpendPeriod> for SpendPeriod {
    type Error = u8;

    fn try_from(value: IAccount::SpendPeriod) -> Result<Self, Self::Error> {
        match value {
            IAccount::SpendPeriod::Minute => Ok(Self::Minute),
            IAccount::SpendPeriod::Hour => Ok(Self::Hour),
            IAccount::SpendPeriod::Day => Ok(Self::Day),
            IAccount::SpendPeriod::Week => Ok(Self::Week),
            IAccount::SpendPeriod::Month => Ok(Self::Month),
            IAccount::SpendPeriod::Year => Ok(Self::Year),
            IAccount::SpendPeriod::Forever => Ok(Self::Forever),
            IAccount::SpendPeriod::__Invalid => Err(u8::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // 2024-03-15T12:34:56Z, a Friday
    const TS: u64 = 1_710_506_096;

    #[test]
    fn fixed_length_windows() {
        assert_eq!(SpendPeriod::Minute.window_start(TS), TS - 56);
        assert_eq!(SpendPeriod::Hour.window_start(TS), 1_710_504_000);
        assert_eq!(SpendPeriod::Day.window_start(TS), 1_710_460_800);
        assert_eq!(SpendPeriod::Forever.window_start(TS), 0);
    }

    #[test]
    fn calendar_windows() {
        // Monday 2024-03-11
        assert_eq!(SpendPeriod::Week.window_start(TS), 1_710_115_200);
        // 2024-03-01
        assert_eq!(SpendPeriod::Month.window_start(TS), 1_709_251_200);
        // 2024-01-01
        assert_eq!(SpendPeriod::Year.window_start(TS), 1_704_067_200);
    }

    #[test]
    fn window_start_is_idempotent_at_boundaries() {
        let april_first = 1_711_929_600;
        assert_eq!(SpendPeriod::Month.window_start(april_first), april_first);
        assert_eq!(SpendPeriod::Month.window_start(april_first - 1), 1_709_251_200);

        let monday = 1_710_720_000;
        assert_eq!(SpendPeriod::Week.window_start(monday), monday);
        assert_eq!(SpendPeriod::Week.window_start(monday - 1), 1_710_115_200);

        let new_year = 1_735_689_600;
        assert_eq!(SpendPeriod::Year.window_start(new_year), new_year);
    }

    #[test]
    fn rollover() {
        let start = SpendPeriod::Day.window_start(TS);
        assert!(!SpendPeriod::Day.has_rolled_over(start, TS));
        // 2024-03-16T00:00:00Z
        assert!(SpendPeriod::Day.has_rolled_over(start, 1_710_547_200));
        assert!(!SpendPeriod::Forever.has_rolled_over(0, u64::MAX));
    }

    #[test]
    fn epoch_week_clamps_to_zero() {
        // 1970-01-01 was a Thursday.
        assert_eq!(SpendPeriod::Week.window_start(0), 0);
        assert_eq!(SpendPeriod::Week.window_start(DAY * 2), 0);
    }

    #[test]
    fn unrepresentable_timestamps_fall_back_to_days() {
        let far = u64::MAX - 5;
        assert_eq!(SpendPeriod::Month.window_start(far), far - far % DAY);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn window_contains_timestamp(ts in 0u64..4_102_444_800, idx in 0u8..7) {
            let period = SpendPeriod::try_from(idx).unwrap();
            let start = period.window_start(ts);
            prop_assert!(start <= ts);
            prop_assert_eq!(period.window_start(start), start);
        }
    }
}
