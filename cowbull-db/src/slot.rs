use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};

pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// Offset used for slot keys unless the config says otherwise (UTC+7).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 7;

/// Parses `H:M` / `HH:MM` into `(hour, minute)`. Anything else is `None`;
/// callers skip such keys rather than failing.
pub fn parse_slot(s: &str) -> Option<(u8, u8)> {
    let (h, m) = s.split_once(':')?;
    let hour = parse_part(h)?;
    let minute = parse_part(m)?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

fn parse_part(part: &str) -> Option<u8> {
    if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

pub fn slot_to_minutes(hour: u8, minute: u8) -> u16 {
    hour as u16 * 60 + minute as u16
}

/// Minute-of-day for a slot key, if it parses.
pub fn slot_key_minutes(s: &str) -> Option<u16> {
    parse_slot(s).map(|(h, m)| slot_to_minutes(h, m))
}

/// Formats a minute count as `HH:MM`, wrapping modulo one day.
pub fn minutes_to_slot(total_minutes: i64) -> String {
    let minutes = total_minutes.rem_euclid(MINUTES_PER_DAY);
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn slot_of(time: &DateTime<FixedOffset>) -> String {
    format!("{:02}:{:02}", time.hour(), time.minute())
}

pub fn minute_of_day(time: &DateTime<FixedOffset>) -> u16 {
    (time.hour() * 60 + time.minute()) as u16
}

pub fn fixed_offset(hours: i32) -> Result<FixedOffset> {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .with_context(|| format!("Invalid UTC offset: {hours}h"))
}

pub trait Clock {
    fn now_local(&self) -> DateTime<FixedOffset>;
}

/// Wall clock read in a fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset_hours: i32) -> Result<Self> {
        Ok(Self {
            offset: fixed_offset(offset_hours)?,
        })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl Clock for SystemClock {
    fn now_local(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl FixedClock {
    /// Today at `hour:minute` in the default offset.
    pub fn at(hour: u32, minute: u32) -> Self {
        let offset = fixed_offset(DEFAULT_UTC_OFFSET_HOURS).unwrap_or(Utc.fix());
        let now = Utc::now().with_timezone(&offset);
        let pinned = now
            .with_hour(hour)
            .and_then(|t| t.with_minute(minute))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        Self(pinned)
    }
}

impl Clock for FixedClock {
    fn now_local(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_slot_forms() {
        assert_eq!(parse_slot("09:05"), Some((9, 5)));
        assert_eq!(parse_slot("9:5"), Some((9, 5)));
        assert_eq!(parse_slot("23:59"), Some((23, 59)));
        assert_eq!(parse_slot("00:00"), Some((0, 0)));
    }

    #[test]
    fn test_parse_slot_invalid() {
        assert_eq!(parse_slot("24:00"), None);
        assert_eq!(parse_slot("12:60"), None);
        assert_eq!(parse_slot("12"), None);
        assert_eq!(parse_slot("12:00:00"), None);
        assert_eq!(parse_slot("ab:cd"), None);
        assert_eq!(parse_slot(":30"), None);
        assert_eq!(parse_slot("-1:30"), None);
        assert_eq!(parse_slot("009:30"), None);
        assert_eq!(parse_slot(""), None);
    }

    #[test]
    fn test_minutes_to_slot_wraps() {
        assert_eq!(minutes_to_slot(0), "00:00");
        assert_eq!(minutes_to_slot(1439), "23:59");
        assert_eq!(minutes_to_slot(1440), "00:00");
        assert_eq!(minutes_to_slot(-5), "23:55");
        assert_eq!(minutes_to_slot(-5), minutes_to_slot(1435));
    }

    #[test]
    fn test_fixed_clock_slot() {
        let clock = FixedClock::at(10, 0);
        assert_eq!(slot_of(&clock.now_local()), "10:00");
        assert_eq!(minute_of_day(&clock.now_local()), 600);
        assert_eq!(clock.now_local().offset().local_minus_utc(), 7 * 3600);
    }

    #[test]
    fn test_system_clock_offset() {
        let clock = SystemClock::new(7).unwrap();
        assert_eq!(clock.now_local().offset().local_minus_utc(), 7 * 3600);
        assert!(SystemClock::new(30).is_err());
    }

    proptest! {
        #[test]
        fn prop_slot_roundtrip(h in 0u8..24, m in 0u8..60) {
            let slot = format!("{:02}:{:02}", h, m);
            prop_assert_eq!(minutes_to_slot(slot_to_minutes(h, m) as i64), slot.clone());
            prop_assert_eq!(parse_slot(&slot), Some((h, m)));
        }

        #[test]
        fn prop_minutes_to_slot_periodic(n in -100_000i64..100_000) {
            prop_assert_eq!(minutes_to_slot(n), minutes_to_slot(n + MINUTES_PER_DAY));
        }
    }
}
