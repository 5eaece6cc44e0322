//! Calendar primitives and the working-day counter
use std::collections::HashSet;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc, Weekday};

use crate::error::ApprovalError;

/// Instant a workflow event happened at. Encoded as nanoseconds since the
/// unix epoch on the wire.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// A civil date (no time component). Leave spans and holidays are dates,
/// not instants. Encoded as the day count from the common era.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    pub fn new(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(CalendarDate)
    }
    pub fn year(&self) -> i32 {
        self.0.year()
    }
    pub fn to_naive_date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for CalendarDate {
    fn from(value: NaiveDate) -> Self {
        CalendarDate(value)
    }
}

impl<C> minicbor::Encode<C> for CalendarDate {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i32(self.0.num_days_from_ce())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for CalendarDate {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let days = d.i32()?;

        NaiveDate::from_num_days_from_ce_opt(days)
            .map(CalendarDate)
            .ok_or(minicbor::decode::Error::message(
                "failed to convert day count to a date",
            ))
    }
}

/// Non-working reference dates, public plus institution-custom.
pub type HolidaySet = HashSet<CalendarDate>;

/// Count the working days between `start` and `end`, inclusive of both
/// endpoints. A day counts unless it is a Saturday, a Sunday or a member
/// of `holidays`. Fails with [`ApprovalError::InvalidRange`] when
/// `start > end`.
pub fn count_working_days(
    start: CalendarDate,
    end: CalendarDate,
    holidays: &HolidaySet,
) -> Result<u16, ApprovalError> {
    if start > end {
        return Err(ApprovalError::InvalidRange);
    }

    let mut count = 0u16;
    let mut day = start.0;
    while day <= end.0 {
        let weekend = matches!(day.weekday(), Weekday::Sat | Weekday::Sun);
        if !weekend && !holidays.contains(&CalendarDate(day)) {
            count += 1;
        }
        // succ_opt only fails at the end of the representable range
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> CalendarDate {
        CalendarDate::new(y, m, d).unwrap()
    }

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn calendar_date_encoding() {
        let original = date(2024, 2, 29);

        let encoding = minicbor::to_vec(original).unwrap();
        let decode: CalendarDate = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn full_week_counts_five_working_days() {
        // 2024-01-01 is a Monday, 2024-01-07 the following Sunday
        let days = count_working_days(date(2024, 1, 1), date(2024, 1, 7), &HolidaySet::new());
        assert_eq!(days.unwrap(), 5);
    }

    #[test]
    fn holiday_is_excluded() {
        let mut holidays = HolidaySet::new();
        holidays.insert(date(2024, 1, 1));

        let days = count_working_days(date(2024, 1, 1), date(2024, 1, 7), &holidays);
        assert_eq!(days.unwrap(), 4);
    }

    #[test]
    fn weekend_holiday_does_not_double_count() {
        let mut holidays = HolidaySet::new();
        holidays.insert(date(2024, 1, 6)); // a Saturday

        let days = count_working_days(date(2024, 1, 1), date(2024, 1, 7), &holidays);
        assert_eq!(days.unwrap(), 5);
    }

    #[test]
    fn single_day_range_is_inclusive() {
        let days = count_working_days(date(2024, 1, 3), date(2024, 1, 3), &HolidaySet::new());
        assert_eq!(days.unwrap(), 1);
    }

    #[test]
    fn reversed_range_fails() {
        let res = count_working_days(date(2024, 1, 7), date(2024, 1, 1), &HolidaySet::new());
        assert_eq!(res.unwrap_err(), ApprovalError::InvalidRange);
    }
}
