//! Trading calendar construction.
//!
//! The simulation steps over an ordered list of business dates supplied by a
//! [`TradingCalendar`]. The built-in [`UsEquityCalendar`] excludes weekends
//! and US federal holidays, shifting holidays that land on a weekend to the
//! nearest workday (Saturday observes Friday, Sunday observes Monday).

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;

/// Source of the ordered sequence of sessions a simulation steps over.
pub trait TradingCalendar: Send + Sync {
    /// Business dates in `[start, end]`, ascending.
    fn sessions(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate>;
}

/// US equity trading calendar: weekdays minus federal holidays.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsEquityCalendar;

impl TradingCalendar for UsEquityCalendar {
    fn sessions(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        if start > end {
            return Vec::new();
        }

        // Observed dates can spill across year boundaries (a Jan 1 Saturday
        // is observed on Dec 31), so compute one extra year on each side.
        let mut holidays = BTreeSet::new();
        for year in (start.year() - 1)..=(end.year() + 1) {
            holidays.extend(federal_holidays(year));
        }

        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| is_weekday(*d) && !holidays.contains(d))
            .collect()
    }
}

fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Shift a weekend holiday to the nearest workday.
fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// The `n`-th (1-based) given weekday of a month.
fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month start");
    let offset = (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    first + Duration::days(i64::from(offset + (n - 1) * 7))
}

/// The last given weekday of a month.
fn last_weekday(year: i32, month: u32, weekday: Weekday) -> NaiveDate {
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid month start");
    let last = next_month - Duration::days(1);
    let offset = (7 + last.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    last - Duration::days(i64::from(offset))
}

/// US federal holidays for one calendar year, weekend dates observed.
fn federal_holidays(year: i32) -> Vec<NaiveDate> {
    let fixed = |month: u32, day: u32| {
        observed(NaiveDate::from_ymd_opt(year, month, day).expect("valid holiday date"))
    };

    let mut days = vec![
        fixed(1, 1),                                  // New Year's Day
        nth_weekday(year, 1, Weekday::Mon, 3),        // Martin Luther King Jr. Day
        nth_weekday(year, 2, Weekday::Mon, 3),        // Washington's Birthday
        last_weekday(year, 5, Weekday::Mon),          // Memorial Day
        fixed(7, 4),                                  // Independence Day
        nth_weekday(year, 9, Weekday::Mon, 1),        // Labor Day
        nth_weekday(year, 10, Weekday::Mon, 2),       // Columbus Day
        fixed(11, 11),                                // Veterans Day
        nth_weekday(year, 11, Weekday::Thu, 4),       // Thanksgiving
        fixed(12, 25),                                // Christmas
    ];

    // Juneteenth became a federal holiday in 2021.
    if year >= 2021 {
        days.push(fixed(6, 19));
    }

    days
}
