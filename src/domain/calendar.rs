use crate::domain::models::{CheckInChip, CheckInRecord};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonthView {
    first_day: NaiveDate,
}

impl MonthView {
    pub fn new(year: i32, month: u32) -> Result<Self, String> {
        if !(1..=12).contains(&month) {
            return Err(format!("month must be between 1 and 12, got {month}"));
        }
        let first_day = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| format!("year {year} is out of range"))?;
        Ok(Self { first_day })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            first_day: date - Duration::days(i64::from(date.day0())),
        }
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day - Duration::days(1)
    }

    pub fn days_in_month(&self) -> u32 {
        self.last_day().day()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year() && date.month() == self.month()
    }

    pub fn date(&self, day: u32) -> Option<NaiveDate> {
        self.first_day.with_day(day)
    }

    pub fn next(&self) -> Self {
        Self {
            first_day: self.first_day + Months::new(1),
        }
    }

    pub fn previous(&self) -> Self {
        Self {
            first_day: self.first_day - Months::new(1),
        }
    }

    /// UTC calendar months that overlap this month as seen in `tz`, oldest
    /// first. Stores keyed by UTC month must be read for each of them.
    pub fn utc_months(&self, tz: &Tz) -> Vec<MonthView> {
        let start = local_midnight(self.first_day, tz).date_naive();
        let end = (local_midnight(self.next().first_day, tz) - Duration::milliseconds(1)).date_naive();

        let mut months = Vec::new();
        let mut month = MonthView::containing(start);
        while month.first_day <= end {
            months.push(month);
            month = month.next();
        }
        months
    }
}

// Falls back an hour when midnight is skipped by a DST jump.
fn local_midnight(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    BeforeStart,
    Upcoming,
    Missed,
    Partial,
    Complete,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DayCell {
    pub day: u32,
    pub status: DayStatus,
    pub check_in_count: usize,
    pub completion: f64,
    pub has_issues: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DayEntry {
    pub timestamp: DateTime<Utc>,
    pub chips: Vec<CheckInChip>,
    pub scheduled_for: Vec<String>,
    pub has_issues: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DayDetail {
    pub date: NaiveDate,
    pub completion: f64,
    pub has_issues: bool,
    pub entries: Vec<DayEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlyMetrics {
    pub year: i32,
    pub month: u32,
    pub as_of: NaiveDate,
    pub check_ins_by_day: BTreeMap<u32, Vec<CheckInRecord>>,
    pub total_check_ins: usize,
    pub success_rate_percent: u8,
    pub counted_window: Option<(NaiveDate, NaiveDate)>,
    pub days_to_count: u32,
    pub current_streak: u32,
    pub best_streak: u32,
    pub days_with_issues: Vec<u32>,
}

/// Builds the month's metrics from raw records. Records are bucketed by their
/// local day in `tz`; records outside the viewed month are ignored.
pub fn aggregate_month(
    records: &[CheckInRecord],
    start_date: Option<NaiveDate>,
    view: MonthView,
    today: NaiveDate,
    tz: &Tz,
) -> MonthlyMetrics {
    let mut check_ins_by_day: BTreeMap<u32, Vec<CheckInRecord>> = BTreeMap::new();
    for record in records {
        let date = record.local_date(tz);
        if !view.contains(date) {
            continue;
        }
        check_ins_by_day
            .entry(date.day())
            .or_default()
            .push(record.clone());
    }
    for day_records in check_ins_by_day.values_mut() {
        day_records.sort_by_key(|record| record.timestamp);
    }

    let total_check_ins = check_ins_by_day.values().map(Vec::len).sum();
    let days_with_issues = check_ins_by_day
        .iter()
        .filter(|(_, day_records)| day_records.iter().any(CheckInRecord::has_issues))
        .map(|(day, _)| *day)
        .collect();

    let counted_window = counted_window(view, start_date, today);
    let completions: Vec<(NaiveDate, usize, f64)> = match counted_window {
        Some((start, end)) => start
            .iter_days()
            .take_while(|date| *date <= end)
            .map(|date| {
                let day_records = check_ins_by_day
                    .get(&date.day())
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                (date, day_records.len(), daily_completion(day_records))
            })
            .collect(),
        None => Vec::new(),
    };

    let days_to_count = completions.len() as u32;
    let completion_sum: f64 = completions.iter().map(|(_, _, completion)| completion).sum();

    MonthlyMetrics {
        year: view.year(),
        month: view.month(),
        as_of: today,
        check_ins_by_day,
        total_check_ins,
        success_rate_percent: success_rate_percent(completion_sum, days_to_count),
        counted_window,
        days_to_count,
        current_streak: current_streak(&completions, today),
        best_streak: best_streak(&completions),
        days_with_issues,
    }
}

/// Effective start and end of the days that count toward the success rate.
/// `None` when no day of the month counts yet.
pub fn counted_window(
    view: MonthView,
    start_date: Option<NaiveDate>,
    today: NaiveDate,
) -> Option<(NaiveDate, NaiveDate)> {
    let month_start = view.first_day();
    let effective_start = match start_date {
        Some(start) if start > month_start => start,
        _ => month_start,
    };
    let month_end = if view.contains(today) {
        today
    } else if month_start > today {
        return None;
    } else {
        view.last_day()
    };

    (effective_start <= month_end).then_some((effective_start, month_end))
}

/// Share of the day's scheduled check-ins that were recorded, capped at 1.0.
pub fn daily_completion(records: &[CheckInRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let scheduled = records
        .iter()
        .map(|record| record.scheduled_count)
        .max()
        .unwrap_or_default();
    if scheduled == 0 {
        return 1.0;
    }
    let completed = records.len().min(scheduled as usize);
    completed as f64 / f64::from(scheduled)
}

pub fn success_rate_percent(completion_sum: f64, days_to_count: u32) -> u8 {
    if days_to_count == 0 {
        return 0;
    }
    let percent = (100.0 * completion_sum / f64::from(days_to_count)).round();
    percent.clamp(0.0, 100.0) as u8
}

fn is_complete(completion: f64) -> bool {
    completion >= 1.0
}

fn current_streak(completions: &[(NaiveDate, usize, f64)], today: NaiveDate) -> u32 {
    // Today is still open; an incomplete today does not break the streak yet.
    let skip_open_today = matches!(
        completions.last(),
        Some((date, _, completion)) if *date == today && !is_complete(*completion)
    );
    completions
        .iter()
        .rev()
        .skip(usize::from(skip_open_today))
        .take_while(|(_, _, completion)| is_complete(*completion))
        .count() as u32
}

fn best_streak(completions: &[(NaiveDate, usize, f64)]) -> u32 {
    let mut best = 0;
    let mut run = 0;
    for (_, _, completion) in completions {
        if is_complete(*completion) {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}

impl MonthlyMetrics {
    pub fn view(&self) -> Option<MonthView> {
        MonthView::new(self.year, self.month).ok()
    }

    pub fn records_for_day(&self, day: u32) -> &[CheckInRecord] {
        self.check_ins_by_day
            .get(&day)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn day_has_issues(&self, day: u32) -> bool {
        self.days_with_issues.contains(&day)
    }

    pub fn day_cells(&self) -> Vec<DayCell> {
        let Some(view) = self.view() else {
            return Vec::new();
        };

        view.first_day()
            .iter_days()
            .take_while(|date| view.contains(*date))
            .map(|date| {
                let day = date.day();
                let records = self.records_for_day(day);
                let completion = daily_completion(records);
                DayCell {
                    day,
                    status: self.day_status(date, records.len(), completion),
                    check_in_count: records.len(),
                    completion,
                    has_issues: self.day_has_issues(day),
                }
            })
            .collect()
    }

    pub fn day_detail(&self, day: u32) -> Option<DayDetail> {
        let date = self.view()?.date(day)?;
        let records = self.records_for_day(day);
        Some(DayDetail {
            date,
            completion: daily_completion(records),
            has_issues: self.day_has_issues(day),
            entries: records
                .iter()
                .map(|record| DayEntry {
                    timestamp: record.timestamp,
                    chips: record.chips(),
                    scheduled_for: record.scheduled_for.clone(),
                    has_issues: record.has_issues(),
                })
                .collect(),
        })
    }

    fn day_status(&self, date: NaiveDate, count: usize, completion: f64) -> DayStatus {
        if date > self.as_of {
            return DayStatus::Upcoming;
        }
        match self.counted_window {
            Some((start, _)) if date >= start => {}
            _ => return DayStatus::BeforeStart,
        }
        if count == 0 {
            DayStatus::Missed
        } else if is_complete(completion) {
            DayStatus::Complete
        } else {
            DayStatus::Partial
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn record_on(day: NaiveDate, hour: u32, scheduled_count: u32) -> CheckInRecord {
        let timestamp = Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).expect("valid time"));
        CheckInRecord::new(timestamp, scheduled_count)
    }

    fn utc() -> Tz {
        Tz::UTC
    }

    fn april() -> MonthView {
        MonthView::new(2026, 4).expect("valid month")
    }

    #[test]
    fn month_view_bounds() {
        let february = MonthView::new(2028, 2).expect("valid month");
        assert_eq!(february.days_in_month(), 29);
        assert_eq!(february.last_day(), date(2028, 2, 29));
        assert_eq!(february.previous(), MonthView::new(2028, 1).expect("valid month"));
        assert_eq!(
            MonthView::new(2026, 12).expect("valid month").next(),
            MonthView::new(2027, 1).expect("valid month")
        );
        assert_eq!(MonthView::containing(date(2026, 4, 17)), april());
        assert!(MonthView::new(2026, 13).is_err());
    }

    #[test]
    fn scheduled_twice_scenario_scores_thirty_percent() {
        let records = vec![
            record_on(date(2026, 4, 1), 8, 2),
            record_on(date(2026, 4, 1), 18, 2),
            record_on(date(2026, 4, 3), 9, 2),
        ];

        let metrics = aggregate_month(&records, None, april(), date(2026, 4, 5), &utc());

        assert_eq!(metrics.days_to_count, 5);
        assert_eq!(metrics.total_check_ins, 3);
        assert_eq!(metrics.check_ins_by_day.get(&1).map(Vec::len), Some(2));
        assert_eq!(metrics.success_rate_percent, 30);
    }

    #[test]
    fn days_before_start_date_are_excluded() {
        let records: Vec<CheckInRecord> = (1..=9)
            .map(|day| record_on(date(2026, 4, day), 9, 1))
            .chain([record_on(date(2026, 4, 12), 9, 1)])
            .collect();

        let metrics = aggregate_month(
            &records,
            Some(date(2026, 4, 10)),
            april(),
            date(2026, 4, 15),
            &utc(),
        );

        assert_eq!(metrics.days_to_count, 6);
        assert_eq!(
            metrics.counted_window,
            Some((date(2026, 4, 10), date(2026, 4, 15)))
        );
        assert_eq!(metrics.total_check_ins, 10);
        assert_eq!(metrics.success_rate_percent, 17);
    }

    #[test]
    fn start_date_before_month_uses_month_start() {
        let window = counted_window(april(), Some(date(2025, 12, 1)), date(2026, 5, 2));
        assert_eq!(window, Some((date(2026, 4, 1), date(2026, 4, 30))));
    }

    #[test]
    fn start_date_after_month_end_counts_nothing() {
        let records = vec![record_on(date(2026, 4, 3), 9, 1)];
        let metrics = aggregate_month(
            &records,
            Some(date(2026, 5, 10)),
            april(),
            date(2026, 6, 1),
            &utc(),
        );
        assert_eq!(metrics.days_to_count, 0);
        assert_eq!(metrics.success_rate_percent, 0);
        assert_eq!(metrics.total_check_ins, 1);
    }

    #[test]
    fn future_month_counts_nothing() {
        let metrics = aggregate_month(&[], None, april(), date(2026, 3, 20), &utc());
        assert_eq!(metrics.counted_window, None);
        assert_eq!(metrics.days_to_count, 0);
        assert!(metrics
            .day_cells()
            .iter()
            .all(|cell| cell.status == DayStatus::Upcoming));
    }

    #[test]
    fn zero_scheduled_count_completes_a_recorded_day() {
        let records = vec![record_on(date(2026, 4, 1), 9, 0)];
        let metrics = aggregate_month(&records, None, april(), date(2026, 4, 1), &utc());
        assert_eq!(metrics.success_rate_percent, 100);
    }

    #[test]
    fn extra_check_ins_do_not_inflate_the_rate() {
        let records: Vec<CheckInRecord> = (0..5)
            .map(|hour| record_on(date(2026, 4, 1), 8 + hour, 1))
            .collect();
        let metrics = aggregate_month(&records, None, april(), date(2026, 4, 2), &utc());
        assert_eq!(metrics.success_rate_percent, 50);
        assert_eq!(metrics.total_check_ins, 5);
    }

    #[test]
    fn records_outside_the_month_are_ignored() {
        let records = vec![
            record_on(date(2026, 3, 31), 9, 1),
            record_on(date(2026, 4, 2), 9, 1),
        ];
        let metrics = aggregate_month(&records, None, april(), date(2026, 4, 2), &utc());
        assert_eq!(metrics.total_check_ins, 1);
        assert!(!metrics.check_ins_by_day.contains_key(&31));
    }

    #[test]
    fn local_time_zone_decides_the_day_bucket() {
        let tz: Tz = "Asia/Tokyo".parse().expect("valid tz");
        let records = vec![record_on(date(2026, 4, 1), 20, 1)];
        let metrics = aggregate_month(&records, None, april(), date(2026, 4, 3), &tz);
        assert_eq!(metrics.check_ins_by_day.get(&2).map(Vec::len), Some(1));
    }

    #[test]
    fn issue_days_are_flagged() {
        let mut sad = record_on(date(2026, 4, 2), 9, 1);
        sad.mood = Some("Sad".to_string());
        let mut rested = record_on(date(2026, 4, 3), 9, 1);
        rested.sleep = Some("great".to_string());
        let metrics = aggregate_month(&[sad, rested], None, april(), date(2026, 4, 5), &utc());

        assert_eq!(metrics.days_with_issues, vec![2]);
        assert!(metrics.day_has_issues(2));
        assert!(!metrics.day_has_issues(3));
    }

    #[test]
    fn streaks_skip_an_open_today() {
        let records: Vec<CheckInRecord> = [1, 2, 4, 5, 6]
            .into_iter()
            .map(|day| record_on(date(2026, 4, day), 9, 1))
            .collect();
        let metrics = aggregate_month(&records, None, april(), date(2026, 4, 7), &utc());
        assert_eq!(metrics.current_streak, 3);
        assert_eq!(metrics.best_streak, 3);

        let broken = aggregate_month(&records, None, april(), date(2026, 4, 8), &utc());
        assert_eq!(broken.current_streak, 0);
    }

    #[test]
    fn utc_months_cover_the_local_month_edges() {
        let ahead_of_utc = april().utc_months(&chrono_tz::Asia::Tokyo);
        assert_eq!(ahead_of_utc, vec![MonthView::new(2026, 3).expect("march"), april()]);

        let behind_utc = april().utc_months(&chrono_tz::America::New_York);
        assert_eq!(behind_utc, vec![april(), MonthView::new(2026, 5).expect("may")]);

        assert_eq!(april().utc_months(&utc()), vec![april()]);
    }

    #[test]
    fn partially_checked_in_today_keeps_the_streak() {
        let mut records: Vec<CheckInRecord> = [1, 2, 3]
            .into_iter()
            .map(|day| record_on(date(2026, 4, day), 9, 1))
            .collect();
        records.push(record_on(date(2026, 4, 4), 9, 2));

        let open = aggregate_month(&records, None, april(), date(2026, 4, 4), &utc());
        assert_eq!(open.current_streak, 3);

        let closed = aggregate_month(&records, None, april(), date(2026, 4, 5), &utc());
        assert_eq!(closed.current_streak, 0);
        assert_eq!(closed.best_streak, 3);
    }

    #[test]
    fn partial_days_break_streaks() {
        let records = vec![
            record_on(date(2026, 4, 1), 9, 2),
            record_on(date(2026, 4, 1), 19, 2),
            record_on(date(2026, 4, 2), 9, 2),
            record_on(date(2026, 4, 3), 9, 1),
        ];
        let metrics = aggregate_month(&records, None, april(), date(2026, 4, 3), &utc());
        assert_eq!(metrics.current_streak, 1);
        assert_eq!(metrics.best_streak, 1);
    }

    #[test]
    fn day_cells_describe_each_day() {
        let records = vec![
            record_on(date(2026, 4, 5), 9, 2),
            record_on(date(2026, 4, 6), 9, 1),
            record_on(date(2026, 4, 1), 9, 1),
        ];
        let metrics = aggregate_month(
            &records,
            Some(date(2026, 4, 4)),
            april(),
            date(2026, 4, 8),
            &utc(),
        );
        let cells = metrics.day_cells();

        assert_eq!(cells.len(), 30);
        assert_eq!(cells[0].status, DayStatus::BeforeStart);
        assert_eq!(cells[0].check_in_count, 1);
        assert_eq!(cells[3].status, DayStatus::Missed);
        assert_eq!(cells[4].status, DayStatus::Partial);
        assert_eq!(cells[5].status, DayStatus::Complete);
        assert_eq!(cells[8].status, DayStatus::Upcoming);
    }

    #[test]
    fn day_detail_lists_entries_in_time_order() {
        let mut evening = record_on(date(2026, 4, 2), 19, 2);
        evening.mood = Some("down".to_string());
        let mut morning = record_on(date(2026, 4, 2), 8, 2);
        morning.energy = Some("high".to_string());
        morning.scheduled_for = vec!["morning".to_string()];

        let metrics = aggregate_month(&[evening, morning], None, april(), date(2026, 4, 3), &utc());
        let detail = metrics.day_detail(2).expect("day exists");

        assert_eq!(detail.entries.len(), 2);
        assert_eq!(detail.entries[0].scheduled_for, vec!["morning".to_string()]);
        assert!(!detail.entries[0].has_issues);
        assert!(detail.entries[1].has_issues);
        assert!(detail.has_issues);
        assert_eq!(detail.completion, 1.0);
        assert!(metrics.day_detail(31).is_none());
    }

    // Feature: checkin-core, Property 2: success rate grows with check-ins up to the schedule, then stays flat
    proptest! {
        #[test]
        fn property2_success_rate_is_capped_and_monotonic(
            scheduled in 1u32..6,
            extra in 0u32..6,
            today_day in 1u32..=30,
        ) {
            let today = date(2026, 4, today_day);
            let mut previous = 0u8;
            for count in 0..=(scheduled + extra) {
                let records: Vec<CheckInRecord> = (0..count)
                    .map(|index| record_on(date(2026, 4, 1), index % 24, scheduled))
                    .collect();
                let metrics = aggregate_month(&records, None, april(), today, &utc());
                prop_assert!(metrics.success_rate_percent >= previous);
                if count > scheduled {
                    prop_assert_eq!(metrics.success_rate_percent, previous);
                }
                previous = metrics.success_rate_percent;
            }
        }
    }

    // Feature: checkin-core, Property 3: success rate stays within 0..=100 and days before start never count
    proptest! {
        #[test]
        fn property3_rate_bounded_and_start_respected(
            days in proptest::collection::vec((1u32..=30, 0u32..4), 0..40),
            start_day in 1u32..=30,
            today_day in 1u32..=30,
        ) {
            let records: Vec<CheckInRecord> = days
                .iter()
                .map(|(day, scheduled)| record_on(date(2026, 4, *day), 9, *scheduled))
                .collect();
            let metrics = aggregate_month(
                &records,
                Some(date(2026, 4, start_day)),
                april(),
                date(2026, 4, today_day),
                &utc(),
            );
            prop_assert!(metrics.success_rate_percent <= 100);
            let expected_days = if start_day > today_day { 0 } else { today_day - start_day + 1 };
            prop_assert_eq!(metrics.days_to_count, expected_days);
        }
    }
}
