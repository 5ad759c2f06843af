//! Descriptive statistics over the historical table
//!
//! Demand-by-hour and demand-by-weekday aggregates for dashboards, and
//! range queries that fall back to daily means for long spans.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::TimeSeriesTable;
use crate::error::{ForecastError, Result};

/// Largest range returned at hourly resolution
pub const MAX_RANGE_ROWS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyDemand {
    pub hour: u32,
    pub avg_demand: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyDemand {
    pub day: String,
    pub weekday: u32,
    pub avg_demand: f64,
    pub peak_demand: f64,
    pub samples: usize,
}

/// Running mean/max accumulator
#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    sum: f64,
    peak: Option<f64>,
    count: usize,
}

impl Bucket {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.peak = Some(self.peak.map_or(value, |p| p.max(value)));
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

fn target_index(table: &TimeSeriesTable, target: &str) -> Result<usize> {
    table
        .channel_index(target)
        .ok_or_else(|| ForecastError::InvalidRequest(format!("channel '{}' not in table", target)))
}

/// Mean of `target` per hour of day; hours without data are omitted
pub fn hourly_pattern(table: &TimeSeriesTable, target: &str) -> Result<Vec<HourlyDemand>> {
    let idx = target_index(table, target)?;
    let mut buckets = [Bucket::default(); 24];
    for (ts, row) in table.iter() {
        buckets[ts.hour() as usize].add(row[idx]);
    }

    Ok(buckets
        .iter()
        .enumerate()
        .filter_map(|(hour, b)| {
            b.mean().map(|avg_demand| HourlyDemand {
                hour: hour as u32,
                avg_demand,
                samples: b.count,
            })
        })
        .collect())
}

/// Mean and peak of `target` per weekday, Monday first
pub fn weekly_trend(table: &TimeSeriesTable, target: &str) -> Result<Vec<DailyDemand>> {
    let idx = target_index(table, target)?;
    let mut buckets = [Bucket::default(); 7];
    for (ts, row) in table.iter() {
        buckets[ts.weekday().num_days_from_monday() as usize].add(row[idx]);
    }

    let days = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];
    Ok(days
        .iter()
        .zip(buckets.iter())
        .filter_map(|(day, b)| {
            Some(DailyDemand {
                day: day_name(*day).to_string(),
                weekday: day.num_days_from_monday(),
                avg_demand: b.mean()?,
                peak_demand: b.peak?,
                samples: b.count,
            })
        })
        .collect())
}

fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Rows with `start <= t <= end`. Spans longer than `max_rows` are
/// downsampled to one row of channel means per UTC day, stamped at midnight.
pub fn historical_range(
    table: &TimeSeriesTable,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    max_rows: usize,
) -> Result<TimeSeriesTable> {
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(ForecastError::InvalidRequest(format!(
                "range start {} is after end {}",
                s, e
            )));
        }
    }

    let timestamps = table.timestamps();
    let from = start.map_or(0, |s| timestamps.partition_point(|t| *t < s));
    let to = end.map_or(table.len(), |e| timestamps.partition_point(|t| *t <= e));
    let subset = table.slice(from, to);

    if subset.len() <= max_rows {
        return Ok(subset);
    }
    daily_means(&subset)
}

fn daily_means(table: &TimeSeriesTable) -> Result<TimeSeriesTable> {
    let mut out = TimeSeriesTable::new(table.channels().to_vec())
        .map_err(|e| ForecastError::ComputationFailure(e.to_string()))?;

    let mut day: Option<(NaiveDate, Vec<Bucket>)> = None;
    for (ts, row) in table.iter() {
        let date = ts.date_naive();
        if !matches!(&day, Some((current, _)) if *current == date) {
            if let Some((done, buckets)) = day.take() {
                push_daily(&mut out, done, &buckets)?;
            }
            day = Some((date, vec![Bucket::default(); row.len()]));
        }
        if let Some((_, buckets)) = day.as_mut() {
            buckets.iter_mut().zip(row).for_each(|(b, v)| b.add(*v));
        }
    }
    if let Some((done, buckets)) = day {
        push_daily(&mut out, done, &buckets)?;
    }
    Ok(out)
}

fn push_daily(out: &mut TimeSeriesTable, date: NaiveDate, buckets: &[Bucket]) -> Result<()> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| ForecastError::ComputationFailure(format!("no midnight on {}", date)))?;
    let means = buckets.iter().map(|b| b.mean().unwrap_or_default()).collect();
    out.push(midnight, means)
        .map_err(|e| ForecastError::ComputationFailure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// `days` full days starting Monday 2021-08-16, power = 100 * hour-of-day
    fn table(days: usize) -> TimeSeriesTable {
        let start = Utc.with_ymd_and_hms(2021, 8, 16, 0, 0, 0).unwrap();
        let mut t = TimeSeriesTable::new(vec!["Phase3_power".into(), "Phase3_voltage".into()])
            .unwrap();
        for i in 0..days * 24 {
            let ts = start + Duration::hours(i as i64);
            let day = (i / 24) as f64;
            t.push(ts, vec![100.0 * ts.hour() as f64 + day, 230.0]).unwrap();
        }
        t
    }

    #[test]
    fn test_hourly_pattern() {
        let pattern = hourly_pattern(&table(2), "Phase3_power").unwrap();
        assert_eq!(pattern.len(), 24);
        assert_eq!(pattern[0].hour, 0);
        assert_eq!(pattern[0].samples, 2);
        assert!((pattern[0].avg_demand - 0.5).abs() < 1e-9);
        assert!((pattern[13].avg_demand - 1300.5).abs() < 1e-9);
    }

    #[test]
    fn test_hourly_pattern_omits_empty_hours() {
        let t = table(1).slice(0, 6);
        let pattern = hourly_pattern(&t, "Phase3_power").unwrap();
        assert_eq!(pattern.len(), 6);
        assert_eq!(pattern.last().unwrap().hour, 5);
    }

    #[test]
    fn test_weekly_trend() {
        let trend = weekly_trend(&table(8), "Phase3_power").unwrap();
        assert_eq!(trend.len(), 7);
        assert_eq!(trend[0].day, "Monday");
        assert_eq!(trend[0].samples, 48);
        // Mondays are day 0 and day 7
        assert!((trend[0].avg_demand - (1150.0 + 3.5)).abs() < 1e-9);
        assert_eq!(trend[0].peak_demand, 2307.0);
        assert_eq!(trend[6].day, "Sunday");
        assert_eq!(trend[6].samples, 24);
    }

    #[test]
    fn test_unknown_channel() {
        assert!(matches!(
            hourly_pattern(&table(1), "Phase1_power"),
            Err(ForecastError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_range_is_inclusive() {
        let t = table(2);
        let start = t.timestamp(3);
        let end = t.timestamp(10);
        let range = historical_range(&t, Some(start), Some(end), MAX_RANGE_ROWS).unwrap();
        assert_eq!(range.len(), 8);
        assert_eq!(range.first_timestamp(), Some(start));
        assert_eq!(range.last_timestamp(), Some(end));

        let all = historical_range(&t, None, None, MAX_RANGE_ROWS).unwrap();
        assert_eq!(all, t);
    }

    #[test]
    fn test_long_range_downsampled_to_daily_means() {
        let t = table(50);
        assert!(t.len() > MAX_RANGE_ROWS);

        let daily = historical_range(&t, None, None, MAX_RANGE_ROWS).unwrap();
        assert_eq!(daily.len(), 50);
        assert_eq!(daily.timestamp(1), Utc.with_ymd_and_hms(2021, 8, 17, 0, 0, 0).unwrap());
        // mean of 100 * (0..24) is 1150, plus the day offset
        assert!((daily.value(1, 0) - 1151.0).abs() < 1e-9);
        assert_eq!(daily.value(1, 1), 230.0);
    }

    #[test]
    fn test_reversed_range_is_invalid() {
        let t = table(1);
        assert!(historical_range(&t, Some(t.timestamp(5)), Some(t.timestamp(1)), 10).is_err());
    }
}
