use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::aggregate::month_id;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthBreakdown {
    pub month_id: String,
    pub period_days: i64,
    pub weight_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodAnalysis {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_days: i64,
    pub cross_month: bool,
    pub primary_month: Option<String>,
    pub breakdowns: Vec<MonthBreakdown>,
}

/// Walks the range month by month and weights each touched month by the share
/// of days falling inside it. Informational only: the monthly aggregation
/// keeps assigning whole weeks to a single month.
pub fn analyze_period(start: NaiveDate, end: NaiveDate) -> PeriodAnalysis {
    let (start, end) = if end < start { (end, start) } else { (start, end) };
    let total_days = (end - start).num_days() + 1;

    let mut breakdowns = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let month_end = last_day_of_month(cursor.year(), cursor.month());
        let segment_end = month_end.min(end);
        let days = (segment_end - cursor).num_days() + 1;
        breakdowns.push(MonthBreakdown {
            month_id: month_id(cursor.year(), cursor.month()),
            period_days: days,
            weight_percentage: days as f64 / total_days as f64 * 100.0,
        });
        cursor = segment_end + Duration::days(1);
    }

    let primary_month = breakdowns
        .iter()
        .max_by_key(|b| b.period_days)
        .map(|b| b.month_id.clone());

    PeriodAnalysis {
        start_date: start,
        end_date: end,
        total_days,
        cross_month: breakdowns.len() > 1,
        primary_month,
        breakdowns,
    }
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .map(|first| first - Duration::days(1))
        .unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn single_month_period_is_not_cross_month() {
        let analysis = analyze_period(date(2024, 5, 6), date(2024, 5, 12));
        assert!(!analysis.cross_month);
        assert_eq!(analysis.total_days, 7);
        assert_eq!(analysis.breakdowns.len(), 1);
        assert_eq!(analysis.breakdowns[0].month_id, "2024-05");
        assert!((analysis.breakdowns[0].weight_percentage - 100.0).abs() < 1e-9);
        assert_eq!(analysis.primary_month.as_deref(), Some("2024-05"));
    }

    #[test]
    fn boundary_week_splits_days_between_months() {
        let analysis = analyze_period(date(2024, 4, 28), date(2024, 5, 3));
        assert!(analysis.cross_month);
        assert_eq!(analysis.total_days, 6);
        assert_eq!(analysis.breakdowns.len(), 2);

        let april = &analysis.breakdowns[0];
        let may = &analysis.breakdowns[1];
        assert_eq!(april.month_id, "2024-04");
        assert_eq!(april.period_days, 3);
        assert_eq!(may.month_id, "2024-05");
        assert_eq!(may.period_days, 3);
        assert_eq!(april.period_days + may.period_days, analysis.total_days);
        assert!((april.weight_percentage + may.weight_percentage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn primary_month_carries_the_most_days() {
        let analysis = analyze_period(date(2024, 4, 29), date(2024, 5, 5));
        assert_eq!(analysis.primary_month.as_deref(), Some("2024-05"));
    }

    #[test]
    fn year_rollover_walks_into_january() {
        let analysis = analyze_period(date(2023, 12, 28), date(2024, 1, 3));
        assert!(analysis.cross_month);
        assert_eq!(analysis.breakdowns[0].month_id, "2023-12");
        assert_eq!(analysis.breakdowns[1].month_id, "2024-01");
        let days: i64 = analysis.breakdowns.iter().map(|b| b.period_days).sum();
        assert_eq!(days, analysis.total_days);
    }

    #[test]
    fn reversed_range_is_normalized() {
        let analysis = analyze_period(date(2024, 5, 12), date(2024, 5, 6));
        assert_eq!(analysis.start_date, date(2024, 5, 6));
        assert_eq!(analysis.total_days, 7);
    }

    #[test]
    fn long_period_touches_every_month_once() {
        let analysis = analyze_period(date(2024, 1, 15), date(2024, 4, 10));
        let ids: Vec<&str> = analysis
            .breakdowns
            .iter()
            .map(|b| b.month_id.as_str())
            .collect();
        assert_eq!(ids, vec!["2024-01", "2024-02", "2024-03", "2024-04"]);
        let weights: f64 = analysis.breakdowns.iter().map(|b| b.weight_percentage).sum();
        assert!((weights - 100.0).abs() < 1e-9);
    }
}
