use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    KpiRecord, MonthlyKpiTarget, ProcessedKpiMonthlyData, StatusBand, Week, WeeklyDataEntry,
};

pub const GREEN_THRESHOLD: f64 = 95.0;
pub const YELLOW_THRESHOLD: f64 = 70.0;

pub fn parse_month_id(month_id: &str) -> Option<(i32, u32)> {
    let (year, month) = month_id.split_once('-')?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some((year, month))
}

pub fn month_id(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

pub fn previous_year_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

pub fn previous_month_id(current: &str) -> Option<String> {
    let (year, month) = parse_month_id(current)?;
    let (prev_year, prev_month) = previous_year_month(year, month);
    Some(month_id(prev_year, prev_month))
}

pub fn month_name(month_id: &str) -> Option<String> {
    let (year, month) = parse_month_id(month_id)?;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(first.format("%B %Y").to_string())
}

pub fn status_band(percentage: f64) -> StatusBand {
    if percentage >= GREEN_THRESHOLD {
        StatusBand::Green
    } else if percentage >= YELLOW_THRESHOLD {
        StatusBand::Yellow
    } else {
        StatusBand::Red
    }
}

/// A positive target scores actual/target unclamped. A zero or missing target
/// counts as achieved, whatever the actual. No data and no target scores
/// nothing at all.
pub fn status_percentage(actual: Option<f64>, target: Option<f64>) -> Option<f64> {
    match target {
        Some(t) if t > 0.0 => Some(actual.unwrap_or(0.0) / t * 100.0),
        Some(_) => Some(100.0),
        None => actual.map(|_| 100.0),
    }
}

pub fn percentage_change(current: Option<f64>, previous: Option<f64>) -> String {
    let (Some(current), Some(previous)) = (current, previous) else {
        return "N/A".to_string();
    };
    if previous == 0.0 {
        return if current > 0.0 {
            "+∞%".to_string()
        } else if current == 0.0 {
            "0%".to_string()
        } else {
            "-∞%".to_string()
        };
    }
    format!("{:+.1}%", (current - previous) / previous * 100.0)
}

pub fn aggregate_month(
    month_id: &str,
    kpis: &[KpiRecord],
    weekly_data: &[WeeklyDataEntry],
    targets: &[MonthlyKpiTarget],
    weeks: &[Week],
) -> Vec<ProcessedKpiMonthlyData> {
    let Some((year, month)) = parse_month_id(month_id) else {
        return Vec::new();
    };
    if kpis.is_empty() {
        return Vec::new();
    }

    let (prev_year, prev_month) = previous_year_month(year, month);
    let current_weeks = week_ids_for(weeks, year, month);
    let previous_weeks = week_ids_for(weeks, prev_year, prev_month);
    let week_starts: HashMap<&str, NaiveDate> = weeks
        .iter()
        .map(|w| (w.id.as_str(), w.start_date))
        .collect();
    let overrides: HashMap<Uuid, f64> = targets
        .iter()
        .filter(|t| t.month_id == month_id)
        .map(|t| (t.kpi_id, t.target_value))
        .collect();

    let mut ordered: Vec<&KpiRecord> = kpis.iter().collect();
    ordered.sort_by(|a, b| {
        a.stage_order
            .cmp(&b.stage_order)
            .then_with(|| a.sub_category_order.cmp(&b.sub_category_order))
            .then_with(|| a.kpi_name.cmp(&b.kpi_name))
    });

    ordered
        .into_iter()
        .map(|kpi| {
            let mut entries: Vec<WeeklyDataEntry> = weekly_data
                .iter()
                .filter(|e| e.kpi_id == kpi.kpi_id && current_weeks.contains(e.week_id.as_str()))
                .cloned()
                .collect();
            entries.sort_by_key(|e| week_starts.get(e.week_id.as_str()).copied());

            let current_sum = sum_entries(&entries, &current_weeks);
            let previous_entries: Vec<WeeklyDataEntry> = weekly_data
                .iter()
                .filter(|e| e.kpi_id == kpi.kpi_id && previous_weeks.contains(e.week_id.as_str()))
                .cloned()
                .collect();
            let previous_sum = sum_entries(&previous_entries, &previous_weeks);

            let target = overrides
                .get(&kpi.kpi_id)
                .copied()
                .or(kpi.default_monthly_target);
            let percentage = status_percentage(current_sum, target);
            let status = percentage.map(status_band);

            ProcessedKpiMonthlyData {
                kpi_id: kpi.kpi_id,
                kpi_name: kpi.kpi_name.clone(),
                description: kpi.description.clone(),
                unit_type: kpi.unit_type,
                sub_category_id: kpi.sub_category_id,
                sub_category_name: kpi.sub_category_name.clone(),
                stage_id: kpi.stage_id,
                stage_name: kpi.stage_name.clone(),
                stage_order: kpi.stage_order,
                stage_color: kpi.stage_color.clone(),
                month_id: month_id.to_string(),
                summed_actual_value: current_sum,
                monthly_target_value: target,
                status_percentage: percentage,
                status,
                status_color: status.map(StatusBand::color),
                status_text_color: status.map(StatusBand::text_color),
                percentage_change_vs_previous_month: percentage_change(current_sum, previous_sum),
                weekly_entries: entries,
            }
        })
        .collect()
}

fn week_ids_for(weeks: &[Week], year: i32, month: u32) -> HashSet<&str> {
    weeks
        .iter()
        .filter(|w| w.year == year && w.month == month)
        .map(|w| w.id.as_str())
        .collect()
}

/// None only when the month has no week rows at all; an empty entry set over
/// existing weeks sums to zero, and a null actual counts as zero.
fn sum_entries(entries: &[WeeklyDataEntry], month_weeks: &HashSet<&str>) -> Option<f64> {
    if month_weeks.is_empty() {
        return None;
    }
    Some(entries.iter().map(|e| e.actual_value.unwrap_or(0.0)).sum())
}
