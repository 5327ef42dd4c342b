use std::fmt::Write;

use crate::models::StatusBand;
use crate::overview::MonthlyOverview;

pub fn build_report(overview: &MonthlyOverview) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Monthly KPI Scorecard — {}", overview.month_name);
    let _ = writeln!(output);

    let summary = &overview.summary;
    let _ = writeln!(
        output,
        "{} KPIs tracked: {} on track, {} at risk, {} below target.",
        summary.total_kpis,
        summary.kpis_on_track,
        summary.kpis_at_risk,
        summary.kpis_below_target
    );
    match summary.overall_health_score {
        Some(score) => {
            let _ = writeln!(output, "Overall health score: {score:.1}%.");
        }
        None => {
            let _ = writeln!(output, "Overall health score: no KPIs with a target.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Stage Performance");

    if overview.stage_performance.is_empty() {
        let _ = writeln!(output, "No stages with active KPIs.");
    } else {
        for stage in overview.stage_performance.iter() {
            let average = stage
                .average_status_percentage
                .map(|avg| format!("{avg:.1}%"))
                .unwrap_or_else(|| "no data".to_string());
            match &stage.top_performer {
                Some(top) => {
                    let _ = writeln!(
                        output,
                        "- {}: {} KPIs, average {}, top performer {} ({:.1}%)",
                        stage.stage_name,
                        stage.kpi_count,
                        average,
                        top.kpi_name,
                        top.status_percentage
                    );
                }
                None => {
                    let _ = writeln!(
                        output,
                        "- {}: {} KPIs, average {}",
                        stage.stage_name, stage.kpi_count, average
                    );
                }
            }
        }
    }

    let mut attention: Vec<_> = overview
        .kpi_details
        .iter()
        .filter(|d| matches!(d.status, Some(StatusBand::Red) | Some(StatusBand::Yellow)))
        .collect();
    attention.sort_by(|a, b| {
        a.status_percentage
            .partial_cmp(&b.status_percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Needs Attention");

    if attention.is_empty() {
        let _ = writeln!(output, "All KPIs are at or above the on-track threshold.");
    } else {
        for detail in attention.iter().take(10) {
            let actual = detail.summed_actual_value.unwrap_or(0.0);
            let target = detail
                .monthly_target_value
                .map(|t| format!("{t:.1}"))
                .unwrap_or_else(|| "none".to_string());
            let percentage = detail
                .status_percentage
                .map(|p| format!("{p:.1}%"))
                .unwrap_or_else(|| "n/a".to_string());
            let _ = writeln!(
                output,
                "- {} ({}): {:.1} of {} ({}), MoM {}",
                detail.kpi_name,
                detail.stage_name,
                actual,
                target,
                percentage,
                detail.percentage_change_vs_previous_month
            );
        }
    }

    let mut unscored: Vec<_> = overview
        .kpi_details
        .iter()
        .filter(|d| d.status_percentage.is_none())
        .collect();
    unscored.sort_by(|a, b| a.kpi_name.cmp(&b.kpi_name));

    if !unscored.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Missing Data");
        for detail in unscored {
            let _ = writeln!(
                output,
                "- {} ({}): no weekly data recorded for {}",
                detail.kpi_name, detail.stage_name, overview.month
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KpiRecord, UnitType, Week, WeeklyDataEntry};
    use crate::overview::build_monthly_overview;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn kpi(name: &str, target: Option<f64>) -> KpiRecord {
        KpiRecord {
            kpi_id: Uuid::new_v4(),
            kpi_name: name.to_string(),
            description: None,
            unit_type: UnitType::Currency,
            default_monthly_target: target,
            sub_category_id: Uuid::new_v4(),
            sub_category_name: "Sales".to_string(),
            sub_category_order: 1,
            stage_id: Uuid::new_v4(),
            stage_name: "Convert".to_string(),
            stage_order: 4,
            stage_color: "#f59e0b".to_string(),
        }
    }

    #[test]
    fn report_contains_summary_and_sections() {
        let revenue = kpi("Revenue", Some(50000.0));
        let start = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let week = Week::from_range(start, start + chrono::Duration::days(6));
        let data = vec![WeeklyDataEntry {
            week_id: week.id.clone(),
            kpi_id: revenue.kpi_id,
            actual_value: Some(39000.0),
            notes: None,
        }];

        let overview = build_monthly_overview("2024-05", &[revenue], &data, &[], &[week]);
        let report = build_report(&overview);

        assert!(report.contains("# Monthly KPI Scorecard — May 2024"));
        assert!(report.contains("## Stage Performance"));
        assert!(report.contains("## Needs Attention"));
        assert!(report.contains("Revenue (Convert): 39000.0 of 50000.0 (78.0%)"));
    }

    #[test]
    fn clean_scorecard_reports_nothing_to_flag() {
        let sessions = kpi("Sessions", Some(100.0));
        let start = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let week = Week::from_range(start, start + chrono::Duration::days(6));
        let data = vec![WeeklyDataEntry {
            week_id: week.id.clone(),
            kpi_id: sessions.kpi_id,
            actual_value: Some(120.0),
            notes: None,
        }];

        let overview = build_monthly_overview("2024-05", &[sessions], &data, &[], &[week]);
        let report = build_report(&overview);

        assert!(report.contains("All KPIs are at or above the on-track threshold."));
        assert!(!report.contains("## Missing Data"));
    }

    #[test]
    fn unscored_kpis_land_in_missing_data() {
        let untargeted = kpi("Pipeline Notes", None);
        let overview = build_monthly_overview("2024-07", &[untargeted], &[], &[], &[]);
        let report = build_report(&overview);

        assert!(report.contains("## Missing Data"));
        assert!(report.contains("no weekly data recorded for 2024-07"));
    }
}
