use serde::Serialize;

use crate::aggregate;
use crate::models::{KpiRecord, MonthlyKpiTarget, ProcessedKpiMonthlyData, StatusBand, Week, WeeklyDataEntry};
use crate::rollup::{self, StagePerformance};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewSummary {
    pub total_kpis: usize,
    pub kpis_on_track: usize,
    pub kpis_at_risk: usize,
    pub kpis_below_target: usize,
    pub overall_health_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyOverview {
    pub month: String,
    pub month_name: String,
    pub summary: OverviewSummary,
    pub stage_performance: Vec<StagePerformance>,
    pub kpi_details: Vec<ProcessedKpiMonthlyData>,
}

pub fn build_monthly_overview(
    month_id: &str,
    kpis: &[KpiRecord],
    weekly_data: &[WeeklyDataEntry],
    targets: &[MonthlyKpiTarget],
    weeks: &[Week],
) -> MonthlyOverview {
    let details = aggregate::aggregate_month(month_id, kpis, weekly_data, targets, weeks);

    let count_band = |band: StatusBand| {
        details
            .iter()
            .filter(|d| d.status == Some(band))
            .count()
    };

    MonthlyOverview {
        month: month_id.to_string(),
        month_name: aggregate::month_name(month_id).unwrap_or_else(|| month_id.to_string()),
        summary: OverviewSummary {
            total_kpis: details.len(),
            kpis_on_track: count_band(StatusBand::Green),
            kpis_at_risk: count_band(StatusBand::Yellow),
            kpis_below_target: count_band(StatusBand::Red),
            overall_health_score: rollup::overall_health_score(&details),
        },
        stage_performance: rollup::stage_performance(&details),
        kpi_details: details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitType;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn kpi(stage: &str, order: i32, name: &str, target: Option<f64>) -> KpiRecord {
        KpiRecord {
            kpi_id: Uuid::new_v4(),
            kpi_name: name.to_string(),
            description: None,
            unit_type: UnitType::Number,
            default_monthly_target: target,
            sub_category_id: Uuid::new_v4(),
            sub_category_name: "Reach".to_string(),
            sub_category_order: 1,
            stage_id: Uuid::new_v4(),
            stage_name: stage.to_string(),
            stage_order: order,
            stage_color: "#3b82f6".to_string(),
        }
    }

    fn may_week(day: u32) -> Week {
        let start = NaiveDate::from_ymd_opt(2024, 5, day).unwrap();
        Week::from_range(start, start + chrono::Duration::days(6))
    }

    #[test]
    fn summary_counts_match_status_bands() {
        let green = kpi("Aware", 1, "Sessions", Some(100.0));
        let yellow = kpi("Engage", 2, "Read Time", Some(100.0));
        let red = kpi("Convert", 4, "Revenue", Some(100.0));
        let week = may_week(6);
        let data = vec![
            WeeklyDataEntry {
                week_id: week.id.clone(),
                kpi_id: green.kpi_id,
                actual_value: Some(100.0),
                notes: None,
            },
            WeeklyDataEntry {
                week_id: week.id.clone(),
                kpi_id: yellow.kpi_id,
                actual_value: Some(80.0),
                notes: None,
            },
            WeeklyDataEntry {
                week_id: week.id.clone(),
                kpi_id: red.kpi_id,
                actual_value: Some(10.0),
                notes: None,
            },
        ];

        let overview = build_monthly_overview(
            "2024-05",
            &[green, yellow, red],
            &data,
            &[],
            &[week],
        );

        assert_eq!(overview.month, "2024-05");
        assert_eq!(overview.month_name, "May 2024");
        assert_eq!(overview.summary.total_kpis, 3);
        assert_eq!(overview.summary.kpis_on_track, 1);
        assert_eq!(overview.summary.kpis_at_risk, 1);
        assert_eq!(overview.summary.kpis_below_target, 1);
        assert_eq!(overview.stage_performance.len(), 3);
        assert_eq!(overview.kpi_details.len(), 3);
    }

    #[test]
    fn health_score_averages_only_targeted_kpis() {
        let scored = kpi("Aware", 1, "Sessions", Some(100.0));
        let vacuous = kpi("Aware", 1, "Untargeted", None);
        let week = may_week(6);
        let data = vec![WeeklyDataEntry {
            week_id: week.id.clone(),
            kpi_id: scored.kpi_id,
            actual_value: Some(50.0),
            notes: None,
        }];

        let overview = build_monthly_overview("2024-05", &[scored, vacuous], &data, &[], &[week]);
        assert!((overview.summary.overall_health_score.unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn serializes_with_camel_case_wire_names() {
        let overview = build_monthly_overview("2024-05", &[kpi("Aware", 1, "S", None)], &[], &[], &[may_week(6)]);
        let json = serde_json::to_value(&overview).unwrap();
        assert!(json.get("monthName").is_some());
        assert!(json["summary"].get("totalKpis").is_some());
        assert!(json["summary"].get("kpisOnTrack").is_some());
        assert!(json.get("stagePerformance").is_some());
        assert!(json["kpiDetails"][0].get("summedActualValue").is_some());
        assert!(json["kpiDetails"][0]
            .get("percentageChangeVsPreviousMonth")
            .is_some());
    }
}
