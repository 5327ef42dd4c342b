use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::models::ProcessedKpiMonthlyData;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPerformer {
    pub kpi_id: Uuid,
    pub kpi_name: String,
    pub status_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagePerformance {
    pub stage_id: Uuid,
    pub stage_name: String,
    pub color_code: String,
    pub kpi_count: usize,
    pub average_status_percentage: Option<f64>,
    pub top_performer: Option<TopPerformer>,
}

struct StageAccumulator {
    stage_name: String,
    color_code: String,
    stage_order: i32,
    kpi_count: usize,
    percentage_sum: f64,
    percentage_count: usize,
    top: Option<TopPerformer>,
}

pub fn stage_performance(results: &[ProcessedKpiMonthlyData]) -> Vec<StagePerformance> {
    let mut map: HashMap<Uuid, StageAccumulator> = HashMap::new();

    for result in results {
        let acc = map
            .entry(result.stage_id)
            .or_insert_with(|| StageAccumulator {
                stage_name: result.stage_name.clone(),
                color_code: result.stage_color.clone(),
                stage_order: result.stage_order,
                kpi_count: 0,
                percentage_sum: 0.0,
                percentage_count: 0,
                top: None,
            });

        acc.kpi_count += 1;
        if let Some(percentage) = result.status_percentage {
            acc.percentage_sum += percentage;
            acc.percentage_count += 1;
            let beats_current = acc
                .top
                .as_ref()
                .map(|top| percentage > top.status_percentage)
                .unwrap_or(true);
            if beats_current {
                acc.top = Some(TopPerformer {
                    kpi_id: result.kpi_id,
                    kpi_name: result.kpi_name.clone(),
                    status_percentage: percentage,
                });
            }
        }
    }

    let mut stages: Vec<(i32, StagePerformance)> = map
        .into_iter()
        .map(|(stage_id, acc)| {
            let average = if acc.percentage_count == 0 {
                None
            } else {
                Some(acc.percentage_sum / acc.percentage_count as f64)
            };
            (
                acc.stage_order,
                StagePerformance {
                    stage_id,
                    stage_name: acc.stage_name,
                    color_code: acc.color_code,
                    kpi_count: acc.kpi_count,
                    average_status_percentage: average,
                    top_performer: acc.top,
                },
            )
        })
        .collect();

    stages.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.stage_name.cmp(&b.1.stage_name)));
    stages.into_iter().map(|(_, stage)| stage).collect()
}

/// Averages only KPIs with a real (positive) target, so the scored-100-by-
/// convention cases cannot inflate the overall number.
pub fn overall_health_score(results: &[ProcessedKpiMonthlyData]) -> Option<f64> {
    let scored: Vec<f64> = results
        .iter()
        .filter(|r| r.monthly_target_value.map(|t| t > 0.0).unwrap_or(false))
        .filter_map(|r| r.status_percentage)
        .collect();

    if scored.is_empty() {
        None
    } else {
        Some(scored.iter().sum::<f64>() / scored.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitType;

    fn result(
        stage_id: Uuid,
        stage_name: &str,
        stage_order: i32,
        kpi_name: &str,
        percentage: Option<f64>,
        target: Option<f64>,
    ) -> ProcessedKpiMonthlyData {
        ProcessedKpiMonthlyData {
            kpi_id: Uuid::new_v4(),
            kpi_name: kpi_name.to_string(),
            description: None,
            unit_type: UnitType::Number,
            sub_category_id: Uuid::new_v4(),
            sub_category_name: "Reach".to_string(),
            stage_id,
            stage_name: stage_name.to_string(),
            stage_order,
            stage_color: "#3b82f6".to_string(),
            month_id: "2024-05".to_string(),
            summed_actual_value: Some(0.0),
            monthly_target_value: target,
            status_percentage: percentage,
            status: percentage.map(crate::aggregate::status_band),
            status_color: None,
            status_text_color: None,
            percentage_change_vs_previous_month: "N/A".to_string(),
            weekly_entries: Vec::new(),
        }
    }

    #[test]
    fn groups_by_stage_in_display_order() {
        let convert = Uuid::new_v4();
        let aware = Uuid::new_v4();
        let results = vec![
            result(convert, "Convert", 4, "Revenue", Some(78.0), Some(50000.0)),
            result(aware, "Aware", 1, "Sessions", Some(103.0), Some(20000.0)),
            result(aware, "Aware", 1, "Impressions", Some(91.0), Some(150000.0)),
        ];

        let stages = stage_performance(&results);
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].stage_name, "Aware");
        assert_eq!(stages[0].kpi_count, 2);
        assert!((stages[0].average_status_percentage.unwrap() - 97.0).abs() < 1e-9);
        assert_eq!(stages[1].stage_name, "Convert");
    }

    #[test]
    fn top_performer_is_the_highest_percentage() {
        let aware = Uuid::new_v4();
        let results = vec![
            result(aware, "Aware", 1, "Sessions", Some(103.0), Some(20000.0)),
            result(aware, "Aware", 1, "Impressions", Some(91.0), Some(150000.0)),
        ];

        let stages = stage_performance(&results);
        let top = stages[0].top_performer.as_ref().unwrap();
        assert_eq!(top.kpi_name, "Sessions");
        assert!((top.status_percentage - 103.0).abs() < 1e-9);
    }

    #[test]
    fn unscored_kpis_count_but_do_not_average() {
        let aware = Uuid::new_v4();
        let results = vec![
            result(aware, "Aware", 1, "Sessions", Some(80.0), Some(20000.0)),
            result(aware, "Aware", 1, "Unscored", None, None),
        ];

        let stages = stage_performance(&results);
        assert_eq!(stages[0].kpi_count, 2);
        assert!((stages[0].average_status_percentage.unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn stage_with_no_scores_has_no_average_or_top() {
        let aware = Uuid::new_v4();
        let results = vec![result(aware, "Aware", 1, "Unscored", None, None)];

        let stages = stage_performance(&results);
        assert_eq!(stages[0].average_status_percentage, None);
        assert!(stages[0].top_performer.is_none());
    }

    #[test]
    fn health_score_skips_kpis_without_a_real_target() {
        let aware = Uuid::new_v4();
        let results = vec![
            result(aware, "Aware", 1, "Sessions", Some(80.0), Some(20000.0)),
            result(aware, "Aware", 1, "Vacuous", Some(100.0), None),
            result(aware, "Aware", 1, "ZeroTarget", Some(100.0), Some(0.0)),
            result(aware, "Aware", 1, "Revenue", Some(60.0), Some(50000.0)),
        ];

        let health = overall_health_score(&results).unwrap();
        assert!((health - 70.0).abs() < 1e-9);
    }

    #[test]
    fn health_score_is_none_when_nothing_qualifies() {
        let aware = Uuid::new_v4();
        let results = vec![result(aware, "Aware", 1, "Vacuous", Some(100.0), None)];
        assert_eq!(overall_health_score(&results), None);
    }
}
