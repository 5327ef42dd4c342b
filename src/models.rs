use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    Number,
    Percentage,
    Currency,
    DurationSeconds,
    Text,
}

impl UnitType {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitType::Number => "number",
            UnitType::Percentage => "percentage",
            UnitType::Currency => "currency",
            UnitType::DurationSeconds => "duration_seconds",
            UnitType::Text => "text",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "number" => Some(UnitType::Number),
            "percentage" => Some(UnitType::Percentage),
            "currency" => Some(UnitType::Currency),
            "duration_seconds" => Some(UnitType::DurationSeconds),
            "text" => Some(UnitType::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBand {
    Green,
    Yellow,
    Red,
}

impl StatusBand {
    pub fn color(self) -> &'static str {
        match self {
            StatusBand::Green => "#22c55e",
            StatusBand::Yellow => "#eab308",
            StatusBand::Red => "#ef4444",
        }
    }

    pub fn text_color(self) -> &'static str {
        match self {
            StatusBand::Yellow => "#1f2937",
            StatusBand::Green | StatusBand::Red => "#ffffff",
        }
    }
}

#[derive(Debug, Clone)]
pub struct KpiRecord {
    pub kpi_id: Uuid,
    pub kpi_name: String,
    pub description: Option<String>,
    pub unit_type: UnitType,
    pub default_monthly_target: Option<f64>,
    pub sub_category_id: Uuid,
    pub sub_category_name: String,
    pub sub_category_order: i32,
    pub stage_id: Uuid,
    pub stage_name: String,
    pub stage_order: i32,
    pub stage_color: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Week {
    pub id: String,
    pub year: i32,
    pub week_number: u32,
    pub month: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Week {
    /// The week is assigned wholesale to the (year, month) of its start date,
    /// even when the date range crosses a month boundary.
    pub fn from_range(start: NaiveDate, end: NaiveDate) -> Self {
        let week_number = start.iso_week().week();
        Self {
            id: week_label(week_number, start, end),
            year: start.year(),
            week_number,
            month: start.month(),
            start_date: start,
            end_date: end,
        }
    }
}

pub fn week_label(week_number: u32, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "Week {} [{}-{}]",
        week_number,
        start.format("%m/%d"),
        end.format("%m/%d")
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyDataEntry {
    pub week_id: String,
    pub kpi_id: Uuid,
    pub actual_value: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyKpiTarget {
    pub kpi_id: Uuid,
    pub month_id: String,
    pub target_value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedKpiMonthlyData {
    pub kpi_id: Uuid,
    pub kpi_name: String,
    pub description: Option<String>,
    pub unit_type: UnitType,
    pub sub_category_id: Uuid,
    pub sub_category_name: String,
    pub stage_id: Uuid,
    pub stage_name: String,
    pub stage_order: i32,
    pub stage_color: String,
    pub month_id: String,
    pub summed_actual_value: Option<f64>,
    pub monthly_target_value: Option<f64>,
    pub status_percentage: Option<f64>,
    pub status: Option<StatusBand>,
    pub status_color: Option<&'static str>,
    pub status_text_color: Option<&'static str>,
    pub percentage_change_vs_previous_month: String,
    pub weekly_entries: Vec<WeeklyDataEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiNode {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub unit_type: UnitType,
    pub default_monthly_target: Option<f64>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubCategoryNode {
    pub id: Uuid,
    pub name: String,
    pub display_order: i32,
    pub kpis: Vec<KpiNode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageNode {
    pub id: Uuid,
    pub name: String,
    pub display_order: i32,
    pub color_code: String,
    pub sub_categories: Vec<SubCategoryNode>,
}
