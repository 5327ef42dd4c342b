use std::collections::{BTreeSet, HashSet};

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::aggregate;
use crate::models::{
    KpiNode, KpiRecord, MonthlyKpiTarget, StageNode, SubCategoryNode, UnitType, Week,
    WeeklyDataEntry,
};
use crate::overview::{self, MonthlyOverview};

#[derive(Debug, thiserror::Error)]
pub enum BulkUpsertError {
    #[error("unknown KPI ids: {0:?}")]
    MissingKpis(Vec<Uuid>),
    #[error("unknown week ids: {0:?}")]
    MissingWeeks(Vec<String>),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let stages = vec![
        ("Aware", 1, "#3b82f6"),
        ("Engage", 2, "#06b6d4"),
        ("Subscribe", 3, "#10b981"),
        ("Convert", 4, "#f59e0b"),
        ("Excite", 5, "#f97316"),
        ("Ascend", 6, "#8b5cf6"),
        ("Advocate", 7, "#ec4899"),
        ("Promote", 8, "#ef4444"),
    ];

    for (name, display_order, color_code) in stages {
        sqlx::query(
            r#"
            INSERT INTO kpi_scorecard.cvj_stages (id, name, display_order, color_code)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE
            SET display_order = EXCLUDED.display_order, color_code = EXCLUDED.color_code
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(display_order)
        .bind(color_code)
        .execute(pool)
        .await?;
    }

    let sub_categories = vec![
        ("Aware", "Reach", 1),
        ("Engage", "Content", 1),
        ("Subscribe", "List Growth", 1),
        ("Convert", "Sales", 1),
        ("Excite", "Activation", 1),
        ("Ascend", "Expansion", 1),
        ("Advocate", "Referrals", 1),
        ("Promote", "Promotion", 1),
    ];

    for (stage_name, name, display_order) in sub_categories {
        let stage_id: Uuid =
            sqlx::query("SELECT id FROM kpi_scorecard.cvj_stages WHERE name = $1")
                .bind(stage_name)
                .fetch_one(pool)
                .await?
                .get("id");

        sqlx::query(
            r#"
            INSERT INTO kpi_scorecard.sub_categories (id, stage_id, name, display_order)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (stage_id, name) DO UPDATE
            SET display_order = EXCLUDED.display_order
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(stage_id)
        .bind(name)
        .bind(display_order)
        .execute(pool)
        .await?;
    }

    let kpis = vec![
        ("Reach", "Website Sessions", UnitType::Number, Some(20000.0)),
        ("Reach", "Social Impressions", UnitType::Number, None),
        ("Content", "Email Click Rate", UnitType::Percentage, Some(3.5)),
        ("Content", "Avg Read Time", UnitType::DurationSeconds, Some(90.0)),
        ("List Growth", "New Subscribers", UnitType::Number, Some(1000.0)),
        ("Sales", "New Customers", UnitType::Number, Some(120.0)),
        ("Sales", "Revenue", UnitType::Currency, Some(50000.0)),
        ("Activation", "Onboarding Completion", UnitType::Percentage, Some(85.0)),
        ("Expansion", "Upsell Revenue", UnitType::Currency, Some(15000.0)),
        ("Referrals", "NPS Responses", UnitType::Number, Some(200.0)),
        ("Promotion", "Referral Signups", UnitType::Number, Some(150.0)),
    ];

    for (sub_category, name, unit_type, default_target) in kpis {
        let sub_category_id: Uuid =
            sqlx::query("SELECT id FROM kpi_scorecard.sub_categories WHERE name = $1")
                .bind(sub_category)
                .fetch_one(pool)
                .await?
                .get("id");

        sqlx::query(
            r#"
            INSERT INTO kpi_scorecard.kpis
            (id, sub_category_id, name, unit_type, default_monthly_target, is_active)
            VALUES ($1, $2, $3, $4, $5, TRUE)
            ON CONFLICT (name) DO UPDATE
            SET unit_type = EXCLUDED.unit_type,
                default_monthly_target = EXCLUDED.default_monthly_target
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(sub_category_id)
        .bind(name)
        .bind(unit_type.as_str())
        .bind(default_target)
        .execute(pool)
        .await?;
    }

    let week_ranges = vec![
        ((2024, 4, 8), (2024, 4, 14)),
        ((2024, 4, 15), (2024, 4, 21)),
        ((2024, 4, 22), (2024, 4, 28)),
        ((2024, 4, 29), (2024, 5, 5)),
        ((2024, 5, 6), (2024, 5, 12)),
        ((2024, 5, 13), (2024, 5, 19)),
        ((2024, 5, 20), (2024, 5, 26)),
        ((2024, 5, 27), (2024, 6, 2)),
    ];

    let mut weeks = Vec::new();
    for ((sy, sm, sd), (ey, em, ed)) in week_ranges {
        let start = NaiveDate::from_ymd_opt(sy, sm, sd).context("invalid seed date")?;
        let end = NaiveDate::from_ymd_opt(ey, em, ed).context("invalid seed date")?;
        weeks.push(upsert_week(pool, start, end).await?);
    }

    let entries = vec![
        ("Website Sessions", 0, Some(4300.0)),
        ("Website Sessions", 1, Some(4100.0)),
        ("Website Sessions", 2, Some(4600.0)),
        ("Website Sessions", 4, Some(5200.0)),
        ("Website Sessions", 5, Some(4800.0)),
        ("Website Sessions", 6, Some(5600.0)),
        ("Website Sessions", 7, Some(5100.0)),
        ("New Subscribers", 0, Some(50.0)),
        ("New Subscribers", 1, Some(55.0)),
        ("New Subscribers", 4, Some(60.0)),
        ("New Subscribers", 5, Some(70.0)),
        ("New Subscribers", 6, Some(55.0)),
        ("New Subscribers", 7, Some(65.0)),
        ("Revenue", 4, Some(12000.0)),
        ("Revenue", 5, Some(9000.0)),
        ("Revenue", 6, Some(8000.0)),
        ("Revenue", 7, Some(10000.0)),
        ("New Customers", 4, Some(20.0)),
        ("New Customers", 5, Some(25.0)),
        ("New Customers", 6, Some(30.0)),
        ("New Customers", 7, Some(28.0)),
        ("Email Click Rate", 4, Some(0.8)),
        ("Email Click Rate", 5, Some(0.9)),
        ("Email Click Rate", 6, Some(0.7)),
        ("Email Click Rate", 7, Some(0.6)),
        ("Onboarding Completion", 4, None),
    ];

    for (kpi_name, week_index, actual_value) in entries {
        let kpi_id: Uuid = sqlx::query("SELECT id FROM kpi_scorecard.kpis WHERE name = $1")
            .bind(kpi_name)
            .fetch_one(pool)
            .await?
            .get("id");
        let week = weeks.get(week_index).context("seed week out of range")?;

        sqlx::query(
            r#"
            INSERT INTO kpi_scorecard.weekly_data_entries (week_id, kpi_id, actual_value)
            VALUES ($1, $2, $3)
            ON CONFLICT (week_id, kpi_id) DO UPDATE
            SET actual_value = EXCLUDED.actual_value
            "#,
        )
        .bind(&week.id)
        .bind(kpi_id)
        .bind(actual_value)
        .execute(pool)
        .await?;
    }

    let subscriber_kpi: Uuid = sqlx::query("SELECT id FROM kpi_scorecard.kpis WHERE name = $1")
        .bind("New Subscribers")
        .fetch_one(pool)
        .await?
        .get("id");

    sqlx::query(
        r#"
        INSERT INTO kpi_scorecard.monthly_kpi_targets (kpi_id, month_id, target_value)
        VALUES ($1, $2, $3)
        ON CONFLICT (kpi_id, month_id) DO UPDATE
        SET target_value = EXCLUDED.target_value
        "#,
    )
    .bind(subscriber_kpi)
    .bind("2024-05")
    .bind(200.0)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_active_kpis(
    pool: &PgPool,
    stage_id: Option<Uuid>,
) -> anyhow::Result<Vec<KpiRecord>> {
    let mut query = String::from(
        "SELECT k.id AS kpi_id, k.name AS kpi_name, k.description, k.unit_type, \
         k.default_monthly_target, \
         sc.id AS sub_category_id, sc.name AS sub_category_name, \
         sc.display_order AS sub_category_order, \
         st.id AS stage_id, st.name AS stage_name, \
         st.display_order AS stage_order, st.color_code AS stage_color \
         FROM kpi_scorecard.kpis k \
         JOIN kpi_scorecard.sub_categories sc ON sc.id = k.sub_category_id \
         JOIN kpi_scorecard.cvj_stages st ON st.id = sc.stage_id \
         WHERE k.is_active",
    );

    if stage_id.is_some() {
        query.push_str(" AND st.id = $1");
    }
    query.push_str(" ORDER BY st.display_order, sc.display_order, k.name");

    let mut rows = sqlx::query(&query);
    if let Some(value) = stage_id {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut kpis = Vec::new();

    for row in records {
        let unit: String = row.get("unit_type");
        let unit_type = UnitType::parse(&unit)
            .with_context(|| format!("unknown unit type {unit:?} in kpis table"))?;
        kpis.push(KpiRecord {
            kpi_id: row.get("kpi_id"),
            kpi_name: row.get("kpi_name"),
            description: row.get("description"),
            unit_type,
            default_monthly_target: row.get("default_monthly_target"),
            sub_category_id: row.get("sub_category_id"),
            sub_category_name: row.get("sub_category_name"),
            sub_category_order: row.get("sub_category_order"),
            stage_id: row.get("stage_id"),
            stage_name: row.get("stage_name"),
            stage_order: row.get("stage_order"),
            stage_color: row.get("stage_color"),
        });
    }

    Ok(kpis)
}

pub async fn fetch_weeks(
    pool: &PgPool,
    year: Option<i32>,
    month: Option<u32>,
) -> anyhow::Result<Vec<Week>> {
    let mut query = String::from(
        "SELECT id, year, week_number, month, start_date, end_date \
         FROM kpi_scorecard.weeks WHERE TRUE",
    );

    if year.is_some() && month.is_some() {
        query.push_str(" AND year = $1 AND month = $2");
    } else if year.is_some() {
        query.push_str(" AND year = $1");
    } else if month.is_some() {
        query.push_str(" AND month = $1");
    }
    query.push_str(" ORDER BY year, week_number");

    let mut rows = sqlx::query(&query);
    if let Some(value) = year {
        rows = rows.bind(value);
    }
    if let Some(value) = month {
        rows = rows.bind(value as i32);
    }

    let records = rows.fetch_all(pool).await?;
    let mut weeks = Vec::new();

    for row in records {
        weeks.push(Week {
            id: row.get("id"),
            year: row.get("year"),
            week_number: row.get::<i32, _>("week_number") as u32,
            month: row.get::<i32, _>("month") as u32,
            start_date: row.get("start_date"),
            end_date: row.get("end_date"),
        });
    }

    Ok(weeks)
}

pub async fn fetch_entries_for_weeks(
    pool: &PgPool,
    week_ids: &[String],
) -> anyhow::Result<Vec<WeeklyDataEntry>> {
    if week_ids.is_empty() {
        return Ok(Vec::new());
    }

    let records = sqlx::query(
        "SELECT week_id, kpi_id, actual_value, notes \
         FROM kpi_scorecard.weekly_data_entries \
         WHERE week_id = ANY($1) \
         ORDER BY week_id, kpi_id",
    )
    .bind(week_ids)
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::new();
    for row in records {
        entries.push(WeeklyDataEntry {
            week_id: row.get("week_id"),
            kpi_id: row.get("kpi_id"),
            actual_value: row.get("actual_value"),
            notes: row.get("notes"),
        });
    }

    Ok(entries)
}

pub async fn fetch_targets_for_month(
    pool: &PgPool,
    month_id: &str,
) -> anyhow::Result<Vec<MonthlyKpiTarget>> {
    let records = sqlx::query(
        "SELECT kpi_id, month_id, target_value \
         FROM kpi_scorecard.monthly_kpi_targets WHERE month_id = $1",
    )
    .bind(month_id)
    .fetch_all(pool)
    .await?;

    let mut targets = Vec::new();
    for row in records {
        targets.push(MonthlyKpiTarget {
            kpi_id: row.get("kpi_id"),
            month_id: row.get("month_id"),
            target_value: row.get("target_value"),
        });
    }

    Ok(targets)
}

pub async fn fetch_stage_tree(pool: &PgPool) -> anyhow::Result<Vec<StageNode>> {
    let records = sqlx::query(
        "SELECT st.id AS stage_id, st.name AS stage_name, \
         st.display_order AS stage_order, st.color_code, \
         sc.id AS sub_id, sc.name AS sub_name, sc.display_order AS sub_order, \
         k.id AS kpi_id, k.name AS kpi_name, k.description, k.unit_type, \
         k.default_monthly_target, k.is_active \
         FROM kpi_scorecard.cvj_stages st \
         LEFT JOIN kpi_scorecard.sub_categories sc ON sc.stage_id = st.id \
         LEFT JOIN kpi_scorecard.kpis k ON k.sub_category_id = sc.id \
         ORDER BY st.display_order, sc.display_order, k.name",
    )
    .fetch_all(pool)
    .await?;

    let mut stages: Vec<StageNode> = Vec::new();
    for row in records {
        let stage_id: Uuid = row.get("stage_id");
        if stages.last().map(|s| s.id) != Some(stage_id) {
            stages.push(StageNode {
                id: stage_id,
                name: row.get("stage_name"),
                display_order: row.get("stage_order"),
                color_code: row.get("color_code"),
                sub_categories: Vec::new(),
            });
        }
        let Some(stage) = stages.last_mut() else {
            continue;
        };

        let Some(sub_id) = row.get::<Option<Uuid>, _>("sub_id") else {
            continue;
        };
        if stage.sub_categories.last().map(|s| s.id) != Some(sub_id) {
            stage.sub_categories.push(SubCategoryNode {
                id: sub_id,
                name: row.get("sub_name"),
                display_order: row.get("sub_order"),
                kpis: Vec::new(),
            });
        }
        let Some(sub_category) = stage.sub_categories.last_mut() else {
            continue;
        };

        let Some(kpi_id) = row.get::<Option<Uuid>, _>("kpi_id") else {
            continue;
        };
        let unit: String = row.get("unit_type");
        let unit_type = UnitType::parse(&unit)
            .with_context(|| format!("unknown unit type {unit:?} in kpis table"))?;
        sub_category.kpis.push(KpiNode {
            id: kpi_id,
            name: row.get("kpi_name"),
            description: row.get("description"),
            unit_type,
            default_monthly_target: row.get("default_monthly_target"),
            is_active: row.get("is_active"),
        });
    }

    Ok(stages)
}

pub async fn upsert_week(pool: &PgPool, start: NaiveDate, end: NaiveDate) -> anyhow::Result<Week> {
    let week = Week::from_range(start, end);

    sqlx::query(
        r#"
        INSERT INTO kpi_scorecard.weeks (id, year, week_number, month, start_date, end_date)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE
        SET year = EXCLUDED.year,
            week_number = EXCLUDED.week_number,
            month = EXCLUDED.month,
            start_date = EXCLUDED.start_date,
            end_date = EXCLUDED.end_date
        "#,
    )
    .bind(&week.id)
    .bind(week.year)
    .bind(week.week_number as i32)
    .bind(week.month as i32)
    .bind(week.start_date)
    .bind(week.end_date)
    .execute(pool)
    .await?;

    Ok(week)
}

/// Validates every referenced id before writing, then applies the whole batch
/// inside one transaction: a batch either lands completely or not at all.
pub async fn bulk_upsert_entries(
    pool: &PgPool,
    entries: &[WeeklyDataEntry],
) -> Result<usize, BulkUpsertError> {
    let kpi_ids: Vec<Uuid> = entries
        .iter()
        .map(|e| e.kpi_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let missing = missing_kpis(pool, &kpi_ids).await?;
    if !missing.is_empty() {
        return Err(BulkUpsertError::MissingKpis(missing));
    }

    let week_ids: Vec<String> = entries
        .iter()
        .map(|e| e.week_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let missing = missing_weeks(pool, &week_ids).await?;
    if !missing.is_empty() {
        return Err(BulkUpsertError::MissingWeeks(missing));
    }

    let mut tx = pool.begin().await?;
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO kpi_scorecard.weekly_data_entries (week_id, kpi_id, actual_value, notes)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (week_id, kpi_id) DO UPDATE
            SET actual_value = EXCLUDED.actual_value, notes = EXCLUDED.notes
            "#,
        )
        .bind(&entry.week_id)
        .bind(entry.kpi_id)
        .bind(entry.actual_value)
        .bind(&entry.notes)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(entries.len())
}

pub async fn bulk_upsert_targets(
    pool: &PgPool,
    targets: &[MonthlyKpiTarget],
) -> Result<usize, BulkUpsertError> {
    let kpi_ids: Vec<Uuid> = targets
        .iter()
        .map(|t| t.kpi_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let missing = missing_kpis(pool, &kpi_ids).await?;
    if !missing.is_empty() {
        return Err(BulkUpsertError::MissingKpis(missing));
    }

    let mut tx = pool.begin().await?;
    for target in targets {
        sqlx::query(
            r#"
            INSERT INTO kpi_scorecard.monthly_kpi_targets (kpi_id, month_id, target_value)
            VALUES ($1, $2, $3)
            ON CONFLICT (kpi_id, month_id) DO UPDATE
            SET target_value = EXCLUDED.target_value
            "#,
        )
        .bind(target.kpi_id)
        .bind(&target.month_id)
        .bind(target.target_value)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(targets.len())
}

async fn missing_kpis(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Uuid>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query("SELECT id FROM kpi_scorecard.kpis WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await?;
    let existing: HashSet<Uuid> = rows.iter().map(|r| r.get("id")).collect();
    Ok(ids.iter().filter(|id| !existing.contains(id)).copied().collect())
}

async fn missing_weeks(pool: &PgPool, ids: &[String]) -> Result<Vec<String>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query("SELECT id FROM kpi_scorecard.weeks WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await?;
    let existing: HashSet<String> = rows.iter().map(|r| r.get("id")).collect();
    Ok(ids
        .iter()
        .filter(|id| !existing.contains(*id))
        .cloned()
        .collect())
}

pub async fn load_monthly_overview(
    pool: &PgPool,
    month_id: &str,
    stage_id: Option<Uuid>,
) -> anyhow::Result<MonthlyOverview> {
    let previous = aggregate::previous_month_id(month_id)
        .with_context(|| format!("month id {month_id:?} must be formatted YYYY-MM"))?;

    let kpis = fetch_active_kpis(pool, stage_id).await?;
    let weeks = fetch_weeks(pool, None, None).await?;
    let relevant_weeks: Vec<String> = weeks
        .iter()
        .filter(|w| {
            let id = aggregate::month_id(w.year, w.month);
            id == month_id || id == previous
        })
        .map(|w| w.id.clone())
        .collect();
    let entries = fetch_entries_for_weeks(pool, &relevant_weeks).await?;
    let targets = fetch_targets_for_month(pool, month_id).await?;

    Ok(overview::build_monthly_overview(
        month_id, &kpis, &entries, &targets, &weeks,
    ))
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        kpi: String,
        week_start: NaiveDate,
        week_end: NaiveDate,
        actual_value: Option<f64>,
        notes: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let kpi_id: Uuid = sqlx::query("SELECT id FROM kpi_scorecard.kpis WHERE name = $1")
            .bind(&row.kpi)
            .fetch_one(pool)
            .await
            .with_context(|| format!("unknown KPI {:?} in CSV", row.kpi))?
            .get("id");

        let week = upsert_week(pool, row.week_start, row.week_end).await?;

        sqlx::query(
            r#"
            INSERT INTO kpi_scorecard.weekly_data_entries (week_id, kpi_id, actual_value, notes)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (week_id, kpi_id) DO UPDATE
            SET actual_value = EXCLUDED.actual_value, notes = EXCLUDED.notes
            "#,
        )
        .bind(&week.id)
        .bind(kpi_id)
        .bind(row.actual_value)
        .bind(&row.notes)
        .execute(pool)
        .await?;

        imported += 1;
    }

    Ok(imported)
}
