use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod aggregate;
mod db;
mod models;
mod overview;
mod period;
mod report;
mod rollup;
mod server;

#[derive(Parser)]
#[command(name = "kpi-scorecard")]
#[command(about = "Marketing KPI scorecard service and tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the CVJ stage tree and sample scorecard data
    Seed,
    /// Import weekly data entries from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the monthly overview for a month
    Overview {
        #[arg(long)]
        month: String,
        #[arg(long)]
        stage: Option<Uuid>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Write a markdown scorecard report for a month
    Report {
        #[arg(long)]
        month: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Start the HTTP API
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let imported = db::import_csv(&pool, &csv).await?;
            println!("Imported {imported} entries from {}.", csv.display());
        }
        Commands::Overview { month, stage, json } => {
            aggregate::parse_month_id(&month)
                .with_context(|| format!("month {month:?} must be formatted YYYY-MM"))?;
            let overview = db::load_monthly_overview(&pool, &month, stage).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&overview)?);
                return Ok(());
            }

            let summary = &overview.summary;
            println!("Monthly overview for {}:", overview.month_name);
            println!(
                "- {} KPIs: {} on track, {} at risk, {} below target",
                summary.total_kpis,
                summary.kpis_on_track,
                summary.kpis_at_risk,
                summary.kpis_below_target
            );
            match summary.overall_health_score {
                Some(score) => println!("- Overall health: {score:.1}%"),
                None => println!("- Overall health: no KPIs with a target"),
            }
            for stage in overview.stage_performance.iter() {
                let average = stage
                    .average_status_percentage
                    .map(|avg| format!("{avg:.1}%"))
                    .unwrap_or_else(|| "no data".to_string());
                match &stage.top_performer {
                    Some(top) => println!(
                        "- {}: {} KPIs, avg {}, top {} ({:.1}%)",
                        stage.stage_name,
                        stage.kpi_count,
                        average,
                        top.kpi_name,
                        top.status_percentage
                    ),
                    None => println!(
                        "- {}: {} KPIs, avg {}",
                        stage.stage_name, stage.kpi_count, average
                    ),
                }
            }
        }
        Commands::Report { month, out } => {
            aggregate::parse_month_id(&month)
                .with_context(|| format!("month {month:?} must be formatted YYYY-MM"))?;
            let overview = db::load_monthly_overview(&pool, &month, None).await?;
            let report = report::build_report(&overview);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Serve { bind } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .init();
            server::serve(pool, &bind).await?;
        }
    }

    Ok(())
}
