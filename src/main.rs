// Entry point and high-level CLI flow.
//
// One pass: load the CSV, clean it, compute the four grouped views, then
// print previews and write the report files.
mod analysis;
mod cleaner;
mod error;
mod loader;
mod output;
mod reports;
mod types;
mod util;

use analysis::{Analysis, StateMetric, DISTRIBUTION_PERCENTILES};
use clap::Parser;
use cleaner::CleaningSchema;
use error::AppError;
use reports::{AmountThresholds, ReportConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "eidl-report")]
#[command(about = "Summarize EIDL loan records by state, day, amount and business type", long_about = None)]
struct Cli {
    /// Input CSV file
    #[arg(default_value = "DATAACT_EIDL_LOANS_20200401-20200609.csv")]
    input: PathBuf,

    /// Directory for report files
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Rows in the top-states rankings
    #[arg(long, default_value_t = 15)]
    top: usize,

    /// Rows shown in console table previews
    #[arg(long, default_value_t = 10)]
    preview_rows: usize,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level.to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// Print the exploration step: shape and columns with missing values.
fn print_profile(table: &types::Table) {
    if table.is_empty() {
        warn!("dataset has no rows");
    }
    println!(
        "Dataset shape: ({}, {})",
        util::format_int(table.len()),
        table.columns().len()
    );
    let missing: Vec<_> = table
        .missing_counts()
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .collect();
    if !missing.is_empty() {
        println!("\nMissing values:");
        for (col, n) in missing {
            println!("  {}: {}", col, util::format_int(n));
        }
    }
}

fn print_views(table: &types::Table, analysis: &Analysis, config: &ReportConfig) {
    if let Some(by_state) = &analysis.by_state {
        println!("\n{}\nGEOGRAPHIC ANALYSIS\n{}", "=".repeat(50), "=".repeat(50));
        output::preview_table(
            &format!("Top {} states by loan count", config.top_n),
            &reports::top_state_rows(by_state, StateMetric::LoanCount, config.top_n),
            config.top_n,
        );
        output::preview_table(
            &format!("Top {} states by total loan amount", config.top_n),
            &reports::top_state_rows(by_state, StateMetric::TotalAmount, config.top_n),
            config.top_n,
        );
        output::preview_table(
            &format!("Top {} states by average loan amount", config.top_n),
            &reports::top_state_rows(by_state, StateMetric::MeanAmount, config.top_n),
            config.top_n,
        );
        output::preview_table(
            &format!("Top {} states by total subsidy cost", config.top_n),
            &reports::top_state_rows(by_state, StateMetric::TotalSubsidy, config.top_n),
            config.top_n,
        );
    }

    if let Some(daily) = &analysis.by_day {
        println!("\n{}\nTEMPORAL ANALYSIS\n{}", "=".repeat(50), "=".repeat(50));
        let rows = reports::daily_rows(daily);
        let n = config.preview_rows;
        output::preview_table(&format!("Daily loan statistics (first {} days)", n), &rows, n);
        let tail_start = rows.len().saturating_sub(n);
        output::preview_table(
            &format!("Daily loan statistics (last {} days)", n),
            &rows[tail_start..],
            n,
        );
    }

    if let Some(dist) = &analysis.amounts {
        println!("\n{}\nLOAN AMOUNT ANALYSIS\n{}", "=".repeat(50), "=".repeat(50));
        for line in reports::distribution_lines(dist) {
            println!("{}", line);
        }
        output::preview_table(
            "Loan amount percentiles",
            &reports::percentile_rows(dist),
            DISTRIBUTION_PERCENTILES.len(),
        );
    }

    if let Some(business) = &analysis.by_business_type {
        println!("\n{}\nBUSINESS TYPE ANALYSIS\n{}", "=".repeat(50), "=".repeat(50));
        output::preview_table(
            "Business types analysis",
            &reports::business_type_rows(business),
            config.preview_rows,
        );
    }

    info!("{} cleaned rows available to the reporter", table.len());
}

fn write_reports(
    table: &types::Table,
    analysis: &Analysis,
    config: &ReportConfig,
) -> Result<Vec<PathBuf>, AppError> {
    std::fs::create_dir_all(&config.output_dir)?;
    let mut written = Vec::new();

    if let Some(by_state) = &analysis.by_state {
        let path = config.output_path("state_summary.csv");
        output::write_csv(&path, &reports::state_rows(by_state))?;
        written.push(path);
    }
    if let Some(daily) = &analysis.by_day {
        let path = config.output_path("daily_summary.csv");
        output::write_csv(&path, &reports::daily_rows(daily))?;
        written.push(path);
    }
    if let Some(dist) = &analysis.amounts {
        let path = config.output_path("loan_amount_percentiles.csv");
        output::write_csv(&path, &reports::percentile_rows(dist))?;
        written.push(path);
        let path = config.output_path("loan_amount_cdf.csv");
        output::write_csv(&path, &reports::cumulative_rows(dist, reports::CDF_POINTS))?;
        written.push(path);
    }
    if let Some(business) = &analysis.by_business_type {
        let path = config.output_path("business_type_summary.csv");
        output::write_csv(&path, &reports::business_type_rows(business))?;
        written.push(path);
    }

    let summary = reports::build_summary(table, analysis, &config.thresholds);
    let path = config.output_path("summary.json");
    output::write_json(&path, &summary)?;
    written.push(path);

    let text = reports::render_text_report(&summary);
    println!("\n{}\nEIDL LOANS COMPREHENSIVE ANALYSIS REPORT\n{}", "=".repeat(70), "=".repeat(70));
    println!("{}", text);
    let path = config.output_path("eidl_analysis_report.txt");
    output::write_text(&path, &text)?;
    written.push(path);

    Ok(written)
}

fn run(cli: Cli) -> Result<(), AppError> {
    let config = ReportConfig {
        output_dir: cli.output_dir,
        top_n: cli.top,
        preview_rows: cli.preview_rows,
        thresholds: AmountThresholds::default(),
    };

    println!("Loading EIDL loans dataset...");
    let (table, load_report) = loader::load_table(&cli.input)?;
    println!(
        "Read {} rows, loaded {}.",
        util::format_int(load_report.total_rows),
        util::format_int(load_report.loaded_rows)
    );
    if load_report.tolerant {
        println!(
            "Loaded with {} rows skipped due to parsing errors.",
            util::format_int(load_report.skipped_rows)
        );
    }
    print_profile(&table);

    let table = cleaner::clean_table(table, &CleaningSchema::default());
    let analysis = Analysis::run(&table);

    print_views(&table, &analysis, &config);
    let written = write_reports(&table, &analysis, &config)?;

    println!("\nAnalysis complete! Generated files:");
    for path in written {
        println!("- {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);
    info!("eidl-report v{} starting", env!("CARGO_PKG_VERSION"));

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::io::Write;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["eidl-report"]);
        assert_eq!(
            cli.input,
            PathBuf::from("DATAACT_EIDL_LOANS_20200401-20200609.csv")
        );
        assert_eq!(cli.top, 15);
        assert_eq!(cli.preview_rows, 10);
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn full_pipeline_writes_every_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("loans.csv");
        let mut f = std::fs::File::create(&input).unwrap();
        writeln!(
            f,
            "LEGALENTITYSTATECD,FACEVALUEOFDIRECTLOANORLOANGUARANTEE,ORIGINALLOANSUBSIDYCOST,ACTIONDATE,BUSINESSTYPES"
        )
        .unwrap();
        writeln!(f, " ca ,1000,100,2020-04-01,R").unwrap();
        writeln!(f, "CA,abc,10,2020-04-01,R").unwrap();
        writeln!(f, "TX,500,50,2020-04-02,2R").unwrap();
        writeln!(f, "NY,700,70,2020-04-02,R,extra").unwrap();
        drop(f);

        let out = dir.path().join("out");
        let cli = Cli::parse_from([
            OsStr::new("eidl-report"),
            input.as_os_str(),
            OsStr::new("--output-dir"),
            out.as_os_str(),
        ]);
        run(cli).unwrap();

        for file in [
            "state_summary.csv",
            "daily_summary.csv",
            "loan_amount_percentiles.csv",
            "loan_amount_cdf.csv",
            "business_type_summary.csv",
            "summary.json",
            "eidl_analysis_report.txt",
        ] {
            assert!(out.join(file).exists(), "{} not written", file);
        }
        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary["total_loans"], 3);
        assert_eq!(summary["states_represented"], 2);
        assert_eq!(summary["top_state_by_count"]["key"], "CA");
    }

    #[test]
    fn missing_input_fails_with_data_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            OsStr::new("eidl-report"),
            dir.path().join("absent.csv").as_os_str(),
        ]);
        let err = run(cli).unwrap_err();
        assert!(matches!(
            err,
            AppError::Load(error::LoadError::DataUnavailable { .. })
        ));
    }
}
