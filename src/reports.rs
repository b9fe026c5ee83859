use crate::analysis::{
    top_states, Analysis, AmountDistribution, BusinessTypeStats, DailySummary, GroupStats,
    StateMetric,
};
use crate::types::{
    BusinessTypeRow, CumulativeRow, DailySummaryRow, PercentileRow, StateSummaryRow, Table, FACE_VALUE_COL,
    SUBSIDY_COST_COL,
};
use crate::util::{format_int, format_number, format_opt, mean};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything the reporter needs besides the data. Built by the CLI.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    /// Rows in each "top states" ranking.
    pub top_n: usize,
    /// Rows shown in console previews.
    pub preview_rows: usize,
    pub thresholds: AmountThresholds,
}

#[derive(Debug, Clone)]
pub struct AmountThresholds {
    pub under: f64,
    pub over: Vec<f64>,
}

impl Default for AmountThresholds {
    fn default() -> Self {
        Self {
            under: 50_000.0,
            over: vec![100_000.0, 1_000_000.0],
        }
    }
}

impl ReportConfig {
    pub fn output_path(&self, file: &str) -> PathBuf {
        self.output_dir.join(file)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leader {
    pub key: String,
    pub loans: usize,
    pub amount: f64,
}

impl Leader {
    fn new(key: impl Into<String>, stats: &GroupStats) -> Self {
        Self {
            key: key.into(),
            loans: stats.count,
            amount: stats.total_amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdCount {
    /// `"under"` or `"over"`.
    pub side: &'static str,
    pub threshold: f64,
    pub count: usize,
    /// Share of non-missing loan amounts, in percent.
    pub share_pct: Option<f64>,
}

/// Global figures for the text report and `summary.json`.
///
/// Totals come from the cleaned table; everything else is read off one of
/// the four views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    /// First and last day in the daily view.
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    /// Rows in the cleaned table, including rows with a missing amount.
    pub total_loans: usize,
    /// Rows with a non-missing face value. Denominator for per-group loan
    /// shares, since group counts only include priced rows.
    pub loans_with_amount: Option<usize>,
    /// Sum of non-missing face values.
    pub total_amount: f64,
    /// Sum of non-missing subsidy costs.
    pub total_subsidy: f64,
    /// Mean of non-missing face values.
    pub average_loan: Option<f64>,
    pub top_state_by_count: Option<Leader>,
    pub top_state_by_amount: Option<Leader>,
    pub states_represented: Option<usize>,
    pub peak_day: Option<(NaiveDate, usize)>,
    /// Mean of the daily loan counts.
    pub average_daily_loans: Option<f64>,
    pub days_covered: Option<usize>,
    /// Rows left out of the daily view for lack of a valid action date.
    pub undated_loans: Option<usize>,
    pub median_loan: Option<f64>,
    pub min_loan: Option<f64>,
    pub max_loan: Option<f64>,
    pub loan_std_dev: Option<f64>,
    pub threshold_counts: Vec<ThresholdCount>,
    /// First entry of the business-type view (highest count).
    pub top_business_type: Option<Leader>,
    pub business_types: Option<usize>,
}

pub fn build_summary(
    table: &Table,
    analysis: &Analysis,
    thresholds: &AmountThresholds,
) -> ReportSummary {
    let amounts = table.decimals(FACE_VALUE_COL);
    let subsidies = table.decimals(SUBSIDY_COST_COL);

    let by_state = analysis.by_state.as_ref();
    let top_state = |metric: StateMetric| {
        by_state
            .and_then(|v| top_states(v, metric, 1).into_iter().next())
            .map(|(k, s)| Leader::new(k, s))
    };
    let daily = analysis.by_day.as_ref();
    let dist = analysis.amounts.as_ref();

    ReportSummary {
        period_start: daily.and_then(DailySummary::first_day),
        period_end: daily.and_then(DailySummary::last_day),
        total_loans: table.len(),
        loans_with_amount: dist.map(|d| d.count),
        total_amount: amounts.iter().sum(),
        total_subsidy: subsidies.iter().sum(),
        average_loan: mean(&amounts),
        top_state_by_count: top_state(StateMetric::LoanCount),
        top_state_by_amount: top_state(StateMetric::TotalAmount),
        states_represented: by_state.map(BTreeMap::len),
        peak_day: daily
            .and_then(DailySummary::peak_day)
            .map(|(d, s)| (d, s.count)),
        average_daily_loans: daily.and_then(DailySummary::mean_daily_count),
        days_covered: daily.map(|d| d.days.len()),
        undated_loans: daily.map(|d| d.undated_rows),
        median_loan: dist.and_then(|d| d.median),
        min_loan: dist.and_then(|d| d.min),
        max_loan: dist.and_then(|d| d.max),
        loan_std_dev: dist.and_then(|d| d.std_dev),
        threshold_counts: dist
            .map(|d| threshold_counts(d, thresholds))
            .unwrap_or_default(),
        top_business_type: analysis
            .by_business_type
            .as_ref()
            .and_then(|v| v.first())
            .map(|b| Leader::new(b.business_type.clone(), &b.stats)),
        business_types: analysis.by_business_type.as_ref().map(Vec::len),
    }
}

fn threshold_counts(dist: &AmountDistribution, thresholds: &AmountThresholds) -> Vec<ThresholdCount> {
    let share = |count: usize| {
        (dist.count > 0).then(|| count as f64 * 100.0 / dist.count as f64)
    };
    let under = dist.count_below(thresholds.under);
    std::iter::once(ThresholdCount {
        side: "under",
        threshold: thresholds.under,
        count: under,
        share_pct: share(under),
    })
    .chain(thresholds.over.iter().map(|&t| {
        let count = dist.count_above(t);
        ThresholdCount {
            side: "over",
            threshold: t,
            count,
            share_pct: share(count),
        }
    }))
    .collect()
}

fn money(v: f64) -> String {
    format!("${}", format_number(v, 2))
}

fn money_opt(v: Option<f64>) -> String {
    v.map(money).unwrap_or_else(|| "n/a".to_string())
}

fn compact_money(v: f64) -> String {
    if v >= 1_000_000.0 && v % 1_000_000.0 == 0.0 {
        format!("${}M", format_number(v / 1_000_000.0, 0))
    } else if v >= 1_000.0 && v % 1_000.0 == 0.0 {
        format!("${}K", format_number(v / 1_000.0, 0))
    } else {
        money(v)
    }
}

fn section(out: &mut Vec<String>, title: &str) {
    out.push(title.to_string());
    out.push("-".repeat(30));
}

/// Plain-text report. Sections whose view is absent are left out.
pub fn render_text_report(s: &ReportSummary) -> String {
    let mut out: Vec<String> = Vec::new();
    out.push("EXECUTIVE SUMMARY".to_string());
    out.push("=".repeat(50));
    if let (Some(start), Some(end)) = (s.period_start, s.period_end) {
        out.push(format!(
            "Dataset Period: {} - {}",
            start.format("%B %-d, %Y"),
            end.format("%B %-d, %Y")
        ));
    }
    out.push(format!("Total Number of Loans: {}", format_int(s.total_loans)));
    out.push(format!("Total Loan Amount: {}", money(s.total_amount)));
    out.push(format!("Total Subsidy Cost: {}", money(s.total_subsidy)));
    out.push(format!("Average Loan Amount: {}", money_opt(s.average_loan)));
    out.push(String::new());

    if let Some(states) = s.states_represented {
        section(&mut out, "GEOGRAPHIC INSIGHTS");
        if let Some(top) = &s.top_state_by_count {
            out.push(format!(
                "State with most loans: {} ({} loans)",
                top.key,
                format_int(top.loans)
            ));
        }
        if let Some(top) = &s.top_state_by_amount {
            out.push(format!(
                "State with highest total amount: {} ({})",
                top.key,
                money(top.amount)
            ));
        }
        out.push(format!("Number of states represented: {}", states));
        out.push(String::new());
    }

    if let Some(days) = s.days_covered {
        section(&mut out, "TEMPORAL INSIGHTS");
        if let Some((day, count)) = s.peak_day {
            out.push(format!("Peak loan day: {} ({} loans)", day, format_int(count)));
        }
        out.push(format!(
            "Average daily loans: {}",
            format_opt(s.average_daily_loans, 0)
        ));
        out.push(format!("Analysis period: {} days", days));
        if let Some(undated) = s.undated_loans.filter(|n| *n > 0) {
            out.push(format!(
                "Loans without a valid action date: {}",
                format_int(undated)
            ));
        }
        out.push(String::new());
    }

    if !s.threshold_counts.is_empty() || s.median_loan.is_some() {
        section(&mut out, "LOAN AMOUNT INSIGHTS");
        out.push(format!("Median loan amount: {}", money_opt(s.median_loan)));
        for t in &s.threshold_counts {
            out.push(format!(
                "Loans {} {}: {} ({}%)",
                t.side,
                compact_money(t.threshold),
                format_int(t.count),
                format_opt(t.share_pct, 1)
            ));
        }
        out.push(String::new());
    }

    if let Some(count) = s.business_types {
        section(&mut out, "BUSINESS TYPE INSIGHTS");
        if let Some(top) = &s.top_business_type {
            out.push(format!(
                "Most common business type: {} ({} loans)",
                top.key,
                format_int(top.loans)
            ));
        }
        out.push(format!("Number of business types: {}", count));
        out.push(String::new());
    }

    let findings = key_findings(s);
    if !findings.is_empty() {
        section(&mut out, "KEY FINDINGS");
        for (i, f) in findings.iter().enumerate() {
            out.push(format!("{}. {}", i + 1, f));
        }
    }
    out.join("\n")
}

fn key_findings(s: &ReportSummary) -> Vec<String> {
    let mut findings = Vec::new();
    if let (Some(start), Some(end), Some(days)) = (s.period_start, s.period_end, s.days_covered) {
        findings.push(format!(
            "{} loans were recorded between {} and {}, across {} active days",
            format_int(s.total_loans),
            start,
            end,
            days
        ));
    }
    if let (Some(states), Some(top)) = (s.states_represented, &s.top_state_by_count) {
        let share = match s.loans_with_amount {
            Some(priced) if priced > 0 => {
                format_number(top.loans as f64 * 100.0 / priced as f64, 1)
            }
            _ => "n/a".to_string(),
        };
        findings.push(format!(
            "{} states and territories are represented; {} leads with {}% of loans with a recorded amount",
            states, top.key, share
        ));
    }
    if let (Some(min), Some(max)) = (s.min_loan, s.max_loan) {
        findings.push(format!(
            "Loan amounts range from {} to {} (standard deviation {})",
            money(min),
            money(max),
            money_opt(s.loan_std_dev)
        ));
    }
    if let (Some(median), Some(avg)) = (s.median_loan, s.average_loan) {
        let skew = if avg > median { "above" } else { "at or below" };
        findings.push(format!(
            "The average loan ({}) sits {} the median ({})",
            money(avg),
            skew,
            money(median)
        ));
    }
    if let (Some((day, count)), Some(avg)) = (s.peak_day, s.average_daily_loans) {
        findings.push(format!(
            "Activity peaked on {} with {} loans against a daily average of {}",
            day,
            format_int(count),
            format_number(avg, 0)
        ));
    }
    findings
}

fn state_row(state: &str, s: &GroupStats) -> StateSummaryRow {
    StateSummaryRow {
        state: state.to_string(),
        loan_count: s.count,
        total_loan_amount: format_number(s.total_amount, 2),
        mean_loan_amount: format_opt(s.mean_amount, 2),
        median_loan_amount: format_opt(s.median_amount, 2),
        total_subsidy_cost: format_number(s.total_subsidy, 2),
        mean_subsidy_cost: format_opt(s.mean_subsidy, 2),
    }
}

/// All states, in state-code order.
pub fn state_rows(by_state: &BTreeMap<String, GroupStats>) -> Vec<StateSummaryRow> {
    by_state.iter().map(|(k, s)| state_row(k, s)).collect()
}

pub fn top_state_rows(
    by_state: &BTreeMap<String, GroupStats>,
    metric: StateMetric,
    n: usize,
) -> Vec<StateSummaryRow> {
    top_states(by_state, metric, n)
        .into_iter()
        .map(|(k, s)| state_row(k, s))
        .collect()
}

pub fn daily_rows(daily: &DailySummary) -> Vec<DailySummaryRow> {
    daily
        .days
        .iter()
        .zip(daily.cumulative_counts())
        .map(|((day, s), (_, cumulative))| DailySummaryRow {
            date: day.to_string(),
            loan_count: s.count,
            cumulative_count: cumulative,
            total_amount: format_number(s.total_amount, 2),
            mean_amount: format_opt(s.mean_amount, 2),
            median_amount: format_opt(s.median_amount, 2),
            total_subsidy: format_number(s.total_subsidy, 2),
            mean_subsidy: format_opt(s.mean_subsidy, 2),
        })
        .collect()
}

pub fn percentile_rows(dist: &AmountDistribution) -> Vec<PercentileRow> {
    dist.percentiles
        .iter()
        .map(|(p, v)| PercentileRow {
            percentile: format!("{}th", p),
            loan_amount: format_number(*v, 2),
        })
        .collect()
}

pub fn business_type_rows(view: &[BusinessTypeStats]) -> Vec<BusinessTypeRow> {
    view.iter()
        .map(|b| BusinessTypeRow {
            business_type: b.business_type.clone(),
            count: b.stats.count,
            total_amount: format_number(b.stats.total_amount, 2),
            mean_amount: format_opt(b.stats.mean_amount, 2),
            total_subsidy: format_number(b.stats.total_subsidy, 2),
            mean_subsidy: format_opt(b.stats.mean_subsidy, 2),
        })
        .collect()
}

/// Upper bound on sampled points in the cumulative-distribution export.
pub const CDF_POINTS: usize = 200;

/// Evenly sampled points of the cumulative distribution, always ending at 100%.
pub fn cumulative_rows(dist: &AmountDistribution, max_points: usize) -> Vec<CumulativeRow> {
    let points = dist.cumulative_percentages();
    if points.is_empty() || max_points == 0 {
        return Vec::new();
    }
    let step = points.len().div_ceil(max_points);
    let mut picked: Vec<(f64, f64)> = points.iter().copied().step_by(step).collect();
    if let Some(last) = points.last() {
        if picked.last() != Some(last) {
            picked.push(*last);
        }
    }
    picked
        .into_iter()
        .map(|(amount, pct)| CumulativeRow {
            loan_amount: format_number(amount, 2),
            cumulative_pct: format_number(pct, 2),
        })
        .collect()
}

/// Console lines for the loan-amount statistics block.
pub fn distribution_lines(dist: &AmountDistribution) -> Vec<String> {
    vec![
        format!("Total loans: {}", format_int(dist.count)),
        format!("Total amount: {}", money(dist.sum)),
        format!("Average loan: {}", money_opt(dist.mean)),
        format!("Median loan: {}", money_opt(dist.median)),
        format!("Min loan: {}", money_opt(dist.min)),
        format!("Max loan: {}", money_opt(dist.max)),
        format!("Standard deviation: {}", money_opt(dist.std_dev)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::{clean_table, CleaningSchema};
    use crate::types::{Value, ACTION_DATE_COL, BUSINESS_TYPE_COL, STATE_COL};

    fn sample_table() -> Table {
        let mut t = Table::new(vec![
            STATE_COL.into(),
            FACE_VALUE_COL.into(),
            SUBSIDY_COST_COL.into(),
            ACTION_DATE_COL.into(),
            BUSINESS_TYPE_COL.into(),
        ]);
        let rows = [
            ("ca", "10000", "1000", "2020-04-01", "R"),
            ("CA", "60000", "6000", "2020-04-01", "R"),
            ("TX", "2000000", "200000", "2020-04-02", "2R"),
            ("NY", "abc", "", "not a date", "R"),
        ];
        for (state, face, subsidy, date, business) in rows {
            let cell = |s: &str| {
                if s.is_empty() {
                    Value::Missing
                } else {
                    Value::Text(s.to_string())
                }
            };
            t.push_row(vec![
                cell(state),
                cell(face),
                cell(subsidy),
                cell(date),
                cell(business),
            ]);
        }
        clean_table(t, &CleaningSchema::default())
    }

    fn summary() -> ReportSummary {
        let table = sample_table();
        let analysis = Analysis::run(&table);
        build_summary(&table, &analysis, &AmountThresholds::default())
    }

    #[test]
    fn summary_is_derived_from_views() {
        let s = summary();
        assert_eq!(s.total_loans, 4);
        assert_eq!(s.loans_with_amount, Some(3));
        assert_eq!(s.total_amount, 2_070_000.0);
        assert_eq!(s.total_subsidy, 207_000.0);
        assert_eq!(s.average_loan, Some(690_000.0));
        assert_eq!(s.top_state_by_count.as_ref().map(|l| l.key.as_str()), Some("CA"));
        assert_eq!(s.top_state_by_amount.as_ref().map(|l| l.key.as_str()), Some("TX"));
        assert_eq!(s.states_represented, Some(3));
        assert_eq!(s.period_start, NaiveDate::from_ymd_opt(2020, 4, 1));
        assert_eq!(s.period_end, NaiveDate::from_ymd_opt(2020, 4, 2));
        assert_eq!(
            s.peak_day,
            Some((NaiveDate::from_ymd_opt(2020, 4, 1).unwrap(), 2))
        );
        assert_eq!(s.days_covered, Some(2));
        assert_eq!(s.undated_loans, Some(1));
        assert_eq!(s.median_loan, Some(60_000.0));
        assert_eq!(s.top_business_type.as_ref().map(|l| l.key.as_str()), Some("R"));
        assert_eq!(s.business_types, Some(2));
    }

    #[test]
    fn threshold_counts_use_non_missing_amounts() {
        let s = summary();
        let counts: Vec<(&str, usize)> = s
            .threshold_counts
            .iter()
            .map(|t| (t.side, t.count))
            .collect();
        assert_eq!(counts, vec![("under", 1), ("over", 1), ("over", 1)]);
        let under = &s.threshold_counts[0];
        assert!((under.share_pct.unwrap() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn text_report_has_every_section() {
        let text = render_text_report(&summary());
        for heading in [
            "EXECUTIVE SUMMARY",
            "GEOGRAPHIC INSIGHTS",
            "TEMPORAL INSIGHTS",
            "LOAN AMOUNT INSIGHTS",
            "BUSINESS TYPE INSIGHTS",
            "KEY FINDINGS",
        ] {
            assert!(text.contains(heading), "missing {}", heading);
        }
        assert!(text.contains("Dataset Period: April 1, 2020 - April 2, 2020"));
        assert!(text.contains("Total Number of Loans: 4"));
        assert!(text.contains("Loans without a valid action date: 1"));
        assert!(text.contains("State with highest total amount: TX ($2,000,000.00)"));
        assert!(text.contains("Loans under $50K: 1 (33.3%)"));
        assert!(text.contains("Loans over $1M: 1 (33.3%)"));
    }

    #[test]
    fn leader_share_counts_only_priced_loans() {
        // NY's face value is unparseable, so CA holds 2 of the 3 priced loans.
        let text = render_text_report(&summary());
        assert!(
            text.contains("CA leads with 66.7% of loans with a recorded amount"),
            "{}",
            text
        );
    }

    #[test]
    fn sections_without_views_are_omitted() {
        let mut t = Table::new(vec![FACE_VALUE_COL.into()]);
        t.push_row(vec![Value::Decimal(5.0)]);
        let analysis = Analysis::run(&t);
        let text = render_text_report(&build_summary(&t, &analysis, &AmountThresholds::default()));
        assert!(!text.contains("GEOGRAPHIC INSIGHTS"));
        assert!(!text.contains("TEMPORAL INSIGHTS"));
        assert!(!text.contains("BUSINESS TYPE INSIGHTS"));
        assert!(text.contains("LOAN AMOUNT INSIGHTS"));
    }

    #[test]
    fn empty_table_renders_undefined_as_na() {
        let t = Table::new(vec![FACE_VALUE_COL.into()]);
        let analysis = Analysis::run(&t);
        let s = build_summary(&t, &analysis, &AmountThresholds::default());
        assert_eq!(s.average_loan, None);
        let text = render_text_report(&s);
        assert!(text.contains("Average Loan Amount: n/a"));
        assert!(text.contains("Median loan amount: n/a"));
    }

    #[test]
    fn view_rows_render_missing_as_na() {
        let table = sample_table();
        let analysis = Analysis::run(&table);
        let states = state_rows(analysis.by_state.as_ref().unwrap());
        let ny = states.iter().find(|r| r.state == "NY").unwrap();
        assert_eq!(ny.loan_count, 0);
        assert_eq!(ny.mean_loan_amount, "n/a");
        assert_eq!(ny.total_loan_amount, "0.00");

        let daily = daily_rows(analysis.by_day.as_ref().unwrap());
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[1].cumulative_count, 3);

        let top = top_state_rows(analysis.by_state.as_ref().unwrap(), StateMetric::TotalAmount, 1);
        assert_eq!(top[0].state, "TX");

        let pct = percentile_rows(analysis.amounts.as_ref().unwrap());
        assert_eq!(pct[2].percentile, "50th");
        assert_eq!(pct[2].loan_amount, "60,000.00");

        let business = business_type_rows(analysis.by_business_type.as_ref().unwrap());
        assert_eq!(business[0].business_type, "R");
        assert_eq!(business[0].count, 2);
    }

    #[test]
    fn cumulative_rows_are_sampled_and_end_at_full() {
        let dist = AmountDistribution::from_values(vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        let all = cumulative_rows(&dist, 10);
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].cumulative_pct, "20.00");
        let sampled = cumulative_rows(&dist, 2);
        let pcts: Vec<&str> = sampled.iter().map(|r| r.cumulative_pct.as_str()).collect();
        assert_eq!(pcts, vec!["20.00", "80.00", "100.00"]);
        assert!(cumulative_rows(&AmountDistribution::from_values(Vec::new()), 10).is_empty());
    }

    #[test]
    fn compact_money_labels() {
        assert_eq!(compact_money(50_000.0), "$50K");
        assert_eq!(compact_money(1_000_000.0), "$1M");
        assert_eq!(compact_money(1_500.5), "$1,500.50");
    }
}
