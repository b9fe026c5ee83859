// Grouped summary views over a cleaned table.
//
// Every statistic skips missing values. An empty subset yields `None` for
// mean/median/std/min/max, never `0.0`.
use crate::types::{
    Table, Value, ACTION_DATE_COL, BUSINESS_TYPE_COL, FACE_VALUE_COL, STATE_COL,
    SUBSIDY_COST_COL,
};
use crate::util::{mean, median, median_sorted, percentile_sorted, sort_values, std_dev_population};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

pub const DISTRIBUTION_PERCENTILES: [f64; 7] = [10.0, 25.0, 50.0, 75.0, 90.0, 95.0, 99.0];

/// Loan-amount and subsidy statistics for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    /// Non-missing face values in the group.
    pub count: usize,
    pub total_amount: f64,
    pub mean_amount: Option<f64>,
    pub median_amount: Option<f64>,
    pub total_subsidy: f64,
    pub mean_subsidy: Option<f64>,
}

#[derive(Default)]
struct GroupAcc {
    amounts: Vec<f64>,
    subsidies: Vec<f64>,
}

impl GroupAcc {
    fn add(&mut self, amount: Option<f64>, subsidy: Option<f64>) {
        self.amounts.extend(amount);
        self.subsidies.extend(subsidy);
    }

    fn finish(self) -> GroupStats {
        GroupStats {
            count: self.amounts.len(),
            total_amount: self.amounts.iter().sum(),
            mean_amount: mean(&self.amounts),
            median_amount: median(self.amounts),
            total_subsidy: self.subsidies.iter().sum(),
            mean_subsidy: mean(&self.subsidies),
        }
    }
}

/// Column positions shared by the grouped views.
struct Measures {
    amount: usize,
    subsidy: Option<usize>,
}

impl Measures {
    fn of(table: &Table) -> Option<Self> {
        Some(Self {
            amount: table.column_index(FACE_VALUE_COL)?,
            subsidy: table.column_index(SUBSIDY_COST_COL),
        })
    }

    fn read(&self, row: &[Value]) -> (Option<f64>, Option<f64>) {
        (
            row[self.amount].as_decimal(),
            self.subsidy.and_then(|i| row[i].as_decimal()),
        )
    }
}

/// Statistics per state code. `None` when the state or face-value column is absent.
pub fn by_geography(table: &Table) -> Option<BTreeMap<String, GroupStats>> {
    let state = table.column_index(STATE_COL)?;
    let measures = Measures::of(table)?;
    let mut map: BTreeMap<String, GroupAcc> = BTreeMap::new();
    for row in table.rows() {
        let Some(key) = row[state].group_key() else {
            continue;
        };
        let (amount, subsidy) = measures.read(row);
        map.entry(key).or_default().add(amount, subsidy);
    }
    Some(map.into_iter().map(|(k, acc)| (k, acc.finish())).collect())
}

/// Per-day statistics in calendar order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub days: BTreeMap<NaiveDate, GroupStats>,
    /// Rows left out because their action date is missing.
    pub undated_rows: usize,
}

impl DailySummary {
    /// Running total of loan counts, one entry per day.
    pub fn cumulative_counts(&self) -> Vec<(NaiveDate, usize)> {
        self.days
            .iter()
            .scan(0usize, |acc, (day, stats)| {
                *acc += stats.count;
                Some((*day, *acc))
            })
            .collect()
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        self.days.keys().next().copied()
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.days.keys().next_back().copied()
    }

    /// Day with the most loans; the earliest such day on ties.
    pub fn peak_day(&self) -> Option<(NaiveDate, &GroupStats)> {
        self.days
            .iter()
            .fold(None, |best: Option<(NaiveDate, &GroupStats)>, (day, stats)| match best {
                Some((_, b)) if b.count >= stats.count => best,
                _ => Some((*day, stats)),
            })
    }

    pub fn mean_daily_count(&self) -> Option<f64> {
        let counts: Vec<f64> = self.days.values().map(|s| s.count as f64).collect();
        mean(&counts)
    }
}

/// Statistics per calendar day of the action date. Rows with a missing date
/// are excluded from every group.
pub fn by_day(table: &Table) -> Option<DailySummary> {
    let date = table.column_index(ACTION_DATE_COL)?;
    let measures = Measures::of(table)?;
    let mut map: BTreeMap<NaiveDate, GroupAcc> = BTreeMap::new();
    let mut undated_rows = 0usize;
    for row in table.rows() {
        let Some(ts) = row[date].as_timestamp() else {
            undated_rows += 1;
            continue;
        };
        let (amount, subsidy) = measures.read(row);
        map.entry(ts.date()).or_default().add(amount, subsidy);
    }
    if undated_rows > 0 {
        warn!(
            undated_rows,
            "rows without a valid action date are left out of the daily view"
        );
    }
    Some(DailySummary {
        days: map.into_iter().map(|(k, acc)| (k, acc.finish())).collect(),
        undated_rows,
    })
}

/// Scalar statistics over all non-missing face values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmountDistribution {
    pub count: usize,
    pub sum: f64,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub std_dev: Option<f64>,
    /// `(percentile, value)` for [`DISTRIBUTION_PERCENTILES`]; empty when there are no values.
    pub percentiles: Vec<(f64, f64)>,
    #[serde(skip)]
    sorted: Vec<f64>,
}

impl AmountDistribution {
    pub fn from_values(mut values: Vec<f64>) -> Self {
        sort_values(&mut values);
        let mut dist = Self {
            count: values.len(),
            sum: values.iter().sum(),
            mean: mean(&values),
            median: median_sorted(&values),
            min: values.first().copied(),
            max: values.last().copied(),
            std_dev: std_dev_population(&values),
            percentiles: Vec::new(),
            sorted: values,
        };
        dist.percentiles = DISTRIBUTION_PERCENTILES
            .iter()
            .filter_map(|&p| dist.percentile(p).map(|v| (p, v)))
            .collect();
        dist
    }

    pub fn percentile(&self, p: f64) -> Option<f64> {
        percentile_sorted(&self.sorted, p)
    }

    /// `(value, i / n * 100)` for the i-th smallest value, 1-indexed.
    pub fn cumulative_percentages(&self) -> Vec<(f64, f64)> {
        let n = self.sorted.len() as f64;
        self.sorted
            .iter()
            .enumerate()
            .map(|(i, v)| (*v, (i + 1) as f64 * 100.0 / n))
            .collect()
    }

    pub fn count_below(&self, threshold: f64) -> usize {
        self.sorted.partition_point(|v| *v < threshold)
    }

    pub fn count_above(&self, threshold: f64) -> usize {
        self.sorted.len() - self.sorted.partition_point(|v| *v <= threshold)
    }
}

/// Distribution of face values. `None` when the face-value column is absent.
pub fn amount_distribution(table: &Table) -> Option<AmountDistribution> {
    table.column_index(FACE_VALUE_COL)?;
    Some(AmountDistribution::from_values(table.decimals(FACE_VALUE_COL)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusinessTypeStats {
    pub business_type: String,
    pub stats: GroupStats,
}

/// Statistics per business type, by descending count. Equal counts keep the
/// order in which each type first appears in the table.
pub fn by_business_type(table: &Table) -> Option<Vec<BusinessTypeStats>> {
    let business = table.column_index(BUSINESS_TYPE_COL)?;
    let measures = Measures::of(table)?;
    let mut order: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, GroupAcc)> = Vec::new();
    for row in table.rows() {
        let Some(key) = row[business].group_key() else {
            continue;
        };
        let idx = *order.entry(key.clone()).or_insert_with(|| {
            groups.push((key, GroupAcc::default()));
            groups.len() - 1
        });
        let (amount, subsidy) = measures.read(row);
        groups[idx].1.add(amount, subsidy);
    }
    let mut rows: Vec<BusinessTypeStats> = groups
        .into_iter()
        .map(|(business_type, acc)| BusinessTypeStats {
            business_type,
            stats: acc.finish(),
        })
        .collect();
    // `sort_by` is stable, which keeps encounter order among ties.
    rows.sort_by(|a, b| b.stats.count.cmp(&a.stats.count));
    Some(rows)
}

/// The four views, computed once per run.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub by_state: Option<BTreeMap<String, GroupStats>>,
    pub by_day: Option<DailySummary>,
    pub amounts: Option<AmountDistribution>,
    pub by_business_type: Option<Vec<BusinessTypeStats>>,
}

impl Analysis {
    pub fn run(table: &Table) -> Self {
        info!("Running grouped analysis over {} rows", table.len());
        let analysis = Self {
            by_state: by_geography(table),
            by_day: by_day(table),
            amounts: amount_distribution(table),
            by_business_type: by_business_type(table),
        };
        if analysis.by_state.is_none() {
            warn!("state or face-value column missing; geographic view skipped");
        }
        if analysis.by_day.is_none() {
            warn!("action-date or face-value column missing; daily view skipped");
        }
        if analysis.by_business_type.is_none() {
            warn!("business-type or face-value column missing; business view skipped");
        }
        analysis
    }
}

/// Metric a state ranking sorts on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateMetric {
    LoanCount,
    TotalAmount,
    MeanAmount,
    TotalSubsidy,
}

impl StateMetric {
    fn key(self, stats: &GroupStats) -> f64 {
        match self {
            StateMetric::LoanCount => stats.count as f64,
            StateMetric::TotalAmount => stats.total_amount,
            StateMetric::MeanAmount => stats.mean_amount.unwrap_or(f64::NEG_INFINITY),
            StateMetric::TotalSubsidy => stats.total_subsidy,
        }
    }
}

/// Top `n` states by `metric`, descending; ties by state code ascending.
pub fn top_states(
    by_state: &BTreeMap<String, GroupStats>,
    metric: StateMetric,
    n: usize,
) -> Vec<(&str, &GroupStats)> {
    let mut ranked: Vec<(&str, &GroupStats)> =
        by_state.iter().map(|(k, v)| (k.as_str(), v)).collect();
    ranked.sort_by(|a, b| metric.key(b.1).total_cmp(&metric.key(a.1)));
    ranked.truncate(n);
    ranked
}
