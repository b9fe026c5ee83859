use chrono::NaiveDateTime;
use serde::Serialize;
use tabled::Tabled;

pub const STATE_COL: &str = "LEGALENTITYSTATECD";
pub const FACE_VALUE_COL: &str = "FACEVALUEOFDIRECTLOANORLOANGUARANTEE";
pub const SUBSIDY_COST_COL: &str = "ORIGINALLOANSUBSIDYCOST";
pub const ACTION_DATE_COL: &str = "ACTIONDATE";
pub const BUSINESS_TYPE_COL: &str = "BUSINESSTYPES";
pub const PERIOD_START_COL: &str = "PERIODOFPERFORMANCESTARTDATE";
pub const PERIOD_END_COL: &str = "PERIODOFPERFORMANCECURRENTENDDATE";
pub const FEDERAL_OBLIGATION_COL: &str = "FEDERALACTIONOBLIGATION";
pub const NON_FEDERAL_FUNDING_COL: &str = "NONFEDERALFUNDINGAMOUNT";

/// A single cell. `Missing` is never the same thing as zero or `""`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Text(String),
    Decimal(f64),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            Value::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Key used when grouping on this cell. Missing cells form no group.
    pub fn group_key(&self) -> Option<String> {
        match self {
            Value::Missing => None,
            Value::Text(s) => Some(s.clone()),
            Value::Decimal(v) => Some(v.to_string()),
            Value::Timestamp(ts) => Some(ts.to_string()),
        }
    }
}

/// Rows in file order, each holding one value per column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row. Short rows are padded with `Missing`, long rows truncated,
    /// so every row always matches the header width.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Missing);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    /// Values of one column, top to bottom. `None` if the column does not exist.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    /// Non-missing decimals of one column; empty if the column is absent.
    pub fn decimals(&self, name: &str) -> Vec<f64> {
        self.column(name)
            .map(|values| values.filter_map(Value::as_decimal).collect())
            .unwrap_or_default()
    }

    /// Missing-value count per column, in header order.
    pub fn missing_counts(&self) -> Vec<(&str, usize)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let missing = self.rows.iter().filter(|r| r[idx].is_missing()).count();
                (name.as_str(), missing)
            })
            .collect()
    }

    pub(crate) fn column_mut(&mut self, idx: usize) -> impl Iterator<Item = &mut Value> {
        self.rows.iter_mut().map(move |r| &mut r[idx])
    }
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct StateSummaryRow {
    #[serde(rename = "State")]
    #[tabled(rename = "State")]
    pub state: String,
    #[serde(rename = "LoanCount")]
    #[tabled(rename = "LoanCount")]
    pub loan_count: usize,
    #[serde(rename = "TotalLoanAmount")]
    #[tabled(rename = "TotalLoanAmount")]
    pub total_loan_amount: String,
    #[serde(rename = "MeanLoanAmount")]
    #[tabled(rename = "MeanLoanAmount")]
    pub mean_loan_amount: String,
    #[serde(rename = "MedianLoanAmount")]
    #[tabled(rename = "MedianLoanAmount")]
    pub median_loan_amount: String,
    #[serde(rename = "TotalSubsidyCost")]
    #[tabled(rename = "TotalSubsidyCost")]
    pub total_subsidy_cost: String,
    #[serde(rename = "MeanSubsidyCost")]
    #[tabled(rename = "MeanSubsidyCost")]
    pub mean_subsidy_cost: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct DailySummaryRow {
    #[serde(rename = "Date")]
    #[tabled(rename = "Date")]
    pub date: String,
    #[serde(rename = "DailyLoanCount")]
    #[tabled(rename = "DailyLoanCount")]
    pub loan_count: usize,
    #[serde(rename = "CumulativeLoanCount")]
    #[tabled(rename = "CumulativeLoanCount")]
    pub cumulative_count: usize,
    #[serde(rename = "DailyTotalAmount")]
    #[tabled(rename = "DailyTotalAmount")]
    pub total_amount: String,
    #[serde(rename = "DailyMeanAmount")]
    #[tabled(rename = "DailyMeanAmount")]
    pub mean_amount: String,
    #[serde(rename = "DailyMedianAmount")]
    #[tabled(rename = "DailyMedianAmount")]
    pub median_amount: String,
    #[serde(rename = "DailyTotalSubsidy")]
    #[tabled(rename = "DailyTotalSubsidy")]
    pub total_subsidy: String,
    #[serde(rename = "DailyMeanSubsidy")]
    #[tabled(rename = "DailyMeanSubsidy")]
    pub mean_subsidy: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct PercentileRow {
    #[serde(rename = "Percentile")]
    #[tabled(rename = "Percentile")]
    pub percentile: String,
    #[serde(rename = "LoanAmount")]
    #[tabled(rename = "LoanAmount")]
    pub loan_amount: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct CumulativeRow {
    #[serde(rename = "LoanAmount")]
    #[tabled(rename = "LoanAmount")]
    pub loan_amount: String,
    #[serde(rename = "CumulativePct")]
    #[tabled(rename = "CumulativePct")]
    pub cumulative_pct: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct BusinessTypeRow {
    #[serde(rename = "BusinessType")]
    #[tabled(rename = "BusinessType")]
    pub business_type: String,
    #[serde(rename = "Count")]
    #[tabled(rename = "Count")]
    pub count: usize,
    #[serde(rename = "TotalAmount")]
    #[tabled(rename = "TotalAmount")]
    pub total_amount: String,
    #[serde(rename = "MeanAmount")]
    #[tabled(rename = "MeanAmount")]
    pub mean_amount: String,
    #[serde(rename = "TotalSubsidy")]
    #[tabled(rename = "TotalSubsidy")]
    pub total_subsidy: String,
    #[serde(rename = "MeanSubsidy")]
    #[tabled(rename = "MeanSubsidy")]
    pub mean_subsidy: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_row_pads_to_header_width() {
        let mut t = Table::new(vec!["A".into(), "B".into(), "C".into()]);
        t.push_row(vec![Value::Text("x".into())]);
        let row: Vec<Value> = t.rows().next().unwrap().to_vec();
        assert_eq!(
            row,
            vec![Value::Text("x".into()), Value::Missing, Value::Missing]
        );
    }

    #[test]
    fn decimals_skip_missing_and_absent_columns() {
        let mut t = Table::new(vec!["F".into()]);
        t.push_row(vec![Value::Decimal(1.5)]);
        t.push_row(vec![Value::Missing]);
        t.push_row(vec![Value::Decimal(2.5)]);
        assert_eq!(t.decimals("F"), vec![1.5, 2.5]);
        assert!(t.decimals("NOPE").is_empty());
        assert!(t.column("NOPE").is_none());
    }

    #[test]
    fn missing_counts_per_column() {
        let mut t = Table::new(vec!["A".into(), "B".into()]);
        t.push_row(vec![Value::Missing, Value::Decimal(1.0)]);
        t.push_row(vec![Value::Missing, Value::Missing]);
        assert_eq!(t.missing_counts(), vec![("A", 2), ("B", 1)]);
    }

    #[test]
    fn missing_has_no_group_key() {
        assert_eq!(Value::Missing.group_key(), None);
        assert_eq!(Value::Text("CA".into()).group_key(), Some("CA".into()));
    }
}
