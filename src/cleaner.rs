use crate::types::{
    Table, Value, ACTION_DATE_COL, FACE_VALUE_COL, FEDERAL_OBLIGATION_COL,
    NON_FEDERAL_FUNDING_COL, PERIOD_END_COL, PERIOD_START_COL, STATE_COL, SUBSIDY_COST_COL,
};
use crate::util::{parse_datetime_safe, parse_f64_safe};
use tracing::{debug, info};

/// Which columns get which semantic type. Columns absent from a table are
/// skipped, so these lists may name more columns than a file carries.
#[derive(Debug, Clone)]
pub struct CleaningSchema {
    pub date_columns: Vec<String>,
    pub decimal_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
}

impl Default for CleaningSchema {
    fn default() -> Self {
        let owned = |cols: &[&str]| -> Vec<String> { cols.iter().map(|c| c.to_string()).collect() };
        Self {
            date_columns: owned(&[ACTION_DATE_COL, PERIOD_START_COL, PERIOD_END_COL]),
            decimal_columns: owned(&[
                FEDERAL_OBLIGATION_COL,
                NON_FEDERAL_FUNDING_COL,
                FACE_VALUE_COL,
                SUBSIDY_COST_COL,
            ]),
            categorical_columns: owned(&[STATE_COL]),
        }
    }
}

/// Normalize column encodings in place. Row count and column set never change;
/// a value that cannot be parsed becomes `Missing`.
pub fn clean_table(mut table: Table, schema: &CleaningSchema) -> Table {
    info!("Cleaning data...");
    clean_columns(&mut table, &schema.date_columns, clean_date);
    clean_columns(&mut table, &schema.decimal_columns, clean_decimal);
    clean_columns(&mut table, &schema.categorical_columns, clean_code);
    info!("Data cleaning completed.");
    table
}

fn clean_columns(table: &mut Table, columns: &[String], clean: fn(Value) -> Value) {
    for name in columns {
        let Some(idx) = table.column_index(name) else {
            continue;
        };
        let mut coerced = 0usize;
        for cell in table.column_mut(idx) {
            let was_missing = cell.is_missing();
            *cell = clean(std::mem::replace(cell, Value::Missing));
            if !was_missing && cell.is_missing() {
                coerced += 1;
            }
        }
        if coerced > 0 {
            debug!(column = %name, coerced, "unparseable values set to missing");
        }
    }
}

fn clean_date(value: Value) -> Value {
    match value {
        Value::Timestamp(_) => value,
        Value::Text(s) => parse_datetime_safe(&s).map_or(Value::Missing, Value::Timestamp),
        _ => Value::Missing,
    }
}

fn clean_decimal(value: Value) -> Value {
    match value {
        Value::Decimal(v) if v.is_finite() => value,
        Value::Text(s) => parse_f64_safe(&s).map_or(Value::Missing, Value::Decimal),
        _ => Value::Missing,
    }
}

fn clean_code(value: Value) -> Value {
    match value {
        Value::Text(s) => Value::Text(s.trim().to_uppercase()),
        _ => Value::Missing,
    }
}
