use crate::error::LoadError;
use crate::types::{Table, Value};
use csv::{ByteRecord, ReaderBuilder};
use std::path::Path;
use tracing::{info, warn};

/// Field texts that load as missing rather than as text.
const NA_VALUES: &[&str] = &[
    "", "NA", "N/A", "n/a", "NULL", "null", "NaN", "nan", "-NaN", "#N/A", "<NA>", "None",
];

#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    pub skipped_rows: usize,
    /// True when strict parsing failed and the table came from the tolerant retry.
    pub tolerant: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParseMode {
    Strict,
    Tolerant,
}

/// Load a comma-separated file, header row first.
///
/// Strict parsing is tried first. On a malformed row the file is read again
/// in tolerant mode, which drops every row it cannot parse. Only an
/// unreadable file is an error.
pub fn load_table(path: &Path) -> Result<(Table, LoadReport), LoadError> {
    let result = match read_table(path, ParseMode::Strict) {
        Ok(loaded) => loaded,
        Err(LoadError::MalformedRow { line, message }) => {
            warn!(line, %message, "Parser error encountered, retrying with bad rows skipped");
            read_table(path, ParseMode::Tolerant)?
        }
        Err(e) => return Err(e),
    };
    let (table, report) = result;
    if report.skipped_rows > 0 {
        warn!(
            skipped = report.skipped_rows,
            "Loaded with some rows skipped due to parsing errors"
        );
    }
    info!(
        rows = table.len(),
        columns = table.columns().len(),
        "Dataset loaded from {}",
        path.display()
    );
    Ok((table, report))
}

fn read_table(path: &Path, mode: ParseMode) -> Result<(Table, LoadReport), LoadError> {
    let unavailable = |source: std::io::Error| LoadError::DataUnavailable {
        path: path.to_path_buf(),
        source,
    };
    let bytes = std::fs::read(path).map_err(unavailable)?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(mode == ParseMode::Tolerant)
        .from_reader(&bytes[..]);

    let headers: Vec<String> = match rdr.byte_headers() {
        Ok(h) => h
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect(),
        Err(e) => return Err(classify(e, path)),
    };
    let width = headers.len();
    let mut table = Table::new(headers);

    let mut total_rows = 0usize;
    let mut skipped_rows = 0usize;
    let mut record = ByteRecord::new();
    loop {
        match rdr.read_byte_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                total_rows += 1;
                let (line, start) = record
                    .position()
                    .map(|p| (p.line(), p.byte() as usize))
                    .unwrap_or((0, 0));
                let end = rdr.position().byte() as usize;
                let row = if unclosed_quote(&bytes, start, end) {
                    Err("unclosed quoted field".to_string())
                } else if record.len() == width {
                    decode_row(&record)
                } else {
                    Err(format!(
                        "expected {} fields, found {}",
                        width,
                        record.len()
                    ))
                };
                match (row, mode) {
                    (Ok(row), _) => table.push_row(row),
                    (Err(message), ParseMode::Strict) => {
                        return Err(LoadError::MalformedRow { line, message })
                    }
                    (Err(_), ParseMode::Tolerant) => skipped_rows += 1,
                }
            }
            Err(e) => {
                total_rows += 1;
                match (classify(e, path), mode) {
                    (LoadError::MalformedRow { .. }, ParseMode::Tolerant) => skipped_rows += 1,
                    (err, _) => return Err(err),
                }
            }
        }
    }

    let report = LoadReport {
        total_rows,
        loaded_rows: table.len(),
        skipped_rows,
        tolerant: mode == ParseMode::Tolerant,
    };
    Ok((table, report))
}

/// An opening quote that is never closed swallows every later line into one
/// field, so such a record always runs to the end of the input with an odd
/// number of quote characters in its raw bytes.
fn unclosed_quote(bytes: &[u8], start: usize, end: usize) -> bool {
    if end < bytes.len() || start >= end {
        return false;
    }
    bytes[start..end].iter().filter(|&&b| b == b'"').count() % 2 == 1
}

fn decode_row(record: &ByteRecord) -> Result<Vec<Value>, String> {
    record
        .iter()
        .map(|field| {
            std::str::from_utf8(field)
                .map(field_value)
                .map_err(|e| format!("invalid UTF-8: {}", e))
        })
        .collect()
}

fn field_value(field: &str) -> Value {
    if NA_VALUES.contains(&field) {
        Value::Missing
    } else {
        Value::Text(field.to_string())
    }
}

/// I/O failures mean the data is unavailable; everything else is a bad row.
fn classify(err: csv::Error, path: &Path) -> LoadError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(source) => LoadError::DataUnavailable {
            path: path.to_path_buf(),
            source,
        },
        _ => LoadError::MalformedRow { line, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        csv_bytes(contents.as_bytes())
    }

    fn csv_bytes(contents: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn loads_clean_file_strictly() {
        let f = csv_file("STATE,FACE\nCA,1000\nTX,500\n");
        let (table, report) = load_table(f.path()).unwrap();
        assert_eq!(table.columns(), ["STATE".to_string(), "FACE".to_string()]);
        assert_eq!(table.len(), 2);
        assert_eq!(report.skipped_rows, 0);
        assert!(!report.tolerant);
    }

    #[test]
    fn unescaped_delimiter_row_is_dropped_in_tolerant_retry() {
        let f = csv_file("STATE,NAME,FACE\nCA,Acme,1000\nTX,Smith, Jones LLC,500\nNY,Beta,300\n");
        let (table, report) = load_table(f.path()).unwrap();
        assert!(report.tolerant);
        assert_eq!(report.skipped_rows, 1);
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.loaded_rows, 2);
        let states: Vec<_> = table.column("STATE").unwrap().cloned().collect();
        assert_eq!(
            states,
            vec![Value::Text("CA".into()), Value::Text("NY".into())]
        );
    }

    #[test]
    fn strict_mode_reports_malformed_row() {
        let f = csv_file("A,B\n1,2\n3,4,5\n");
        match read_table(f.path(), ParseMode::Strict) {
            Err(LoadError::MalformedRow { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed row, got {:?}", other),
        }
    }

    #[test]
    fn unclosed_quote_is_dropped_in_tolerant_retry() {
        let f = csv_file("A,B\n0,1\n1,\"open\n2,3\n4,5\n");
        match read_table(f.path(), ParseMode::Strict) {
            Err(LoadError::MalformedRow { line, message }) => {
                assert_eq!(line, 3);
                assert!(message.contains("unclosed"), "{}", message);
            }
            other => panic!("expected malformed row, got {:?}", other),
        }

        let (table, report) = load_table(f.path()).unwrap();
        assert!(report.tolerant);
        assert_eq!(report.total_rows, 2);
        assert_eq!(report.skipped_rows, 1);
        assert_eq!(table.len(), 1);
        let first: Vec<Value> = table.rows().next().unwrap().to_vec();
        assert_eq!(
            first,
            vec![Value::Text("0".into()), Value::Text("1".into())]
        );
    }

    #[test]
    fn escaped_quotes_in_last_row_load_strictly() {
        let f = csv_file("A,B\n1,\"say \"\"hi\"\"\"\n2,\"x\"");
        let (table, report) = load_table(f.path()).unwrap();
        assert!(!report.tolerant);
        assert_eq!(table.len(), 2);
        let b: Vec<Value> = table.column("B").unwrap().cloned().collect();
        assert_eq!(
            b,
            vec![Value::Text("say \"hi\"".into()), Value::Text("x".into())]
        );
    }

    #[test]
    fn non_utf8_row_is_dropped_in_tolerant_retry() {
        let f = csv_bytes(b"A,B\n1,2\n3,\xff\xfe\n5,6\n");
        let (table, report) = load_table(f.path()).unwrap();
        assert!(report.tolerant);
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.skipped_rows, 1);
        assert_eq!(table.len(), 2);
        let a: Vec<Value> = table.column("A").unwrap().cloned().collect();
        assert_eq!(a, vec![Value::Text("1".into()), Value::Text("5".into())]);
    }

    #[test]
    fn empty_and_na_fields_are_missing() {
        let f = csv_file("A,B,C\n,NA,x\n");
        let (table, _) = load_table(f.path()).unwrap();
        let row: Vec<Value> = table.rows().next().unwrap().to_vec();
        assert_eq!(
            row,
            vec![Value::Missing, Value::Missing, Value::Text("x".into())]
        );
    }

    #[test]
    fn whitespace_is_preserved_for_the_cleaner() {
        let f = csv_file("STATE\n ca \n");
        let (table, _) = load_table(f.path()).unwrap();
        let first = table.column("STATE").unwrap().next().cloned();
        assert_eq!(first, Some(Value::Text(" ca ".into())));
    }

    #[test]
    fn empty_file_is_a_zero_column_table() {
        let f = csv_file("");
        let (table, report) = load_table(f.path()).unwrap();
        assert!(table.columns().is_empty());
        assert!(table.is_empty());
        assert_eq!(report.total_rows, 0);
    }

    #[test]
    fn header_only_file_is_a_zero_row_table() {
        let f = csv_file("A,B\n");
        let (table, _) = load_table(f.path()).unwrap();
        assert_eq!(table.columns().len(), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn missing_file_is_data_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_table(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, LoadError::DataUnavailable { .. }));
    }
}
