//! CSV uploads of purchases, sales and yields.
//!
//! ## Layout
//!
//! | Upload           | Header (fixed order)                                                                |
//! |------------------|-------------------------------------------------------------------------------------|
//! | purchases, sales | `Asset Name, Date, Amount, Quota Price, Value / Quota`                              |
//! | yields           | `Asset Name, Yield At, Base Date, Payment Date, Base Price, Income Value, Yield Value` |
//!
//! Cells may be separated by `,` or `;` (picked from the header line). Dates are
//! `dd/MM/yyyy`, `Yield At` is `yyyyMM`. Rows are numbered from 1 with the header
//! as row 1, columns from 1.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use crate::errors::{AppError, Result};
use crate::import::FileUpload;
use crate::models::normalize_asset_name;

pub const TRADE_HEADER: [&str; 5] = ["Asset Name", "Date", "Amount", "Quota Price", "Value / Quota"];

pub const YIELD_HEADER: [&str; 7] = [
    "Asset Name",
    "Yield At",
    "Base Date",
    "Payment Date",
    "Base Price",
    "Income Value",
    "Yield Value",
];

const CSV_CONTENT_TYPES: [&str; 5] = [
    "text/csv",
    "application/csv",
    "text/plain",
    "application/vnd.ms-excel",
    "application/octet-stream",
];

const DATE_FORMAT: &str = "%d/%m/%Y";

/// One validated purchase or sale line.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRow {
    pub row: usize,
    pub asset_name: String,
    pub date: NaiveDate,
    pub amount: i64,
    pub price: Decimal,
    pub quota_value: Decimal,
}

/// One validated yield line.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldRow {
    pub row: usize,
    pub asset_name: String,
    pub yield_at: String,
    pub base_date: NaiveDate,
    pub payment_date: NaiveDate,
    pub base_price: Decimal,
    pub income_value: Decimal,
    pub yield_value: Decimal,
}

/// Accepted rows in file order plus the number of in-batch duplicates dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRows<T> {
    pub rows: Vec<T>,
    pub skipped: usize,
}

/// Parse a purchases or sales upload. Rows repeating an (asset, date) pair
/// already seen in the file are skipped.
pub fn parse_trade_file(upload: Option<&FileUpload>, today: NaiveDate) -> Result<ParsedRows<TradeRow>> {
    let upload = ensure_csv_upload(upload)?;
    let raw_rows = read_rows(upload, &TRADE_HEADER)?;

    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(raw_rows.len());
    let mut skipped = 0;

    for raw in raw_rows {
        let asset_name = normalize_asset_name(raw.text(0));
        let date = raw.date(1, today)?;
        let amount = raw.positive_integer(2)?;
        let price = raw.positive_decimal(3)?;
        let quota_value = raw.positive_decimal(4)?;

        if !seen.insert((asset_name.clone(), date)) {
            tracing::debug!("Row {}: duplicate {} on {} skipped", raw.number, asset_name, date);
            skipped += 1;
            continue;
        }

        rows.push(TradeRow {
            row: raw.number,
            asset_name,
            date,
            amount,
            price,
            quota_value,
        });
    }

    Ok(ParsedRows { rows, skipped })
}

/// Parse a yields upload. Rows repeating an (asset, yieldAt) pair already seen
/// in the file are skipped; keys already persisted are the caller's concern.
pub fn parse_yield_file(upload: Option<&FileUpload>, today: NaiveDate) -> Result<ParsedRows<YieldRow>> {
    let upload = ensure_csv_upload(upload)?;
    let raw_rows = read_rows(upload, &YIELD_HEADER)?;

    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(raw_rows.len());
    let mut skipped = 0;

    for raw in raw_rows {
        let asset_name = normalize_asset_name(raw.text(0));
        let yield_at = raw.text(1).to_string();
        validate_yield_at(&yield_at, today)
            .map_err(|e| AppError::InvalidStringFormat(format!("Row {}: {}", raw.number, e)))?;
        let base_date = raw.date(2, today)?;
        let payment_date = raw.date(3, today)?;
        ensure_payment_after_base(base_date, payment_date)
            .map_err(|e| AppError::InvalidDateFormat(format!("Row {}: {}", raw.number, e)))?;
        let base_price = raw.positive_decimal(4)?;
        let income_value = raw.decimal(5)?;
        let yield_value = raw.decimal(6)?;

        if !seen.insert((asset_name.clone(), yield_at.clone())) {
            skipped += 1;
            continue;
        }

        rows.push(YieldRow {
            row: raw.number,
            asset_name,
            yield_at,
            base_date,
            payment_date,
            base_price,
            income_value,
            yield_value,
        });
    }

    Ok(ParsedRows { rows, skipped })
}

/// Checks a `yyyyMM` period token. The error text carries no row prefix so
/// manual registrations can reuse it.
pub fn validate_yield_at(token: &str, today: NaiveDate) -> std::result::Result<(), String> {
    if token.len() != 6 || !token.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("'{}' is not a valid yield period (yyyyMM)", token));
    }
    let year: i32 = token[..4]
        .parse()
        .map_err(|_| format!("'{}' has an invalid year", token))?;
    let month: u32 = token[4..]
        .parse()
        .map_err(|_| format!("'{}' has an invalid month", token))?;
    if year > today.year() {
        return Err(format!(
            "yield period {} is after the current year {}",
            token,
            today.year()
        ));
    }
    if !(1..=12).contains(&month) {
        return Err(format!("yield period {} has month {} outside 1-12", token, month));
    }
    Ok(())
}

pub fn ensure_payment_after_base(base_date: NaiveDate, payment_date: NaiveDate) -> std::result::Result<(), String> {
    if base_date > payment_date {
        return Err(format!(
            "payment date must exceed base date ({} is before {})",
            payment_date, base_date
        ));
    }
    Ok(())
}

// ── Structural checks ───────────────────────────────────────────────

fn ensure_csv_upload(upload: Option<&FileUpload>) -> Result<&FileUpload> {
    let upload = match upload {
        Some(u) if !u.bytes.is_empty() => u,
        _ => return Err(AppError::EmptyFile("No file provided or the file is empty".into())),
    };

    let has_csv_name = upload
        .file_name
        .as_deref()
        .map(|name| name.to_ascii_lowercase().ends_with(".csv"))
        .unwrap_or(false);
    let has_csv_type = upload
        .content_type
        .as_deref()
        .map(|declared| {
            let essence = declared.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            CSV_CONTENT_TYPES.contains(&essence.as_str())
        })
        .unwrap_or(true);

    if !has_csv_name || !has_csv_type {
        return Err(AppError::InvalidFileFormat(
            "The uploaded file must be a valid CSV".into(),
        ));
    }
    Ok(upload)
}

/// A data row with trimmed cells and its 1-based position in the file.
struct RawRow<'h> {
    number: usize,
    cells: Vec<String>,
    header: &'h [&'h str],
}

impl RawRow<'_> {
    fn text(&self, column: usize) -> &str {
        &self.cells[column]
    }

    fn date(&self, column: usize, today: NaiveDate) -> Result<NaiveDate> {
        let field = self.header[column];
        let value = self.text(column);
        let date = NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
            AppError::InvalidDateFormat(format!(
                "Row {}: '{}' in '{}' is not a valid date (dd/MM/yyyy)",
                self.number, value, field
            ))
        })?;
        if date > today {
            return Err(AppError::InvalidDateFormat(format!(
                "Row {}: '{}' {} is in the future; date must be <= current date",
                self.number, field, value
            )));
        }
        Ok(date)
    }

    fn positive_integer(&self, column: usize) -> Result<i64> {
        let field = self.header[column];
        let value = self.text(column);
        let parsed: i64 = value.parse().map_err(|_| {
            AppError::InvalidNumberFormat(format!(
                "Row {}: '{}' in '{}' is not a valid integer",
                self.number, value, field
            ))
        })?;
        if parsed <= 0 {
            return Err(AppError::InvalidNumberFormat(format!(
                "Row {}: '{}' must be greater than zero",
                self.number, field
            )));
        }
        Ok(parsed)
    }

    fn decimal(&self, column: usize) -> Result<Decimal> {
        let field = self.header[column];
        let value = self.text(column);
        parse_decimal(value).ok_or_else(|| {
            AppError::InvalidNumberFormat(format!(
                "Row {}: '{}' in '{}' is not a valid number",
                self.number, value, field
            ))
        })
    }

    fn positive_decimal(&self, column: usize) -> Result<Decimal> {
        let parsed = self.decimal(column)?;
        if parsed <= Decimal::ZERO {
            return Err(AppError::InvalidNumberFormat(format!(
                "Row {}: '{}' must be greater than zero",
                self.number, self.header[column]
            )));
        }
        Ok(parsed)
    }
}

/// Accepts `28.51` and the comma-decimal form `28,51`.
fn parse_decimal(value: &str) -> Option<Decimal> {
    let normalized = if value.contains(',') && !value.contains('.') {
        value.replace(',', ".")
    } else {
        value.to_string()
    };
    Decimal::from_str(&normalized).ok()
}

fn read_rows<'h>(upload: &FileUpload, header: &'h [&'h str]) -> Result<Vec<RawRow<'h>>> {
    let text = std::str::from_utf8(&upload.bytes)
        .map_err(|e| AppError::FileProcessing(format!("the file is not valid UTF-8: {e}")))?;
    let text = text.trim_start_matches('\u{feff}');

    let first_line = text.lines().next().unwrap_or("");
    let delimiter = if first_line.contains(';') { b';' } else { b',' };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();

    let header_record = match records.next() {
        Some(record) => record?,
        None => return Err(AppError::EmptyFile("The file is empty or header-only".into())),
    };
    check_header(&header_record, header)?;

    let mut rows = Vec::new();
    for (index, record) in records.enumerate() {
        let record = record?;
        // Header is row 1.
        let number = index + 2;

        if record.len() != header.len() {
            return Err(AppError::InvalidFileFormat(format!(
                "Row {} has {} columns, expected {}",
                number,
                record.len(),
                header.len()
            )));
        }

        let cells: Vec<String> = record.iter().map(|c| c.trim().to_string()).collect();
        if let Some(column) = cells.iter().position(|c| c.is_empty()) {
            return Err(AppError::InvalidFileFormat(format!(
                "Row {}, column {} ('{}') is empty",
                number,
                column + 1,
                header[column]
            )));
        }

        rows.push(RawRow {
            number,
            cells,
            header,
        });
    }

    if rows.is_empty() {
        return Err(AppError::EmptyFile("The file is empty or header-only".into()));
    }
    Ok(rows)
}

fn check_header(found: &csv::StringRecord, expected: &[&str]) -> Result<()> {
    if found.len() != expected.len() {
        return Err(AppError::InvalidFileFormat(format!(
            "Invalid header: expected {} columns '{}' but found {}",
            expected.len(),
            expected.join(", "),
            found.len()
        )));
    }
    for (position, (cell, name)) in found.iter().zip(expected).enumerate() {
        let cell = cell.trim().trim_start_matches('\u{feff}');
        if !cell.eq_ignore_ascii_case(name) {
            return Err(AppError::InvalidFileFormat(format!(
                "Invalid header at column {}: expected '{}' but found '{}'",
                position + 1,
                name,
                cell
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const TRADES: &str = "Asset Name,Date,Amount,Quota Price,Value / Quota";
    const YIELDS: &str =
        "Asset Name,Yield At,Base Date,Payment Date,Base Price,Income Value,Yield Value";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 15).unwrap()
    }

    fn trades(body: &str) -> Result<ParsedRows<TradeRow>> {
        let upload = FileUpload::csv("purchases.csv", &format!("{TRADES}\n{body}"));
        parse_trade_file(Some(&upload), today())
    }

    fn message(err: AppError) -> String {
        err.to_string()
    }

    #[test]
    fn parses_a_single_purchase_row() {
        let parsed = trades("ABCD11,01/01/2024,10,28.51,28.51").unwrap();
        assert_eq!(parsed.skipped, 0);
        assert_eq!(
            parsed.rows,
            vec![TradeRow {
                row: 2,
                asset_name: "ABCD11".into(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                amount: 10,
                price: dec!(28.51),
                quota_value: dec!(28.51),
            }]
        );
    }

    #[test]
    fn semicolon_files_accept_comma_decimals() {
        let body = "Asset Name;Date;Amount;Quota Price;Value / Quota\nabcd11 ; 02/01/2024 ;3;10,50;31,50";
        let upload = FileUpload::csv("p.csv", body);
        let parsed = parse_trade_file(Some(&upload), today()).unwrap();
        assert_eq!(parsed.rows[0].asset_name, "ABCD11");
        assert_eq!(parsed.rows[0].price, dec!(10.50));
        assert_eq!(parsed.rows[0].quota_value, dec!(31.50));
    }

    #[test]
    fn missing_or_empty_file_is_rejected() {
        assert!(matches!(
            parse_trade_file(None, today()),
            Err(AppError::EmptyFile(_))
        ));
        let empty = FileUpload::csv("p.csv", "");
        assert!(matches!(
            parse_trade_file(Some(&empty), today()),
            Err(AppError::EmptyFile(_))
        ));
    }

    #[test]
    fn non_csv_uploads_are_rejected() {
        let wrong_name = FileUpload::new("p.xlsx", Some("text/csv"), b"x".to_vec());
        let wrong_type = FileUpload::new("p.csv", Some("image/png"), b"x".to_vec());
        let no_name = FileUpload {
            file_name: None,
            content_type: Some("text/csv".into()),
            bytes: b"x".to_vec(),
        };
        for upload in [wrong_name, wrong_type, no_name] {
            let err = parse_trade_file(Some(&upload), today()).unwrap_err();
            assert!(message(err).contains("must be a valid CSV"));
        }
    }

    #[test]
    fn content_type_parameters_are_ignored() {
        let upload = FileUpload::new(
            "p.CSV",
            Some("text/csv; charset=utf-8"),
            format!("{TRADES}\nABCD11,01/01/2024,1,1,1").into_bytes(),
        );
        assert!(parse_trade_file(Some(&upload), today()).is_ok());
    }

    #[test]
    fn header_with_wrong_column_count_names_expected_header() {
        let upload = FileUpload::csv("p.csv", "Asset Name,Date,Amount\nABCD11,01/01/2024,1");
        let err = parse_trade_file(Some(&upload), today()).unwrap_err();
        assert!(matches!(err, AppError::InvalidFileFormat(_)));
        assert!(message(err).contains("Asset Name, Date, Amount, Quota Price, Value / Quota"));
    }

    #[test]
    fn header_with_wrong_name_names_both_columns() {
        let upload = FileUpload::csv(
            "p.csv",
            "Ticker,Date,Amount,Quota Price,Value / Quota\nABCD11,01/01/2024,1,1,1",
        );
        let err = message(parse_trade_file(Some(&upload), today()).unwrap_err());
        assert!(err.contains("expected 'Asset Name' but found 'Ticker'"), "{err}");
    }

    #[test]
    fn header_only_file_is_empty() {
        let upload = FileUpload::csv("p.csv", TRADES);
        let err = parse_trade_file(Some(&upload), today()).unwrap_err();
        assert!(matches!(err, AppError::EmptyFile(_)));
    }

    #[test]
    fn short_and_long_rows_cite_the_row() {
        let err = message(trades("ABCD11,01/01/2024,10,28.51,28.51\nABCD11,02/01/2024,10").unwrap_err());
        assert!(err.contains("Row 3 has 3 columns"), "{err}");

        let err = message(trades("ABCD11,01/01/2024,10,28.51,28.51,extra").unwrap_err());
        assert!(err.contains("Row 2 has 6 columns"), "{err}");
    }

    #[test]
    fn empty_cell_cites_row_and_column() {
        let err = message(trades("ABCD11,01/01/2024, ,28.51,28.51").unwrap_err());
        assert!(err.contains("Row 2, column 3"), "{err}");
    }

    #[test]
    fn bad_and_future_dates_are_invalid_date_format() {
        let err = trades("ABCD11,2024-01-01,10,28.51,28.51").unwrap_err();
        assert!(matches!(err, AppError::InvalidDateFormat(_)));

        let err = trades("ABCD11,16/09/2024,10,28.51,28.51").unwrap_err();
        assert!(matches!(err, AppError::InvalidDateFormat(_)));
        assert!(message(err).contains("<= current date"));
    }

    #[test]
    fn bad_numbers_cite_row_and_field() {
        let err = trades("ABCD11,01/01/2024,ten,28.51,28.51").unwrap_err();
        assert!(matches!(err, AppError::InvalidNumberFormat(_)));
        assert!(message(err).contains("Row 2: 'ten' in 'Amount'"));

        let err = message(trades("ABCD11,01/01/2024,10,abc,28.51").unwrap_err());
        assert!(err.contains("'Quota Price'"), "{err}");

        let err = message(trades("ABCD11,01/01/2024,0,1,1").unwrap_err());
        assert!(err.contains("greater than zero"), "{err}");
    }

    #[test]
    fn duplicate_asset_and_date_in_batch_is_skipped() {
        let parsed = trades(
            "ABCD11,01/01/2024,10,28.51,28.51\n\
             ABCD11,01/01/2024,5,30.00,30.00\n\
             ABCD11,02/01/2024,5,30.00,30.00",
        )
        .unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.rows[0].amount, 10);
        assert_eq!(parsed.rows[1].row, 4);
    }

    #[test]
    fn yield_rows_are_validated() {
        let ok = FileUpload::csv(
            "y.csv",
            &format!("{YIELDS}\nABCD11,202408,31/07/2024,14/08/2024,100.00,0.85,0.85"),
        );
        let parsed = parse_yield_file(Some(&ok), today()).unwrap();
        assert_eq!(parsed.rows[0].yield_at, "202408");
        assert_eq!(parsed.rows[0].income_value, dec!(0.85));

        let bad_token = FileUpload::csv(
            "y.csv",
            &format!("{YIELDS}\nABCD11,2024-8,31/07/2024,14/08/2024,100,1,1"),
        );
        assert!(matches!(
            parse_yield_file(Some(&bad_token), today()),
            Err(AppError::InvalidStringFormat(_))
        ));

        let swapped = FileUpload::csv(
            "y.csv",
            &format!("{YIELDS}\nABCD11,202408,14/08/2024,31/07/2024,100,1,1"),
        );
        let err = parse_yield_file(Some(&swapped), today()).unwrap_err();
        assert!(matches!(err, AppError::InvalidDateFormat(_)));
        assert!(message(err).contains("payment date must exceed base date"));
    }

    #[test]
    fn yield_period_checks() {
        assert!(validate_yield_at("202408", today()).is_ok());
        assert!(validate_yield_at("202413", today()).is_err());
        assert!(validate_yield_at("202400", today()).is_err());
        assert!(validate_yield_at("202501", today()).is_err());
        assert!(validate_yield_at("20248", today()).is_err());
        assert!(validate_yield_at("2024a8", today()).is_err());
    }
}
