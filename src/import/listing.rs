//! Fixed-width exchange quote listing (COTAHIST layout) used to populate the
//! asset catalog.
//!
//! Only quote records (TIPREG `01`) are read:
//!
//! | Columns | Field  | Use                                   |
//! |---------|--------|---------------------------------------|
//! | 1-2     | TIPREG | `01` = quote record, others skipped   |
//! | 11-12   | CODBDI | `02` equity, `12` REIT-like fund       |
//! | 13-24   | CODNEG | ticker, right-padded with spaces      |

use std::collections::HashSet;

use crate::errors::{AppError, Result};
use crate::models::{normalize_asset_name, Asset, AssetCategory};

const QUOTE_RECORD: &[u8] = b"01";
const MIN_RECORD_LEN: usize = 24;

fn category_for(codbdi: &[u8]) -> Option<AssetCategory> {
    match codbdi {
        b"02" => Some(AssetCategory::Equity),
        b"12" => Some(AssetCategory::ReitLike),
        _ => None,
    }
}

/// Extract the distinct equity and REIT-like tickers from a listing file.
/// The file is read as raw bytes since only ASCII columns are used.
pub fn parse_listing(bytes: &[u8]) -> Result<Vec<Asset>> {
    if bytes.is_empty() {
        return Err(AppError::EmptyFile("The listing file is empty".into()));
    }

    let mut seen = HashSet::new();
    let mut assets = Vec::new();

    for (index, line) in bytes.split(|b| *b == b'\n').enumerate() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if !line.starts_with(QUOTE_RECORD) {
            continue;
        }
        if line.len() < MIN_RECORD_LEN {
            return Err(AppError::InvalidFileFormat(format!(
                "Listing line {} is a quote record shorter than {} characters",
                index + 1,
                MIN_RECORD_LEN
            )));
        }

        let Some(category) = category_for(&line[10..12]) else {
            continue;
        };
        let name = normalize_asset_name(&String::from_utf8_lossy(&line[12..24]));
        if name.is_empty() || !seen.insert(name.clone()) {
            continue;
        }
        assets.push(Asset { name, category });
    }

    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(codbdi: &str, ticker: &str) -> String {
        format!("0120240102{}{:<12}rest-of-record", codbdi, ticker)
    }

    #[test]
    fn reads_equities_and_reit_like_funds() {
        let file = [
            "00COTAHIST.2024BOVESPA 20240102".to_string(),
            record("02", "PETR4"),
            record("12", "ABCD11"),
            record("96", "PETR4F"),
            record("02", "PETR4"),
            "99COTAHIST.2024BOVESPA 2024010200000000004".to_string(),
        ]
        .join("\r\n");

        let assets = parse_listing(file.as_bytes()).unwrap();
        assert_eq!(
            assets,
            vec![
                Asset {
                    name: "PETR4".into(),
                    category: AssetCategory::Equity
                },
                Asset {
                    name: "ABCD11".into(),
                    category: AssetCategory::ReitLike
                },
            ]
        );
    }

    #[test]
    fn truncated_quote_record_cites_the_line() {
        let file = format!("{}\n0120240102", record("02", "PETR4"));
        let err = parse_listing(file.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn empty_listing_is_rejected() {
        assert!(matches!(parse_listing(b""), Err(AppError::EmptyFile(_))));
    }
}
