use std::collections::BTreeMap;

use crate::{errors::Error, Result};

/// Header cells of the expense sheet, in column order.
pub const HEADER_AMOUNT: &str = "Valor";
pub const HEADER_DESCRIPTION: &str = "Descrição";

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// One (amount, description) pair persisted as a spreadsheet row.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpenseRecord {
    pub amount: f64,
    pub description: String,
}

impl ExpenseRecord {
    /// Build a record from a raw sheet row (`[amount, description, ..]`).
    ///
    /// A comma decimal separator is accepted in the amount cell. A missing
    /// description cell reads as empty text.
    pub fn from_row(row: &[String]) -> Result<Self> {
        let raw_amount = row.first().map(String::as_str).unwrap_or("");
        let amount = parse_amount(raw_amount)
            .ok_or_else(|| Error::Data(format!("invalid amount cell: {raw_amount:?}")))?;
        let description = row.get(1).cloned().unwrap_or_default();
        Ok(Self {
            amount,
            description,
        })
    }
}

/// A data row keyed by the sheet's header cells.
pub type SheetRecord = BTreeMap<String, String>;

/// Zip every data row with the header row.
///
/// Missing trailing cells become empty strings and cells beyond the header
/// width are dropped. An empty sheet (or header only) yields no records.
pub fn records_from_rows(rows: &[Vec<String>]) -> Vec<SheetRecord> {
    let Some((header, data)) = rows.split_first() else {
        return Vec::new();
    };

    data.iter()
        .map(|row| {
            header
                .iter()
                .enumerate()
                .map(|(idx, key)| (key.clone(), row.get(idx).cloned().unwrap_or_default()))
                .collect()
        })
        .collect()
}

/// Parse a stored amount, tolerating `,` as the decimal separator.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}
