//! Spreadsheet import and export of the item catalog.
//!
//! CSV files and Excel workbooks are both reduced to rows of text cells; the
//! header row decides which column feeds which item field.

use bigdecimal::BigDecimal;
use calamine::{open_workbook_auto_from_rs, Reader};
use chrono::Utc;
use chrono_tz::Tz;
use rust_xlsxwriter::Workbook;
use serde::Serialize;
use std::io::Cursor;
use std::str::FromStr;
use thiserror::Error;

use crate::models::{Category, Item, NewItem};
use crate::utils::timezone::format_local;

#[derive(Debug, Error)]
pub enum SpreadsheetError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook could not be read: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Workbook has no worksheets")]
    NoWorksheet,

    #[error("Workbook could not be written: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),
}

/// Outcome of parsing one sheet
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportResult {
    pub success: bool,
    pub imported: usize,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Item>,
}

impl ImportResult {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            imported: 0,
            errors: vec![message.into()],
            items: Vec::new(),
        }
    }
}

/// Header aliases, matched case-insensitively in priority order
const NAME_COLUMNS: &[&str] = &["name", "item", "item name", "description", "product", "profile"];
const CATEGORY_COLUMNS: &[&str] = &["category", "type", "cat"];
const QUANTITY_COLUMNS: &[&str] = &["quantity", "qty", "count", "stock", "on hand"];
const LOCATION_COLUMNS: &[&str] = &["location", "loc", "bin", "warehouse"];
const SUPPLIER_COLUMNS: &[&str] = &["supplier", "vendor", "manufacturer"];
const REORDER_COLUMNS: &[&str] = &["reorder", "reorder level", "min", "minimum"];
const NOTES_COLUMNS: &[&str] = &["notes", "note", "comments"];
const SKU_COLUMNS: &[&str] = &["sku", "part number", "part", "code", "item number"];
const COST_COLUMNS: &[&str] = &["cost", "price", "unit cost", "unit price"];

const EXPORT_HEADERS: [&str; 11] = [
    "Name",
    "Category",
    "Quantity",
    "Location",
    "Supplier",
    "Reorder Level",
    "Notes",
    "SKU",
    "Unit Cost",
    "Last Count Date",
    "Last Count By",
];

/// Index of the first header matching one of `aliases`
pub fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    let lower: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    aliases
        .iter()
        .find_map(|alias| lower.iter().position(|h| h == alias))
}

fn numeric_text(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect()
}

/// Strip everything but digits, `.` and `-`; unparseable cells become 0
pub fn parse_number(value: &str) -> f64 {
    numeric_text(value).parse::<f64>().unwrap_or(0.0)
}

/// Whole number of a quantity cell; `None` when it does not fit an `i32`
fn parse_whole(value: &str) -> Option<i32> {
    let number = parse_number(value).trunc();
    (number >= f64::from(i32::MIN) && number <= f64::from(i32::MAX)).then_some(number as i32)
}

fn parse_cost(value: &str) -> BigDecimal {
    BigDecimal::from_str(&numeric_text(value)).unwrap_or_default()
}

/// Turn sheet rows into catalog items. Row 0 is the header.
pub fn map_rows(rows: &[Vec<String>]) -> ImportResult {
    let Some((header, data)) = rows.split_first() else {
        return ImportResult::failed("File is empty or has no data rows");
    };
    if data.is_empty() {
        return ImportResult::failed("File is empty or has no data rows");
    }

    let Some(name_idx) = find_column(header, NAME_COLUMNS) else {
        return ImportResult::failed("Could not find 'Name' or 'Item' column");
    };
    let category_idx = find_column(header, CATEGORY_COLUMNS);
    let quantity_idx = find_column(header, QUANTITY_COLUMNS);
    let location_idx = find_column(header, LOCATION_COLUMNS);
    let supplier_idx = find_column(header, SUPPLIER_COLUMNS);
    let reorder_idx = find_column(header, REORDER_COLUMNS);
    let notes_idx = find_column(header, NOTES_COLUMNS).filter(|&i| i != name_idx);
    let sku_idx = find_column(header, SKU_COLUMNS);
    let cost_idx = find_column(header, COST_COLUMNS);

    let cell = |row: &[String], idx: Option<usize>| -> String {
        idx.and_then(|i| row.get(i))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let now = Utc::now();
    let mut result = ImportResult {
        success: true,
        ..Default::default()
    };

    for (offset, row) in data.iter().enumerate() {
        let name = cell(row, Some(name_idx));
        if name.is_empty() {
            continue;
        }
        let row_number = offset + 2;

        let whole = |idx: Option<usize>| idx.map_or(Some(0), |_| parse_whole(&cell(row, idx)));
        let (Some(quantity), Some(reorder_level)) = (whole(quantity_idx), whole(reorder_idx)) else {
            result
                .errors
                .push(format!("Row {row_number}: quantity is out of range"));
            continue;
        };
        if quantity < 0 || reorder_level < 0 {
            result
                .errors
                .push(format!("Row {row_number}: quantities cannot be negative"));
            continue;
        }

        let sku = cell(row, sku_idx);
        let cost = cell(row, cost_idx);
        let item = NewItem {
            id: None,
            name,
            category: Category::normalize(&cell(row, category_idx)),
            quantity,
            location: cell(row, location_idx),
            supplier: cell(row, supplier_idx),
            reorder_level,
            notes: cell(row, notes_idx),
            sku: (!sku.is_empty()).then_some(sku),
            unit_cost: (!cost.is_empty()).then(|| parse_cost(&cost)),
        }
        .into_item(now);
        result.items.push(item);
    }

    result.imported = result.items.len();
    result
}

/// Read CSV text into trimmed cell rows; rows with no content are dropped
pub fn read_csv_rows(content: &str) -> Result<Vec<Vec<String>>, SpreadsheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.trim_start_matches('\u{feff}').as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

pub fn parse_csv(content: &str) -> ImportResult {
    match read_csv_rows(content) {
        Ok(rows) => map_rows(&rows),
        Err(e) => ImportResult::failed(e.to_string()),
    }
}

/// Rows of the first worksheet of an `.xlsx`/`.xls` workbook
pub fn read_workbook_rows(bytes: Vec<u8>) -> Result<Vec<Vec<String>>, SpreadsheetError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SpreadsheetError::NoWorksheet)??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect())
}

pub fn parse_workbook(bytes: Vec<u8>) -> ImportResult {
    match read_workbook_rows(bytes) {
        Ok(rows) => map_rows(&rows),
        Err(e) => ImportResult::failed(e.to_string()),
    }
}

fn export_row(item: &Item, tz: Tz) -> [String; 11] {
    [
        item.name.clone(),
        item.category.to_string(),
        item.quantity.to_string(),
        item.location.clone(),
        item.supplier.clone(),
        item.reorder_level.to_string(),
        item.notes.clone(),
        item.sku.clone().unwrap_or_default(),
        item.unit_cost.as_ref().map(ToString::to_string).unwrap_or_default(),
        item.last_count_date
            .map(|at| format_local(at, tz))
            .unwrap_or_default(),
        item.last_count_by.clone().unwrap_or_default(),
    ]
}

/// Render the catalog as CSV; count dates are shown in `tz`
pub fn export_csv(items: &[Item], tz: Tz) -> Result<String, SpreadsheetError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADERS)?;
    for item in items {
        writer.write_record(export_row(item, tz))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Render the catalog as an `.xlsx` workbook with one "Inventory" sheet
pub fn export_xlsx(items: &[Item], tz: Tz) -> Result<Vec<u8>, SpreadsheetError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Inventory")?;

    for (col, header) in EXPORT_HEADERS.iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }
    for (offset, item) in items.iter().enumerate() {
        let row = offset as u32 + 1;
        for (col, value) in export_row(item, tz).into_iter().enumerate() {
            let col = col as u16;
            match col {
                2 => sheet.write_number(row, col, f64::from(item.quantity))?,
                5 => sheet.write_number(row, col, f64::from(item.reorder_level))?,
                _ if value.is_empty() => continue,
                _ => sheet.write_string(row, col, value)?,
            };
        }
    }

    Ok(workbook.save_to_buffer()?)
}
