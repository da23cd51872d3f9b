//! Exporting several patient sheets into one workbook.
//!
//! With a mapping configuration every patient becomes one row of a shared
//! sheet; without one every patient gets a worksheet of their own.

use log::{debug, warn};
use rust_xlsxwriter::Workbook;
use serde_json::Value;
use std::collections::HashSet;

use crate::address::{self, CellAddress, MAX_COLUMN, MAX_ROW};
use crate::error::SheetError;
use crate::workbook::{CellData, WorkbookFile, Worksheet};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Longest sheet name xlsx accepts.
const SHEET_NAME_LIMIT: usize = 31;

/// Width of one character unit in the default font.
const MAX_DIGIT_PIXELS: f64 = 7.0;

/// `"C4-D5"`: copy C4 of each patient into column D, starting at row 5.
#[derive(Clone, Debug, PartialEq)]
pub struct MappingRule {
    pub source: CellAddress,
    pub destination: CellAddress,
}

impl MappingRule {
    pub fn parse(rule: &str) -> Option<Self> {
        let mut parts = rule.split('-');
        let source = address::decode(parts.next()?)?;
        let destination = parts.next()?;
        let (letters, row) = address::split(destination)?;
        let col = address::column_index(&letters)?;

        Some(MappingRule {
            source,
            destination: CellAddress::new(row - 1, col),
        })
    }

    /// Destination for the patient at `position` in the batch.
    pub fn destination_for(&self, position: usize) -> CellAddress {
        self.destination.offset_rows(position as u32)
    }
}

/// Parsed `converter.json`.
#[derive(Clone, Debug, Default)]
pub struct MappingConfig {
    pub rules: Vec<MappingRule>,
    /// Number of entries in the file, valid or not.
    pub declared: usize,
}

impl MappingConfig {
    /// Accepts a list of rules, `{"mappings": [...]}`, `{"mappings": "a;b"}`
    /// or a bare `"a;b"` string. Returns `None` when the text holds no rule
    /// list at all. Individual bad rules are dropped.
    pub fn parse(text: &str) -> Result<Option<Self>, SheetError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let conf: Value = serde_json::from_str(text)?;
        let raw: Vec<String> = match &conf {
            Value::Array(items) => items.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
            Value::Object(map) => match map.get("mappings") {
                Some(Value::Array(items)) => {
                    items.iter().filter_map(|v| v.as_str().map(String::from)).collect()
                }
                Some(Value::String(s)) => split_rules(s),
                _ => return Ok(None),
            },
            Value::String(s) => split_rules(s),
            _ => return Ok(None),
        };

        let rules = raw
            .iter()
            .filter_map(|r| {
                let parsed = MappingRule::parse(r);
                if parsed.is_none() {
                    debug!("skipping mapping rule {:?}", r);
                }
                parsed
            })
            .collect();

        Ok(Some(MappingConfig {
            rules,
            declared: raw.len(),
        }))
    }

    /// An empty list means "no mapping": exports fall back to one sheet
    /// per patient. A list of only malformed rules still selects mapped mode.
    pub fn is_empty(&self) -> bool {
        self.declared == 0
    }
}

fn split_rules(s: &str) -> Vec<String> {
    s.split(';')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from)
        .collect()
}

/// One requested patient. `workbook` is `None` when the patient has no
/// workbook on disk; such entries still take up a position in the batch.
pub struct BatchEntry {
    pub id: u64,
    pub name: Option<String>,
    pub workbook: Option<WorkbookFile>,
}

impl BatchEntry {
    fn source_sheet(&self) -> Option<&Worksheet> {
        self.workbook.as_ref().and_then(WorkbookFile::first_sheet)
    }
}

/// Copy mapped cells of every patient into the first sheet of `output`.
///
/// Patient `n` of the batch lands `n` rows below each rule's destination.
/// When the un-offset destination cell carries a style, the written cell
/// takes the same style. Returns the number of patients exported.
pub fn export_mapped(
    output: &mut WorkbookFile,
    rules: &[MappingRule],
    batch: &[BatchEntry],
) -> Result<usize, SheetError> {
    let sheet = output.first_sheet_mut().ok_or(SheetError::MissingWorksheet)?;
    let mut exported = 0;

    for (position, entry) in batch.iter().enumerate() {
        let Some(source) = entry.source_sheet() else {
            warn!("export: {}", SheetError::MissingSourceRecord(entry.id));
            continue;
        };

        for rule in rules {
            let target = rule.destination_for(position);
            if let Some(style) = sheet.style(rule.destination) {
                sheet.set_style(target, style);
            }
            sheet.set_value(target, source.value(rule.source));
        }
        exported += 1;
    }

    Ok(exported)
}

/// Make `name` usable as a worksheet name that is not in `taken`.
///
/// Names are cut to length before apostrophes are trimmed, since xlsx
/// rejects a name that starts or ends with one.
pub fn sanitize_sheet_name(name: &str, taken: &HashSet<String>) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '\\' | '/' | '*' | '?' | ':' | '[' | ']' => '_',
            c => c,
        })
        .collect();
    let base = fit_sheet_name(&cleaned, SHEET_NAME_LIMIT);

    let mut candidate = base.clone();
    let mut counter = 1;
    while taken.contains(&candidate.to_lowercase()) {
        let stem = fit_sheet_name(&base, SHEET_NAME_LIMIT - 3);
        candidate = format!("{}_{}", stem, counter);
        counter += 1;
    }
    candidate
}

/// At most `limit` characters, no leading or trailing apostrophe, never empty.
fn fit_sheet_name(name: &str, limit: usize) -> String {
    let cut: String = name.chars().take(limit).collect();
    let trimmed = cut.trim_matches('\'');
    if trimmed.is_empty() {
        "Sheet".to_string()
    } else {
        trimmed.to_string()
    }
}

/// One worksheet per patient, carrying column widths, row heights and values.
pub fn export_unmapped(batch: &[BatchEntry]) -> Result<Vec<u8>, SheetError> {
    let mut workbook = Workbook::new();
    let mut taken = HashSet::new();

    for entry in batch {
        let Some(source) = entry.source_sheet() else {
            warn!("export: {}", SheetError::MissingSourceRecord(entry.id));
            continue;
        };

        let label = match &entry.name {
            Some(name) => format!("{}_{}", entry.id, name),
            None => format!("Patient_{}", entry.id),
        };
        let sheet_name = sanitize_sheet_name(&label, &taken);
        taken.insert(sheet_name.to_lowercase());

        let target = workbook.add_worksheet();
        target.set_name(&sheet_name)?;

        for col in source.column_widths() {
            // Stored widths already include cell padding.
            let pixels = (col.width * MAX_DIGIT_PIXELS).round() as u16;
            for c in col.first..=col.last.min(MAX_COLUMN - 1) {
                target.set_column_width_pixels(c as u16, pixels)?;
            }
        }
        for (row, height) in source.row_heights() {
            target.set_row_height(row, height)?;
        }
        for (addr, cell) in source.cells() {
            let col = match u16::try_from(addr.col) {
                Ok(col) if addr.col < MAX_COLUMN && addr.row < MAX_ROW => col,
                _ => {
                    debug!("export: skipping out-of-range cell {:?}", addr);
                    continue;
                }
            };
            let row = addr.row;
            match cell.value() {
                CellData::Empty => {}
                CellData::Number(n) => {
                    target.write_number(row, col, *n)?;
                }
                CellData::Bool(b) => {
                    target.write_boolean(row, col, *b)?;
                }
                CellData::Text(t) | CellData::Error(t) => {
                    target.write_string(row, col, t)?;
                }
            }
        }
    }

    if taken.is_empty() {
        workbook.add_worksheet();
    }

    Ok(workbook.save_to_buffer()?)
}
