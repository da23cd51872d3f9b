//! Applying client snapshots onto a persisted workbook.

use log::debug;

use crate::address::{CellAddress, MAX_COLUMN, MAX_ROW};
use crate::error::SheetError;
use crate::snapshot::{lookup_in, resolve_display, SheetCells, SheetSnapshot};
use crate::store::PatientRecord;
use crate::workbook::{CellData, WorkbookFile};

/// Addresses of the denormalized header fields inside a patient sheet.
#[derive(Clone, Debug)]
pub struct HeaderCells {
    pub full_name: String,
    pub phone: String,
}

impl Default for HeaderCells {
    fn default() -> Self {
        HeaderCells {
            full_name: "D3".to_string(),
            phone: "AC3".to_string(),
        }
    }
}

/// Name and phone as read from a save request. Empty means "not supplied".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeaderFields {
    pub full_name: String,
    pub phone: String,
}

impl HeaderFields {
    /// Read from the submitted snapshots, not from the written workbook.
    pub fn from_snapshots(snapshots: &[SheetSnapshot], cells: &HeaderCells) -> Self {
        HeaderFields {
            full_name: lookup_in(snapshots, &cells.full_name),
            phone: lookup_in(snapshots, &cells.phone),
        }
    }

    /// Overwrite stored values, but only with non-empty ones.
    pub fn apply_to(&self, record: &mut PatientRecord) {
        if !self.full_name.is_empty() {
            record.name = self.full_name.clone();
        }
        if !self.phone.is_empty() {
            record.phone = self.phone.clone();
        }
    }
}

fn target_sheet(workbook: &WorkbookFile, snapshot: &SheetSnapshot) -> Option<usize> {
    snapshot
        .name
        .as_deref()
        .and_then(|name| workbook.position_of(name))
        .or_else(|| snapshot.index.filter(|&i| i < workbook.sheet_count()))
        .or_else(|| (workbook.sheet_count() > 0).then_some(0))
}

/// Write every resolvable cell of every snapshot into `workbook`.
///
/// Cells whose value resolves to nothing are left as they are, so template
/// text and formatting survive. Returns the number of cells written.
pub fn apply_snapshots(
    workbook: &mut WorkbookFile,
    snapshots: &[SheetSnapshot],
) -> Result<usize, SheetError> {
    let mut written = 0;

    for snapshot in snapshots {
        let index = target_sheet(workbook, snapshot).ok_or(SheetError::MissingWorksheet)?;
        let sheet = workbook
            .sheet_by_index_mut(index)
            .ok_or(SheetError::MissingWorksheet)?;

        let mut write = |addr: CellAddress, text: String| {
            if addr.row >= MAX_ROW || addr.col >= MAX_COLUMN {
                debug!("ignoring out-of-range cell {:?}", addr);
                return;
            }
            sheet.set_value(addr, CellData::Text(text));
            written += 1;
        };

        match &snapshot.cells {
            SheetCells::Sparse(entries) => {
                for entry in entries {
                    if let Some(text) = resolve_display(&entry.v) {
                        write(CellAddress::new(entry.r, entry.c), text);
                    }
                }
            }
            SheetCells::Dense(rows) => {
                for (r, row) in rows.iter().enumerate() {
                    for (c, value) in row.iter().enumerate() {
                        if let Some(text) = resolve_display(value) {
                            write(CellAddress::new(r as u32, c as u32), text);
                        }
                    }
                }
            }
        }
    }

    Ok(written)
}
