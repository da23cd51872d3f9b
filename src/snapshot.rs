//! Client-submitted sheet contents.
//!
//! The browser editor posts each worksheet either as a sparse list of changed
//! cells (`celldata`) or as the full visible grid (`data`). Cell values arrive
//! as bare scalars or as objects carrying a display string (`m`) and a machine
//! value (`v`).

use serde::Deserialize;
use serde_json::Value;

use crate::address::{self, CellAddress};

/// One cell value as posted by the client.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Scalar(String),
    Wrapped {
        display: Option<String>,
        raw: Option<String>,
    },
}

impl CellValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => CellValue::Wrapped {
                display: map.get("m").and_then(scalar_to_string),
                raw: map.get("v").and_then(scalar_to_string),
            },
            other => scalar_to_string(other)
                .map(CellValue::Scalar)
                .unwrap_or(CellValue::Empty),
        }
    }

    /// A dense grid element: an object with a `v` key wraps the value,
    /// anything else is the value itself.
    pub fn from_grid_json(value: &Value) -> Self {
        match value {
            Value::Object(map) if map.contains_key("v") => CellValue::from_json(&map["v"]),
            other => CellValue::from_json(other),
        }
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(CellValue::from_json(&value))
    }
}

/// Text form of a JSON scalar, matching how a browser would print it.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) => format_number(f),
            _ => n.to_string(),
        }),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Whole floats print without a fractional part (`3.0` → `"3"`).
pub fn format_number(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Display value of a cell, or `None` when it should be treated as absent.
/// Empty strings are absent. The raw value is only used when no display
/// text was sent at all.
pub fn resolve_display(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Empty => None,
        CellValue::Scalar(s) => non_empty(s.clone()),
        CellValue::Wrapped {
            display: Some(display),
            ..
        } => non_empty(display.clone()),
        CellValue::Wrapped { display: None, raw } => raw.clone().and_then(non_empty),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// One entry of a sparse snapshot.
#[derive(Clone, Debug, Deserialize)]
pub struct CellEntry {
    #[serde(default)]
    pub r: u32,
    #[serde(default)]
    pub c: u32,
    #[serde(default)]
    pub v: CellValue,
}

#[derive(Clone, Debug)]
pub enum SheetCells {
    Sparse(Vec<CellEntry>),
    Dense(Vec<Vec<CellValue>>),
}

/// One worksheet as submitted in a save request.
#[derive(Clone, Debug, Deserialize)]
#[serde(from = "RawSnapshot")]
pub struct SheetSnapshot {
    pub name: Option<String>,
    pub index: Option<usize>,
    pub active: bool,
    pub cells: SheetCells,
}

#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    index: Option<Value>,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    celldata: Option<Vec<CellEntry>>,
    #[serde(default)]
    data: Option<Vec<Value>>,
}

impl From<RawSnapshot> for SheetSnapshot {
    fn from(raw: RawSnapshot) -> Self {
        let cells = match raw.celldata {
            Some(entries) if !entries.is_empty() => SheetCells::Sparse(entries),
            _ => SheetCells::Dense(
                raw.data
                    .unwrap_or_default()
                    .iter()
                    .map(|row| match row {
                        Value::Array(cells) => cells.iter().map(CellValue::from_grid_json).collect(),
                        _ => Vec::new(),
                    })
                    .collect(),
            ),
        };

        SheetSnapshot {
            name: raw.name.filter(|n| !n.is_empty()),
            index: raw.index.as_ref().and_then(Value::as_u64).map(|i| i as usize),
            active: raw.status.as_ref().and_then(Value::as_i64) == Some(1),
            cells,
        }
    }
}

impl SheetSnapshot {
    pub fn sparse(cells: Vec<CellEntry>) -> Self {
        SheetSnapshot {
            name: None,
            index: None,
            active: false,
            cells: SheetCells::Sparse(cells),
        }
    }

    pub fn dense(rows: Vec<Vec<CellValue>>) -> Self {
        SheetSnapshot {
            name: None,
            index: None,
            active: false,
            cells: SheetCells::Dense(rows),
        }
    }

    /// Raw value at a zero-based position.
    pub fn value_at(&self, addr: CellAddress) -> Option<&CellValue> {
        match &self.cells {
            SheetCells::Dense(rows) => rows.get(addr.row as usize)?.get(addr.col as usize),
            SheetCells::Sparse(entries) => entries
                .iter()
                .find(|e| e.r == addr.row && e.c == addr.col)
                .map(|e| &e.v),
        }
    }

    /// Every cell with a displayable value, in payload order.
    pub fn populated(&self) -> Vec<(CellAddress, String)> {
        match &self.cells {
            SheetCells::Sparse(entries) => entries
                .iter()
                .filter_map(|e| resolve_display(&e.v).map(|v| (CellAddress::new(e.r, e.c), v)))
                .collect(),
            SheetCells::Dense(rows) => rows
                .iter()
                .enumerate()
                .flat_map(|(r, row)| {
                    row.iter().enumerate().filter_map(move |(c, v)| {
                        resolve_display(v).map(|v| (CellAddress::new(r as u32, c as u32), v))
                    })
                })
                .collect(),
        }
    }
}

/// Trimmed display text at an A1 address, `""` when absent or malformed.
pub fn lookup(snapshot: &SheetSnapshot, address: &str) -> String {
    let Some(addr) = address::decode(address) else {
        return String::new();
    };

    snapshot
        .value_at(addr)
        .and_then(resolve_display)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// The snapshot flagged as currently selected, else the first one.
pub fn select_active(snapshots: &[SheetSnapshot]) -> Option<&SheetSnapshot> {
    snapshots.iter().find(|s| s.active).or_else(|| snapshots.first())
}

/// [`lookup`] against the selected snapshot.
pub fn lookup_in(snapshots: &[SheetSnapshot], address: &str) -> String {
    select_active(snapshots)
        .map(|s| lookup(s, address))
        .unwrap_or_default()
}
