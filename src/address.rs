//! A1-style cell addresses.
//!
//! Columns use bijective base-26 letters (`A` = 1 … `Z` = 26, `AA` = 27) and
//! rows are 1-based in the external form. Internally everything is zero-based.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref ADDRESS_REGEX: Regex = Regex::new(r"^([A-Za-z]+)([0-9]+)$").unwrap();
}

/// Largest column xlsx allows (`XFD`).
pub const MAX_COLUMN: u32 = 16_384;
/// Largest row xlsx allows.
pub const MAX_ROW: u32 = 1_048_576;

/// Zero-based cell coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub fn new(row: u32, col: u32) -> Self {
        CellAddress { row, col }
    }

    /// Same column, `rows` further down.
    pub fn offset_rows(self, rows: u32) -> Self {
        CellAddress {
            row: self.row + rows,
            col: self.col,
        }
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row + 1)
    }
}

impl FromStr for CellAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s).ok_or_else(|| format!("Invalid cell address: {}", s))
    }
}

/// Convert a zero-based column to its letters (`0` → `A`, `28` → `AC`).
pub fn column_letters(col0: u32) -> String {
    let mut name = Vec::new();
    let mut n = col0 + 1;

    while n > 0 {
        n -= 1;
        name.push(b'A' + (n % 26) as u8);
        n /= 26;
    }

    name.reverse();
    String::from_utf8(name).unwrap_or_default()
}

/// Convert column letters to a zero-based column. Case-insensitive.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }

    let mut col: u32 = 0;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        let digit = (b.to_ascii_uppercase() - b'A' + 1) as u32;
        col = col.checked_mul(26)?.checked_add(digit)?;
    }

    Some(col - 1)
}

/// Zero-based row/column to `"AC3"` form.
pub fn encode(row0: u32, col0: u32) -> String {
    CellAddress::new(row0, col0).to_string()
}

/// Parse `"AC3"` (any letter case, surrounding whitespace ignored).
///
/// Returns `None` for anything that is not letters followed by digits, for
/// row `0`, and for numbers too large to represent.
pub fn decode(address: &str) -> Option<CellAddress> {
    let caps = ADDRESS_REGEX.captures(address.trim())?;
    let col = column_index(&caps[1])?;
    let row: u32 = caps[2].parse().ok()?;

    if row < 1 {
        return None;
    }

    Some(CellAddress::new(row - 1, col))
}

/// Split an address into its letters (upper-cased) and 1-based row number,
/// without converting the letters. Used for mapping rule destinations.
pub fn split(address: &str) -> Option<(String, u32)> {
    let caps = ADDRESS_REGEX.captures(address.trim())?;
    let row: u32 = caps[2].parse().ok()?;
    if row < 1 {
        return None;
    }
    Some((caps[1].to_ascii_uppercase(), row))
}
