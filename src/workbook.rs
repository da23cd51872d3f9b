//! xlsx packages read and patched in place.
//!
//! A [`WorkbookFile`] keeps every part of the zip archive as loaded. Only the
//! `<sheetData>` element of a worksheet whose cells were changed is rebuilt on
//! save, and inside it untouched cells are written back from their original
//! bytes. Styles, merged regions, column widths, drawings and everything else
//! pass through unchanged.

use lazy_static::lazy_static;
use log::debug;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::address::{CellAddress, MAX_COLUMN, MAX_ROW};
use crate::error::SheetError;
use crate::snapshot::format_number;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

lazy_static! {
    static ref CALC_CHAIN_REL: Regex = Regex::new(r"<Relationship\s[^>]*calcChain[^>]*/>").unwrap();
    static ref CALC_CHAIN_OVERRIDE: Regex = Regex::new(r"<Override\s[^>]*calcChain[^>]*/>").unwrap();
}

/// Value held by a worksheet cell. Formula cells carry their cached result.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum CellData {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Error(String),
}

impl CellData {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellData::Empty)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Cell {
    value: CellData,
    style: Option<u32>,
    formula: Option<String>,
    /// Original `<c>` element, kept while the cell is unmodified.
    raw: Option<Vec<u8>>,
}

impl Cell {
    pub fn value(&self) -> &CellData {
        &self.value
    }

    pub fn style(&self) -> Option<u32> {
        self.style
    }

    pub fn formula(&self) -> Option<&str> {
        self.formula.as_deref()
    }
}

#[derive(Clone, Debug, Default)]
struct Row {
    /// Attributes of the `<row>` start tag, values kept escaped.
    attrs: Vec<(String, String)>,
    cells: BTreeMap<u32, Cell>,
}

impl Row {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Width of a run of columns, zero-based and inclusive.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnWidth {
    pub first: u32,
    pub last: u32,
    pub width: f64,
}

#[derive(Clone, Debug)]
pub struct Worksheet {
    name: String,
    part: String,
    head: Vec<u8>,
    tail: Vec<u8>,
    prefix: String,
    rows: BTreeMap<u32, Row>,
    columns: Vec<ColumnWidth>,
    dirty: bool,
    formulas_overwritten: bool,
}

impl Worksheet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cell(&self, addr: CellAddress) -> Option<&Cell> {
        self.rows.get(&addr.row)?.cells.get(&addr.col)
    }

    /// Value at `addr`, [`CellData::Empty`] when the cell does not exist.
    pub fn value(&self, addr: CellAddress) -> CellData {
        self.cell(addr).map(|c| c.value.clone()).unwrap_or_default()
    }

    pub fn style(&self, addr: CellAddress) -> Option<u32> {
        self.cell(addr).and_then(|c| c.style)
    }

    /// Replace the value of a cell, keeping its style. Any formula is dropped.
    pub fn set_value(&mut self, addr: CellAddress, value: CellData) {
        let cell = self.cell_mut(addr);
        if cell.formula.take().is_some() {
            self.formulas_overwritten = true;
        }
        let cell = self.cell_mut(addr);
        cell.value = value;
        cell.raw = None;
        self.dirty = true;
    }

    pub fn set_style(&mut self, addr: CellAddress, style: u32) {
        let cell = self.cell_mut(addr);
        cell.style = Some(style);
        cell.raw = None;
        self.dirty = true;
    }

    /// Every stored cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (CellAddress, &Cell)> {
        self.rows.iter().flat_map(|(&r, row)| {
            row.cells
                .iter()
                .map(move |(&c, cell)| (CellAddress::new(r, c), cell))
        })
    }

    pub fn column_widths(&self) -> &[ColumnWidth] {
        &self.columns
    }

    /// Explicit row heights as (zero-based row, points).
    pub fn row_heights(&self) -> Vec<(u32, f64)> {
        self.rows
            .iter()
            .filter_map(|(&r, row)| {
                row.attr("ht")
                    .and_then(|h| h.parse::<f64>().ok())
                    .map(|h| (r, h))
            })
            .collect()
    }

    pub fn is_modified(&self) -> bool {
        self.dirty
    }

    fn cell_mut(&mut self, addr: CellAddress) -> &mut Cell {
        let row = self.rows.entry(addr.row).or_insert_with(|| Row {
            attrs: vec![("r".to_string(), (addr.row + 1).to_string())],
            cells: BTreeMap::new(),
        });
        if !row.cells.contains_key(&addr.col) {
            // spans is only a hint and goes stale once a cell is added
            row.attrs.retain(|(k, _)| k != "spans");
        }
        row.cells.entry(addr.col).or_default()
    }

    fn to_xml(&self) -> Vec<u8> {
        let p = &self.prefix;
        let mut out = Vec::with_capacity(self.head.len() + self.tail.len() + self.rows.len() * 128);
        out.extend_from_slice(&self.head);

        if self.rows.is_empty() {
            out.extend_from_slice(format!("<{}sheetData/>", p).as_bytes());
        } else {
            out.extend_from_slice(format!("<{}sheetData>", p).as_bytes());
            for (&r, row) in &self.rows {
                out.extend_from_slice(format!("<{}row", p).as_bytes());
                if row.attr("r").is_none() {
                    out.extend_from_slice(format!(" r=\"{}\"", r + 1).as_bytes());
                }
                for (k, v) in &row.attrs {
                    push_attr(&mut out, k, v);
                }
                if row.cells.is_empty() {
                    out.extend_from_slice(b"/>");
                    continue;
                }
                out.push(b'>');
                for (&c, cell) in &row.cells {
                    match &cell.raw {
                        Some(raw) => out.extend_from_slice(raw),
                        None => write_cell(&mut out, p, CellAddress::new(r, c), cell),
                    }
                }
                out.extend_from_slice(format!("</{}row>", p).as_bytes());
            }
            out.extend_from_slice(format!("</{}sheetData>", p).as_bytes());
        }

        out.extend_from_slice(&self.tail);
        out
    }
}

fn push_attr(out: &mut Vec<u8>, key: &str, escaped_value: &str) {
    let quote = if escaped_value.contains('"') { '\'' } else { '"' };
    out.extend_from_slice(format!(" {}={}{}{}", key, quote, escaped_value, quote).as_bytes());
}

fn write_cell(out: &mut Vec<u8>, p: &str, addr: CellAddress, cell: &Cell) {
    let mut open = format!("<{}c r=\"{}\"", p, addr);
    if let Some(s) = cell.style {
        open.push_str(&format!(" s=\"{}\"", s));
    }

    let body = match &cell.value {
        CellData::Empty => {
            open.push_str("/>");
            out.extend_from_slice(open.as_bytes());
            return;
        }
        CellData::Number(n) => format!("<{p}v>{}</{p}v>", format_number(*n), p = p),
        CellData::Bool(b) => {
            open.push_str(" t=\"b\"");
            format!("<{p}v>{}</{p}v>", if *b { 1 } else { 0 }, p = p)
        }
        CellData::Error(e) => {
            open.push_str(" t=\"e\"");
            format!("<{p}v>{}</{p}v>", escape(e.as_str()), p = p)
        }
        CellData::Text(t) => {
            open.push_str(" t=\"inlineStr\"");
            format!(
                "<{p}is><{p}t xml:space=\"preserve\">{}</{p}t></{p}is>",
                escape(t.as_str()),
                p = p
            )
        }
    };

    out.extend_from_slice(open.as_bytes());
    out.push(b'>');
    out.extend_from_slice(body.as_bytes());
    out.extend_from_slice(format!("</{}c>", p).as_bytes());
}

struct Part {
    name: String,
    data: Vec<u8>,
}

/// An xlsx workbook held in memory.
pub struct WorkbookFile {
    parts: Vec<Part>,
    sheets: Vec<Worksheet>,
}

impl WorkbookFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SheetError> {
        let data = fs::read(path.as_ref())?;
        Self::load_from_bytes(&data)
    }

    pub fn load_from_bytes(data: &[u8]) -> Result<Self, SheetError> {
        let mut archive = ZipArchive::new(Cursor::new(data))?;
        let mut parts = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let mut buf = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buf)?;
            parts.push(Part {
                name: file.name().to_string(),
                data: buf,
            });
        }

        let find = |name: &str| parts.iter().find(|p| p.name == name).map(|p| p.data.as_slice());

        let workbook_xml =
            find(WORKBOOK_PART).ok_or_else(|| SheetError::MissingPart(WORKBOOK_PART.to_string()))?;
        let sheet_refs = parse_sheet_list(workbook_xml)?;
        let rels = match find(WORKBOOK_RELS_PART) {
            Some(xml) => parse_relationships(xml)?,
            None => HashMap::new(),
        };
        let shared_strings = match find(SHARED_STRINGS_PART) {
            Some(xml) => parse_shared_strings(xml)?,
            None => Vec::new(),
        };

        let mut sheets = Vec::with_capacity(sheet_refs.len());
        for (position, (name, rid)) in sheet_refs.into_iter().enumerate() {
            let part = match rels.get(&rid) {
                Some(target) => resolve_target(target),
                None => format!("xl/worksheets/sheet{}.xml", position + 1),
            };
            let xml = find(&part).ok_or_else(|| SheetError::MissingPart(part.clone()))?;
            sheets.push(parse_worksheet(name, part.clone(), xml, &shared_strings)?);
        }

        Ok(WorkbookFile { parts, sheets })
    }

    /// A fresh workbook with a single empty worksheet.
    pub fn blank(sheet_name: &str) -> Result<Self, SheetError> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        workbook.add_worksheet().set_name(sheet_name)?;
        let bytes = workbook.save_to_buffer()?;
        Self::load_from_bytes(&bytes)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn sheet_by_name(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_by_index(&self, index: usize) -> Option<&Worksheet> {
        self.sheets.get(index)
    }

    pub fn sheet_by_index_mut(&mut self, index: usize) -> Option<&mut Worksheet> {
        self.sheets.get_mut(index)
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name)
    }

    pub fn first_sheet(&self) -> Option<&Worksheet> {
        self.sheets.first()
    }

    pub fn first_sheet_mut(&mut self) -> Option<&mut Worksheet> {
        self.sheets.first_mut()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SheetError> {
        let drop_calc_chain = self.sheets.iter().any(|s| s.formulas_overwritten);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        for part in &self.parts {
            if drop_calc_chain && part.name == CALC_CHAIN_PART {
                debug!("dropping {} after formula cells were overwritten", CALC_CHAIN_PART);
                continue;
            }

            let rebuilt = self
                .sheets
                .iter()
                .find(|s| s.dirty && s.part == part.name)
                .map(Worksheet::to_xml);

            let data = match (&rebuilt, part.name.as_str()) {
                (Some(xml), _) => xml.clone(),
                (None, WORKBOOK_RELS_PART) if drop_calc_chain => {
                    strip(&CALC_CHAIN_REL, &part.data)
                }
                (None, CONTENT_TYPES_PART) if drop_calc_chain => {
                    strip(&CALC_CHAIN_OVERRIDE, &part.data)
                }
                _ => part.data.clone(),
            };

            zip.start_file(part.name.as_str(), options)?;
            zip.write_all(&data)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    /// Write to `path`, going through a sibling temp file so a failed write
    /// never leaves a truncated workbook behind.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SheetError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let tmp = path.with_extension("xlsx.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn strip(re: &Regex, data: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(data);
    re.replace_all(&text, "").into_owned().into_bytes()
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn attr_value(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes().flatten().find(|a| a.key.as_ref() == key).map(|a| {
        a.unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned())
    })
}

fn attr_local_value(e: &BytesStart, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// (sheet name, relationship id) in workbook order.
fn parse_sheet_list(xml: &[u8]) -> Result<Vec<(String, String)>, SheetError> {
    let mut reader = Reader::from_reader(xml);
    let mut sheets = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = attr_value(&e, b"name");
                let rid = attr_local_value(&e, b"id");
                if let (Some(name), Some(rid)) = (name, rid) {
                    sheets.push((name, rid));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(sheets)
}

fn parse_relationships(xml: &[u8]) -> Result<HashMap<String, String>, SheetError> {
    let mut reader = Reader::from_reader(xml);
    let mut rels = HashMap::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr_value(&e, b"Id"), attr_value(&e, b"Target")) {
                    rels.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rels)
}

fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, SheetError> {
    let mut reader = Reader::from_reader(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" if phonetic_depth == 0 => in_t = true,
                b"rPh" => phonetic_depth += 1,
                _ => {}
            },
            Event::Text(e) if in_t => current.push_str(&e.unescape().unwrap_or_default()),
            Event::CData(e) if in_t => current.push_str(&String::from_utf8_lossy(&e.into_inner())),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(strings)
}

/// State of the `<c>` element being read.
struct PendingCell {
    col: u32,
    start: usize,
    has_ref: bool,
    style: Option<u32>,
    kind: String,
    value: Option<String>,
    inline: String,
    formula: Option<String>,
}

#[derive(PartialEq)]
enum Capture {
    None,
    Value,
    Formula,
    InlineText,
}

fn parse_worksheet(
    name: String,
    part: String,
    xml: &[u8],
    shared_strings: &[String],
) -> Result<Worksheet, SheetError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut sheet = Worksheet {
        name,
        part,
        head: Vec::new(),
        tail: Vec::new(),
        prefix: String::new(),
        rows: BTreeMap::new(),
        columns: Vec::new(),
        dirty: false,
        formulas_overwritten: false,
    };

    let mut data_span: Option<(usize, usize)> = None;
    let mut data_start: Option<usize> = None;
    let mut current_row: Option<u32> = None;
    let mut next_row: u32 = 0;
    let mut next_col: u32 = 0;
    let mut cell: Option<PendingCell> = None;
    let mut capture = Capture::None;
    let mut phonetic_depth = 0usize;

    loop {
        let event = reader.read_event()?;
        let end = reader.buffer_position() as usize;
        let tag_start = || xml[..end].iter().rposition(|&b| b == b'<').unwrap_or(0);

        match event {
            Event::Start(e) | Event::Empty(e) if data_start.is_none() && data_span.is_none() => {
                let is_empty = xml[..end].ends_with(b"/>");
                match e.local_name().as_ref() {
                    b"sheetData" => {
                        let qname = e.name();
                        let qname = String::from_utf8_lossy(qname.as_ref()).into_owned();
                        sheet.prefix = match qname.rfind(':') {
                            Some(i) => qname[..=i].to_string(),
                            None => String::new(),
                        };
                        if is_empty {
                            data_span = Some((tag_start(), end));
                        } else {
                            data_start = Some(tag_start());
                        }
                    }
                    b"col" => {
                        let first = attr_value(&e, b"min").and_then(|v| v.parse::<u32>().ok());
                        let last = attr_value(&e, b"max").and_then(|v| v.parse::<u32>().ok());
                        let width = attr_value(&e, b"width").and_then(|v| v.parse::<f64>().ok());
                        if let (Some(first), Some(last), Some(width)) = (first, last, width) {
                            if first >= 1 && last >= first {
                                sheet.columns.push(ColumnWidth {
                                    first: first - 1,
                                    last: (last - 1).min(MAX_COLUMN - 1),
                                    width,
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Start(e) | Event::Empty(e) if data_start.is_some() => {
                let is_empty = xml[..end].ends_with(b"/>");
                match e.local_name().as_ref() {
                    b"row" => {
                        let mut attrs = Vec::new();
                        let mut index = None;
                        for a in e.attributes().flatten() {
                            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
                            let value = String::from_utf8_lossy(&a.value).into_owned();
                            if key == "r" {
                                index = value.parse::<u32>().ok().filter(|r| *r >= 1 && *r <= MAX_ROW);
                            }
                            attrs.push((key, value));
                        }
                        let r = index.map(|r| r - 1).unwrap_or(next_row);
                        next_row = r + 1;
                        next_col = 0;
                        let row = sheet.rows.entry(r).or_default();
                        if row.attrs.is_empty() {
                            row.attrs = attrs;
                        }
                        current_row = if is_empty { None } else { Some(r) };
                    }
                    b"c" => {
                        let reference = attr_value(&e, b"r").and_then(|r| crate::address::decode(&r));
                        let col = reference.map(|a| a.col).unwrap_or(next_col);
                        next_col = col + 1;
                        let pending = PendingCell {
                            col,
                            start: tag_start(),
                            has_ref: reference.is_some(),
                            style: attr_value(&e, b"s").and_then(|s| s.parse().ok()),
                            kind: attr_value(&e, b"t").unwrap_or_default(),
                            value: None,
                            inline: String::new(),
                            formula: None,
                        };
                        if is_empty {
                            finish_cell(&mut sheet, current_row, pending, xml, end, shared_strings);
                        } else {
                            cell = Some(pending);
                        }
                    }
                    b"v" if !is_empty => capture = Capture::Value,
                    b"f" => {
                        if let Some(c) = cell.as_mut() {
                            c.formula = Some(String::new());
                        }
                        if !is_empty {
                            capture = Capture::Formula;
                        }
                    }
                    b"rPh" if !is_empty => phonetic_depth += 1,
                    b"t" if !is_empty && phonetic_depth == 0 => capture = Capture::InlineText,
                    _ => {}
                }
            }
            Event::Text(e) if capture != Capture::None => {
                let text = e.unescape().unwrap_or_default();
                push_capture(cell.as_mut(), &capture, &text);
            }
            Event::CData(e) if capture != Capture::None => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                push_capture(cell.as_mut(), &capture, &text);
            }
            Event::End(e) if data_start.is_some() => match e.local_name().as_ref() {
                b"v" | b"f" | b"t" => capture = Capture::None,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"c" => {
                    if let Some(pending) = cell.take() {
                        finish_cell(&mut sheet, current_row, pending, xml, end, shared_strings);
                    }
                }
                b"row" => current_row = None,
                b"sheetData" => {
                    data_span = data_start.take().map(|s| (s, end));
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let (head_end, tail_start) = match data_span {
        Some(span) => span,
        None => {
            // No sheetData at all: insert one before the closing root tag.
            let close = xml.windows(2).rposition(|w| w == b"</").unwrap_or(xml.len());
            (close, close)
        }
    };
    sheet.head = xml[..head_end].to_vec();
    sheet.tail = xml[tail_start..].to_vec();

    Ok(sheet)
}

fn push_capture(cell: Option<&mut PendingCell>, capture: &Capture, text: &str) {
    let Some(c) = cell else { return };
    match capture {
        Capture::Value => c.value.get_or_insert_with(String::new).push_str(text),
        Capture::Formula => c.formula.get_or_insert_with(String::new).push_str(text),
        Capture::InlineText => c.inline.push_str(text),
        Capture::None => {}
    }
}

fn finish_cell(
    sheet: &mut Worksheet,
    row: Option<u32>,
    pending: PendingCell,
    xml: &[u8],
    end: usize,
    shared_strings: &[String],
) {
    let Some(r) = row else { return };

    let value = match (pending.kind.as_str(), pending.value) {
        ("inlineStr", _) => CellData::Text(pending.inline),
        ("s", Some(v)) => v
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i))
            .map(|s| CellData::Text(s.clone()))
            .unwrap_or_default(),
        ("b", Some(v)) => CellData::Bool(v.trim() == "1"),
        ("e", Some(v)) => CellData::Error(v),
        ("str", Some(v)) | ("d", Some(v)) => CellData::Text(v),
        (_, Some(v)) => match v.trim().parse::<f64>() {
            Ok(n) => CellData::Number(n),
            Err(_) => CellData::Text(v),
        },
        (_, None) => CellData::Empty,
    };

    let raw = if pending.has_ref {
        Some(xml[pending.start..end].to_vec())
    } else {
        None
    };

    sheet.rows.entry(r).or_default().cells.insert(
        pending.col,
        Cell {
            value,
            style: pending.style,
            formula: pending.formula,
            raw,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{Format, Workbook};

    fn fixture() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Karta").unwrap();
        sheet.write_string_with_format(0, 0, "Header", &bold).unwrap();
        sheet.write_number(1, 1, 42.5).unwrap();
        sheet.write_boolean(2, 2, true).unwrap();
        sheet.set_column_width(3, 25.0).unwrap();
        sheet.set_row_height(4, 30.0).unwrap();
        sheet.merge_range(5, 0, 5, 3, "Merged", &bold).unwrap();
        workbook.add_worksheet().set_name("Second").unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_load_reads_values_and_layout() {
        let wb = WorkbookFile::load_from_bytes(&fixture()).unwrap();
        assert_eq!(wb.sheet_names(), vec!["Karta", "Second"]);

        let ws = wb.sheet_by_name("Karta").unwrap();
        assert_eq!(ws.value(CellAddress::new(0, 0)), CellData::Text("Header".into()));
        assert_eq!(ws.value(CellAddress::new(1, 1)), CellData::Number(42.5));
        assert_eq!(ws.value(CellAddress::new(2, 2)), CellData::Bool(true));
        assert_eq!(ws.value(CellAddress::new(9, 9)), CellData::Empty);
        assert!(ws.style(CellAddress::new(0, 0)).is_some());

        assert!(ws
            .column_widths()
            .iter()
            .any(|c| c.first <= 3 && c.last >= 3 && c.width > 20.0));
        assert!(ws.row_heights().iter().any(|&(r, h)| r == 4 && h == 30.0));
    }

    #[test]
    fn test_unmodified_workbook_keeps_sheet_xml() {
        let bytes = fixture();
        let wb = WorkbookFile::load_from_bytes(&bytes).unwrap();
        let again = WorkbookFile::load_from_bytes(&wb.to_bytes().unwrap()).unwrap();
        assert_eq!(
            wb.sheet_by_index(0).unwrap().to_xml(),
            again.sheet_by_index(0).unwrap().to_xml()
        );
    }

    #[test]
    fn test_set_value_keeps_style_and_merges() {
        let mut wb = WorkbookFile::load_from_bytes(&fixture()).unwrap();
        let header = CellAddress::new(0, 0);
        let style = wb.first_sheet().unwrap().style(header);

        let ws = wb.first_sheet_mut().unwrap();
        ws.set_value(header, CellData::Text("Bemor <1> & co".into()));
        ws.set_value(CellAddress::new(0, 40), CellData::Text("far".into()));
        ws.set_value(CellAddress::new(99, 0), CellData::Number(7.0));
        assert!(ws.is_modified());

        let saved = wb.to_bytes().unwrap();
        let wb = WorkbookFile::load_from_bytes(&saved).unwrap();
        let ws = wb.first_sheet().unwrap();
        assert_eq!(ws.value(header), CellData::Text("Bemor <1> & co".into()));
        assert_eq!(ws.style(header), style);
        assert_eq!(ws.value(CellAddress::new(0, 40)), CellData::Text("far".into()));
        assert_eq!(ws.value(CellAddress::new(99, 0)), CellData::Number(7.0));
        assert_eq!(ws.value(CellAddress::new(1, 1)), CellData::Number(42.5));

        let xml = String::from_utf8(ws.to_xml()).unwrap();
        assert!(xml.contains("<mergeCell ref=\"A6:D6\"/>"));
        assert!(xml.contains("<cols>"));
    }

    #[test]
    fn test_blank_workbook() {
        let wb = WorkbookFile::blank("Sheet1").unwrap();
        assert_eq!(wb.sheet_names(), vec!["Sheet1"]);
        assert_eq!(wb.first_sheet().unwrap().cells().count(), 0);
    }
}
