mod common;

use std::io::Read;

use patient_sheets::snapshot::SheetSnapshot;
use patient_sheets::writer::{apply_snapshots, HeaderCells, HeaderFields};
use patient_sheets::{CellAddress, CellData, WorkbookFile};
use serde_json::json;

fn sheet_xml(bytes: &[u8]) -> String {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut part = archive.by_name("xl/worksheets/sheet1.xml").unwrap();
    let mut xml = String::new();
    part.read_to_string(&mut xml).unwrap();
    xml
}

fn snapshots(value: serde_json::Value) -> Vec<SheetSnapshot> {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_save_keeps_template_layout() {
    let template = common::patient_template().save_to_buffer().unwrap();
    let mut workbook = WorkbookFile::load_from_bytes(&template).unwrap();
    let name_cell = CellAddress::new(2, 3);
    let name_style = workbook.first_sheet().unwrap().style(name_cell);
    assert!(name_style.is_some(), "fixture D3 should carry a style");

    let sheets = snapshots(json!([{
        "name": "Bemor",
        "status": 1,
        "celldata": [
            {"r": 2, "c": 3, "v": {"m": "Ali Valiyev", "v": "Ali Valiyev"}},
            {"r": 3, "c": 1, "v": {"v": 38.6}},
            {"r": 2, "c": 0, "v": {"m": ""}}
        ]
    }]));
    let written = apply_snapshots(&mut workbook, &sheets).unwrap();
    assert_eq!(written, 2, "blank entries must not be written");

    let saved = workbook.to_bytes().unwrap();
    let reloaded = WorkbookFile::load_from_bytes(&saved).unwrap();
    let sheet = reloaded.first_sheet().unwrap();

    assert_eq!(sheet.value(name_cell), CellData::Text("Ali Valiyev".into()));
    assert_eq!(sheet.style(name_cell), name_style, "D3 lost its style");
    assert_eq!(sheet.value(CellAddress::new(3, 1)), CellData::Text("38.6".into()));
    assert_eq!(
        sheet.value(CellAddress::new(2, 0)),
        CellData::Text("F.I.Sh".into()),
        "template label was blanked"
    );

    let original = WorkbookFile::load_from_bytes(&template).unwrap();
    let before = original.first_sheet().unwrap();
    assert_eq!(sheet.column_widths(), before.column_widths());
    assert_eq!(sheet.row_heights(), before.row_heights());

    let xml = sheet_xml(&saved);
    assert!(xml.contains("<mergeCell ref=\"A1:F1\"/>"), "merged title lost");
}

#[test]
fn test_dense_grid_and_header_fields() {
    let template = common::patient_template().save_to_buffer().unwrap();
    let mut workbook = WorkbookFile::load_from_bytes(&template).unwrap();

    let mut row = vec![serde_json::Value::Null; 29];
    row[3] = json!({"v": {"m": "Dilnoza Karimova"}});
    row[28] = json!("+998 90 000 00 00");
    let sheets = snapshots(json!([{ "index": 0, "data": [[], [], row] }]));

    apply_snapshots(&mut workbook, &sheets).unwrap();
    let sheet = workbook.first_sheet().unwrap();
    assert_eq!(
        sheet.value(CellAddress::new(2, 28)),
        CellData::Text("+998 90 000 00 00".into())
    );

    let fields = HeaderFields::from_snapshots(&sheets, &HeaderCells::default());
    assert_eq!(fields.full_name, "Dilnoza Karimova");
    assert_eq!(fields.phone, "+998 90 000 00 00");
}

#[test]
fn test_unknown_sheet_falls_back_to_first() {
    let template = common::patient_template().save_to_buffer().unwrap();
    let mut workbook = WorkbookFile::load_from_bytes(&template).unwrap();
    let sheets = snapshots(json!([{ "name": "Nowhere", "index": 5, "celldata": [] }]));

    assert_eq!(apply_snapshots(&mut workbook, &sheets).unwrap(), 0);
    assert!(!workbook.first_sheet().unwrap().is_modified());
}

#[test]
fn test_empty_display_text_keeps_template_cell() {
    let template = common::patient_template().save_to_buffer().unwrap();
    let mut workbook = WorkbookFile::load_from_bytes(&template).unwrap();

    let sheets = snapshots(json!([{
        "name": "Bemor",
        "celldata": [
            {"r": 3, "c": 0, "v": {"m": "", "v": "hidden"}},
            {"r": 2, "c": 3, "v": {"m": "", "v": "Ali Valiyev"}}
        ]
    }]));
    let written = apply_snapshots(&mut workbook, &sheets).unwrap();
    assert_eq!(written, 0, "cells with empty display text must not be written");

    let fields = HeaderFields::from_snapshots(&sheets, &HeaderCells::default());
    assert_eq!(fields.full_name, "");

    let sheet = workbook.first_sheet().unwrap();
    assert_eq!(sheet.value(CellAddress::new(3, 0)), CellData::Text("Tashxis".into()));
    assert_eq!(sheet.value(CellAddress::new(2, 3)), CellData::Empty);
}
