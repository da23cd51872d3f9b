mod common;

use std::collections::HashSet;

use common::Cell4;
use patient_sheets::export::{export_mapped, export_unmapped, BatchEntry, MappingConfig};
use patient_sheets::{CellAddress, CellData, WorkbookFile};

fn entry(dir: &std::path::Path, id: u64, name: Option<&str>, c4: Option<Cell4>) -> BatchEntry {
    let workbook = c4.map(|value| {
        let path = dir.join(format!("{}.xlsx", id));
        common::write_patient_with(&path, value);
        WorkbookFile::load(&path).unwrap()
    });
    BatchEntry {
        id,
        name: name.map(String::from),
        workbook,
    }
}

#[test]
fn test_mapped_export_offsets_rows_and_copies_style() {
    let dir = tempfile::tempdir().unwrap();
    let summary = dir.path().join("alltmp.xlsx");
    common::write_summary_template(&summary);

    let mapping = MappingConfig::parse(r#"{"mappings": "C4-D5;A3-E5"}"#)
        .unwrap()
        .unwrap();
    let batch = vec![
        entry(dir.path(), 1, Some("Ali"), Some(Cell4::Text("Ali Valiyev"))),
        entry(dir.path(), 99, None, None),
        entry(dir.path(), 2, Some("Vali"), Some(Cell4::Number(42.0))),
    ];

    let mut output = WorkbookFile::load(&summary).unwrap();
    let header_style = output.first_sheet().unwrap().style(CellAddress::new(4, 3));
    assert!(header_style.is_some());

    let exported = export_mapped(&mut output, &mapping.rules, &batch).unwrap();
    assert_eq!(exported, 2, "missing record must be skipped");

    let bytes = output.to_bytes().unwrap();
    let result = WorkbookFile::load_from_bytes(&bytes).unwrap();
    let sheet = result.first_sheet().unwrap();

    assert_eq!(sheet.value(CellAddress::new(4, 3)), CellData::Text("Ali Valiyev".into()));
    assert_eq!(sheet.value(CellAddress::new(5, 3)), CellData::Empty, "skipped record keeps its row");
    assert_eq!(sheet.value(CellAddress::new(6, 3)), CellData::Number(42.0));
    assert_eq!(sheet.style(CellAddress::new(6, 3)), header_style);
    assert_eq!(sheet.value(CellAddress::new(4, 4)), CellData::Text("F.I.Sh".into()));
    assert_eq!(sheet.value(CellAddress::new(3, 3)), CellData::Text("Ism".into()));
}

#[test]
fn test_mapped_export_into_blank_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let rules = MappingConfig::parse(r#"["C4-D5"]"#).unwrap().unwrap().rules;
    let batch = vec![
        entry(dir.path(), 1, None, Some(Cell4::Text("first"))),
        entry(dir.path(), 2, None, Some(Cell4::Text("second"))),
    ];

    let mut output = WorkbookFile::blank("Sheet1").unwrap();
    export_mapped(&mut output, &rules, &batch).unwrap();

    let result = WorkbookFile::load_from_bytes(&output.to_bytes().unwrap()).unwrap();
    assert_eq!(result.sheet_names(), vec!["Sheet1"]);
    let sheet = result.first_sheet().unwrap();
    assert_eq!(sheet.value(CellAddress::new(4, 3)), CellData::Text("first".into()));
    assert_eq!(sheet.value(CellAddress::new(5, 3)), CellData::Text("second".into()));
}

#[test]
fn test_unmapped_export_one_sheet_per_patient() {
    let dir = tempfile::tempdir().unwrap();
    let long_name = "Abdurahmonov Abdurashid Abdulla o'g'li";
    let batch = vec![
        entry(dir.path(), 7, Some(long_name), Some(Cell4::Text("a"))),
        entry(dir.path(), 8, None, Some(Cell4::Number(3.5))),
        entry(dir.path(), 9, Some("Ghost"), None),
    ];

    let bytes = export_unmapped(&batch).unwrap();
    let result = WorkbookFile::load_from_bytes(&bytes).unwrap();

    let names = result.sheet_names();
    assert_eq!(names.len(), 2, "patient without a workbook gets no sheet");
    assert!(names.iter().all(|n| n.chars().count() <= 31));
    assert!(names[0].starts_with("7_Abdurahmonov"));
    assert_eq!(names[1], "Patient_8");
    let unique: HashSet<String> = names.iter().map(|n| n.to_lowercase()).collect();
    assert_eq!(unique.len(), names.len());

    let first = result.sheet_by_index(0).unwrap();
    assert_eq!(first.value(CellAddress::new(3, 2)), CellData::Text("a".into()));
    assert_eq!(first.value(CellAddress::new(2, 0)), CellData::Text("F.I.Sh".into()));
    assert!(first.row_heights().iter().any(|&(r, h)| r == 2 && h == 24.0));

    let source = batch[0].workbook.as_ref().unwrap().first_sheet().unwrap();
    let width_of = |widths: &[patient_sheets::workbook::ColumnWidth]| {
        widths
            .iter()
            .find(|c| c.first <= 3 && c.last >= 3)
            .map(|c| c.width)
    };
    let (before, after) = (width_of(source.column_widths()), width_of(first.column_widths()));
    assert!(
        (before.unwrap() - after.unwrap()).abs() < 0.2,
        "column width drifted from {:?} to {:?}",
        before,
        after
    );

    let second = result.sheet_by_index(1).unwrap();
    assert_eq!(second.value(CellAddress::new(3, 2)), CellData::Number(3.5));
}

#[test]
fn test_unmapped_export_with_nothing_to_export() {
    let bytes = export_unmapped(&[]).unwrap();
    let result = WorkbookFile::load_from_bytes(&bytes).unwrap();
    assert_eq!(result.sheet_count(), 1);
}

#[test]
fn test_unmapped_export_skips_cells_beyond_sheet_limits() {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "kept").unwrap();
    sheet.write_string(0, 1, "moved").unwrap();
    let bytes = workbook.save_to_buffer().unwrap();
    // B1 becomes a column far past XFD.
    let bytes = common::replace_in_part(&bytes, "xl/worksheets/sheet1.xml", "r=\"B1\"", "r=\"ZZZZ1\"");

    let source = WorkbookFile::load_from_bytes(&bytes).unwrap();
    let batch = vec![BatchEntry {
        id: 5,
        name: Some("Ali".into()),
        workbook: Some(source),
    }];

    let exported = export_unmapped(&batch).unwrap();
    let result = WorkbookFile::load_from_bytes(&exported).unwrap();
    let sheet = result.first_sheet().unwrap();
    assert_eq!(sheet.value(CellAddress::new(0, 0)), CellData::Text("kept".into()));
    assert_eq!(sheet.cells().count(), 1, "out-of-range cell must not wrap into another column");
}
