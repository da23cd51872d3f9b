#![allow(dead_code)]

use std::path::Path;

use rust_xlsxwriter::{Format, Workbook};

/// A patient card: labelled header row, a styled name cell at D3, a merged
/// title and a widened column.
pub fn patient_template() -> Workbook {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Bemor").unwrap();
    sheet.merge_range(0, 0, 0, 5, "Bemor kartasi", &bold).unwrap();
    sheet.write_string(2, 0, "F.I.Sh").unwrap();
    sheet.write_blank(2, 3, &bold).unwrap();
    sheet.write_string(3, 0, "Tashxis").unwrap();
    sheet.set_column_width(3, 30.0).unwrap();
    sheet.set_row_height(2, 24.0).unwrap();
    workbook
}

pub fn write_patient_template(path: &Path) {
    patient_template().save(path).unwrap();
}

/// A patient workbook whose first sheet holds `c4` in C4.
pub fn write_patient_with(path: &Path, c4: Cell4) {
    let mut workbook = patient_template();
    let sheet = workbook.worksheet_from_index(0).unwrap();
    match c4 {
        Cell4::Text(t) => sheet.write_string(3, 2, t).unwrap(),
        Cell4::Number(n) => sheet.write_number(3, 2, n).unwrap(),
    };
    workbook.save(path).unwrap();
}

pub enum Cell4 {
    Text(&'static str),
    Number(f64),
}

/// Summary template with a bold header cell at D5.
pub fn write_summary_template(path: &Path) {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Jami").unwrap();
    sheet.write_string(3, 3, "Ism").unwrap();
    sheet.write_blank(4, 3, &bold).unwrap();
    workbook.save(path).unwrap();
}

/// Rewrite one part of an xlsx package by plain text substitution.
pub fn replace_in_part(bytes: &[u8], part: &str, from: &str, to: &str) -> Vec<u8> {
    use std::io::{Cursor, Read, Write};
    use zip::write::SimpleFileOptions;

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let name = file.name().to_string();
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        if name == part {
            let text = String::from_utf8(data).unwrap();
            assert!(text.contains(from), "{} does not contain {}", part, from);
            data = text.replace(from, to).into_bytes();
        }
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(&data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
