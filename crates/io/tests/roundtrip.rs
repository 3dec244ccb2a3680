use std::io::Read;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use restock_io::legacy::LOSSY_WARNING;
use restock_io::{load_source, IoError, TargetDocument};
use restock_recon::config::InputConfig;
use restock_recon::CellValue;
use rust_xlsxwriter::{Color, Format, Workbook};
use tempfile::tempdir;

const SHEET_PART: &str = "xl/worksheets/sheet1.xml";

fn write_order_sheet(path: &Path) {
    let mut wb = Workbook::new();
    let header = Format::new().set_bold();
    let qty = Format::new().set_num_format("0.00").set_background_color(Color::Yellow);
    let ws = wb.add_worksheet();
    ws.set_name("订货单").unwrap();
    ws.write_string(0, 0, "夏季订货单").unwrap();
    ws.write_string_with_format(1, 0, "序号", &header).unwrap();
    ws.write_string_with_format(1, 1, "产品型号", &header).unwrap();
    ws.write_string_with_format(1, 2, "所需数量", &header).unwrap();
    ws.write_number(2, 0, 1).unwrap();
    ws.write_string(2, 1, "M100").unwrap();
    ws.write_number_with_format(2, 2, 0, &qty).unwrap();
    ws.write_number(3, 0, 2).unwrap();
    ws.write_string(3, 1, "M999").unwrap();
    ws.write_formula(3, 2, "=2+3").unwrap();
    ws.write_number(4, 0, 3).unwrap();
    ws.write_string(4, 1, "M300").unwrap();
    wb.save(path).unwrap();
}

fn entries(path: &Path) -> Vec<(String, Vec<u8>)> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).unwrap();
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).unwrap();
            (entry.name().to_string(), bytes)
        })
        .collect()
}

fn sheet_xml(path: &Path) -> String {
    let (_, bytes) = entries(path).into_iter().find(|(name, _)| name == SHEET_PART).unwrap();
    String::from_utf8(bytes).unwrap()
}

/// Value of the `s` attribute on the `<c>` element for `cell_ref`.
fn style_of(xml: &str, cell_ref: &str) -> Option<String> {
    let start = xml.find(&format!("<c r=\"{cell_ref}\""))?;
    let tag = &xml[start..start + xml[start..].find('>')?];
    let s = tag.find(" s=\"")? + 4;
    Some(tag[s..s + tag[s..].find('"')?].to_string())
}

#[test]
fn target_loads_active_sheet() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("order.xlsx");
    write_order_sheet(&path);

    let doc = TargetDocument::open(&path, &InputConfig::default()).unwrap();
    assert_eq!(doc.sheet.name, "订货单");
    assert_eq!(doc.sheet.path, SHEET_PART);
    assert!(!doc.converted_from_legacy);
    assert!(doc.warnings.is_empty());
    assert_eq!(doc.grid.max_row(), 5);
    assert_eq!(doc.grid.max_col(), 3);
    assert_eq!(doc.grid.get(2, 2).as_str(), Some("产品型号"));
    assert_eq!(doc.grid.get(3, 1), &CellValue::Number(1.0));
}

#[test]
fn sheet_name_with_markup_characters_opens_and_saves() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("order.xlsx");
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("R&D").unwrap();
    ws.write_string(0, 0, "产品型号").unwrap();
    ws.write_string(0, 1, "所需数量").unwrap();
    ws.write_string(1, 0, "M100").unwrap();
    wb.save(&path).unwrap();

    let mut doc = TargetDocument::open(&path, &InputConfig::default()).unwrap();
    assert_eq!(doc.sheet.name, "R&D");
    assert_eq!(doc.grid.get(2, 1).as_str(), Some("M100"));

    doc.grid.set_number(2, 2, 6.0).unwrap();
    let out = dir.path().join("order_out.xlsx");
    let summary = doc.save(&out).unwrap();
    assert_eq!(summary.sheet, "R&D");

    let mut wb = open_workbook_auto(&out).unwrap();
    let range = wb.worksheet_range("R&D").unwrap();
    assert_eq!(range.get_value((1, 1)), Some(&Data::Float(6.0)));
}

fn legacy_fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/order.xls")
}

#[test]
fn legacy_xls_target_is_converted_with_warning() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("order.xls");
    std::fs::copy(legacy_fixture(), &path).unwrap();
    let before = std::fs::read(&path).unwrap();

    let mut doc = TargetDocument::open(&path, &InputConfig::default()).unwrap();
    assert!(doc.converted_from_legacy);
    assert_eq!(doc.warnings, vec![LOSSY_WARNING.to_string()]);
    assert_eq!(doc.sheet.name, "订货单");
    assert_eq!(doc.grid.get(1, 1).as_str(), Some("产品型号"));
    assert_eq!(doc.grid.get(1, 2).as_str(), Some("所需数量"));
    assert_eq!(doc.grid.get(2, 1).as_str(), Some("M100"));
    assert_eq!(doc.grid.get(2, 2), &CellValue::Number(2.0));
    assert_eq!(doc.grid.get(3, 1).as_str(), Some("M200"));
    assert_eq!(doc.grid.get(3, 2), &CellValue::Empty);

    doc.grid.set_number(2, 2, 3.0).unwrap();
    doc.grid.set_number(3, 2, 5.0).unwrap();
    let out = dir.path().join("order_out.xlsx");
    let summary = doc.save(&out).unwrap();
    assert_eq!(summary.sheet, "订货单");
    assert_eq!(summary.patch.cells_replaced, 1);
    assert_eq!(summary.patch.cells_inserted, 1);
    assert_eq!(std::fs::read(&path).unwrap(), before);

    let mut wb = open_workbook_auto(&out).unwrap();
    let range = wb.worksheet_range("订货单").unwrap();
    assert_eq!(range.get_value((0, 0)), Some(&Data::String("产品型号".into())));
    assert_eq!(range.get_value((1, 1)), Some(&Data::Float(3.0)));
    assert_eq!(range.get_value((2, 0)), Some(&Data::String("M200".into())));
    assert_eq!(range.get_value((2, 1)), Some(&Data::Float(5.0)));
}

#[test]
fn save_patches_cells_and_preserves_package() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("order.xlsx");
    write_order_sheet(&path);
    let original_bytes = std::fs::read(&path).unwrap();
    let original_style = style_of(&sheet_xml(&path), "C3").unwrap();

    let mut doc = TargetDocument::open(&path, &InputConfig::default()).unwrap();
    doc.grid.set_number(3, 3, 3.0).unwrap();
    doc.grid.set_number(4, 3, 8.0).unwrap();
    doc.grid.set_number(5, 3, 4.0).unwrap();

    let out = dir.path().join("order_out.xlsx");
    let summary = doc.save(&out).unwrap();
    assert_eq!(summary.sheet, "订货单");
    assert_eq!(summary.patch.cells_replaced, 2);
    assert_eq!(summary.patch.cells_inserted, 1);
    assert_eq!(summary.patch.formulas_replaced, 1);

    // Input untouched
    assert_eq!(std::fs::read(&path).unwrap(), original_bytes);

    // Values visible to a reader
    let mut wb = open_workbook_auto(&out).unwrap();
    let range = wb.worksheet_range("订货单").unwrap();
    assert_eq!(range.get_value((2, 2)), Some(&Data::Float(3.0)));
    assert_eq!(range.get_value((3, 2)), Some(&Data::Float(8.0)));
    assert_eq!(range.get_value((4, 2)), Some(&Data::Float(4.0)));
    assert_eq!(range.get_value((2, 1)), Some(&Data::String("M100".into())));

    // Style kept, formula gone
    let xml = sheet_xml(&out);
    assert_eq!(style_of(&xml, "C3"), Some(original_style));
    assert!(!xml.contains("<f>"));

    // Every other entry identical and in the same order
    let before = entries(&path);
    let after = entries(&out);
    let names = |e: &[(String, Vec<u8>)]| e.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>();
    assert_eq!(names(&before), names(&after));
    for ((name, a), (_, b)) in before.iter().zip(&after) {
        if name != SHEET_PART {
            assert_eq!(a, b, "{name} changed");
        }
    }
}

#[test]
fn save_without_writes_keeps_sheet_identical() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("order.xlsx");
    write_order_sheet(&path);

    let doc = TargetDocument::open(&path, &InputConfig::default()).unwrap();
    let out = dir.path().join("copy.xlsx");
    let summary = doc.save(&out).unwrap();
    assert_eq!(summary.patch.cells_replaced, 0);
    assert_eq!(entries(&path), entries(&out));
}

#[test]
fn source_workbook_loads_first_sheet() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stock.xlsx");
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.write_string(0, 0, "库存明细").unwrap();
    ws.write_string(1, 0, "商家编码").unwrap();
    ws.write_string(1, 1, "实际可用数").unwrap();
    ws.write_string(1, 2, "30天销量").unwrap();
    ws.write_string(2, 0, "V1-M100").unwrap();
    ws.write_number(2, 1, 5).unwrap();
    ws.write_number(2, 2, 8).unwrap();
    wb.add_worksheet().write_string(0, 0, "ignored").unwrap();
    wb.save(&path).unwrap();

    let grid = load_source(&path, &InputConfig::default()).unwrap();
    assert_eq!(grid.get(2, 1).as_str(), Some("商家编码"));
    assert_eq!(grid.get(3, 3), &CellValue::Number(8.0));
}

#[test]
fn source_csv_loads() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stock.csv");
    let mut content = String::from("库存明细\n商家编码,实际可用数,30天销量\n");
    for i in 0..10 {
        content.push_str(&format!("V{i}-M{i}00,{i},{}\n", i * 2));
    }
    std::fs::write(&path, content).unwrap();

    let grid = load_source(&path, &InputConfig::default()).unwrap();
    assert_eq!(grid.max_row(), 12);
    assert_eq!(grid.get(4, 1).as_str(), Some("V1-M100"));
}

#[test]
fn tiny_and_csv_targets_are_rejected() {
    let dir = tempdir().unwrap();
    let tiny = dir.path().join("tiny.xlsx");
    std::fs::write(&tiny, b"PK\x03\x04").unwrap();
    let err = TargetDocument::open(&tiny, &InputConfig::default()).unwrap_err();
    assert!(matches!(err, IoError::EmptyOrTruncatedDocument { .. }));

    let csv = dir.path().join("order.csv");
    std::fs::write(&csv, "产品型号,所需数量\n".repeat(20)).unwrap();
    let err = TargetDocument::open(&csv, &InputConfig::default()).unwrap_err();
    assert!(matches!(err, IoError::UnreadableDocument { .. }));

    let err = TargetDocument::open(&dir.path().join("missing.xlsx"), &InputConfig::default()).unwrap_err();
    assert!(matches!(err, IoError::InputMissing { .. }));
}
