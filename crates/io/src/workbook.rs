//! OOXML package navigation: which worksheet part is the active sheet.

use std::collections::HashMap;
use std::io::{Read, Seek};

use quick_xml::events::attributes::Attribute;
use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

pub const WORKBOOK_PART: &str = "xl/workbook.xml";
pub const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

/// A worksheet as listed in `xl/workbook.xml`, with its resolved zip path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetEntry {
    pub name: String,
    pub path: String,
}

/// Read a text entry from the archive, `None` if absent or not UTF-8.
pub fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<String> {
    let mut file = archive.by_name(name).ok()?;
    let mut content = String::new();
    file.read_to_string(&mut content).ok()?;
    Some(content)
}

/// Attribute value with XML entities decoded (`R&amp;D` -> `R&D`).
fn attr_text(attr: &Attribute) -> String {
    // `unescape_value` is unavailable when quick-xml's `encoding` feature is
    // enabled (calamine turns it on), so decode UTF-8 and unescape directly.
    let unescaped = std::str::from_utf8(&attr.value)
        .ok()
        .and_then(|text| quick_xml::escape::unescape(text).ok());
    match unescaped {
        Some(value) => value.into_owned(),
        None => String::from_utf8_lossy(&attr.value).into_owned(),
    }
}

/// Resolve a relationship target against the `xl/` folder.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

/// The active worksheet of a workbook.
///
/// `activeTab` in `<workbookView>` indexes the `<sheet>` list; a missing or
/// out-of-range tab, or one that points at a chartsheet, falls back to the
/// first worksheet.
pub fn active_worksheet(workbook_xml: &str, rels_xml: &str) -> Option<SheetEntry> {
    // Step 1: sheet names + rIds, and the active tab
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut active_tab = 0usize;
    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"sheet" => {
                    let mut name = None;
                    let mut rid = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"name" => name = Some(attr_text(&attr)),
                            b"r:id" => rid = Some(attr_text(&attr)),
                            _ => {}
                        }
                    }
                    if let (Some(name), Some(rid)) = (name, rid) {
                        sheets.push((name, rid));
                    }
                }
                b"workbookView" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"activeTab" {
                            active_tab = String::from_utf8_lossy(&attr.value).parse().unwrap_or(0);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Step 2: rId -> worksheet target
    let mut rid_to_target: HashMap<String, String> = HashMap::new();
    let mut reader = Reader::from_str(rels_xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                let mut is_worksheet = false;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = Some(attr_text(&attr)),
                        b"Target" => target = Some(attr_text(&attr)),
                        b"Type" => is_worksheet = attr.value.ends_with(b"/worksheet"),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target), true) = (id, target, is_worksheet) {
                    rid_to_target.insert(id, resolve_target(&target));
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Step 3: pick the active tab if it is a worksheet
    let entry = |(name, rid): &(String, String)| {
        rid_to_target
            .get(rid)
            .map(|path| SheetEntry { name: name.clone(), path: path.clone() })
    };
    sheets
        .get(active_tab)
        .and_then(entry)
        .or_else(|| sheets.iter().find_map(entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet2.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/chartsheet" Target="chartsheets/sheet1.xml"/>
<Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

    fn workbook(view: &str) -> String {
        format!(
            r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<bookViews>{view}</bookViews>
<sheets>
<sheet name="库存" sheetId="1" r:id="rId1"/>
<sheet name="订货" sheetId="2" r:id="rId2"/>
<sheet name="图表" sheetId="3" r:id="rId3"/>
</sheets></workbook>"#
        )
    }

    #[test]
    fn no_view_means_first_sheet() {
        let sheet = active_worksheet(&workbook(""), RELS).unwrap();
        assert_eq!(sheet, SheetEntry { name: "库存".into(), path: "xl/worksheets/sheet1.xml".into() });
    }

    #[test]
    fn active_tab_selects_sheet_and_absolute_target() {
        let sheet = active_worksheet(&workbook(r#"<workbookView activeTab="1"/>"#), RELS).unwrap();
        assert_eq!(sheet.name, "订货");
        assert_eq!(sheet.path, "xl/worksheets/sheet2.xml");
    }

    #[test]
    fn chartsheet_tab_falls_back_to_first_worksheet() {
        let sheet = active_worksheet(&workbook(r#"<workbookView activeTab="2"/>"#), RELS).unwrap();
        assert_eq!(sheet.name, "库存");
        let sheet = active_worksheet(&workbook(r#"<workbookView activeTab="9"/>"#), RELS).unwrap();
        assert_eq!(sheet.name, "库存");
    }

    #[test]
    fn no_worksheets() {
        assert_eq!(active_worksheet("<workbook><sheets/></workbook>", RELS), None);
    }

    #[test]
    fn escaped_names_and_targets_are_decoded() {
        let workbook = r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="R&amp;D &lt;2024&gt;" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
        let rels = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/a&amp;b.xml"/>
</Relationships>"#;
        let sheet = active_worksheet(workbook, rels).unwrap();
        assert_eq!(sheet.name, "R&D <2024>");
        assert_eq!(sheet.path, "xl/worksheets/a&b.xml");
    }
}
