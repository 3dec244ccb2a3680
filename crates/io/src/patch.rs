//! In-place `.xlsx` patching.
//!
//! Only the `<c>` elements of written cells change, plus `<dimension ref>`
//! when an inserted cell falls outside it. The worksheet XML is
//! streamed once and copied through verbatim between the tags that need
//! editing, so attribute order, whitespace, namespaces and every other
//! element survive byte-for-byte. All other package entries are raw-copied.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Seek, Write};

use log::{debug, info};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use restock_recon::grid::{column_index, column_letters, format_number};
use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::IoError;
use crate::workbook::{read_entry, CALC_CHAIN_PART, CONTENT_TYPES_PART, WORKBOOK_RELS_PART};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatchStats {
    /// Existing cells whose content was replaced.
    pub cells_replaced: usize,
    /// Cells that had no element and were inserted.
    pub cells_inserted: usize,
    /// Rows that had no element and were inserted.
    pub rows_inserted: usize,
    /// Replaced cells that held a formula.
    pub formulas_replaced: usize,
    /// Whether `xl/calcChain.xml` was removed.
    pub calc_chain_dropped: bool,
}

/// Split `"AB12"` into a 1-based `(row, col)`.
pub fn parse_cell_ref(cell_ref: &str) -> Option<(usize, usize)> {
    let split = cell_ref.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cell_ref.split_at(split);
    let col = column_index(letters)?;
    let row = digits.parse::<usize>().ok().filter(|r| *r > 0)?;
    Some((row, col))
}

fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn prefix_of(e: &BytesStart) -> String {
    match e.name().prefix() {
        Some(p) => format!("{}:", String::from_utf8_lossy(p.as_ref())),
        None => String::new(),
    }
}

/// `<row r="2"/>` -> `<row r="2">`
fn open_tag(raw: &str) -> String {
    let body = raw.strip_suffix("/>").unwrap_or(raw);
    format!("{}>", body.trim_end())
}

/// Union of a `<dimension ref>` with the written rectangle
/// `(first_row, first_col, last_row, last_col)`. `None` when the ref already
/// covers it or cannot be parsed.
fn widen_ref(current: &str, bounds: (usize, usize, usize, usize)) -> Option<String> {
    let (first, last) = current.split_once(':').unwrap_or((current, current));
    let (r1, c1) = parse_cell_ref(first)?;
    let (r2, c2) = parse_cell_ref(last)?;
    let widened = (r1.min(bounds.0), c1.min(bounds.1), r2.max(bounds.2), c2.max(bounds.3));
    if widened == (r1, c1, r2, c2) {
        return None;
    }
    let (r1, c1, r2, c2) = widened;
    Some(format!("{}{r1}:{}{r2}", column_letters(c1), column_letters(c2)))
}

fn malformed(e: impl std::fmt::Display) -> IoError {
    IoError::Write(format!("malformed package XML: {e}"))
}

fn zip_err(e: zip::result::ZipError) -> IoError {
    IoError::Write(e.to_string())
}

// ---------------------------------------------------------------------------
// Splicing
// ---------------------------------------------------------------------------

/// Copies the input through to the output lazily; callers flush up to a
/// position, skip over spans they replace, and push their own text.
struct Splicer<'a> {
    xml: &'a str,
    out: String,
    copied: usize,
}

impl<'a> Splicer<'a> {
    fn new(xml: &'a str) -> Self {
        Self { xml, out: String::with_capacity(xml.len() + 256), copied: 0 }
    }

    fn flush_to(&mut self, pos: usize) {
        if pos > self.copied {
            self.out.push_str(&self.xml[self.copied..pos]);
            self.copied = pos;
        }
    }

    fn skip_to(&mut self, pos: usize) {
        self.copied = self.copied.max(pos);
    }

    /// Start of the tag that ends at `end`. Tags cannot contain `<`.
    fn tag_start(&self, end: usize) -> usize {
        self.xml[..end].rfind('<').unwrap_or(end)
    }

    fn finish(mut self) -> String {
        self.flush_to(self.xml.len());
        self.out
    }
}

/// Drop every element named `local` (with its content) for which `pred` holds.
/// Returns the new document and the number of elements removed.
pub fn remove_elements<F>(xml: &str, local: &[u8], pred: F) -> Result<(String, usize), IoError>
where
    F: Fn(&BytesStart) -> bool,
{
    let mut splice = Splicer::new(xml);
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut depth = 0usize;
    let mut removed = 0usize;

    loop {
        let event = reader.read_event().map_err(malformed)?;
        let end = reader.buffer_position() as usize;
        if depth > 0 {
            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            splice.skip_to(end);
            continue;
        }
        match event {
            Event::Eof => break,
            Event::Start(ref e) if e.local_name().as_ref() == local && pred(e) => {
                splice.flush_to(splice.tag_start(end));
                splice.skip_to(end);
                depth = 1;
                removed += 1;
            }
            Event::Empty(ref e) if e.local_name().as_ref() == local && pred(e) => {
                splice.flush_to(splice.tag_start(end));
                splice.skip_to(end);
                removed += 1;
            }
            _ => {}
        }
    }

    Ok((splice.finish(), removed))
}

// ---------------------------------------------------------------------------
// Worksheet patch
// ---------------------------------------------------------------------------

struct ReplacedCell {
    row: usize,
    col: usize,
    style: Option<String>,
    value: f64,
    had_formula: bool,
}

struct SheetPatcher<'a> {
    splice: Splicer<'a>,
    /// Namespace prefix of the sheetData element, with its colon.
    prefix: String,
    pending: BTreeMap<usize, BTreeMap<usize, f64>>,
    row_cells: BTreeMap<usize, f64>,
    current_row: Option<usize>,
    last_row: usize,
    last_col: usize,
    replacing: Option<ReplacedCell>,
    stats: PatchStats,
}

impl SheetPatcher<'_> {
    fn push_cell(&mut self, row: usize, col: usize, style: Option<&str>, value: f64) {
        let p = &self.prefix;
        let style = style.map(|s| format!(" s=\"{s}\"")).unwrap_or_default();
        self.splice.out.push_str(&format!(
            "<{p}c r=\"{}{row}\"{style}><{p}v>{}</{p}v></{p}c>",
            column_letters(col),
            format_number(value)
        ));
    }

    /// Insert pending cells of the open row left of `col` (all when `None`).
    fn insert_cells(&mut self, row: usize, col: Option<usize>) {
        let cols: Vec<usize> = match col {
            Some(c) => self.row_cells.range(..c).map(|(k, _)| *k).collect(),
            None => self.row_cells.keys().copied().collect(),
        };
        for c in cols {
            if let Some(value) = self.row_cells.remove(&c) {
                self.push_cell(row, c, None, value);
                self.stats.cells_inserted += 1;
            }
        }
    }

    /// Insert pending rows above `row` (all when `None`).
    fn insert_rows(&mut self, row: Option<usize>) {
        let rows: Vec<usize> = match row {
            Some(r) => self.pending.range(..r).map(|(k, _)| *k).collect(),
            None => self.pending.keys().copied().collect(),
        };
        for r in rows {
            let Some(cells) = self.pending.remove(&r) else {
                continue;
            };
            self.splice.out.push_str(&format!("<{}row r=\"{r}\">", self.prefix));
            for (c, value) in cells {
                self.push_cell(r, c, None, value);
                self.stats.cells_inserted += 1;
            }
            self.splice.out.push_str(&format!("</{}row>", self.prefix));
            self.stats.rows_inserted += 1;
        }
    }

    fn finish_cell(&mut self, cell: ReplacedCell) {
        self.push_cell(cell.row, cell.col, cell.style.as_deref(), cell.value);
        self.stats.cells_replaced += 1;
        if cell.had_formula {
            self.stats.formulas_replaced += 1;
        }
    }

    fn open_row(&mut self, e: &BytesStart, end: usize, self_closing: bool) {
        let row = attr(e, b"r").and_then(|r| r.parse().ok()).unwrap_or(self.last_row + 1);
        let tag_start = self.splice.tag_start(end);
        self.splice.flush_to(tag_start);
        self.insert_rows(Some(row));
        self.last_row = row;
        self.last_col = 0;

        if !self_closing {
            self.row_cells = self.pending.remove(&row).unwrap_or_default();
            self.current_row = Some(row);
            return;
        }
        if let Some(cells) = self.pending.remove(&row) {
            let open = open_tag(&self.splice.xml[tag_start..end]);
            self.splice.out.push_str(&open);
            self.splice.skip_to(end);
            for (c, value) in cells {
                self.push_cell(row, c, None, value);
                self.stats.cells_inserted += 1;
            }
            self.splice.out.push_str(&format!("</{}row>", self.prefix));
        }
    }

    fn open_cell(&mut self, e: &BytesStart, end: usize, self_closing: bool) {
        let Some(row) = self.current_row else {
            return;
        };
        let col = attr(e, b"r")
            .and_then(|r| parse_cell_ref(&r))
            .map(|(_, c)| c)
            .unwrap_or(self.last_col + 1);
        self.last_col = col;

        let tag_start = self.splice.tag_start(end);
        self.splice.flush_to(tag_start);
        self.insert_cells(row, Some(col));

        let Some(value) = self.row_cells.remove(&col) else {
            return;
        };
        self.splice.skip_to(end);
        let cell = ReplacedCell { row, col, style: attr(e, b"s"), value, had_formula: false };
        if self_closing {
            self.finish_cell(cell);
        } else {
            self.replacing = Some(cell);
        }
    }
}

/// Apply `writes` (1-based `(row, col)` → value) to one worksheet's XML.
///
/// A written cell keeps its `r` and `s` attributes; its type, formula and
/// value are replaced by a plain numeric `<v>`. Cells and rows that have no
/// element yet are inserted in order, and `<dimension>` grows to cover them.
pub fn patch_sheet_xml(
    xml: &str,
    writes: &BTreeMap<(usize, usize), f64>,
) -> Result<(String, PatchStats), IoError> {
    let mut pending: BTreeMap<usize, BTreeMap<usize, f64>> = BTreeMap::new();
    for (&(row, col), &value) in writes {
        pending.entry(row).or_default().insert(col, value);
    }
    if pending.is_empty() {
        return Ok((xml.to_string(), PatchStats::default()));
    }
    let bounds = (
        pending.keys().next().copied().unwrap_or(1),
        writes.keys().map(|&(_, c)| c).min().unwrap_or(1),
        pending.keys().next_back().copied().unwrap_or(1),
        writes.keys().map(|&(_, c)| c).max().unwrap_or(1),
    );

    let mut p = SheetPatcher {
        splice: Splicer::new(xml),
        prefix: String::new(),
        pending,
        row_cells: BTreeMap::new(),
        current_row: None,
        last_row: 0,
        last_col: 0,
        replacing: None,
        stats: PatchStats::default(),
    };
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut in_sheet_data = false;
    let mut saw_sheet_data = false;

    loop {
        let event = reader.read_event().map_err(malformed)?;
        let end = reader.buffer_position() as usize;

        // Inside a replaced cell: drop everything, note formulas.
        if let Some(cell) = p.replacing.as_mut() {
            p.splice.skip_to(end);
            match event {
                Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"f" => {
                    cell.had_formula = true;
                }
                Event::End(ref e) if e.local_name().as_ref() == b"c" => {
                    if let Some(cell) = p.replacing.take() {
                        p.finish_cell(cell);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Empty(ref e) | Event::Start(ref e)
                if !saw_sheet_data && e.local_name().as_ref() == b"dimension" =>
            {
                let Some(current) = attr(e, b"ref") else {
                    continue;
                };
                if let Some(widened) = widen_ref(&current, bounds) {
                    let tag_start = p.splice.tag_start(end);
                    p.splice.flush_to(tag_start);
                    let tag = xml[tag_start..end].replacen(&current, &widened, 1);
                    p.splice.out.push_str(&tag);
                    p.splice.skip_to(end);
                    debug!("dimension widened from {current} to {widened}");
                }
            }
            Event::Start(ref e) if e.local_name().as_ref() == b"sheetData" => {
                p.prefix = prefix_of(e);
                in_sheet_data = true;
                saw_sheet_data = true;
            }
            Event::Empty(ref e) if e.local_name().as_ref() == b"sheetData" => {
                p.prefix = prefix_of(e);
                saw_sheet_data = true;
                let tag_start = p.splice.tag_start(end);
                p.splice.flush_to(tag_start);
                let open = open_tag(&xml[tag_start..end]);
                p.splice.out.push_str(&open);
                p.splice.skip_to(end);
                p.insert_rows(None);
                p.splice.out.push_str(&format!("</{}sheetData>", p.prefix));
            }
            Event::End(ref e) if e.local_name().as_ref() == b"sheetData" => {
                p.splice.flush_to(p.splice.tag_start(end));
                p.insert_rows(None);
                in_sheet_data = false;
            }
            Event::Start(ref e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                p.open_row(e, end, false);
            }
            Event::Empty(ref e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                p.open_row(e, end, true);
            }
            Event::End(ref e) if in_sheet_data && e.local_name().as_ref() == b"row" => {
                if let Some(row) = p.current_row.take() {
                    p.splice.flush_to(p.splice.tag_start(end));
                    p.insert_cells(row, None);
                }
            }
            Event::Start(ref e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                p.open_cell(e, end, false);
            }
            Event::Empty(ref e) if in_sheet_data && e.local_name().as_ref() == b"c" => {
                p.open_cell(e, end, true);
            }
            _ => {}
        }
    }

    if !saw_sheet_data {
        return Err(IoError::Write("worksheet has no sheetData element".into()));
    }
    let stats = p.stats;
    Ok((p.splice.finish(), stats))
}

// ---------------------------------------------------------------------------
// Package
// ---------------------------------------------------------------------------

/// Write a copy of the `.xlsx` `package` to `out` with `writes` applied to
/// the worksheet part at `sheet_path`.
///
/// Every other entry is raw-copied (same compressed bytes, same order).
/// When a formula cell was overwritten, the calc chain is dropped together
/// with its content-type override and relationship so Excel rebuilds it.
pub fn patch_package<W: Write + Seek>(
    package: &[u8],
    sheet_path: &str,
    writes: &BTreeMap<(usize, usize), f64>,
    out: W,
) -> Result<PatchStats, IoError> {
    let mut archive = ZipArchive::new(Cursor::new(package)).map_err(zip_err)?;
    let sheet_xml = read_entry(&mut archive, sheet_path)
        .ok_or_else(|| IoError::Write(format!("worksheet part {sheet_path} is missing")))?;
    let (patched, mut stats) = patch_sheet_xml(&sheet_xml, writes)?;

    let mut rewritten: HashMap<&str, String> = HashMap::new();
    rewritten.insert(sheet_path, patched);

    stats.calc_chain_dropped =
        stats.formulas_replaced > 0 && archive.index_for_name(CALC_CHAIN_PART).is_some();
    if stats.calc_chain_dropped {
        if let Some(xml) = read_entry(&mut archive, CONTENT_TYPES_PART) {
            let (xml, _) = remove_elements(&xml, b"Override", |e| {
                attr(e, b"PartName").as_deref() == Some("/xl/calcChain.xml")
            })?;
            rewritten.insert(CONTENT_TYPES_PART, xml);
        }
        if let Some(xml) = read_entry(&mut archive, WORKBOOK_RELS_PART) {
            let (xml, _) = remove_elements(&xml, b"Relationship", |e| {
                attr(e, b"Type").is_some_and(|t| t.ends_with("/calcChain"))
            })?;
            rewritten.insert(WORKBOOK_RELS_PART, xml);
        }
        debug!("dropping {CALC_CHAIN_PART}: {} formula cells overwritten", stats.formulas_replaced);
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(out);
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i).map_err(zip_err)?;
        let name = entry.name().to_string();
        if stats.calc_chain_dropped && name == CALC_CHAIN_PART {
            continue;
        }
        match rewritten.get(name.as_str()) {
            Some(xml) => {
                writer.start_file(name, options).map_err(zip_err)?;
                writer.write_all(xml.as_bytes())?;
            }
            None => writer.raw_copy_file(entry).map_err(zip_err)?,
        }
    }
    writer.finish().map_err(zip_err)?;

    info!(
        "patched {sheet_path}: {} replaced, {} inserted, {} new rows",
        stats.cells_replaced, stats.cells_inserted, stats.rows_inserted
    );
    Ok(stats)
}
