use crate::error::{ReportError, Result};
use crate::reports::ReportTable;
use crate::types::Cell;
use crate::util::serial_from_date;
use rust_xlsxwriter::{
    Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError,
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tabled::{builder::Builder, settings::Style};

/// Excel's sheet-name length limit.
pub const SHEET_NAME_LIMIT: usize = 31;
const COLUMN_PADDING: usize = 2;
const INVALID_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value).map_err(ReportError::Summary)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Render `table` as a markdown-style grid, showing at most `max_rows` rows.
pub fn render_table(table: &ReportTable, max_rows: Option<usize>) -> String {
    let limit = max_rows.unwrap_or(usize::MAX);
    let mut builder = Builder::default();
    builder.push_record(table.headers.iter().cloned());
    for row in table.rows.iter().take(limit) {
        builder.push_record(row.iter().map(|c| c.to_string()));
    }
    builder.build().with(Style::markdown()).to_string()
}

pub fn preview_table(table: &ReportTable, max_rows: Option<usize>) {
    println!("\n{}", table.title);
    if table.is_empty() {
        println!("(no rows)\n");
        return;
    }
    println!("{}", render_table(table, max_rows));
    let shown = max_rows.unwrap_or(usize::MAX).min(table.rows.len());
    if shown < table.rows.len() {
        println!("({} more rows not shown)", table.rows.len() - shown);
    }
    println!();
}

/// Hands out unique, valid worksheet names.
#[derive(Debug, Default)]
pub struct SheetNamer {
    used: HashSet<String>,
}

impl SheetNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize and truncate `raw`; on a (case-insensitive) clash, shorten
    /// further and append `~2`, `~3`, ...
    pub fn assign(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        let mut candidate = truncate_name(&base, SHEET_NAME_LIMIT);
        let mut n = 2;
        while self.used.contains(&candidate.to_lowercase()) {
            let suffix = format!("~{}", n);
            let room = SHEET_NAME_LIMIT - suffix.chars().count();
            candidate = format!("{}{}", truncate_name(&base, room), suffix);
            n += 1;
        }
        self.used.insert(candidate.to_lowercase());
        candidate
    }
}

fn sanitize_sheet_name(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if INVALID_SHEET_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim().trim_matches('\'').trim();
    if trimmed.is_empty() {
        "Sheet".to_string()
    } else {
        trimmed.to_string()
    }
}

fn truncate_name(name: &str, max: usize) -> String {
    let cut: String = name.chars().take(max).collect();
    let cut = cut.trim_end_matches('\'').trim_end();
    if cut.is_empty() {
        "Sheet".chars().take(max).collect()
    } else {
        cut.to_string()
    }
}

struct Formats {
    header: Format,
    text: Format,
    count: Format,
    decimal: Format,
    rate: Format,
    money: Format,
    date: Format,
    duration: Format,
}

impl Formats {
    fn new() -> Self {
        let base = Format::new()
            .set_border(FormatBorder::Thin)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter);
        Self {
            header: base
                .clone()
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(Color::Red),
            text: base.clone(),
            count: base.clone().set_num_format("0"),
            decimal: base.clone().set_num_format("0.00"),
            rate: base.clone().set_num_format("0\"%\""),
            money: base.clone().set_num_format("#,##0.00"),
            date: base.clone().set_num_format("mmm dd, yyyy"),
            duration: base.set_num_format("[hh]:mm:ss"),
        }
    }
}

fn write_cell(
    ws: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    f: &Formats,
) -> std::result::Result<(), XlsxError> {
    match cell {
        Cell::Text(s) => ws.write_string_with_format(row, col, s.as_str(), &f.text),
        Cell::Count(n) => ws.write_number_with_format(row, col, *n as f64, &f.count),
        Cell::Decimal(Some(v)) => ws.write_number_with_format(row, col, *v, &f.decimal),
        Cell::Rate(Some(v)) => ws.write_number_with_format(row, col, v.round(), &f.rate),
        Cell::Money(v) => ws.write_number_with_format(row, col, *v, &f.money),
        Cell::Date(d) => ws.write_number_with_format(row, col, serial_from_date(*d), &f.date),
        Cell::Duration(Some(secs)) => {
            ws.write_number_with_format(row, col, secs.round() / 86_400.0, &f.duration)
        }
        Cell::Decimal(None) | Cell::Rate(None) | Cell::Duration(None) | Cell::Blank => {
            ws.write_blank(row, col, &f.text)
        }
    }?;
    Ok(())
}

/// Column widths: longest of header and rendered cells, plus padding.
pub fn column_widths(table: &ReportTable) -> Vec<usize> {
    table
        .headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let content = table
                .rows
                .iter()
                .filter_map(|row| row.get(i))
                .map(|c| c.to_string().chars().count())
                .max()
                .unwrap_or(0);
            content.max(header.chars().count()) + COLUMN_PADDING
        })
        .collect()
}

fn build_sheet(
    table: &ReportTable,
    name: &str,
    f: &Formats,
) -> std::result::Result<Worksheet, XlsxError> {
    let mut ws = Worksheet::new();
    ws.set_name(name)?;
    for (col, header) in table.headers.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, header.as_str(), &f.header)?;
    }
    for (r, row) in table.rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            write_cell(&mut ws, r as u32 + 1, col as u16, cell, f)?;
        }
    }
    for (col, width) in column_widths(table).into_iter().enumerate() {
        ws.set_column_width(col as u16, width as f64)?;
    }
    ws.set_freeze_panes(1, 0)?;
    Ok(ws)
}

/// Serialize `tables` into an in-memory workbook, one sheet per table.
pub fn build_workbook(tables: &[&ReportTable]) -> Result<Vec<u8>> {
    let formats = Formats::new();
    let mut namer = SheetNamer::new();
    let mut workbook = Workbook::new();
    for table in tables {
        let name = namer.assign(&table.name);
        workbook.push_worksheet(build_sheet(table, &name, &formats)?);
    }
    Ok(workbook.save_to_buffer()?)
}

/// Write the workbook to `path`. Nothing is written unless the whole
/// workbook serialized.
pub fn export_workbook(path: &Path, tables: &[&ReportTable]) -> Result<()> {
    let buffer = build_workbook(tables)?;
    std::fs::write(path, buffer)?;
    tracing::info!(path = %path.display(), sheets = tables.len(), "Exported workbook");
    Ok(())
}
