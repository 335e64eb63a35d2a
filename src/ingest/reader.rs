/// Workbook byte-stream reading.
///
/// Uploads arrive as in-memory bytes. The xlsx path is preferred because it
/// exposes merged-region metadata (which drives multi-row header detection);
/// other workbook formats fall back to a format-sniffing reader without
/// merges, and csv files become a single merge-free sheet.
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, open_workbook_from_rs, Data, Range, Reader, Xlsx, XlsxError};
use tracing::{debug, warn};

use crate::ingest::grid::{CellValue, MergeRange, SheetGrid};

#[derive(Debug, thiserror::Error)]
pub enum WorkbookReadError {
    #[error("Unreadable workbook: {0}")]
    Workbook(String),

    #[error("Unreadable csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Read every sheet of an uploaded file into absolute-addressed grids.
pub fn read_workbook(file_name: &str, bytes: &[u8]) -> Result<Vec<SheetGrid>, WorkbookReadError> {
    if file_name.to_lowercase().ends_with(".csv") {
        return read_csv(file_name, bytes);
    }

    match read_xlsx(bytes) {
        Ok(sheets) => Ok(sheets),
        Err(xlsx_err) => {
            debug!("Not readable as xlsx ({}), trying format sniffing", xlsx_err);
            read_sniffed(bytes)
        }
    }
}

/// xlsx path: values plus merged regions per sheet.
fn read_xlsx(bytes: &[u8]) -> Result<Vec<SheetGrid>, WorkbookReadError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e: XlsxError| WorkbookReadError::Workbook(e.to_string()))?;

    if let Err(e) = workbook.load_merged_regions() {
        warn!("Failed to load merged regions, headers fall back to heuristics: {}", e);
    }

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| WorkbookReadError::Workbook(e.to_string()))?;

        let merges = workbook
            .worksheet_merge_cells(&name)
            .unwrap_or(Ok(Vec::new()))
            .unwrap_or_default()
            .iter()
            .map(|dim| MergeRange {
                start_row: dim.start.0 as usize,
                start_col: dim.start.1 as usize,
                end_row: dim.end.0 as usize,
                end_col: dim.end.1 as usize,
            })
            .collect();

        debug!("Read sheet '{}' ({} rows)", name, range.height());
        sheets.push(SheetGrid::new(name, absolute_cells(&range), merges));
    }

    Ok(sheets)
}

/// Fallback for non-xlsx workbook formats (xls, ods). No merge metadata.
fn read_sniffed(bytes: &[u8]) -> Result<Vec<SheetGrid>, WorkbookReadError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| WorkbookReadError::Workbook(e.to_string()))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| WorkbookReadError::Workbook(e.to_string()))?;
        debug!("Read sheet '{}' ({} rows, no merges)", name, range.height());
        sheets.push(SheetGrid::new(name, absolute_cells(&range), Vec::new()));
    }

    Ok(sheets)
}

/// csv uploads become one merge-free sheet named after the file.
fn read_csv(file_name: &str, bytes: &[u8]) -> Result<Vec<SheetGrid>, WorkbookReadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut cells = Vec::new();
    for record in reader.records() {
        let record = record?;
        cells.push(
            record
                .iter()
                .map(|field| {
                    if field.trim().is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }

    let name = std::path::Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Sheet1".to_string());

    Ok(vec![SheetGrid::new(name, cells, Vec::new())])
}

/// A calamine range covers only the used region and may start at a nonzero
/// offset; pad the grid so cell addresses stay absolute.
fn absolute_cells(range: &Range<Data>) -> Vec<Vec<CellValue>> {
    let (start_row, start_col) = match range.start() {
        Some((row, col)) => (row as usize, col as usize),
        None => return Vec::new(),
    };

    let mut cells: Vec<Vec<CellValue>> = vec![Vec::new(); start_row];
    for row in range.rows() {
        let mut row_cells = vec![CellValue::Empty; start_col];
        row_cells.extend(row.iter().map(CellValue::from_data));
        cells.push(row_cells);
    }
    cells
}
