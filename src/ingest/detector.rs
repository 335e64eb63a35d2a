/// Sheet structure detection.
///
/// Uploaded record sheets follow a loose convention: a title row, a small
/// metadata block (region / facility / month-year), then a header that may be
/// one row or a multi-row merged block, then data rows, optionally terminated
/// by a signature footer ("Diketahui ..."). None of it is guaranteed, so the
/// detector works from merge geometry where available and falls back to
/// density heuristics where it is not.
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::ingest::grid::{CellValue, MergeRange, SheetGrid};

/// Fixed metadata cells: (row, key column, value column), 0-based.
/// Rows 2-4 of the sheet in the source convention.
const META_CELLS: [(usize, usize, usize); 3] = [(1, 0, 3), (2, 0, 3), (3, 0, 3)];

/// Signature footer marker; the row it appears on ends the data region.
const STOP_MARKER: &str = "diketahui";

/// Column scanned for the stop marker.
const STOP_MARKER_COL: usize = 1;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// First row eligible for header/data search; everything above is the
    /// reserved metadata block.
    pub visible_start_row: usize,
    /// How many rows the single-row header heuristic inspects.
    pub header_scan_rows: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            visible_start_row: 4,
            header_scan_rows: 12,
        }
    }
}

/// One key/value row from the metadata block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetaPair {
    pub key: String,
    pub value: String,
}

/// Metadata block classified into the three known fields.
#[derive(Debug, Clone, Default)]
pub struct SheetMeta {
    pub kabupaten: Option<String>,
    pub puskesmas: Option<String>,
    pub bulan_tahun: Option<String>,
    pub pairs: Vec<MetaPair>,
}

/// The physical rows forming the column header, with merge geometry made
/// relative to the block's top-left corner (start row, first kept column).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeaderBlock {
    pub start_row: usize,
    pub end_row: usize,
    #[schema(value_type = Vec<Vec<Object>>)]
    pub rows: Vec<Vec<CellValue>>,
    pub merges: Vec<MergeRange>,
}

/// Everything the detector learned about one sheet.
#[derive(Debug, Clone)]
pub struct SheetStructure {
    pub meta: SheetMeta,
    pub header: HeaderBlock,
    /// Data rows, already trimmed to start at `first_col`.
    pub data_rows: Vec<Vec<CellValue>>,
    /// First kept column in grid coordinates.
    pub first_col: usize,
    /// Exclusive end of the data region in grid coordinates.
    pub stop_row: usize,
}

/// Locate metadata, header block, and data rows in one sheet.
pub fn detect_sheet(grid: &SheetGrid, options: &ScanOptions) -> SheetStructure {
    let meta = read_metadata(grid);
    let stop_row = find_stop_row(grid, options.visible_start_row);
    let (header_start, header_end) = find_header_window(grid, options, stop_row);
    let first_col = first_header_col(grid, header_end);

    let header = HeaderBlock {
        start_row: header_start,
        end_row: header_end,
        rows: (header_start..=header_end)
            .map(|row| trimmed_row(grid, row, first_col))
            .collect(),
        merges: relative_header_merges(grid, header_start, header_end, first_col),
    };

    let data_rows: Vec<Vec<CellValue>> = ((header_end + 1)..stop_row)
        .map(|row| trimmed_row(grid, row, first_col))
        .filter(|cells| cells.iter().any(|c| !c.is_empty()))
        .collect();

    debug!(
        "Sheet '{}': header rows {}-{}, first col {}, {} data rows, stop at {}",
        grid.name,
        header_start,
        header_end,
        first_col,
        data_rows.len(),
        stop_row
    );

    SheetStructure {
        meta,
        header,
        data_rows,
        first_col,
        stop_row,
    }
}

/// Read the fixed metadata cells and classify them by key substring.
fn read_metadata(grid: &SheetGrid) -> SheetMeta {
    let mut meta = SheetMeta::default();

    for (row, key_col, val_col) in META_CELLS {
        let key = grid.get(row, key_col).display();
        let value = grid.get(row, val_col).display();
        if key.is_empty() || value.is_empty() {
            continue;
        }

        let key_lower = key.to_lowercase();
        if key_lower.contains("kabupaten") {
            meta.kabupaten = Some(value.clone());
        } else if key_lower.contains("puskesmas") {
            meta.puskesmas = Some(value.clone());
        } else if key_lower.contains("bulan") {
            meta.bulan_tahun = Some(clean_month_year(&value));
        }

        meta.pairs.push(MetaPair { key, value });
    }

    meta
}

/// Month-year values sometimes carry a leading colon or "/" separators
/// (": JANUARI/2025"); normalize to "JANUARI 2025".
fn clean_month_year(value: &str) -> String {
    value
        .trim()
        .trim_start_matches(':')
        .trim()
        .replace('/', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First row at or after `visible_start` whose marker column starts the
/// signature footer; exclusive end of the data region.
fn find_stop_row(grid: &SheetGrid, visible_start: usize) -> usize {
    for row in visible_start..grid.height() {
        let value = grid.get(row, STOP_MARKER_COL).display().to_lowercase();
        if value.starts_with(STOP_MARKER) {
            return row;
        }
    }
    grid.height()
}

/// Header window from merge geometry, with a density-scored single-row
/// fallback when the sheet has no merges in the visible region.
fn find_header_window(grid: &SheetGrid, options: &ScanOptions, stop_row: usize) -> (usize, usize) {
    let visible_start = options.visible_start_row;
    if stop_row <= visible_start {
        return (visible_start, visible_start);
    }

    let in_window: Vec<&MergeRange> = grid
        .merges
        .iter()
        .filter(|m| m.start_row >= visible_start && m.start_row < stop_row)
        .collect();

    if !in_window.is_empty() {
        let start = in_window.iter().map(|m| m.start_row).min().unwrap_or(visible_start);
        let end = in_window
            .iter()
            .map(|m| m.end_row)
            .max()
            .unwrap_or(start)
            .min(stop_row - 1);
        return (start, end.max(start));
    }

    // No merges: pick the densest of the first few visible rows.
    let scan_end = (visible_start + options.header_scan_rows).min(stop_row);
    let mut best_row = visible_start;
    let mut best_count = 0usize;
    for row in visible_start..scan_end {
        let count = match grid.cells.get(row) {
            Some(cells) => cells.iter().filter(|c| !c.is_empty()).count(),
            None => 0,
        };
        if count > best_count {
            best_count = count;
            best_row = row;
        }
    }

    if best_count >= 3 {
        (best_row, best_row)
    } else {
        (visible_start, visible_start)
    }
}

/// First column with content in the bottom header row; leading decorative
/// columns to its left are dropped everywhere.
fn first_header_col(grid: &SheetGrid, header_end: usize) -> usize {
    match grid.cells.get(header_end) {
        Some(cells) => cells
            .iter()
            .position(|c| !c.is_empty())
            .unwrap_or(0),
        None => 0,
    }
}

fn trimmed_row(grid: &SheetGrid, row: usize, first_col: usize) -> Vec<CellValue> {
    grid.cells
        .get(row)
        .map(|cells| cells.get(first_col..).unwrap_or(&[]).to_vec())
        .unwrap_or_default()
}

/// Merges overlapping the header window, re-based to (header start, first
/// kept column). Merges entirely left of the kept window are dropped.
fn relative_header_merges(
    grid: &SheetGrid,
    header_start: usize,
    header_end: usize,
    first_col: usize,
) -> Vec<MergeRange> {
    grid.merges
        .iter()
        .filter(|m| m.start_row >= header_start && m.start_row <= header_end)
        .filter(|m| m.end_col >= first_col)
        .map(|m| MergeRange {
            start_row: m.start_row - header_start,
            start_col: m.start_col.saturating_sub(first_col),
            end_row: m.end_row.min(header_end) - header_start,
            end_col: m.end_col - first_col,
        })
        .collect()
}
