/// Raw sheet grid model shared by the detector and normalizer.
///
/// A sheet comes off the workbook reader as a ragged 2-D array of cells plus
/// the sheet's merged regions. Merge propagation copies each region's top-left
/// value into every covered cell so header and data logic can read the grid
/// position-by-position without caring about merge geometry.
use calamine::Data;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

static EMPTY_CELL: CellValue = CellValue::Empty;

/// One cell value as carried through normalization, editing, and storage.
///
/// JSON form is untagged: string / number / boolean / null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Empty,
}

impl CellValue {
    pub fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
            Data::DateTimeIso(s) => CellValue::Text(s.clone()),
            Data::DurationIso(s) => CellValue::Text(s.clone()),
            Data::Error(_) => CellValue::Empty,
        }
    }

    /// Empty cell, or text that is blank after trimming.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Display form used for matching, dedup keys, and re-emission.
    /// Whole floats print without the trailing ".0".
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{}", *f as i64)
                } else {
                    f.to_string()
                }
            }
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(f) => Some(*f),
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Storage form after cell cleaning: text trimmed, everything else as-is.
    pub fn cleaned(&self) -> Self {
        match self {
            CellValue::Text(s) => CellValue::Text(s.trim().to_string()),
            other => other.clone(),
        }
    }
}

/// Inclusive rectangular merged region; the top-left cell holds the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MergeRange {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl MergeRange {
    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.start_row..=self.end_row).contains(&row)
            && (self.start_col..=self.end_col).contains(&col)
    }
}

/// One worksheet as read from the uploaded file: name, ragged cell grid,
/// merged regions. Out-of-bounds reads yield `CellValue::Empty`.
#[derive(Debug, Clone)]
pub struct SheetGrid {
    pub name: String,
    pub cells: Vec<Vec<CellValue>>,
    pub merges: Vec<MergeRange>,
}

impl SheetGrid {
    pub fn new(name: String, cells: Vec<Vec<CellValue>>, merges: Vec<MergeRange>) -> Self {
        let mut grid = Self {
            name,
            cells,
            merges,
        };
        grid.propagate_merges();
        grid
    }

    pub fn height(&self) -> usize {
        self.cells.len()
    }

    pub fn get(&self, row: usize, col: usize) -> &CellValue {
        self.cells
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn row_is_empty(&self, row: usize) -> bool {
        match self.cells.get(row) {
            Some(cells) => cells.iter().all(CellValue::is_empty),
            None => true,
        }
    }

    /// Copy each merged region's top-left value into every covered cell.
    /// Regions are clamped to the grid height; rows are widened as needed so
    /// covered cells are addressable afterwards.
    fn propagate_merges(&mut self) {
        let height = self.height();
        for merge in self.merges.clone() {
            if merge.start_row >= height {
                continue;
            }
            let value = self.get(merge.start_row, merge.start_col).clone();
            if value.is_empty() {
                continue;
            }
            let end_row = merge.end_row.min(height.saturating_sub(1));
            for row in merge.start_row..=end_row {
                let cells = &mut self.cells[row];
                if cells.len() <= merge.end_col {
                    cells.resize(merge.end_col + 1, CellValue::Empty);
                }
                for cell in &mut cells[merge.start_col..=merge.end_col] {
                    *cell = value.clone();
                }
            }
        }
    }
}
