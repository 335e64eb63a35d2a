// Workbook ingest pipeline
//
// Turns an uploaded spreadsheet into an editable draft:
// - reader: bytes -> per-sheet grids (values + merged regions)
// - grid: cell model and merge propagation
// - detector: metadata rows, header window, data region
// - normalizer: canonical column keys and row objects
// - intake: orchestration over every sheet of the workbook

pub mod detector;
pub mod grid;
pub mod intake;
pub mod normalizer;
pub mod reader;

pub use detector::{HeaderBlock, MetaPair, ScanOptions, SheetMeta};
pub use grid::{CellValue, MergeRange, SheetGrid};
pub use intake::{parse_workbook, IntakeError, WorkbookDraft, WorksheetDraft};
pub use normalizer::{CanonicalColumn, DataRow, NormalizedSheet};
pub use reader::{read_workbook, WorkbookReadError};
