/// Workbook intake pipeline.
///
/// Chains the reader, detector, and normalizer over every sheet of an
/// uploaded workbook and produces the editable draft returned by the upload
/// endpoint. Sheets yielding no data rows are dropped; a workbook where
/// every sheet drops out is rejected.
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::ingest::detector::{detect_sheet, HeaderBlock, MetaPair, ScanOptions};
use crate::ingest::normalizer::{normalize, CanonicalColumn, DataRow};
use crate::ingest::reader::{read_workbook, WorkbookReadError};

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("File tidak dapat dibaca: {0}")]
    Read(#[from] WorkbookReadError),

    #[error("File tidak memiliki sheet")]
    NoSheets,

    #[error("Tidak ada sheet yang berisi baris data")]
    NoUsableData,
}

/// One usable worksheet of a draft, in the same shape the confirm request
/// later sends back: sheet metadata, canonical columns, rows, header block.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorksheetDraft {
    pub worksheet_name: String,
    pub source_sheet_name: String,
    pub kabupaten: Option<String>,
    pub puskesmas: Option<String>,
    pub bulan_tahun: Option<String>,
    pub meta_pairs: Vec<MetaPair>,
    pub columns: Vec<CanonicalColumn>,
    pub rows: Vec<DataRow>,
    pub header_block: HeaderBlock,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookDraft {
    pub file_name: String,
    pub worksheets: Vec<WorksheetDraft>,
    /// Index of the worksheet the editor opens first.
    pub active_worksheet: usize,
}

/// Parse an uploaded workbook into an editable draft.
pub fn parse_workbook(file_name: &str, bytes: &[u8]) -> Result<WorkbookDraft, IntakeError> {
    // 1. Decode the raw bytes into per-sheet grids
    let grids = read_workbook(file_name, bytes)?;
    if grids.is_empty() {
        return Err(IntakeError::NoSheets);
    }

    // 2. Detect structure and normalize each sheet, dropping empty ones
    let options = ScanOptions::default();
    let mut worksheets = Vec::new();
    for grid in &grids {
        let structure = detect_sheet(grid, &options);
        let normalized = normalize(&structure.header, &structure.data_rows);
        if normalized.rows.is_empty() {
            debug!(sheet = %grid.name, "Skipping sheet with no data rows");
            continue;
        }

        let meta = structure.meta;
        let worksheet_name = meta
            .puskesmas
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| grid.name.clone());

        worksheets.push(WorksheetDraft {
            worksheet_name,
            source_sheet_name: grid.name.clone(),
            kabupaten: meta.kabupaten,
            puskesmas: meta.puskesmas,
            bulan_tahun: meta.bulan_tahun,
            meta_pairs: meta.pairs,
            columns: normalized.columns,
            rows: normalized.rows,
            header_block: structure.header,
        });
    }

    // 3. A workbook with sheets but no usable rows is an intake error
    if worksheets.is_empty() {
        return Err(IntakeError::NoUsableData);
    }

    info!(
        file_name = %file_name,
        sheets = grids.len(),
        usable = worksheets.len(),
        "Parsed workbook draft"
    );
    Ok(WorkbookDraft {
        file_name: file_name.to_string(),
        worksheets,
        active_worksheet: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::grid::CellValue;
    use rust_xlsxwriter::Workbook;

    fn write_usable_sheet(workbook: &mut Workbook, name: &str) {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name).unwrap();
        sheet.write_string(0, 0, "REKAPITULASI LAPORAN LANSIA").unwrap();
        sheet.write_string(1, 0, "KABUPATEN").unwrap();
        sheet.write_string(1, 2, ":").unwrap();
        sheet.write_string(1, 3, "Kab. Contoh").unwrap();
        sheet.write_string(2, 0, "PUSKESMAS").unwrap();
        sheet.write_string(2, 3, name).unwrap();
        sheet.write_string(3, 0, "BULAN").unwrap();
        sheet.write_string(3, 3, "JANUARI 2025").unwrap();
        sheet.write_string(4, 0, "NO").unwrap();
        sheet.write_string(4, 1, "NAMA").unwrap();
        sheet.write_string(4, 2, "NIK").unwrap();
        sheet.write_string(4, 3, "UMUR").unwrap();
        sheet.write_string(4, 4, "JK").unwrap();
        sheet.write_number(5, 0, 1.0).unwrap();
        sheet.write_string(5, 1, "Budi").unwrap();
        sheet.write_string(5, 2, "1234567890123456").unwrap();
        sheet.write_number(5, 3, 65.0).unwrap();
        sheet.write_string(5, 4, "L").unwrap();
    }

    #[test]
    fn test_parse_workbook_builds_draft_from_xlsx() {
        let mut workbook = Workbook::new();
        write_usable_sheet(&mut workbook, "PKM MELATI");
        let bytes = workbook.save_to_buffer().unwrap();

        let draft = parse_workbook("laporan.xlsx", &bytes).unwrap();
        assert_eq!(draft.worksheets.len(), 1);
        assert_eq!(draft.active_worksheet, 0);

        let sheet = &draft.worksheets[0];
        assert_eq!(sheet.worksheet_name, "PKM MELATI");
        assert_eq!(sheet.kabupaten.as_deref(), Some("Kab. Contoh"));
        assert_eq!(sheet.bulan_tahun.as_deref(), Some("JANUARI 2025"));
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0].get("nama"), &CellValue::Text("Budi".into()));
        assert_eq!(sheet.rows[0].get("umur"), &CellValue::Number(65.0));
    }

    #[test]
    fn test_empty_sheets_are_dropped_from_draft() {
        let mut workbook = Workbook::new();
        write_usable_sheet(&mut workbook, "PKM A");
        write_usable_sheet(&mut workbook, "PKM B");
        let empty = workbook.add_worksheet();
        empty.set_name("KOSONG").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let draft = parse_workbook("laporan.xlsx", &bytes).unwrap();
        assert_eq!(draft.worksheets.len(), 2);
        assert_eq!(draft.worksheets[0].worksheet_name, "PKM A");
        assert_eq!(draft.worksheets[1].worksheet_name, "PKM B");
    }

    #[test]
    fn test_workbook_with_only_empty_sheets_is_rejected() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("KOSONG").unwrap();
        sheet.write_string(0, 0, "judul saja").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let err = parse_workbook("laporan.xlsx", &bytes).unwrap_err();
        assert!(matches!(err, IntakeError::NoUsableData));
    }

    #[test]
    fn test_csv_upload_parses_into_single_sheet_draft() {
        let csv = "\
REKAPITULASI,,,\n\
KABUPATEN,,:,Kab. Contoh\n\
PUSKESMAS,,:,PKM CSV\n\
BULAN,,:,FEBRUARI 2025\n\
NO,NAMA,NIK,UMUR,JK\n\
1,Siti,1234567890123457,70,P\n";

        let draft = parse_workbook("export.csv", csv.as_bytes()).unwrap();
        assert_eq!(draft.worksheets.len(), 1);
        let sheet = &draft.worksheets[0];
        assert_eq!(sheet.worksheet_name, "PKM CSV");
        assert_eq!(sheet.source_sheet_name, "export");
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0].get("jk"), &CellValue::Text("P".into()));
    }

    #[test]
    fn test_garbage_bytes_are_an_intake_error() {
        let err = parse_workbook("laporan.xlsx", b"not a workbook").unwrap_err();
        assert!(matches!(err, IntakeError::Read(_)));
    }
}
