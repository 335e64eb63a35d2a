use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::ingest::{CanonicalColumn, DataRow, HeaderBlock, MetaPair};

// Database entity models

/// One worksheet as frozen at confirm time. Stored inside the bundle's JSON
/// document, not as its own table row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorksheetPayload {
    pub worksheet_name: String,
    pub kabupaten: Option<String>,
    pub puskesmas: Option<String>,
    pub bulan_tahun: Option<String>,
    #[serde(default)]
    pub meta_pairs: Vec<MetaPair>,
    pub columns: Vec<CanonicalColumn>,
    pub rows: Vec<DataRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_block: Option<HeaderBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sheet_name: Option<String>,
}

impl WorksheetPayload {
    /// Display name used for the emitted sheet tab.
    pub fn facility_name(&self) -> &str {
        match self.puskesmas.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.worksheet_name,
        }
    }
}

/// Raw bundle row as stored; `worksheets` is the JSON payload column.
#[derive(Debug, Clone, FromRow)]
pub struct ReportBundleRow {
    pub id: i64,
    pub file_name: Option<String>,
    pub kabupaten: String,
    pub bulan_tahun: String,
    pub worksheet_count: i64,
    pub worksheets: Json<Vec<WorksheetPayload>>,
    pub excel_path: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for a new bundle.
#[derive(Debug, Clone)]
pub struct NewReportBundle {
    pub file_name: Option<String>,
    pub kabupaten: String,
    pub bulan_tahun: String,
    pub worksheets: Vec<WorksheetPayload>,
    pub created_by: Option<String>,
}

// API response DTOs (to avoid circular dependency between services and api modules)

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    pub id: i64,
    pub file_name: Option<String>,
    pub kabupaten: String,
    pub bulan_tahun: String,
    pub worksheet_count: i64,
    pub worksheets: Vec<WorksheetPayload>,
    pub excel_path: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ReportBundleRow> for StoredReport {
    fn from(row: ReportBundleRow) -> Self {
        Self {
            id: row.id,
            file_name: row.file_name,
            kabupaten: row.kabupaten,
            bulan_tahun: row.bulan_tahun,
            worksheet_count: row.worksheet_count,
            worksheets: row.worksheets.0,
            excel_path: row.excel_path,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

/// List-view projection without the row payload.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub id: i64,
    pub file_name: Option<String>,
    pub kabupaten: String,
    pub bulan_tahun: String,
    pub worksheet_count: i64,
    pub excel_path: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}
