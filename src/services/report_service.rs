use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use crate::db::{
    DbError, NewReportBundle, ReportRepository, ReportSummary, StoredReport, WorksheetPayload,
};
use crate::ingest::{CanonicalColumn, CellValue, DataRow, HeaderBlock, MetaPair};
use crate::report::{compute_metrics, generate_report, ReportError, ReportSheet};

/// Sentinel written over address-detail cells before storage.
pub const ADDRESS_PRESENT: &str = "v";
pub const ADDRESS_ABSENT: &str = "-";

const RECENT_LIMIT: i64 = 50;

/// Error types for report bundle operations
#[derive(Debug, thiserror::Error)]
pub enum ReportServiceError {
    #[error("Kabupaten dan bulan/tahun wajib diisi")]
    MissingMetadata,

    #[error("Nama puskesmas/worksheet wajib diisi")]
    MissingFacility,

    #[error("Tidak ada worksheet dengan kolom dan baris data")]
    NoUsableWorksheets,

    #[error("Report {0} not found")]
    NotFound(i64),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Report generation failed: {0}")]
    Generation(#[from] ReportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

// Create-report wire types (used by API)

/// Request body for creating a report bundle. The modern shape carries a
/// `worksheets` array; the legacy shape is a single worksheet's fields at
/// the top level and is still accepted. The `worksheets` field decides
/// which shape applies, so a bundle with missing metadata is reported as
/// such instead of falling through to the legacy rules.
#[derive(Debug, Clone)]
pub enum CreateReportBody {
    Bundle(ReportBundleInput),
    Legacy(WorksheetInput),
}

impl<'de> Deserialize<'de> for CreateReportBody {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.get("worksheets").is_some() {
            serde_json::from_value(value)
                .map(CreateReportBody::Bundle)
                .map_err(serde::de::Error::custom)
        } else {
            serde_json::from_value(value)
                .map(CreateReportBody::Legacy)
                .map_err(serde::de::Error::custom)
        }
    }
}

impl<'s> utoipa::ToSchema<'s> for CreateReportBody {
    fn schema() -> (
        &'s str,
        utoipa::openapi::RefOr<utoipa::openapi::schema::Schema>,
    ) {
        use utoipa::openapi::schema::{OneOfBuilder, Schema};
        use utoipa::openapi::{Ref, RefOr};

        let one_of = OneOfBuilder::new()
            .item(RefOr::Ref(Ref::from_schema_name("ReportBundleInput")))
            .item(RefOr::Ref(Ref::from_schema_name("WorksheetInput")))
            .build();
        ("CreateReportBody", RefOr::T(Schema::OneOf(one_of)))
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportBundleInput {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub kabupaten: String,
    #[serde(default)]
    pub bulan_tahun: String,
    #[serde(default)]
    pub created_by: Option<String>,
    pub worksheets: Vec<WorksheetInput>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorksheetInput {
    #[serde(default)]
    pub worksheet_name: Option<String>,
    #[serde(default)]
    pub puskesmas: Option<String>,
    #[serde(default)]
    pub kabupaten: Option<String>,
    #[serde(default)]
    pub bulan_tahun: Option<String>,
    #[serde(default)]
    pub meta_pairs: Vec<MetaPair>,
    #[serde(default)]
    pub header_keys: Vec<String>,
    #[serde(default)]
    pub header_labels: Vec<String>,
    #[serde(default)]
    pub header_order: Vec<String>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub row_data: Vec<DataRow>,
    #[serde(default)]
    pub source_sheet_name: Option<String>,
    #[serde(default)]
    pub header_block: Option<HeaderBlock>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportResponse {
    pub report_id: i64,
    pub worksheet_count: i64,
    pub excel_path: Option<String>,
}

/// A regenerated workbook ready to stream back to the client.
#[derive(Debug, Clone)]
pub struct ReportDownload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct ReportService {
    report_repo: ReportRepository,
    reports_dir: PathBuf,
}

impl ReportService {
    pub fn new(report_repo: ReportRepository, reports_dir: PathBuf) -> Self {
        Self {
            report_repo,
            reports_dir,
        }
    }

    /// Persist a confirmed bundle and produce its recap workbook
    ///
    /// 1. Fold both accepted request shapes into one bundle
    /// 2. Require kabupaten + bulan/tahun
    /// 3. Convert worksheets, apply the address-flag transform, drop empties
    /// 4. Insert the bundle
    /// 5. Best-effort: write the recap workbook and record its path
    #[instrument(skip(self, body))]
    pub async fn create_report(
        &self,
        body: CreateReportBody,
    ) -> Result<CreateReportResponse, ReportServiceError> {
        // 1. Fold the legacy single-worksheet shape into a bundle
        let bundle = match body {
            CreateReportBody::Bundle(bundle) => bundle,
            CreateReportBody::Legacy(worksheet) => {
                if facility_name(&worksheet).is_none() {
                    return Err(ReportServiceError::MissingFacility);
                }
                ReportBundleInput {
                    file_name: worksheet.file_name.clone(),
                    kabupaten: worksheet.kabupaten.clone().unwrap_or_default(),
                    bulan_tahun: worksheet.bulan_tahun.clone().unwrap_or_default(),
                    created_by: None,
                    worksheets: vec![worksheet],
                }
            }
        };

        // 2. Hard requirement on bundle metadata
        let kabupaten = bundle.kabupaten.trim().to_string();
        let bulan_tahun = bundle.bulan_tahun.trim().to_string();
        if kabupaten.is_empty() || bulan_tahun.is_empty() {
            return Err(ReportServiceError::MissingMetadata);
        }

        // 3. Convert and keep only worksheets with columns and rows
        let mut worksheets = Vec::new();
        for (position, input) in bundle.worksheets.into_iter().enumerate() {
            let source = input.source_sheet_name.clone();
            let mut payload = payload_from_input(position, input);
            if payload.columns.is_empty() || payload.rows.is_empty() {
                warn!(
                    "Skipping worksheet {:?} with no columns or rows",
                    source.as_deref().unwrap_or(&payload.worksheet_name)
                );
                continue;
            }
            apply_address_flags(&mut payload);
            worksheets.push(payload);
        }
        if worksheets.is_empty() {
            return Err(ReportServiceError::NoUsableWorksheets);
        }

        // 4. Persist
        let new_bundle = NewReportBundle {
            file_name: bundle.file_name,
            kabupaten,
            bulan_tahun,
            worksheets,
            created_by: bundle.created_by,
        };
        let report_id = self.report_repo.insert(&new_bundle).await?;

        // 5. Generate the recap workbook; failure here never fails the persist
        let reports_dir = self.reports_dir.clone();
        let bundle_for_file = new_bundle.clone();
        let generated = tokio::task::spawn_blocking(move || {
            write_report_file(&reports_dir, report_id, &bundle_for_file)
        })
        .await
        .unwrap_or_else(|e| Err(ReportServiceError::Join(e)));

        let excel_path = match generated {
            Ok(path) => {
                if let Err(e) = self.report_repo.update_excel_path(report_id, &path).await {
                    warn!("Failed to record excel path for bundle {}: {}", report_id, e);
                }
                Some(path)
            }
            Err(e) => {
                error!(
                    "Recap workbook generation for bundle {} failed: {}",
                    report_id, e
                );
                None
            }
        };

        info!(
            "Created report bundle {} with {} worksheets",
            report_id,
            new_bundle.worksheets.len()
        );

        Ok(CreateReportResponse {
            report_id,
            worksheet_count: new_bundle.worksheets.len() as i64,
            excel_path,
        })
    }

    /// Most recently created bundles, newest first
    pub async fn list_reports(&self) -> Result<Vec<ReportSummary>, ReportServiceError> {
        Ok(self.report_repo.find_recent(RECENT_LIMIT).await?)
    }

    /// Full stored bundle by id
    pub async fn get_report(&self, id: i64) -> Result<StoredReport, ReportServiceError> {
        self.report_repo
            .find_by_id(id)
            .await?
            .ok_or(ReportServiceError::NotFound(id))
    }

    /// Regenerate the recap workbook from the stored bundle
    ///
    /// Always rebuilds from the stored rows; the cached file written at
    /// create time is never served.
    #[instrument(skip(self))]
    pub async fn download_report(&self, id: i64) -> Result<ReportDownload, ReportServiceError> {
        let report = self.get_report(id).await?;
        let file_name = download_file_name(&report.kabupaten, &report.bulan_tahun);

        let bytes = tokio::task::spawn_blocking(move || {
            let sheets = report_sheets(&report.worksheets);
            generate_report(&report.kabupaten, &report.bulan_tahun, &sheets)
        })
        .await
        .map_err(ReportServiceError::Join)??;

        info!(
            "Regenerated recap workbook for bundle {} ({} bytes)",
            id,
            bytes.len()
        );

        Ok(ReportDownload { file_name, bytes })
    }
}

fn write_report_file(
    reports_dir: &std::path::Path,
    report_id: i64,
    bundle: &NewReportBundle,
) -> Result<String, ReportServiceError> {
    let sheets = report_sheets(&bundle.worksheets);
    let bytes = generate_report(&bundle.kabupaten, &bundle.bulan_tahun, &sheets)?;

    std::fs::create_dir_all(reports_dir)?;
    let file_name = format!(
        "laporan_lansia_{}_{}.xlsx",
        report_id,
        Utc::now().format("%Y%m%d%H%M%S")
    );
    let path = reports_dir.join(file_name);
    std::fs::write(&path, &bytes)?;

    Ok(path.to_string_lossy().into_owned())
}

// Conversion helpers (private)

fn report_sheets(worksheets: &[WorksheetPayload]) -> Vec<ReportSheet> {
    let today = Utc::now().date_naive();
    worksheets
        .iter()
        .map(|ws| ReportSheet {
            facility: ws.facility_name().to_string(),
            metrics: compute_metrics(&ws.columns, &ws.rows, today),
        })
        .collect()
}

fn facility_name(input: &WorksheetInput) -> Option<&str> {
    [input.worksheet_name.as_deref(), input.puskesmas.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| !name.is_empty())
}

/// Rebuild a stored worksheet payload from its wire form. Column order
/// follows `headerOrder` when the client sent one, else `headerKeys`;
/// row objects are filtered down to the column-key set.
fn payload_from_input(position: usize, input: WorksheetInput) -> WorksheetPayload {
    let labels: HashMap<&str, &str> = input
        .header_keys
        .iter()
        .map(String::as_str)
        .zip(input.header_labels.iter().map(String::as_str))
        .collect();

    let ordered_keys = if input.header_order.is_empty() {
        &input.header_keys
    } else {
        &input.header_order
    };

    let columns: Vec<CanonicalColumn> = ordered_keys
        .iter()
        .enumerate()
        .map(|(index, key)| CanonicalColumn {
            key: key.clone(),
            label: labels
                .get(key.as_str())
                .map(|label| label.to_string())
                .unwrap_or_else(|| key.to_uppercase()),
            index,
        })
        .collect();

    let worksheet_name = facility_name(&input)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Sheet {}", position + 1));

    let rows: Vec<DataRow> = input
        .row_data
        .into_iter()
        .enumerate()
        .map(|(i, mut row)| {
            if row.id == 0 {
                row.id = i as u64 + 1;
            }
            row.values
                .retain(|key, _| columns.iter().any(|c| c.key == *key));
            for value in row.values.values_mut() {
                *value = value.cleaned();
            }
            row
        })
        .collect();

    WorksheetPayload {
        worksheet_name,
        kabupaten: input.kabupaten,
        puskesmas: input.puskesmas,
        bulan_tahun: input.bulan_tahun,
        meta_pairs: input.meta_pairs,
        columns,
        rows,
        header_block: input.header_block,
        file_name: input.file_name,
        source_sheet_name: input.source_sheet_name,
    }
}

/// Replace every cell right of the "alamat" column with a presence flag.
fn apply_address_flags(payload: &mut WorksheetPayload) {
    let Some(address_index) = payload
        .columns
        .iter()
        .position(|c| c.key.eq_ignore_ascii_case("alamat"))
    else {
        return;
    };

    let trailing: Vec<String> = payload.columns[address_index + 1..]
        .iter()
        .map(|c| c.key.clone())
        .collect();
    if trailing.is_empty() {
        return;
    }

    for row in &mut payload.rows {
        for key in &trailing {
            let marker = match row.values.get(key) {
                Some(value) if !value.is_empty() => ADDRESS_PRESENT,
                _ => ADDRESS_ABSENT,
            };
            row.values
                .insert(key.clone(), CellValue::Text(marker.to_string()));
        }
    }
}

fn download_file_name(kabupaten: &str, bulan_tahun: &str) -> String {
    format!(
        "laporan_lansia_{}_{}.xlsx",
        file_slug(kabupaten),
        file_slug(bulan_tahun)
    )
}

/// Collapse anything outside [A-Za-z0-9] into single underscores.
fn file_slug(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_was_sep = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("laporan");
    }
    slug
}
