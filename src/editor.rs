/// Preview editor model: validation rules plus the edit overlay.
///
/// Rows are an immutable base snapshot; edits live in a sparse overlay keyed
/// by row id and column key and never touch the base. The effective value of
/// any cell is the overlay value when present, else the original. Validation
/// always runs against effective values, so the report tracks edits live.
use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;

use crate::columns::{classify_columns, ColumnRoles};
use crate::dates::{date_to_serial, numeric_cell_to_date, parse_ddmmyyyy, MAX_DATE_SERIAL};
use crate::ingest::{CanonicalColumn, CellValue, DataRow};

const AGE_MAX: i64 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Valid,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total: usize,
    pub valid: usize,
    pub error: usize,
}

/// One failed cell check. Date issues are advisory: they are reported here
/// but do not put the row in error status.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CellIssue {
    pub row_id: u64,
    pub key: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RowStatusEntry {
    pub row_id: u64,
    pub status: RowStatus,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub summary: ValidationSummary,
    pub rows: Vec<RowStatusEntry>,
    pub issues: Vec<CellIssue>,
}

/// Editor state for one worksheet draft.
#[derive(Debug, Clone)]
pub struct DraftEditor {
    columns: Vec<CanonicalColumn>,
    roles: ColumnRoles,
    rows: Vec<DataRow>,
    overlay: HashMap<u64, HashMap<String, CellValue>>,
}

impl DraftEditor {
    pub fn new(columns: Vec<CanonicalColumn>, rows: Vec<DataRow>) -> Self {
        let roles = classify_columns(&columns);
        Self {
            columns,
            roles,
            rows,
            overlay: HashMap::new(),
        }
    }

    pub fn columns(&self) -> &[CanonicalColumn] {
        &self.columns
    }

    pub fn roles(&self) -> &ColumnRoles {
        &self.roles
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    /// Overlay value if present, else the original cell.
    pub fn effective<'a>(&'a self, row: &'a DataRow, key: &str) -> &'a CellValue {
        self.overlay
            .get(&row.id)
            .and_then(|edits| edits.get(key))
            .unwrap_or_else(|| row.get(key))
    }

    /// Stage an edit. The base row is never mutated.
    pub fn set_edit(&mut self, row_id: u64, key: &str, value: CellValue) {
        self.overlay
            .entry(row_id)
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Discard all staged edits, keeping original rows intact.
    pub fn clear_edits(&mut self) {
        debug!(edited_rows = self.overlay.len(), "Discarding staged edits");
        self.overlay.clear();
    }

    pub fn has_edits(&self) -> bool {
        !self.overlay.is_empty()
    }

    /// Validate every row against effective values.
    pub fn validate(&self) -> ValidationReport {
        let duplicate_niks = self.duplicate_nik_values();

        let mut rows = Vec::with_capacity(self.rows.len());
        let mut issues = Vec::new();
        let mut error = 0;

        for row in &self.rows {
            let mut blocking = 0;
            let mut push = |key: &Option<String>, message: Option<String>, blocks: bool| {
                if let (Some(key), Some(message)) = (key, message) {
                    if blocks {
                        blocking += 1;
                    }
                    issues.push(CellIssue {
                        row_id: row.id,
                        key: key.clone(),
                        message,
                    });
                }
            };

            push(
                &self.roles.name,
                self.roles
                    .name
                    .as_deref()
                    .and_then(|k| check_name(self.effective(row, k))),
                true,
            );
            push(
                &self.roles.nik,
                self.roles
                    .nik
                    .as_deref()
                    .and_then(|k| check_nik(self.effective(row, k), &duplicate_niks)),
                true,
            );
            push(
                &self.roles.age,
                self.roles
                    .age
                    .as_deref()
                    .and_then(|k| check_age(self.effective(row, k))),
                true,
            );
            push(
                &self.roles.gender,
                self.roles
                    .gender
                    .as_deref()
                    .and_then(|k| check_gender(self.effective(row, k))),
                true,
            );
            for key in &self.roles.date_keys {
                let issue = check_date(self.effective(row, key));
                push(&Some(key.clone()), issue, false);
            }

            let status = if blocking > 0 {
                error += 1;
                RowStatus::Error
            } else {
                RowStatus::Valid
            };
            rows.push(RowStatusEntry {
                row_id: row.id,
                status,
            });
        }

        let total = self.rows.len();
        ValidationReport {
            summary: ValidationSummary {
                total,
                valid: total - error,
                error,
            },
            rows,
            issues,
        }
    }

    /// Confirmation is allowed only while no row is in error status.
    pub fn can_confirm(&self) -> bool {
        self.validate().summary.error == 0
    }

    /// Freeze effective rows for persistence. Date cells holding a parseable
    /// DD/MM/YYYY string are rewritten to their serial number form; every
    /// other cell is carried through verbatim.
    pub fn commit(mut self) -> Vec<DataRow> {
        let rows = std::mem::take(&mut self.rows);
        rows.into_iter()
            .map(|mut row| {
                if let Some(edits) = self.overlay.get(&row.id) {
                    for (key, value) in edits {
                        row.values.insert(key.clone(), value.clone());
                    }
                }
                for key in &self.roles.date_keys {
                    if let Some(CellValue::Text(s)) = row.values.get(key) {
                        if let Some(date) = parse_ddmmyyyy(s) {
                            row.values
                                .insert(key.clone(), CellValue::Number(date_to_serial(date) as f64));
                        }
                    }
                }
                row
            })
            .collect()
    }

    /// NIK display values appearing in more than one row (effective values,
    /// blanks excluded). Every row sharing such a value fails, not just the
    /// second occurrence.
    fn duplicate_nik_values(&self) -> HashMap<String, usize> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        if let Some(nik_key) = self.roles.nik.as_deref() {
            for row in &self.rows {
                let value = self.effective(row, nik_key).display();
                if !value.is_empty() {
                    *counts.entry(value).or_insert(0) += 1;
                }
            }
        }
        counts.retain(|_, count| *count > 1);
        counts
    }
}

fn check_name(value: &CellValue) -> Option<String> {
    if value.is_empty() {
        Some("Nama wajib diisi".to_string())
    } else {
        None
    }
}

fn check_nik(value: &CellValue, duplicates: &HashMap<String, usize>) -> Option<String> {
    let display = value.display();
    if display.is_empty() {
        return Some("NIK wajib diisi".to_string());
    }
    match display.parse::<u64>() {
        Ok(nik) if nik > 0 => {
            if duplicates.contains_key(&display) {
                Some("NIK duplikat dengan baris lain".to_string())
            } else {
                None
            }
        }
        _ => Some("NIK harus berupa angka positif".to_string()),
    }
}

fn check_age(value: &CellValue) -> Option<String> {
    if value.is_empty() {
        return Some("Umur wajib diisi".to_string());
    }
    match value.as_f64() {
        Some(age) if age.fract() == 0.0 => {
            let age = age as i64;
            if (0..=AGE_MAX).contains(&age) {
                None
            } else {
                Some(format!("Umur harus di antara 0 dan {AGE_MAX}"))
            }
        }
        _ => Some("Umur harus berupa angka bulat".to_string()),
    }
}

/// Gender passes when the cell contains an l or p anywhere, so "L", "p",
/// "Laki-laki", and "Perempuan" all pass.
fn check_gender(value: &CellValue) -> Option<String> {
    let display = value.display().to_lowercase();
    if display.contains('l') || display.contains('p') {
        None
    } else {
        Some("Jenis kelamin harus L atau P".to_string())
    }
}

/// Dates are optional: blank passes. Strings must be strict DD/MM/YYYY on
/// the real calendar; numbers must be a serial within the supported range.
fn check_date(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Empty => None,
        CellValue::Text(s) if s.trim().is_empty() => None,
        CellValue::Text(s) => {
            if parse_ddmmyyyy(s).is_some() {
                None
            } else {
                Some("Tanggal harus berformat DD/MM/YYYY".to_string())
            }
        }
        CellValue::Number(n) => {
            if numeric_cell_to_date(*n).is_some() {
                None
            } else {
                Some(format!("Tanggal harus serial 0..={MAX_DATE_SERIAL}"))
            }
        }
        CellValue::Bool(_) => Some("Tanggal harus berformat DD/MM/YYYY".to_string()),
    }
}
