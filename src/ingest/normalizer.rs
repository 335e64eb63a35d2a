/// Canonical column/row normalization.
///
/// Turns a detected header block plus trimmed data rows into the canonical
/// worksheet shape: machine-safe column keys, display labels, and one row
/// object per data row. Keys are the only stable per-column identifier used
/// downstream; labels are display-only and may repeat.
use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use utoipa::ToSchema;

use crate::ingest::detector::HeaderBlock;
use crate::ingest::grid::CellValue;

/// One canonical column: unique key, display label, physical position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalColumn {
    pub key: String,
    pub label: String,
    pub index: usize,
}

/// One normalized data row. The synthetic id keys the edit overlay and has
/// no domain meaning; column values flatten next to it, matching the shape
/// the preview editor works with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DataRow {
    #[serde(default)]
    pub id: u64,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub values: BTreeMap<String, CellValue>,
}

impl DataRow {
    pub fn get(&self, key: &str) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.values.get(key).unwrap_or(&EMPTY)
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedSheet {
    pub columns: Vec<CanonicalColumn>,
    pub rows: Vec<DataRow>,
}

/// Normalize one sheet's header block + data rows.
pub fn normalize(header: &HeaderBlock, data_rows: &[Vec<CellValue>]) -> NormalizedSheet {
    let width = header
        .rows
        .iter()
        .chain(data_rows.iter())
        .map(Vec::len)
        .max()
        .unwrap_or(0);

    let mut columns = Vec::with_capacity(width);
    let mut used: HashSet<String> = HashSet::new();
    for index in 0..width {
        let text = flatten_header_text(header, index);
        let base = match slugify_key(&text) {
            Some(slug) => slug,
            None => format!("column_{}", index + 1),
        };
        // Suffix until free; a literal header may already occupy "{base}_{n}"
        let mut key = base.clone();
        let mut suffix = 1usize;
        while !used.insert(key.clone()) {
            suffix += 1;
            key = format!("{base}_{suffix}");
        }
        let label = if text.is_empty() {
            key.to_uppercase()
        } else {
            text
        };
        columns.push(CanonicalColumn { key, label, index });
    }

    let mut rows = Vec::with_capacity(data_rows.len());
    for (i, cells) in data_rows.iter().enumerate() {
        let mut values = BTreeMap::new();
        for column in &columns {
            let cell = cells
                .get(column.index)
                .map(CellValue::cleaned)
                .unwrap_or(CellValue::Empty);
            values.insert(column.key.clone(), cell);
        }
        rows.push(DataRow {
            id: (i + 1) as u64,
            values,
        });
    }

    let mut sheet = NormalizedSheet { columns, rows };
    trim_trailing_empty_columns(&mut sheet);
    sheet
}

/// Drop columns from the right while every row is empty in them. Stops at
/// the first column with any content, so a second application is a no-op.
pub fn trim_trailing_empty_columns(sheet: &mut NormalizedSheet) {
    while let Some(column) = sheet.columns.last() {
        let all_empty = sheet.rows.iter().all(|row| row.get(&column.key).is_empty());
        if !all_empty {
            break;
        }
        let key = column.key.clone();
        sheet.columns.pop();
        for row in &mut sheet.rows {
            row.values.remove(&key);
        }
    }
}

/// Column header text: top-down join of the column's non-empty header cells.
/// Merge propagation repeats a section label across its span, so consecutive
/// duplicates collapse ("SKRINING" + "BB" -> "SKRINING BB").
fn flatten_header_text(header: &HeaderBlock, col: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for row in &header.rows {
        let text = row.get(col).map(CellValue::display).unwrap_or_default();
        if text.is_empty() {
            continue;
        }
        if parts.last().map(String::as_str) == Some(text.as_str()) {
            continue;
        }
        parts.push(text);
    }
    parts.join(" ")
}

/// Machine-safe snake_case key from a header label: diacritics stripped,
/// punctuation removed, whitespace/hyphen runs collapsed to underscores,
/// lowercased. `None` when nothing survives.
fn slugify_key(label: &str) -> Option<String> {
    let stripped: String = label
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect();

    let punctuation = Regex::new(r"[^\w\s-]").unwrap();
    let separators = Regex::new(r"[\s-]+").unwrap();

    let cleaned = punctuation.replace_all(&stripped, "");
    let key = separators
        .replace_all(cleaned.trim(), "_")
        .to_lowercase();

    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}
