/// Recap workbook emission.
///
/// Renders one sheet per stored worksheet: three metadata rows, a blank
/// separator, the fixed header scaffold, the column-number guide row, and
/// the facility's data row. Geometry comes from `layout`; this module only
/// turns it into workbook writes.
use std::collections::HashSet;

use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};
use thiserror::Error;
use tracing::info;

use crate::report::layout::{
    data_row_cells, header_cells, total_columns, ReportCell, HEADER_ROWS, HEADER_TOP,
};
use crate::report::metrics::MetricsResult;

/// Excel's hard cap on sheet name length.
const SHEET_NAME_MAX: usize = 31;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Report needs at least one worksheet")]
    NoWorksheets,

    #[error("Failed to build report workbook: {0}")]
    Xlsx(#[from] XlsxError),
}

/// One sheet's worth of input: the facility it describes and its metrics.
#[derive(Debug, Clone)]
pub struct ReportSheet {
    pub facility: String,
    pub metrics: MetricsResult,
}

struct SheetFormats {
    title: Format,
    header: Format,
    value: Format,
    text: Format,
}

impl SheetFormats {
    fn new() -> Self {
        Self {
            title: Format::new().set_bold(),
            header: Format::new()
                .set_bold()
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_text_wrap()
                .set_border(FormatBorder::Thin),
            value: Format::new()
                .set_align(FormatAlign::Center)
                .set_border(FormatBorder::Thin),
            text: Format::new().set_border(FormatBorder::Thin),
        }
    }
}

/// Generate the recap workbook for one report bundle.
pub fn generate_report(
    kabupaten: &str,
    bulan_tahun: &str,
    sheets: &[ReportSheet],
) -> Result<Vec<u8>, ReportError> {
    if sheets.is_empty() {
        return Err(ReportError::NoWorksheets);
    }

    let formats = SheetFormats::new();
    let mut workbook = Workbook::new();
    let mut used_names = HashSet::new();

    for (index, sheet) in sheets.iter().enumerate() {
        let name = unique_sheet_name(&sheet.facility, index, &mut used_names);
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&name)?;
        write_sheet(worksheet, index + 1, sheet, kabupaten, bulan_tahun, &formats)?;
    }

    let buffer = workbook.save_to_buffer()?;
    info!(
        kabupaten = %kabupaten,
        bulan_tahun = %bulan_tahun,
        sheets = sheets.len(),
        bytes = buffer.len(),
        "Generated recap workbook"
    );
    Ok(buffer)
}

fn write_sheet(
    worksheet: &mut Worksheet,
    position: usize,
    sheet: &ReportSheet,
    kabupaten: &str,
    bulan_tahun: &str,
    formats: &SheetFormats,
) -> Result<(), XlsxError> {
    let (month, year) = split_bulan_tahun(bulan_tahun);
    worksheet.write_string_with_format(
        0,
        0,
        format!("KABUPATEN {}", kabupaten.to_uppercase()),
        &formats.title,
    )?;
    worksheet.write_string_with_format(1, 0, format!("TAHUN {year}"), &formats.title)?;
    worksheet.write_string_with_format(2, 0, format!("BULAN {month}"), &formats.title)?;

    for cell in header_cells() {
        let row = (HEADER_TOP + cell.row) as u32;
        let col = cell.col as u16;
        if cell.row_span == 1 && cell.col_span == 1 {
            worksheet.write_string_with_format(row, col, cell.label, &formats.header)?;
        } else {
            worksheet.merge_range(
                row,
                col,
                row + cell.row_span as u32 - 1,
                col + cell.col_span as u16 - 1,
                cell.label,
                &formats.header,
            )?;
        }
    }

    let guide_row = (HEADER_TOP + HEADER_ROWS) as u32;
    for col in 0..total_columns() {
        worksheet.write_number_with_format(guide_row, col as u16, (col + 1) as f64, &formats.header)?;
    }

    let data_row = guide_row + 1;
    for (col, cell) in data_row_cells(position, &sheet.facility, &sheet.metrics)
        .iter()
        .enumerate()
    {
        let col = col as u16;
        match cell {
            ReportCell::Number(n) => {
                worksheet.write_number_with_format(data_row, col, *n, &formats.value)?
            }
            ReportCell::Text(s) => {
                worksheet.write_string_with_format(data_row, col, s.as_str(), &formats.text)?
            }
            ReportCell::Blank => worksheet.write_blank(data_row, col, &formats.value)?,
        };
    }

    worksheet.set_column_width(0, 6)?;
    worksheet.set_column_width(1, 28)?;
    worksheet.set_column_width(2, 14)?;
    worksheet.set_column_width(3, 14)?;
    Ok(())
}

/// Month-year metadata is a two-token string like "JANUARI 2025".
fn split_bulan_tahun(bulan_tahun: &str) -> (String, String) {
    let mut tokens = bulan_tahun.split_whitespace();
    let month = tokens.next().unwrap_or("").to_string();
    let year = tokens.next().unwrap_or("").to_string();
    (month, year)
}

/// Sheet names: workbook-illegal characters removed, truncated to the
/// 31-char cap, case-insensitively deduplicated with `_2`, `_3`, ...
fn unique_sheet_name(facility: &str, index: usize, used: &mut HashSet<String>) -> String {
    let cleaned: String = facility
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .collect();
    let cleaned = cleaned.trim();
    let base = if cleaned.is_empty() {
        format!("Sheet{}", index + 1)
    } else {
        truncate_chars(cleaned, SHEET_NAME_MAX)
    };

    let mut name = base.clone();
    let mut suffix = 2;
    while used.contains(&name.to_lowercase()) {
        let tag = format!("_{suffix}");
        name = format!(
            "{}{tag}",
            truncate_chars(&base, SHEET_NAME_MAX - tag.chars().count())
        );
        suffix += 1;
    }
    used.insert(name.to_lowercase());
    name
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::metrics::{GenderCount, ShareCount};
    use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
    use std::io::Cursor;

    fn sample_metrics() -> MetricsResult {
        MetricsResult {
            lansia: GenderCount { male: 1, female: 0, total: 1 },
            risti: GenderCount { male: 0, female: 0, total: 0 },
            dilayani: GenderCount { male: 1, female: 0, total: 1 },
            skrining_lansia: GenderCount { male: 1, female: 0, total: 1 },
            kemandirian_a: ShareCount { count: 1, pct: 100.0 },
            ..MetricsResult::default()
        }
    }

    fn read_back(bytes: &[u8]) -> Xlsx<Cursor<&[u8]>> {
        open_workbook_from_rs(Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn test_generated_workbook_reads_back() {
        let sheets = vec![ReportSheet {
            facility: "PKM MELATI".to_string(),
            metrics: sample_metrics(),
        }];
        let bytes = generate_report("Kab. Contoh", "JANUARI 2025", &sheets).unwrap();

        let mut workbook = read_back(&bytes);
        assert_eq!(workbook.sheet_names(), vec!["PKM MELATI".to_string()]);

        let range = workbook.worksheet_range("PKM MELATI").unwrap();
        let cell = |row: u32, col: u32| range.get_value((row, col)).cloned().unwrap_or(Data::Empty);

        assert_eq!(cell(0, 0), Data::String("KABUPATEN KAB. CONTOH".to_string()));
        assert_eq!(cell(1, 0), Data::String("TAHUN 2025".to_string()));
        assert_eq!(cell(2, 0), Data::String("BULAN JANUARI".to_string()));

        assert_eq!(cell(4, 0), Data::String("NO".to_string()));
        assert_eq!(cell(4, 4), Data::String("SASARAN".to_string()));

        // guide row numbers 1..=107
        assert_eq!(cell(10, 0), Data::Float(1.0));
        assert_eq!(cell(10, 106), Data::Float(107.0));

        // data row: NO, facility, senior counts at leaf columns 7..=9
        assert_eq!(cell(11, 0), Data::Float(1.0));
        assert_eq!(cell(11, 1), Data::String("PKM MELATI".to_string()));
        assert_eq!(cell(11, 7), Data::Float(1.0));
        assert_eq!(cell(11, 8), Data::Float(0.0));
        assert_eq!(cell(11, 9), Data::Float(1.0));
        // screened seniors, current month
        assert_eq!(cell(11, 34), Data::Float(1.0));
        // tier A count and share
        assert_eq!(cell(11, 85), Data::Float(1.0));
        assert_eq!(cell(11, 86), Data::Float(100.0));
    }

    #[test]
    fn test_merge_regions_match_layout() {
        let sheets = vec![ReportSheet {
            facility: "PKM".to_string(),
            metrics: MetricsResult::default(),
        }];
        let bytes = generate_report("Kab", "JANUARI 2025", &sheets).unwrap();

        let mut workbook = read_back(&bytes);
        workbook.load_merged_regions().unwrap();
        let merged = workbook
            .worksheet_merge_cells("PKM")
            .unwrap()
            .unwrap();

        let expected = header_cells()
            .iter()
            .filter(|c| c.row_span > 1 || c.col_span > 1)
            .count();
        assert_eq!(merged.len(), expected);
    }

    #[test]
    fn test_one_sheet_per_worksheet_with_deduplicated_names() {
        let sheets = vec![
            ReportSheet { facility: "PKM MELATI".to_string(), metrics: MetricsResult::default() },
            ReportSheet { facility: "PKM MELATI".to_string(), metrics: MetricsResult::default() },
            ReportSheet { facility: String::new(), metrics: MetricsResult::default() },
        ];
        let bytes = generate_report("Kab", "FEBRUARI 2025", &sheets).unwrap();

        let workbook = read_back(&bytes);
        assert_eq!(
            workbook.sheet_names(),
            vec![
                "PKM MELATI".to_string(),
                "PKM MELATI_2".to_string(),
                "Sheet3".to_string(),
            ]
        );
    }

    #[test]
    fn test_sheet_names_respect_length_cap() {
        let long = "PUSKESMAS DENGAN NAMA YANG SANGAT PANJANG SEKALI".to_string();
        let sheets = vec![
            ReportSheet { facility: long.clone(), metrics: MetricsResult::default() },
            ReportSheet { facility: long, metrics: MetricsResult::default() },
        ];
        let bytes = generate_report("Kab", "MARET 2025", &sheets).unwrap();

        let workbook = read_back(&bytes);
        for name in workbook.sheet_names() {
            assert!(name.chars().count() <= SHEET_NAME_MAX, "{name:?} too long");
        }
        assert_eq!(workbook.sheet_names().len(), 2);
    }

    #[test]
    fn test_empty_bundle_is_rejected() {
        let err = generate_report("Kab", "APRIL 2025", &[]).unwrap_err();
        assert!(matches!(err, ReportError::NoWorksheets));
    }

    #[test]
    fn test_illegal_sheet_name_characters_removed() {
        let mut used = HashSet::new();
        assert_eq!(
            unique_sheet_name("PKM [UTARA]: A/B", 0, &mut used),
            "PKM UTARA AB"
        );
    }
}
