/// Fixed recap sheet geometry.
///
/// The emitted sheet is a contract with the paper reporting form: six nested
/// header rows, a column-number guide row, then one data row per facility.
/// Column order, merge spans, and section labels are the format itself and
/// are spelled out literally here. The data row is built in the same
/// depth-first leaf order the header tree produces.
use crate::report::metrics::{GenderCount, MetricsResult};

/// Label rows of the header scaffold (sheet rows 5..=10, before the column
/// number guide row).
pub(crate) const HEADER_ROWS: usize = 6;

/// 0-based sheet row of the first header label row.
pub(crate) const HEADER_TOP: usize = 4;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Layout {
    Leaf {
        label: &'static str,
        rows: usize,
    },
    Branch {
        label: &'static str,
        rows: usize,
        children: &'static [Layout],
    },
}

use Layout::{Branch, Leaf};

const LPJ: [Layout; 3] = [
    Leaf { label: "L", rows: 2 },
    Leaf { label: "P", rows: 2 },
    Leaf { label: "JML", rows: 2 },
];

const JML_PCT: [Layout; 2] = [
    Leaf { label: "JML", rows: 2 },
    Leaf { label: "%", rows: 2 },
];

const SASARAN_BANDS: [Layout; 3] = [
    Branch { label: "PRA LANSIA (45-59 TAHUN)", rows: 3, children: &LPJ },
    Branch { label: "LANSIA (≥ 60 TAHUN)", rows: 3, children: &LPJ },
    Branch { label: "LANSIA RISTI (≥ 70 TAHUN)", rows: 3, children: &LPJ },
];

const PELAYANAN_PERIODS: [Layout; 3] = [
    Branch { label: "BULAN LALU", rows: 3, children: &LPJ },
    Branch { label: "BULAN INI", rows: 3, children: &LPJ },
    Branch { label: "KUMULATIF", rows: 3, children: &LPJ },
];

const SKRINING_PERIODS: [Layout; 3] = [
    Branch { label: "BULAN LALU", rows: 1, children: &LPJ },
    Branch { label: "BULAN INI", rows: 1, children: &LPJ },
    Branch { label: "KUMULATIF", rows: 1, children: &LPJ },
];

const SKRINING_BANDS: [Layout; 3] = [
    Branch { label: "PRA LANSIA (45-59 TAHUN)", rows: 2, children: &SKRINING_PERIODS },
    Branch { label: "LANSIA (≥ 60 TAHUN)", rows: 2, children: &SKRINING_PERIODS },
    Branch { label: "LANSIA RISTI (≥ 70 TAHUN)", rows: 2, children: &SKRINING_PERIODS },
];

const HASIL_CONDITIONS: [Layout; 12] = [
    Branch { label: "HIPERTENSI", rows: 3, children: &LPJ },
    Branch { label: "DIABETES MELITUS", rows: 3, children: &LPJ },
    Branch { label: "ANEMIA", rows: 3, children: &LPJ },
    Branch { label: "IMT LEBIH", rows: 3, children: &LPJ },
    Branch { label: "IMT KURANG", rows: 3, children: &LPJ },
    Branch { label: "GANGGUAN GINJAL", rows: 3, children: &LPJ },
    Branch { label: "GANGGUAN MENTAL EMOSIONAL", rows: 3, children: &LPJ },
    Branch { label: "GANGGUAN KOGNITIF", rows: 3, children: &LPJ },
    Branch { label: "KATARAK", rows: 3, children: &LPJ },
    Branch { label: "PENYAKIT SENDI", rows: 3, children: &LPJ },
    Branch { label: "PENYAKIT JANTUNG", rows: 3, children: &LPJ },
    Branch { label: "STROKE", rows: 3, children: &LPJ },
];

const KEMANDIRIAN_TIERS: [Layout; 3] = [
    Branch { label: "A", rows: 3, children: &JML_PCT },
    Branch { label: "B", rows: 3, children: &JML_PCT },
    Branch { label: "C", rows: 3, children: &JML_PCT },
];

const SARANA_ITEMS: [Layout; 7] = [
    Leaf { label: "PUSKESMAS SANTUN LANSIA", rows: 5 },
    Leaf { label: "POSYANDU LANSIA AKTIF", rows: 5 },
    Leaf { label: "POSBINDU", rows: 5 },
    Leaf { label: "PANTI WERDHA", rows: 5 },
    Leaf { label: "KELOMPOK LANSIA", rows: 5 },
    Leaf { label: "SENAM LANSIA", rows: 5 },
    Leaf { label: "HOME CARE", rows: 5 },
];

const KETENAGAAN_ITEMS: [Layout; 7] = [
    Leaf { label: "DOKTER TERLATIH GERIATRI", rows: 5 },
    Leaf { label: "PERAWAT TERLATIH", rows: 5 },
    Leaf { label: "TENAGA GIZI", rows: 5 },
    Leaf { label: "FISIOTERAPIS", rows: 5 },
    Leaf { label: "KADER AKTIF", rows: 5 },
    Leaf { label: "KADER TERLATIH", rows: 5 },
    Leaf { label: "PETUGAS TERLATIH P3G", rows: 5 },
];

pub(crate) const HEADER_LAYOUT: &[Layout] = &[
    Leaf { label: "NO", rows: 6 },
    Leaf { label: "PUSKESMAS", rows: 6 },
    Leaf { label: "JUMLAH DESA / KELURAHAN", rows: 6 },
    Leaf { label: "JUMLAH POSYANDU LANSIA", rows: 6 },
    Branch { label: "SASARAN", rows: 1, children: &SASARAN_BANDS },
    Branch { label: "PELAYANAN KESEHATAN LANSIA", rows: 1, children: &PELAYANAN_PERIODS },
    Branch { label: "SKRINING KESEHATAN", rows: 1, children: &SKRINING_BANDS },
    Branch { label: "HASIL SKRINING KESEHATAN", rows: 1, children: &HASIL_CONDITIONS },
    Branch { label: "TINGKAT KEMANDIRIAN LANSIA", rows: 1, children: &KEMANDIRIAN_TIERS },
    Branch { label: "PEMBERDAYAAN LANSIA", rows: 4, children: &JML_PCT },
    Branch { label: "SARANA DAN PRASARANA", rows: 1, children: &SARANA_ITEMS },
    Branch { label: "KETENAGAAN", rows: 1, children: &KETENAGAAN_ITEMS },
];

impl Layout {
    pub(crate) fn width(&self) -> usize {
        match self {
            Leaf { .. } => 1,
            Branch { children, .. } => children.iter().map(Layout::width).sum(),
        }
    }
}

pub(crate) fn total_columns() -> usize {
    HEADER_LAYOUT.iter().map(Layout::width).sum()
}

/// One header cell with its merge spans, rows relative to the scaffold top.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeaderCell {
    pub(crate) row: usize,
    pub(crate) col: usize,
    pub(crate) row_span: usize,
    pub(crate) col_span: usize,
    pub(crate) label: &'static str,
}

/// Flatten the tree into write-and-merge instructions, depth first.
pub(crate) fn header_cells() -> Vec<HeaderCell> {
    let mut cells = Vec::new();
    let mut col = 0;
    for node in HEADER_LAYOUT {
        walk(node, 0, &mut col, &mut cells);
    }
    cells
}

fn walk(node: &Layout, row: usize, col: &mut usize, out: &mut Vec<HeaderCell>) {
    match node {
        Leaf { label, rows } => {
            out.push(HeaderCell {
                row,
                col: *col,
                row_span: *rows,
                col_span: 1,
                label,
            });
            *col += 1;
        }
        Branch {
            label,
            rows,
            children,
        } => {
            out.push(HeaderCell {
                row,
                col: *col,
                row_span: *rows,
                col_span: node.width(),
                label,
            });
            for child in *children {
                walk(child, row + rows, col, out);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ReportCell {
    Number(f64),
    Text(String),
    Blank,
}

/// The facility's data row, one cell per leaf column in leaf order.
///
/// Blank cells are fields with no source in the uploaded register (village
/// and posyandu counts, screening findings, facilities, staffing); they are
/// filled in by hand after export. "BULAN LALU" cells are 0 until a
/// historical source exists, so KUMULATIF repeats the current month.
pub(crate) fn data_row_cells(
    position: usize,
    facility: &str,
    metrics: &MetricsResult,
) -> Vec<ReportCell> {
    let mut cells = Vec::with_capacity(total_columns());
    cells.push(ReportCell::Number(position as f64));
    cells.push(ReportCell::Text(facility.to_string()));
    cells.push(ReportCell::Blank);
    cells.push(ReportCell::Blank);

    push_gender(&mut cells, metrics.pra_lansia);
    push_gender(&mut cells, metrics.lansia);
    push_gender(&mut cells, metrics.risti);

    push_zero_gender(&mut cells);
    push_gender(&mut cells, metrics.dilayani);
    push_gender(&mut cells, metrics.dilayani);

    for band in [
        metrics.skrining_pra_lansia,
        metrics.skrining_lansia,
        metrics.skrining_risti,
    ] {
        push_zero_gender(&mut cells);
        push_gender(&mut cells, band);
        push_gender(&mut cells, band);
    }

    for _ in 0..12 * 3 {
        cells.push(ReportCell::Blank);
    }

    for share in [
        metrics.kemandirian_a,
        metrics.kemandirian_b,
        metrics.kemandirian_c,
        metrics.pemberdayaan,
    ] {
        cells.push(ReportCell::Number(share.count as f64));
        cells.push(ReportCell::Number(share.pct));
    }

    for _ in 0..7 + 7 {
        cells.push(ReportCell::Blank);
    }

    debug_assert_eq!(cells.len(), total_columns());
    cells
}

fn push_gender(cells: &mut Vec<ReportCell>, count: GenderCount) {
    cells.push(ReportCell::Number(count.male as f64));
    cells.push(ReportCell::Number(count.female as f64));
    cells.push(ReportCell::Number(count.total as f64));
}

fn push_zero_gender(cells: &mut Vec<ReportCell>) {
    for _ in 0..3 {
        cells.push(ReportCell::Number(0.0));
    }
}
