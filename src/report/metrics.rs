/// Recap metrics aggregation.
///
/// Every aggregate is a distinct-NIK count so a person listed on multiple
/// rows is counted once per metric. Rows missing a NIK, a resolvable age, or
/// a resolvable gender are skipped from all aggregates. Metrics are derived
/// on every report generation and never stored.
use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::debug;

use crate::columns::{classify_columns, ColumnRoles};
use crate::dates::{age_in_years, numeric_cell_to_date, parse_ddmmyyyy};
use crate::ingest::{CanonicalColumn, CellValue, DataRow};

const PRA_LANSIA_MIN: i64 = 45;
const LANSIA_MIN: i64 = 60;
const RISTI_MIN: i64 = 70;

const TRUTHY_TOKENS: [&str; 7] = ["yes", "ya", "v", "✓", "x", "1", "true"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

/// Distinct-person count split by gender, with the combined total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenderCount {
    pub male: usize,
    pub female: usize,
    pub total: usize,
}

/// Absolute count plus percentage of the senior population.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShareCount {
    pub count: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsResult {
    pub pra_lansia: GenderCount,
    pub lansia: GenderCount,
    pub risti: GenderCount,
    pub dilayani: GenderCount,
    pub skrining_pra_lansia: GenderCount,
    pub skrining_lansia: GenderCount,
    pub skrining_risti: GenderCount,
    pub kemandirian_a: ShareCount,
    pub kemandirian_b: ShareCount,
    pub kemandirian_c: ShareCount,
    pub pemberdayaan: ShareCount,
}

/// Distinct-NIK tally, gender-partitioned. The combined total is the union,
/// so a NIK recorded under both genders still counts once.
#[derive(Debug, Default)]
struct Tally {
    male: HashSet<String>,
    female: HashSet<String>,
    all: HashSet<String>,
}

impl Tally {
    fn add(&mut self, nik: &str, gender: Gender) {
        match gender {
            Gender::Male => self.male.insert(nik.to_string()),
            Gender::Female => self.female.insert(nik.to_string()),
        };
        self.all.insert(nik.to_string());
    }

    fn count(&self) -> GenderCount {
        GenderCount {
            male: self.male.len(),
            female: self.female.len(),
            total: self.all.len(),
        }
    }
}

/// Compute recap metrics for one worksheet as of `today`.
pub fn compute_metrics(
    columns: &[CanonicalColumn],
    rows: &[DataRow],
    today: NaiveDate,
) -> MetricsResult {
    let roles = classify_columns(columns);

    let mut pra_lansia = Tally::default();
    let mut lansia = Tally::default();
    let mut risti = Tally::default();
    let mut dilayani = Tally::default();
    let mut skrining_pra = Tally::default();
    let mut skrining_lansia = Tally::default();
    let mut skrining_risti = Tally::default();
    let mut tier_a: HashSet<String> = HashSet::new();
    let mut tier_b: HashSet<String> = HashSet::new();
    let mut tier_c: HashSet<String> = HashSet::new();
    let mut empowered: HashSet<String> = HashSet::new();

    let mut skipped = 0;
    for row in rows {
        let Some((nik, age, gender)) = extract_person(row, &roles, today) else {
            skipped += 1;
            continue;
        };

        let is_pra = (PRA_LANSIA_MIN..LANSIA_MIN).contains(&age);
        let is_lansia = age >= LANSIA_MIN;
        let is_risti = age >= RISTI_MIN;

        if is_pra {
            pra_lansia.add(&nik, gender);
        }
        if is_lansia {
            lansia.add(&nik, gender);
        }
        if is_risti {
            risti.add(&nik, gender);
        }

        // Served means a senior with at least one service flag marked
        let served = is_lansia
            && roles
                .service_flags()
                .iter()
                .flatten()
                .any(|key| is_marked(row.get(key)));
        if served {
            dilayani.add(&nik, gender);
        }

        let screened = roles
            .skrining
            .as_deref()
            .is_some_and(|key| is_marked(row.get(key)));
        if screened {
            if is_pra {
                skrining_pra.add(&nik, gender);
            }
            if is_lansia {
                skrining_lansia.add(&nik, gender);
            }
            if is_risti {
                skrining_risti.add(&nik, gender);
            }
        }

        if is_lansia {
            if tier_marked(row, roles.kemandirian_a.as_deref()) {
                tier_a.insert(nik.clone());
            }
            if tier_marked(row, roles.kemandirian_b.as_deref()) {
                tier_b.insert(nik.clone());
            }
            if tier_marked(row, roles.kemandirian_c.as_deref()) {
                tier_c.insert(nik.clone());
            }
            if tier_marked(row, roles.pemberdayaan.as_deref()) {
                empowered.insert(nik.clone());
            }
        }
    }

    if skipped > 0 {
        debug!(skipped, total = rows.len(), "Rows without NIK/age/gender skipped from metrics");
    }

    let senior_total = lansia.count().total;
    MetricsResult {
        pra_lansia: pra_lansia.count(),
        lansia: lansia.count(),
        risti: risti.count(),
        dilayani: dilayani.count(),
        skrining_pra_lansia: skrining_pra.count(),
        skrining_lansia: skrining_lansia.count(),
        skrining_risti: skrining_risti.count(),
        kemandirian_a: share_of_seniors(tier_a.len(), senior_total),
        kemandirian_b: share_of_seniors(tier_b.len(), senior_total),
        kemandirian_c: share_of_seniors(tier_c.len(), senior_total),
        pemberdayaan: share_of_seniors(empowered.len(), senior_total),
    }
}

/// Truthy service-flag test against the fixed vocabulary. Blank and
/// anything else is falsy.
pub fn is_marked(value: &CellValue) -> bool {
    let display = value.display().to_lowercase();
    TRUTHY_TOKENS.contains(&display.as_str())
}

/// "L"/"P" or a localized word starting with laki/perempuan, else unresolved.
pub fn resolve_gender(value: &CellValue) -> Option<Gender> {
    let display = value.display().to_lowercase();
    if display == "l" || display.starts_with("laki") {
        Some(Gender::Male)
    } else if display == "p" || display.starts_with("perempuan") {
        Some(Gender::Female)
    } else {
        None
    }
}

fn tier_marked(row: &DataRow, key: Option<&str>) -> bool {
    key.is_some_and(|k| is_marked(row.get(k)))
}

fn extract_person(
    row: &DataRow,
    roles: &ColumnRoles,
    today: NaiveDate,
) -> Option<(String, i64, Gender)> {
    let nik = roles
        .nik
        .as_deref()
        .map(|key| row.get(key).display())
        .filter(|nik| !nik.is_empty())?;
    let age = resolve_age(row, roles, today)?;
    let gender = roles
        .gender
        .as_deref()
        .and_then(|key| resolve_gender(row.get(key)))?;
    Some((nik, age, gender))
}

/// Explicit age column when numeric, else whole years from the birth-date
/// column (serial number or DD/MM/YYYY string) as of `today`. Floored at 0.
fn resolve_age(row: &DataRow, roles: &ColumnRoles, today: NaiveDate) -> Option<i64> {
    if let Some(key) = roles.age.as_deref() {
        if let Some(age) = row.get(key).as_f64() {
            return Some((age.floor() as i64).max(0));
        }
    }

    let birth_cell = roles.birth_date.as_deref().map(|key| row.get(key))?;
    let birth = match birth_cell {
        CellValue::Number(n) => numeric_cell_to_date(*n),
        CellValue::Text(s) => {
            parse_ddmmyyyy(s).or_else(|| s.trim().parse::<f64>().ok().and_then(numeric_cell_to_date))
        }
        _ => None,
    }?;
    Some(age_in_years(birth, today))
}

fn share_of_seniors(count: usize, senior_total: usize) -> ShareCount {
    let denominator = senior_total.max(1) as f64;
    let pct = (count as f64 / denominator * 100.0 * 100.0).round() / 100.0;
    ShareCount { count, pct }
}
