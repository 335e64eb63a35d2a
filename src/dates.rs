/// Date helpers shared by validation, metrics, and the report emitter.
///
/// Uploaded sheets carry dates in two shapes: a "DD/MM/YYYY" display string,
/// or the raw spreadsheet serial (day count from the 1899-12-30 epoch) that
/// workbook readers hand back for date-formatted cells. Everything downstream
/// converts between the two through this module.
use chrono::{Datelike, Duration, NaiveDate};

/// Spreadsheet epoch. Serial 2 = 1900-01-01 under the common tooling
/// convention, which keeps serials aligned with real calendar dates for
/// everything after February 1900.
const EPOCH_YMD: (i32, u32, u32) = (1899, 12, 30);

/// Largest serial accepted from a date-shaped cell (31 Dec 2099).
pub const MAX_DATE_SERIAL: i64 = 73_050;

/// Parse a strict "DD/MM/YYYY" string into a calendar date.
///
/// Day and month must be exactly two digits, the year exactly four, and the
/// triple must be calendar-valid (no 31 April, no 29 February off leap years).
///
/// # Examples
///
/// ```
/// use lansia_report_service::dates::parse_ddmmyyyy;
///
/// assert!(parse_ddmmyyyy("17/08/1960").is_some());
/// assert!(parse_ddmmyyyy("29/02/2024").is_some());
/// assert!(parse_ddmmyyyy("31/04/2024").is_none());
/// assert!(parse_ddmmyyyy("1/08/1960").is_none());
/// ```
pub fn parse_ddmmyyyy(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let mut parts = trimmed.split('/');
    let day = parts.next()?;
    let month = parts.next()?;
    let year = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    if day.len() != 2 || month.len() != 2 || year.len() != 4 {
        return None;
    }
    if !is_all_digits(day) || !is_all_digits(month) || !is_all_digits(year) {
        return None;
    }

    let day: u32 = day.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Format a date back into the "DD/MM/YYYY" display form.
pub fn format_ddmmyyyy(date: NaiveDate) -> String {
    format!("{:02}/{:02}/{:04}", date.day(), date.month(), date.year())
}

/// Convert a spreadsheet serial day count to a calendar date.
///
/// Returns `None` for negative serials or anything past [`MAX_DATE_SERIAL`].
pub fn serial_to_date(serial: i64) -> Option<NaiveDate> {
    if !(0..=MAX_DATE_SERIAL).contains(&serial) {
        return None;
    }
    let (y, m, d) = EPOCH_YMD;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)?;
    epoch.checked_add_signed(Duration::days(serial))
}

/// Convert a calendar date to its spreadsheet serial day count.
pub fn date_to_serial(date: NaiveDate) -> i64 {
    let (y, m, d) = EPOCH_YMD;
    // Epoch components are compile-time constants, always a valid date
    let epoch = NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();
    (date - epoch).num_days()
}

/// Interpret a raw numeric cell as a date serial.
///
/// Date-shaped cells must hold a whole, non-negative day count; fractional
/// values (times) and out-of-range serials are rejected.
pub fn numeric_cell_to_date(value: f64) -> Option<NaiveDate> {
    if value.fract() != 0.0 || value < 0.0 {
        return None;
    }
    serial_to_date(value as i64)
}

/// Whole years between a birth date and `today`, adjusted for a birthday
/// that has not yet happened this year. Never negative.
pub fn age_in_years(birth: NaiveDate, today: NaiveDate) -> i64 {
    let mut age = i64::from(today.year() - birth.year());
    let had_birthday = (today.month(), today.day()) >= (birth.month(), birth.day());
    if !had_birthday {
        age -= 1;
    }
    age.max(0)
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
