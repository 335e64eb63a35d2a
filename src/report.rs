// Recap report generation
//
// metrics: distinct-NIK aggregates per worksheet
// layout: the fixed 107-column header geometry and data-row order
// emitter: turns metrics into the downloadable workbook

pub mod emitter;
mod layout;
pub mod metrics;

pub use emitter::{generate_report, ReportError, ReportSheet};
pub use metrics::{compute_metrics, is_marked, resolve_gender, Gender, GenderCount, MetricsResult, ShareCount};
