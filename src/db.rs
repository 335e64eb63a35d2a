pub mod error;
pub mod models;
pub mod report_repository;

pub use error::DbError;
pub use models::*;
pub use report_repository::ReportRepository;
