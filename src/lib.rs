pub mod api;
pub mod columns;
pub mod config;
pub mod dates;
pub mod db;
pub mod editor;
pub mod ingest;
pub mod report;
pub mod services;
