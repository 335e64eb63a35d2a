use chrono::Utc;
use sqlx::types::Json;
use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

use crate::db::{DbError, NewReportBundle, ReportBundleRow, ReportSummary, StoredReport};

#[derive(Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a confirmed bundle and return its new id
    #[instrument(skip(self, bundle), fields(kabupaten = %bundle.kabupaten, worksheets = bundle.worksheets.len()))]
    pub async fn insert(&self, bundle: &NewReportBundle) -> Result<i64, DbError> {
        debug!(
            "Inserting report bundle with {} worksheets",
            bundle.worksheets.len()
        );

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO report_bundles
                (file_name, kabupaten, bulan_tahun, worksheet_count, worksheets, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING id
            "#,
        )
        .bind(&bundle.file_name)
        .bind(&bundle.kabupaten)
        .bind(&bundle.bulan_tahun)
        .bind(bundle.worksheets.len() as i64)
        .bind(Json(&bundle.worksheets))
        .bind(&bundle.created_by)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        info!("Inserted report bundle {}", id);
        Ok(id)
    }

    /// Most recent bundles first, without row payloads
    #[instrument(skip(self))]
    pub async fn find_recent(&self, limit: i64) -> Result<Vec<ReportSummary>, DbError> {
        debug!("Querying {} most recent report bundles", limit);

        let summaries = sqlx::query_as::<_, ReportSummary>(
            r#"
            SELECT id, file_name, kabupaten, bulan_tahun, worksheet_count,
                   excel_path, created_by, created_at
            FROM report_bundles
            ORDER BY created_at DESC, id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} report bundles", summaries.len());
        Ok(summaries)
    }

    /// Fetch a single bundle with its full worksheet payload
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i64) -> Result<Option<StoredReport>, DbError> {
        debug!("Querying report bundle {}", id);

        let row = sqlx::query_as::<_, ReportBundleRow>(
            r#"
            SELECT id, file_name, kabupaten, bulan_tahun, worksheet_count,
                   worksheets, excel_path, created_by, created_at
            FROM report_bundles
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        if row.is_none() {
            debug!("No report bundle found with id {}", id);
        }

        Ok(row.map(StoredReport::from))
    }

    /// Record where the generated workbook was written
    #[instrument(skip(self))]
    pub async fn update_excel_path(&self, id: i64, excel_path: &str) -> Result<(), DbError> {
        debug!("Recording excel path for report bundle {}", id);

        sqlx::query("UPDATE report_bundles SET excel_path = ?1 WHERE id = ?2")
            .bind(excel_path)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
