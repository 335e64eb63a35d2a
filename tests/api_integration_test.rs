// API integration tests that verify HTTP endpoints
// Tests actual Axum router with real HTTP requests

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt; // For `.collect()`
use lansia_report_service::api::{create_router, AppState};
use lansia_report_service::db::ReportRepository;
use lansia_report_service::services::ReportService;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt; // For `oneshot`

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Test fixture module for API tests
mod api_test_fixtures {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    /// Fresh sqlite database inside the test's temp directory
    pub async fn setup_test_db(dir: &TempDir) -> SqlitePool {
        let db_path = dir.path().join("api_test.sqlite");
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))
            .expect("Invalid sqlite url")
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .expect("Failed to connect to test database");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    /// A modern create-report body with one usable worksheet. The rows carry
    /// an address column plus two trailing detail columns so the stored
    /// bundle exercises the address-flag transform.
    pub fn bundle_body(kabupaten: &str, bulan_tahun: &str) -> Value {
        json!({
            "fileName": "laporan_januari.xlsx",
            "kabupaten": kabupaten,
            "bulanTahun": bulan_tahun,
            "worksheets": [{
                "worksheetName": "PKM MELATI",
                "puskesmas": "PKM MELATI",
                "kabupaten": kabupaten,
                "bulanTahun": bulan_tahun,
                "metaPairs": [{"key": "KABUPATEN", "value": kabupaten}],
                "headerKeys": ["no", "nama", "nik", "umur", "jk", "skrining", "alamat", "rt", "rw"],
                "headerLabels": ["NO", "NAMA", "NIK", "UMUR", "JK", "SKRINING", "ALAMAT", "RT", "RW"],
                "headerOrder": [],
                "rowData": [
                    {
                        "id": 1,
                        "no": 1,
                        "nama": "Budi Santoso",
                        "nik": "1234567890123456",
                        "umur": 65,
                        "jk": "L",
                        "skrining": "Yes",
                        "alamat": "Jl. Melati 1",
                        "rt": "003",
                        "rw": null
                    },
                    {
                        "id": 2,
                        "no": 2,
                        "nama": "Siti Aminah",
                        "nik": "1234567890123457",
                        "umur": 72,
                        "jk": "P",
                        "skrining": "v",
                        "alamat": "Jl. Melati 2",
                        "rt": null,
                        "rw": null
                    }
                ]
            }]
        })
    }

    pub fn json_request(uri: &str, method: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Single-field multipart body for the upload endpoint
    pub fn multipart_request(uri: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
        let boundary = "test-boundary-7MA4YWxkTrZu0gW";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    /// An uploadable workbook in the layout the detector expects:
    /// metadata rows 2-4, header row 5, data from row 6.
    pub fn usable_workbook_bytes() -> Vec<u8> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("PKM MELATI").unwrap();
        sheet.write_string(0, 0, "REKAPITULASI LAPORAN LANSIA").unwrap();
        sheet.write_string(1, 0, "KABUPATEN").unwrap();
        sheet.write_string(1, 2, ":").unwrap();
        sheet.write_string(1, 3, "Kab. Contoh").unwrap();
        sheet.write_string(2, 0, "PUSKESMAS").unwrap();
        sheet.write_string(2, 3, "PKM MELATI").unwrap();
        sheet.write_string(3, 0, "BULAN").unwrap();
        sheet.write_string(3, 3, "JANUARI 2025").unwrap();
        sheet.write_string(4, 0, "NO").unwrap();
        sheet.write_string(4, 1, "NAMA").unwrap();
        sheet.write_string(4, 2, "NIK").unwrap();
        sheet.write_string(4, 3, "UMUR").unwrap();
        sheet.write_string(4, 4, "JK").unwrap();
        sheet.write_number(5, 0, 1.0).unwrap();
        sheet.write_string(5, 1, "Budi").unwrap();
        sheet.write_string(5, 2, "1234567890123456").unwrap();
        sheet.write_number(5, 3, 65.0).unwrap();
        sheet.write_string(5, 4, "L").unwrap();
        workbook.save_to_buffer().unwrap()
    }
}

/// Helper to create test app with real database
async fn create_test_app() -> (axum::Router, SqlitePool, TempDir) {
    create_test_app_with_limit(10 * 1024 * 1024).await
}

async fn create_test_app_with_limit(
    max_upload_bytes: usize,
) -> (axum::Router, SqlitePool, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let pool = api_test_fixtures::setup_test_db(&dir).await;

    let report_repo = ReportRepository::new(pool.clone());
    let report_service = ReportService::new(report_repo, dir.path().join("reports"));

    let state = AppState {
        report_service,
        max_upload_bytes,
    };

    (create_router(state), pool, dir)
}

async fn response_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _pool, _dir) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "lansia-report-service");
}

#[tokio::test]
async fn test_create_report_bundle() {
    let (app, _pool, _dir) = create_test_app().await;

    let body = api_test_fixtures::bundle_body("Kab. Contoh", "Januari 2025");
    let response = app
        .oneshot(api_test_fixtures::json_request(
            "/api/v1/reports",
            "POST",
            &body,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let json = response_json(response).await;
    assert!(json["reportId"].is_number());
    assert_eq!(json["worksheetCount"], 1);
    assert!(json["excelPath"].is_string());
}

#[tokio::test]
async fn test_create_report_rejects_blank_kabupaten() {
    let (app, _pool, _dir) = create_test_app().await;

    let body = api_test_fixtures::bundle_body("  ", "Januari 2025");
    let response = app
        .oneshot(api_test_fixtures::json_request(
            "/api/v1/reports",
            "POST",
            &body,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = response_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("Kabupaten"));
}

#[tokio::test]
async fn test_create_report_bundle_without_metadata_names_metadata() {
    let (app, _pool, _dir) = create_test_app().await;

    // Bundle shape, but no kabupaten/bulanTahun at the top level
    let body = json!({
        "worksheets": [{
            "worksheetName": "PKM MELATI",
            "headerKeys": ["nama", "nik", "umur", "jk"],
            "headerLabels": ["NAMA", "NIK", "UMUR", "JK"],
            "rowData": [
                {"id": 1, "nama": "Budi", "nik": "1234567890123456", "umur": 65, "jk": "L"}
            ]
        }]
    });
    let response = app
        .oneshot(api_test_fixtures::json_request(
            "/api/v1/reports",
            "POST",
            &body,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = response_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("Kabupaten"));
}

#[tokio::test]
async fn test_create_report_rejects_empty_worksheets() {
    let (app, _pool, _dir) = create_test_app().await;

    let body = json!({
        "kabupaten": "Kab. Contoh",
        "bulanTahun": "Januari 2025",
        "worksheets": [{
            "worksheetName": "PKM KOSONG",
            "headerKeys": [],
            "headerLabels": [],
            "rowData": []
        }]
    });
    let response = app
        .oneshot(api_test_fixtures::json_request(
            "/api/v1/reports",
            "POST",
            &body,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_report_accepts_legacy_shape() {
    let (app, _pool, _dir) = create_test_app().await;

    // Legacy body: one worksheet's fields at the top level, no array
    let body = json!({
        "worksheetName": "PKM MELATI",
        "kabupaten": "Kab. Contoh",
        "bulanTahun": "Januari 2025",
        "headerKeys": ["nama", "nik", "umur", "jk"],
        "headerLabels": ["NAMA", "NIK", "UMUR", "JK"],
        "rowData": [
            {"id": 1, "nama": "Budi", "nik": "1234567890123456", "umur": 65, "jk": "L"}
        ]
    });
    let response = app
        .oneshot(api_test_fixtures::json_request(
            "/api/v1/reports",
            "POST",
            &body,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let json = response_json(response).await;
    assert_eq!(json["worksheetCount"], 1);
}

#[tokio::test]
async fn test_list_reports_newest_first() {
    let (app, _pool, _dir) = create_test_app().await;

    let first = api_test_fixtures::bundle_body("Kab. Contoh", "Januari 2025");
    let response = app
        .clone()
        .oneshot(api_test_fixtures::json_request(
            "/api/v1/reports",
            "POST",
            &first,
        ))
        .await
        .unwrap();
    let first_id = response_json(response).await["reportId"].as_i64().unwrap();

    let second = api_test_fixtures::bundle_body("Kab. Contoh", "Februari 2025");
    let response = app
        .clone()
        .oneshot(api_test_fixtures::json_request(
            "/api/v1/reports",
            "POST",
            &second,
        ))
        .await
        .unwrap();
    let second_id = response_json(response).await["reportId"].as_i64().unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/reports")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    let summaries = json.as_array().unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0]["id"].as_i64().unwrap(), second_id);
    assert_eq!(summaries[1]["id"].as_i64().unwrap(), first_id);
    assert_eq!(summaries[0]["bulanTahun"], "Februari 2025");
    assert!(summaries[0].get("worksheets").is_none());
}

#[tokio::test]
async fn test_get_report_applies_address_flags() {
    let (app, _pool, _dir) = create_test_app().await;

    let body = api_test_fixtures::bundle_body("Kab. Contoh", "Januari 2025");
    let response = app
        .clone()
        .oneshot(api_test_fixtures::json_request(
            "/api/v1/reports",
            "POST",
            &body,
        ))
        .await
        .unwrap();
    let id = response_json(response).await["reportId"].as_i64().unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/reports/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["kabupaten"], "Kab. Contoh");
    assert_eq!(json["worksheetCount"], 1);

    // Columns right of "alamat" come back as presence flags
    let rows = json["worksheets"][0]["rows"].as_array().unwrap();
    assert_eq!(rows[0]["alamat"], "Jl. Melati 1");
    assert_eq!(rows[0]["rt"], "v");
    assert_eq!(rows[0]["rw"], "-");
    assert_eq!(rows[1]["rt"], "-");
    assert_eq!(rows[1]["rw"], "-");
}

#[tokio::test]
async fn test_get_report_not_found() {
    let (app, _pool, _dir) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/reports/999999")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = response_json(response).await;
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn test_download_report_regenerates_workbook() {
    let (app, _pool, _dir) = create_test_app().await;

    let body = api_test_fixtures::bundle_body("Kab. Contoh", "Januari 2025");
    let response = app
        .clone()
        .oneshot(api_test_fixtures::json_request(
            "/api/v1/reports",
            "POST",
            &body,
        ))
        .await
        .unwrap();
    let id = response_json(response).await["reportId"].as_i64().unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/reports/{id}/download"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        XLSX_MIME
    );
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("laporan_lansia_Kab_Contoh_Januari_2025.xlsx"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(b"PK"));
}

#[tokio::test]
async fn test_download_report_not_found() {
    let (app, _pool, _dir) = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/reports/424242/download")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_workbook_returns_draft() {
    let (app, _pool, _dir) = create_test_app().await;

    let bytes = api_test_fixtures::usable_workbook_bytes();
    let response = app
        .oneshot(api_test_fixtures::multipart_request(
            "/api/v1/uploads",
            "laporan.xlsx",
            &bytes,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = response_json(response).await;
    assert_eq!(json["fileName"], "laporan.xlsx");
    assert_eq!(json["worksheetCount"], 1);
    assert_eq!(json["activeWorksheet"], 0);

    let worksheet = &json["worksheets"][0];
    assert_eq!(worksheet["worksheetName"], "PKM MELATI");
    assert_eq!(worksheet["kabupaten"], "Kab. Contoh");
    assert_eq!(worksheet["validation"]["total"], 1);
    assert_eq!(worksheet["validation"]["valid"], 1);
    assert_eq!(worksheet["validation"]["error"], 0);
}

#[tokio::test]
async fn test_upload_rejects_missing_file_field() {
    let (app, _pool, _dir) = create_test_app().await;

    let boundary = "test-boundary-7MA4YWxkTrZu0gW";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/uploads")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = response_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("File"));
}

#[tokio::test]
async fn test_upload_rejects_unreadable_workbook() {
    let (app, _pool, _dir) = create_test_app().await;

    let response = app
        .oneshot(api_test_fixtures::multipart_request(
            "/api/v1/uploads",
            "laporan.xlsx",
            b"not a workbook at all",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_rejects_oversize_file() {
    let (app, _pool, _dir) = create_test_app_with_limit(1024).await;

    let bytes = vec![0u8; 4 * 1024];
    let response = app
        .oneshot(api_test_fixtures::multipart_request(
            "/api/v1/uploads",
            "laporan.xlsx",
            &bytes,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = response_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("terlalu besar"));
}
