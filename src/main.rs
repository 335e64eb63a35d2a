use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lansia_report_service::api::{create_router, AppState};
use lansia_report_service::config::Config;
use lansia_report_service::db::ReportRepository;
use lansia_report_service::services::ReportService;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing with environment filter support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lansia_report_service=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;
    info!("Starting lansia report service with config: {:?}", config);

    // Create database connection pool
    info!("Connecting to database...");
    let connect_options =
        SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;
    info!("Database connection established");

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations completed");

    // Create repositories
    let report_repo = ReportRepository::new(pool.clone());

    // Create services
    let report_service = ReportService::new(report_repo, config.reports_dir.clone());

    // Create API router
    let app_state = AppState {
        report_service,
        max_upload_bytes: config.max_upload_bytes,
    };
    let app = create_router(app_state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = config.server_addr();
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
