use std::sync::Arc;

use lapor_api::config::AppConfig;
use lapor_api::services::directory;
use lapor_api::store::PgStore;
use lapor_api::AppState;
use lapor_shared::clients::db::create_pool;
use lapor_shared::clients::minio::MinioClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lapor_shared::middleware::init_tracing("lapor-api");

    let config = AppConfig::load()?;
    let port = config.port;

    let pool = create_pool(&config.database_url, config.db_pool_size)?;

    let minio = MinioClient::new(
        &config.minio_endpoint,
        &config.minio_access_key,
        &config.minio_secret_key,
        &config.minio_bucket,
        &config.minio_public_url,
    )
    .await;

    let metrics_handle = lapor_shared::middleware::init_metrics()?;

    let state = Arc::new(AppState {
        config,
        store: Arc::new(PgStore::new(pool)),
        blobs: Arc::new(minio),
        metrics_handle,
    });

    if let Err(e) = directory::ensure_bootstrap_admin(&state) {
        tracing::error!(error = %e, "failed to create bootstrap admin");
    }

    let app = lapor_api::app(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "lapor-api starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
