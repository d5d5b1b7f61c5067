use anyhow::{Context, Result};
use axum::Router;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use services::{
    object_storage::VideoStorage,
    probe::FfprobeProbe,
    video_service::{MAX_UPLOAD_BYTES, VideoService},
};

/// Schema for the `videos` table, embedded so `--migrate` works from any directory.
const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + command flags ---
    let (cfg, command) = config::AppConfig::from_env_and_args()?;

    if let config::Command::IssueToken(user_id) = command {
        let token =
            services::auth::make_jwt(user_id, &cfg.jwt_secret, chrono::Duration::hours(1))?;
        println!("{}", token);
        return Ok(());
    }

    tracing::info!("Starting video-upload with config: {:?}", cfg);

    // --- Ensure assets + staging directories exist ---
    for dir in [&cfg.assets_root, &cfg.staging_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
            tracing::info!("Created directory at {}", dir.display());
        }
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    // SQLx will not create missing parent directories.
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(
            db_url
                .parse::<sqlx::sqlite::SqliteConnectOptions>()
                .with_context(|| format!("parsing database url `{}`", db_url))?
                .create_if_missing(true),
        )
        .await
        .context("connecting to SQLite")?;

    // --- Handle migration mode ---
    if command == config::Command::Migrate {
        run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core service ---
    let storage = VideoStorage::s3(&cfg).context("building object store client")?;
    let probe = Arc::new(FfprobeProbe::new(cfg.ffprobe_path.clone()));
    let service = VideoService::new(
        Arc::new(db),
        storage,
        probe,
        &cfg.jwt_secret,
        cfg.staging_dir.clone(),
    );

    // --- Build router ---
    let app: Router =
        routes::routes::routes(&cfg.assets_root, MAX_UPLOAD_BYTES).with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Apply the embedded schema statement by statement.
pub(crate) async fn run_migrations(db: &SqlitePool) -> Result<()> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}
