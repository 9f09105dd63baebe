use std::path::PathBuf;

use axum::Router;
use clap::Parser;
use course_server::{
    api::{
        AppState, manager::get_manager_scope, public::get_public_scope, user::get_user_scope,
    },
    artifact::LocalArtifactStore,
    config::Config,
    engine::GatingEngine,
    utils::init_log,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file; CLI flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Path to the SQLite database file.
    #[arg(short, long)]
    database: Option<PathBuf>,
    /// Directory for submitted artifacts.
    #[arg(short, long)]
    artifact_dir: Option<PathBuf>,
    #[arg(short = 'H', long)]
    host: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
    /// Directory for daily-rotated log files (stdout when absent).
    #[arg(short, long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = init_log(args.log_dir.clone());
    let _ = dotenvy::dotenv();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(database) = args.database {
        config.database = database;
    }
    if let Some(artifact_dir) = args.artifact_dir {
        config.artifact_dir = artifact_dir;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let options = SqliteConnectOptions::new()
        .filename(&config.database)
        .create_if_missing(true)
        .foreign_keys(true);
    let database = SqlitePoolOptions::new().connect_with(options).await?;
    sqlx::migrate!().run(&database).await?;

    let session_store = SqliteStore::new(database.clone());
    session_store.migrate().await?;
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(time::Duration::days(5)));

    let artifacts = LocalArtifactStore::new(&config.artifact_dir);
    let engine = GatingEngine::new(database.clone(), artifacts.clone());
    let state = AppState {
        database,
        engine,
        artifacts,
    };

    let app = Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(get_user_scope())
                .merge(get_manager_scope())
                .merge(get_public_scope()),
        )
        .with_state(state)
        .layer(session_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "course server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
