mod app;
mod auth;
mod config;
mod error;
mod state;
mod users;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "userdir=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = match state::AppState::init().await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("startup failed: {e:#}");
            return Err(e);
        }
    };
    tracing::info!(
        data_file = %app_state.config.data_file.display(),
        token_ttl_minutes = app_state.config.jwt.ttl_minutes,
        "configuration loaded"
    );

    let app = app::build_app(app_state);
    app::serve(app).await
}
