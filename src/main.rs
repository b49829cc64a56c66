use std::sync::Arc;

use codegrade::{build_router, build_state, config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codegrade=info,tower_http=info".into()),
        )
        .init();

    let config = config::Config::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);

    let state = Arc::new(build_state(config).await?);
    let app = build_router(state);

    tracing::info!("codegrade listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
