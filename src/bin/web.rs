//! bee-analyst HTTP 前端
//!
//! 启动: cargo run --bin bee-analyst-web --features web
//! 提交: curl -F "files=@questions.txt" -F "files=@data.csv" http://127.0.0.1:8080/api/tasks

#![cfg(feature = "web")]

use std::sync::Arc;

use bee_analyst::agent::create_orchestrator;
use bee_analyst::observability;
use bee_analyst::server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let (orchestrator, cfg) = create_orchestrator(None);
    let state = Arc::new(AppState {
        orchestrator,
        preview_rows: cfg.agent.preview_rows,
    });
    let app = router(state);

    let port = std::env::var("ANALYST_WEB_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(cfg.web.port);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("bee-analyst listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
