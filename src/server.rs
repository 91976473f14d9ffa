//! HTTP 前端（feature `web`）
//!
//! - `GET /api/health` -> `OK`
//! - `POST /api/tasks`、`POST /`：multipart 上传任意文件，按名称启发式选出任务文件，
//!   其余作为附件；返回 JSON TaskReport。每个请求是一次独立的任务运行。

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::agent::{handle_task, TaskReport};
use crate::core::Orchestrator;
use crate::submission::{designate_task_file, Attachment};

/// 上传总大小上限
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub preview_rows: usize,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(api_tasks_create))
        .route("/api/tasks", post(api_tasks_create))
        .route("/api/health", get(|| async { "OK" }))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// 读取 multipart 中的全部文件字段；无文件名的字段以字段名代替
async fn read_uploads(mut multipart: Multipart) -> Result<Vec<Attachment>, (StatusCode, String)> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let name = field
            .file_name()
            .or_else(|| field.name())
            .unwrap_or("upload")
            .to_string();
        let content = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        files.push(Attachment::new(name, content.to_vec()));
    }
    Ok(files)
}

async fn api_tasks_create(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<TaskReport>, (StatusCode, String)> {
    let files = read_uploads(multipart).await?;
    let (task, attachments) = designate_task_file(files);
    let report = handle_task(&state.orchestrator, &task, attachments, state.preview_rows).await;
    Ok(Json(report))
}
