use axum::{
    extract::{Path, State},
    Json,
};
use redis::AsyncCommands;
use serde::Serialize;

use crate::server::AppState;

use super::AppError;

#[derive(Debug, Serialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
}

// ─── GET /api/cache/:key ─────────────────────────────────────────

pub async fn get_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<CacheEntry>, AppError> {
    let mut conn = state.cache.clone().ok_or(AppError::Unavailable("redis"))?;

    let value: Option<String> = conn.get(format!("cache:{key}")).await?;
    match value {
        Some(value) => Ok(Json(CacheEntry { key, value })),
        None => Err(AppError::NotFound(format!("key '{key}' not found"))),
    }
}
