use axum::{
    extract::{Path, State},
    http::Method,
    Extension, Json,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::server::AppState;
use crate::timing::context::RequestContext;
use crate::timing::route::Endpoint;

use super::AppError;

// ─── Domain types ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub item: String,
    pub quantity: u32,
    pub in_stock: bool,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub item: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

// ─── GET /api/orders/:id ─────────────────────────────────────────

pub async fn show(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    ctx.set_dispatch(Endpoint::handler(show, Method::GET));

    if id.is_empty() || !id.starts_with("ord_") {
        return Err(AppError::NotFound(format!("order '{id}' not found")));
    }

    let in_stock = state.external.request(check_inventory(&id)).await;

    Ok(Json(Order {
        id,
        item: "widget".into(),
        quantity: 1,
        in_stock,
        created_at: chrono::Utc::now().to_rfc3339(),
    }))
}

// ─── POST /api/orders ────────────────────────────────────────────

pub async fn create(
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    ctx.set_dispatch(Endpoint::handler(create, Method::POST));

    if req.quantity == 0 || req.quantity > 1_000 {
        return Err(AppError::BadRequest(
            "quantity must be between 1 and 1000".into(),
        ));
    }

    Ok(Json(Order {
        id: format!("ord_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
        item: req.item,
        quantity: req.quantity,
        in_stock: true,
        created_at: chrono::Utc::now().to_rfc3339(),
    }))
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Stand-in for a call to an inventory service: 5–25 ms of latency.
async fn check_inventory(id: &str) -> bool {
    let delay_ms = rand::thread_rng().gen_range(5..=25);
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    !id.ends_with('0')
}
