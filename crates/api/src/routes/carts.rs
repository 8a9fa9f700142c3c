//! Cart endpoints for signed-in users and anonymous sessions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CartItemId, ProductId, SessionId};
use domain::{CartLine, CartSummary, LineProblem};
use marketplace::MergeReport;
use serde::Deserialize;
use store::Store;

use super::identity::{AuthUser, Owner};
use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub session_id: SessionId,
}

/// GET /cart
#[tracing::instrument(skip(state))]
pub async fn view<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Owner(owner): Owner,
) -> Result<Json<CartSummary>, ApiError> {
    Ok(Json(state.market.carts.view(owner).await?))
}

/// POST /cart/items
#[tracing::instrument(skip(state, req))]
pub async fn add<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Owner(owner): Owner,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<CartLine>), ApiError> {
    let line = state
        .market
        .carts
        .add_item(owner, req.product_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(line)))
}

/// PATCH /cart/items/{item_id}
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Owner(owner): Owner,
    Path(item_id): Path<String>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<CartSummary>, ApiError> {
    let item_id: CartItemId = parse_id(&item_id)?;
    state
        .market
        .carts
        .update_quantity(owner, item_id, req.quantity)
        .await?;
    Ok(Json(state.market.carts.view(owner).await?))
}

/// DELETE /cart/items/{item_id}
#[tracing::instrument(skip(state))]
pub async fn remove<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Owner(owner): Owner,
    Path(item_id): Path<String>,
) -> Result<Json<CartSummary>, ApiError> {
    let item_id: CartItemId = parse_id(&item_id)?;
    state.market.carts.remove_item(owner, item_id).await?;
    Ok(Json(state.market.carts.view(owner).await?))
}

/// DELETE /cart
#[tracing::instrument(skip(state))]
pub async fn clear<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Owner(owner): Owner,
) -> Result<StatusCode, ApiError> {
    state.market.carts.clear(owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /cart/problems: lines that would block checkout right now.
#[tracing::instrument(skip(state))]
pub async fn problems<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Owner(owner): Owner,
) -> Result<Json<Vec<LineProblem>>, ApiError> {
    Ok(Json(state.market.carts.validate(owner).await?))
}

/// POST /cart/merge: called by the auth layer right after sign-in.
#[tracing::instrument(skip(state, req))]
pub async fn merge<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    Json(req): Json<MergeRequest>,
) -> Result<Json<MergeReport>, ApiError> {
    let report = state
        .market
        .merger
        .merge(req.session_id, actor.user_id)
        .await?;
    Ok(Json(report))
}
