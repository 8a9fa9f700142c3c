//! Order queries and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::{OrderId, UserId};
use domain::{Order, OrderNumber, OrderStatus};
use serde::Deserialize;
use store::{RecordedEvent, Store};

use super::identity::AuthUser;
use super::parse_id;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub customer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct TrackingRequest {
    pub tracking_number: String,
}

/// GET /orders: the caller's orders, or another customer's for admins.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let customer_id = match query.customer_id.as_deref() {
        Some(raw) => parse_id::<UserId>(raw)?,
        None => actor.user_id,
    };
    let orders = state
        .market
        .lifecycle
        .orders_for_customer(customer_id, &actor)
        .await?;
    Ok(Json(orders))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    Ok(Json(state.market.lifecycle.order(order_id, &actor).await?))
}

/// GET /order-numbers/{number}
#[tracing::instrument(skip(state))]
pub async fn get_by_number<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    Path(number): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let number = OrderNumber::from(number);
    Ok(Json(
        state
            .market
            .lifecycle
            .order_by_number(&number, &actor)
            .await?,
    ))
}

/// GET /orders/{id}/events: the order's history, oldest first.
#[tracing::instrument(skip(state))]
pub async fn events<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<RecordedEvent>>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    Ok(Json(state.market.lifecycle.history(order_id, &actor).await?))
}

/// POST /orders/{id}/status
#[tracing::instrument(skip(state, req))]
pub async fn transition<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    let to: OrderStatus = req.status.parse().map_err(ApiError::BadRequest)?;
    Ok(Json(
        state
            .market
            .lifecycle
            .transition(order_id, to, &actor)
            .await?,
    ))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    Ok(Json(
        state
            .market
            .lifecycle
            .request_cancellation(order_id, &actor)
            .await?,
    ))
}

/// PUT /orders/{id}/tracking
#[tracing::instrument(skip(state, req))]
pub async fn tracking<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<TrackingRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    Ok(Json(
        state
            .market
            .lifecycle
            .assign_tracking_number(order_id, &req.tracking_number, &actor)
            .await?,
    ))
}
