//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use domain::{Order, PaymentMethod, ShippingDetails};
use serde::Deserialize;
use store::Store;

use super::identity::AuthUser;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub shipping: ShippingDetails,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

/// POST /checkout: places an order for the caller's cart.
#[tracing::instrument(skip(state, req))]
pub async fn place_order<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthUser(actor): AuthUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state
        .market
        .checkout
        .place_order(actor.user_id, req.shipping, req.payment_method)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}
