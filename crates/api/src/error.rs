//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use marketplace::MarketplaceError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed identity headers.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Error returned by a marketplace service.
    Marketplace(MarketplaceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": msg }),
            ),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
            }
            ApiError::Marketplace(err) => marketplace_error_to_response(err),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn marketplace_error_to_response(err: MarketplaceError) -> (StatusCode, serde_json::Value) {
    let status = status_for(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "internal server error");
    }

    let mut body = serde_json::json!({ "error": err.to_string(), "kind": err.kind() });
    if let MarketplaceError::CartInvalid { problems } = &err {
        body["problems"] = serde_json::to_value(problems).unwrap_or_default();
    }
    (status, body)
}

fn status_for(err: &MarketplaceError) -> StatusCode {
    match err {
        MarketplaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        MarketplaceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        MarketplaceError::Forbidden(_) => StatusCode::FORBIDDEN,
        MarketplaceError::InvalidQuantity { .. } | MarketplaceError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        }
        MarketplaceError::InsufficientStock { .. } | MarketplaceError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        MarketplaceError::CheckoutFailed { reason } => status_for(reason),
        MarketplaceError::CartEmpty
        | MarketplaceError::CartInvalid { .. }
        | MarketplaceError::ProductUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MarketplaceError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<MarketplaceError> for ApiError {
    fn from(err: MarketplaceError) -> Self {
        ApiError::Marketplace(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;
    use domain::OrderStatus;
    use store::StoreError;

    #[test]
    fn test_status_mapping() {
        let shortfall = MarketplaceError::InsufficientStock {
            product_id: ProductId::new(),
            requested: 2,
            available: 1,
        };
        assert_eq!(status_for(&shortfall), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&MarketplaceError::checkout_failed(shortfall)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&MarketplaceError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Processing,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_for(&MarketplaceError::CartEmpty), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status_for(&MarketplaceError::Forbidden("no".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&MarketplaceError::Infrastructure(StoreError::Conflict("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
