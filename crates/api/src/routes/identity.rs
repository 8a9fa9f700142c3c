//! Identity supplied by the surrounding auth layer through request headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Actor, Role, SessionId, UserId};
use domain::CartOwner;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// An authenticated user. The role defaults to `CUSTOMER`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Actor);

/// Whoever owns the cart being addressed: the signed-in user if there is
/// one, otherwise the anonymous session.
#[derive(Debug, Clone, Copy)]
pub struct Owner(pub CartOwner);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::BadRequest(format!("{name} header is not valid text")))
        })
        .transpose()
}

fn user_id(parts: &Parts) -> Result<Option<UserId>, ApiError> {
    header(parts, USER_ID_HEADER)?
        .map(|raw| {
            raw.parse::<UserId>()
                .map_err(|e| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER}: {e}")))
        })
        .transpose()
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = user_id(parts)?
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
        let role = match header(parts, ROLE_HEADER)? {
            Some(raw) => raw.parse::<Role>().map_err(ApiError::Unauthorized)?,
            None => Role::Customer,
        };
        Ok(AuthUser(Actor::new(user_id, role)))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user_id) = user_id(parts)? {
            return Ok(Owner(CartOwner::User(user_id)));
        }
        let session_id = header(parts, SESSION_ID_HEADER)?.ok_or_else(|| {
            ApiError::Unauthorized(format!(
                "either {USER_ID_HEADER} or {SESSION_ID_HEADER} is required"
            ))
        })?;
        let session_id = session_id
            .parse::<SessionId>()
            .map_err(|e| ApiError::BadRequest(format!("invalid {SESSION_ID_HEADER}: {e}")))?;
        Ok(Owner(CartOwner::Session(session_id)))
    }
}
