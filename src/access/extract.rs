use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use super::Actor;
use crate::error::AppError;

pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(actor) = parts.extensions.get::<Actor>() {
            return Ok(*actor);
        }

        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
        };

        let role = header(ACTOR_ROLE_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing actor role".to_string()))?;
        let id = header(ACTOR_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing actor id".to_string()))?
            .parse::<Uuid>()
            .map_err(|_| AppError::Unauthorized("malformed actor id".to_string()))?;

        let actor = match role {
            "customer" => Actor::Customer(id),
            "driver" => Actor::Driver(id),
            "admin" => Actor::Admin(id),
            other => {
                tracing::warn!(role = other, uri = %parts.uri, "rejected unknown actor role");
                return Err(AppError::Unauthorized(format!("unknown role {other}")));
            }
        };

        parts.extensions.insert(actor);
        Ok(actor)
    }
}
