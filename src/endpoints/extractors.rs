use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

pub const ORG_HEADER: &str = "x-org-id";

/// Organization the request acts for, taken from the `X-Org-Id` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgId(pub String);

impl<S> FromRequestParts<S> for OrgId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ORG_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| OrgId(v.to_string()))
            .ok_or_else(|| AppError::BadRequest("Missing X-Org-Id header".to_string()))
    }
}
