use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};

/// Header carrying the account name, set by the gateway in front of the API
pub const CALLER_HEADER: &str = "x-kiln-user";

/// Account the request acts for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| Caller(name.to_string()))
            .ok_or((StatusCode::UNAUTHORIZED, "Authentication required"))
    }
}
