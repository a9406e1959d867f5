//! Caller identity extracted from request headers, or query parameters for browser sockets.

use axum::{
    extract::{FromRequestParts, Query},
    http::{HeaderMap, request::Parts},
};
use serde::Deserialize;

use crate::{
    error::AppError,
    state::user::{SYSTEM, User},
};

/// Header carrying the caller id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller display name.
pub const USER_NAME_HEADER: &str = "x-user-name";
/// Header carrying the caller avatar URL.
pub const USER_AVATAR_HEADER: &str = "x-user-avatar";

/// Authenticated caller of a route.
#[derive(Debug, Clone)]
pub struct Caller(pub User);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallerQuery {
    user_id: Option<String>,
    user_name: Option<String>,
    user_avatar: Option<String>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query = Query::<CallerQuery>::try_from_uri(&parts.uri)
            .map(|Query(query)| query)
            .unwrap_or_default();

        let id = header(&parts.headers, USER_ID_HEADER)
            .or(query.user_id)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing user id".into()))?;
        if id == SYSTEM {
            return Err(AppError::Forbidden("reserved user id".into()));
        }
        let name = header(&parts.headers, USER_NAME_HEADER)
            .or(query.user_name)
            .unwrap_or_else(|| id.clone());
        let avatar = header(&parts.headers, USER_AVATAR_HEADER).or(query.user_avatar);

        Ok(Caller(User { id, name, avatar }))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(request: Request<()>) -> Result<Caller, AppError> {
        let (mut parts, _) = request.into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn headers_win_over_query() {
        let request = Request::builder()
            .uri("/rooms?userId=from-query&userName=Query")
            .header(USER_ID_HEADER, "from-header")
            .body(())
            .unwrap();

        let Caller(user) = extract(request).await.unwrap();

        assert_eq!(user.id, "from-header");
        assert_eq!(user.name, "Query");
        assert_eq!(user.avatar, None);
    }

    #[tokio::test]
    async fn sockets_can_identify_through_query() {
        let request = Request::builder()
            .uri("/ws/lobby?userId=u1&userAvatar=https%3A%2F%2Fexample.org%2Fa.png")
            .body(())
            .unwrap();

        let Caller(user) = extract(request).await.unwrap();

        assert_eq!(user.id, "u1");
        assert_eq!(user.name, "u1");
        assert_eq!(user.avatar.as_deref(), Some("https://example.org/a.png"));
    }

    #[tokio::test]
    async fn anonymous_and_reserved_ids_are_rejected() {
        let anonymous = Request::builder().uri("/rooms").body(()).unwrap();
        assert!(matches!(
            extract(anonymous).await,
            Err(AppError::Unauthorized(_))
        ));

        let reserved = Request::builder()
            .uri("/rooms")
            .header(USER_ID_HEADER, SYSTEM)
            .body(())
            .unwrap();
        assert!(matches!(extract(reserved).await, Err(AppError::Forbidden(_))));
    }
}
