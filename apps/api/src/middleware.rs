use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use rolegate_core::{AppError, PrincipalIdentity};

use crate::error::ApiResult;

/// Header carrying the authenticated user, set by the upstream proxy.
pub const USER_HEADER: &str = "x-rolegate-user";
/// Header carrying the user's comma-separated group memberships.
pub const GROUPS_HEADER: &str = "x-rolegate-groups";

pub async fn require_identity(mut request: Request, next: Next) -> ApiResult<Response> {
    let identity = identity_from_headers(request.headers())?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

pub fn identity_from_headers(headers: &HeaderMap) -> Result<PrincipalIdentity, AppError> {
    let user = headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_owned()))?;

    let groups: Vec<String> = headers
        .get_all(GROUPS_HEADER)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(str::to_owned)
        .collect();

    Ok(PrincipalIdentity::new(user, groups))
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};
    use rolegate_core::AppError;

    use super::{GROUPS_HEADER, USER_HEADER, identity_from_headers};

    #[test]
    fn missing_user_is_unauthorized() {
        let headers = HeaderMap::new();
        assert!(matches!(
            identity_from_headers(&headers),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn groups_are_collected_from_every_header_value() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_static("U1@Example.com"));
        headers.append(
            GROUPS_HEADER,
            HeaderValue::from_static("g1@example.com, payments@example.com"),
        );
        headers.append(GROUPS_HEADER, HeaderValue::from_static("oncall@example.com,"));

        let Ok(identity) = identity_from_headers(&headers) else {
            panic!("identity should parse");
        };

        assert_eq!(identity.user(), "u1@example.com");
        assert_eq!(identity.groups().len(), 3);
        assert!(identity.matches("payments@example.com"));
    }
}
