use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::utils::token::{decode_token, ACCESS_TOKEN_COOKIE};

/// Requires a valid access token in the `access_token` cookie. The bearer
/// credential travels in a cookie rather than the Authorization header.
pub async fn require_cookie_auth(mut req: Request, next: Next) -> Response {
    let Some(token) = cookie_value(req.headers(), ACCESS_TOKEN_COOKIE) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Authentication credentials were not provided."})),
        )
            .into_response();
    };

    match decode_token(&token) {
        Ok(claims) if claims.token_type == "access" => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Invalid or expired token."})),
        )
            .into_response(),
    }
}

pub fn cookie_value(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let raw = header.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}
