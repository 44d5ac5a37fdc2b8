use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Json},
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::auth_dto::{LoginPayload, LoginResponse, RefreshResponse, RegisterPayload},
    error::{Error, Result},
    middleware::auth::cookie_value,
    utils::token::{
        auth_cookie, decode_token, expired_cookie, issue_access_token, issue_refresh_token,
        ACCESS_TOKEN_COOKIE, ACCESS_TOKEN_TTL_MINUTES, REFRESH_TOKEN_COOKIE,
        REFRESH_TOKEN_TTL_DAYS,
    },
    AppState,
};

#[utoipa::path(
    post,
    path = "/register/",
    request_body = RegisterPayload,
    responses(
        (status = 201, description = "User created successfully"),
        (status = 400, description = "Invalid payload or duplicate username/email")
    )
)]
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    state
        .user_service
        .register(&payload.username, &payload.email, &payload.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"detail": "User created successfully!"})),
    ))
}

#[utoipa::path(
    post,
    path = "/login/",
    request_body = LoginPayload,
    responses(
        (status = 200, description = "Login successful, tokens set as cookies"),
        (status = 401, description = "Invalid credentials")
    )
)]
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<impl IntoResponse> {
    let (Some(username), Some(password)) = (payload.username, payload.password) else {
        return Err(Error::Unauthorized(
            "Username and password are required.".to_string(),
        ));
    };
    let user = state.user_service.authenticate(&username, &password).await?;

    let access = issue_access_token(&user)?;
    let refresh = issue_refresh_token(&user)?;
    let body = LoginResponse {
        detail: "Login successful.".to_string(),
        user: user.into(),
    };
    Ok((
        StatusCode::OK,
        AppendHeaders([
            (
                header::SET_COOKIE,
                auth_cookie(ACCESS_TOKEN_COOKIE, &access, ACCESS_TOKEN_TTL_MINUTES * 60),
            ),
            (
                header::SET_COOKIE,
                auth_cookie(REFRESH_TOKEN_COOKIE, &refresh, REFRESH_TOKEN_TTL_DAYS * 86_400),
            ),
        ]),
        Json(body),
    ))
}

#[utoipa::path(
    post,
    path = "/token/refresh/",
    responses(
        (status = 200, description = "Fresh access token set as cookie"),
        (status = 401, description = "Missing or invalid refresh token")
    )
)]
#[axum::debug_handler]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let Some(token) = cookie_value(&headers, REFRESH_TOKEN_COOKIE) else {
        return Err(Error::Unauthorized(
            "Refresh token not provided.".to_string(),
        ));
    };
    let claims = decode_token(&token)?;
    if claims.token_type != "refresh" {
        return Err(Error::Unauthorized("Invalid or expired token.".to_string()));
    }
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| Error::Unauthorized("Invalid or expired token.".to_string()))?;
    let Some(user) = state.user_service.find_by_id(user_id).await? else {
        return Err(Error::Unauthorized("User no longer exists.".to_string()));
    };

    let access = issue_access_token(&user)?;
    let body = RefreshResponse {
        detail: "Token refreshed successfully.".to_string(),
        access: access.clone(),
    };
    Ok((
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            auth_cookie(ACCESS_TOKEN_COOKIE, &access, ACCESS_TOKEN_TTL_MINUTES * 60),
        )],
        Json(body),
    ))
}

#[utoipa::path(
    post,
    path = "/logout/",
    responses((status = 200, description = "Token cookies cleared"))
)]
#[axum::debug_handler]
pub async fn logout() -> impl IntoResponse {
    (
        StatusCode::OK,
        AppendHeaders([
            (header::SET_COOKIE, expired_cookie(ACCESS_TOKEN_COOKIE)),
            (header::SET_COOKIE, expired_cookie(REFRESH_TOKEN_COOKIE)),
        ]),
        Json(json!({"detail": "Logged out."})),
    )
}
