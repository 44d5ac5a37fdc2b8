use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::get_config;
use crate::error::{Error, Result};
use crate::models::user::User;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 30;
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub token_type: String,
}

pub fn issue_access_token(user: &User) -> Result<String> {
    issue_token(
        user,
        "access",
        Duration::minutes(ACCESS_TOKEN_TTL_MINUTES),
    )
}

pub fn issue_refresh_token(user: &User) -> Result<String> {
    issue_token(user, "refresh", Duration::days(REFRESH_TOKEN_TTL_DAYS))
}

fn issue_token(user: &User, token_type: &str, ttl: Duration) -> Result<String> {
    let claims = Claims {
        sub: user.id.to_string(),
        exp: (Utc::now() + ttl).timestamp() as usize,
        token_type: token_type.to_string(),
    };
    let config = get_config();
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("Token encoding failed: {}", e)))
}

pub fn decode_token(token: &str) -> Result<Claims> {
    let config = get_config();
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| Error::Unauthorized("Invalid or expired token.".to_string()))
}

/// HttpOnly cookie carrying a token, scoped to the whole site.
pub fn auth_cookie(name: &str, value: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        name, value, max_age_secs
    )
}

pub fn expired_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0", name)
}
