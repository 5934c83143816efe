use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::AppState;

/// Claims of a session token minted by the external identity provider. The
/// service only verifies and consumes these; it never issues tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub email: Option<String>,
    pub name: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl AuthUser {
    /// Display name for the roster: the profile name from the identity
    /// provider, else the email local part, else a fixed fallback.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref() {
            let name = name.trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
        if let Some(email) = self.email.as_deref() {
            if let Some(local) = email.split('@').next() {
                if !local.is_empty() {
                    return local.to_string();
                }
            }
        }
        "Player".to_string()
    }
}

pub fn verify_session_token(token: &str, secret: &str) -> AppResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

fn extract_bearer(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(String::from)
}

fn auth_user_from(claims: Claims) -> AppResult<AuthUser> {
    let id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid token subject".into()))?;
    Ok(AuthUser {
        id,
        email: claims.email,
        name: claims.name,
    })
}

/// Middleware: requires a verified identity. Sets AuthUser in extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer(&req)
        .ok_or_else(|| AppError::Unauthorized("No session".into()))?;

    let claims = verify_session_token(&token, &state.config.session.secret)?;
    let user = auth_user_from(claims)?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Middleware: sets AuthUser if a valid token is present, anonymous viewers
/// pass through.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(token) = extract_bearer(&req) {
        if let Ok(claims) = verify_session_token(&token, &state.config.session.secret) {
            if let Ok(user) = auth_user_from(claims) {
                req.extensions_mut().insert(user);
            }
        }
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn claims_for(sub: &str, email: Option<&str>, name: Option<&str>) -> Claims {
        let now = chrono::Utc::now().timestamp();
        Claims {
            sub: sub.to_string(),
            email: email.map(String::from),
            name: name.map(String::from),
            exp: now + 3600,
            iat: now,
        }
    }

    #[test]
    fn verifies_tokens_it_can_decode() {
        let secret = "test-secret";
        let id = Uuid::new_v4();
        let claims = claims_for(&id.to_string(), Some("sam@example.com"), None);
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        let decoded = verify_session_token(&token, secret).unwrap();
        assert_eq!(decoded.sub, id.to_string());

        assert!(verify_session_token(&token, "other-secret").is_err());
    }

    #[test]
    fn rejects_non_uuid_subjects() {
        let claims = claims_for("not-a-uuid", None, None);
        assert!(auth_user_from(claims).is_err());
    }

    #[test]
    fn display_name_falls_back_in_order() {
        let id = Uuid::new_v4();
        let named = AuthUser {
            id,
            email: Some("sam@example.com".into()),
            name: Some("Sam Jones".into()),
        };
        assert_eq!(named.display_name(), "Sam Jones");

        let email_only = AuthUser {
            id,
            email: Some("sam@example.com".into()),
            name: Some("   ".into()),
        };
        assert_eq!(email_only.display_name(), "sam");

        let anonymous = AuthUser {
            id,
            email: None,
            name: None,
        };
        assert_eq!(anonymous.display_name(), "Player");
    }
}
