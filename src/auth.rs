use std::time::{Duration, SystemTime, UNIX_EPOCH};

use argon2::{
    password_hash::{rand_core::OsRng, Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    Json,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};
use crate::models::{
    CredentialsRequest, LoginResponse, MessageResponse, RegisterResponse, ResendCodeRequest, User,
    VerifyRequest,
};
use crate::state::AppState;
use crate::tenant::TenantContext;

/// Hash a password with argon2 and a random salt (PHC string format).
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))
}

/// `Ok(false)` on a wrong password; `Err` only when the stored hash is unusable.
pub fn verify_password(candidate: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AppError::Internal(format!("Invalid stored password hash: {e}")))?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(e) => Err(AppError::Internal(format!("Password verification failed: {e}"))),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    exp: usize,
    iat: usize,
}

/// Issues and validates HS256 bearer tokens.
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
}

impl AuthManager {
    pub fn new(secret: &[u8], token_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            token_ttl,
        }
    }

    pub fn issue_token(&self, user: &User) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| AppError::Internal("System clock is before UNIX_EPOCH".into()))?;
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            iat: now.as_secs() as usize,
            exp: (now + self.token_ttl).as_secs() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))
    }

    /// Resolve a token to the user it was issued for.
    pub fn validate_token(&self, token: &str) -> Result<AuthUser> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;
        Ok(AuthUser {
            user_id: data.claims.sub,
            email: data.claims.email,
        })
    }

    pub fn expires_in(&self) -> Duration {
        self.token_ttl
    }
}

/// The authenticated caller, taken from the `Authorization: Bearer` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Unauthorized access".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Expected a bearer token".into()))?;
        state.auth.validate_token(token.trim())
    }
}

/// Register a new account. The verification code is emailed in the background.
pub async fn register(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(body): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    let users = state.user_service(&tenant).await?;
    let user = users.register(&body.email, &body.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            email: user.email,
            message: "Account created; check your email for the verification code".into(),
        }),
    ))
}

/// Confirm an email address with the emailed code.
pub async fn verify_email(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(body): Json<VerifyRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let users = state.user_service(&tenant).await?;
    users.verify(&body.email, &body.code).await?;
    Ok((StatusCode::OK, Json(MessageResponse::new("Email verified"))))
}

/// Send a fresh verification code.
pub async fn resend_code(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(body): Json<ResendCodeRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let users = state.user_service(&tenant).await?;
    users.resend_code(&body.email).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("A new verification code was sent")),
    ))
}

/// Exchange credentials of a verified account for a bearer token.
pub async fn login(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(body): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<LoginResponse>)> {
    let users = state.user_service(&tenant).await?;
    let user = users.authenticate(&body.email, &body.password).await?;
    let token = state.auth.issue_token(&user)?;
    tracing::info!("User {} logged in", user.id);
    Ok((
        StatusCode::OK,
        Json(LoginResponse {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: state.auth.expires_in().as_secs(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: "user-1".into(),
            email: "ana@example.com".into(),
            password_hash: String::new(),
            checked: true,
            verification_code: None,
            code_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issued_token_identifies_the_user() {
        let auth = AuthManager::new(b"0123456789abcdef0123456789abcdef", Duration::from_secs(60));
        let token = auth.issue_token(&user()).unwrap();
        let caller = auth.validate_token(&token).unwrap();
        assert_eq!(caller.user_id, "user-1");
        assert_eq!(caller.email, "ana@example.com");
    }

    #[test]
    fn token_signed_with_another_secret_is_unauthorized() {
        let issuer = AuthManager::new(b"0123456789abcdef0123456789abcdef", Duration::from_secs(60));
        let other = AuthManager::new(b"fedcba9876543210fedcba9876543210", Duration::from_secs(60));
        let token = issuer.issue_token(&user()).unwrap();
        assert!(matches!(other.validate_token(&token), Err(AppError::Unauthorized(_))));
        assert!(matches!(other.validate_token("garbage"), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn password_hashes_verify_only_the_original() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }
}
