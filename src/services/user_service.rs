use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;

use crate::auth::{hash_password, verify_password};
use crate::db::UserRepository;
use crate::errors::{AppError, Result};
use crate::mailer::{EmailJob, MailQueue};
use crate::models::User;

const CODE_TTL_MINUTES: i64 = 15;
const MIN_PASSWORD_LEN: usize = 8;

fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

fn new_verification_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// Registration, email verification and credential checks.
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserRepository>,
    mail: MailQueue,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>, mail: MailQueue) -> Self {
        Self { users, mail }
    }

    /// Create an unchecked account and queue its verification email.
    pub async fn register(&self, email: &str, password: &str) -> Result<User> {
        let email = normalize_email(email);
        if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            return Err(AppError::BadRequest(format!("'{}' is not a valid email", email)));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::BadRequest(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(format!("Email {} is already registered", email)));
        }

        let now = Utc::now();
        let code = new_verification_code();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            password_hash: hash_password(password)?,
            checked: false,
            verification_code: Some(code.clone()),
            code_expires_at: Some(now + Duration::minutes(CODE_TTL_MINUTES)),
            created_at: now,
            updated_at: now,
        };
        self.users.insert(&user).await?;
        self.send_code(&user.email, &code).await?;

        tracing::info!("User {} registered", user.id);
        Ok(user)
    }

    /// Mark the account as checked when `code` matches the pending one.
    pub async fn verify(&self, email: &str, code: &str) -> Result<()> {
        let mut user = self.find_by_email(email).await?;
        if user.checked {
            return Err(AppError::BadRequest("Email is already verified".into()));
        }

        let expired = user
            .code_expires_at
            .map(|expires| expires < Utc::now())
            .unwrap_or(true);
        if user.verification_code.as_deref() != Some(code.trim()) || expired {
            return Err(AppError::BadRequest(
                "Verification code is invalid or expired".into(),
            ));
        }

        user.checked = true;
        user.verification_code = None;
        user.code_expires_at = None;
        user.updated_at = Utc::now();
        self.users.update(&user).await?;

        tracing::info!("User {} verified", user.id);
        Ok(())
    }

    /// Replace the pending code with a fresh one and email it again.
    pub async fn resend_code(&self, email: &str) -> Result<()> {
        let mut user = self.find_by_email(email).await?;
        if user.checked {
            return Err(AppError::BadRequest("Email is already verified".into()));
        }

        let code = new_verification_code();
        let now = Utc::now();
        user.verification_code = Some(code.clone());
        user.code_expires_at = Some(now + Duration::minutes(CODE_TTL_MINUTES));
        user.updated_at = now;
        self.users.update(&user).await?;
        self.send_code(&user.email, &code).await
    }

    /// Check credentials of a verified account.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let invalid = || AppError::Unauthorized("Invalid email or password".into());
        let user = self
            .users
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or_else(invalid)?;
        if !verify_password(password, &user.password_hash)? {
            return Err(invalid());
        }
        if !user.checked {
            return Err(AppError::Unauthorized("Email is not verified yet".into()));
        }
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<User> {
        let email = normalize_email(email);
        self.users
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No account for {}", email)))
    }

    async fn send_code(&self, email: &str, code: &str) -> Result<()> {
        self.mail
            .enqueue(EmailJob {
                to: email.to_string(),
                subject: "Confirm your email".to_string(),
                body: format!(
                    "Your verification code is {}. It expires in {} minutes.",
                    code, CODE_TTL_MINUTES
                ),
            })
            .await
    }
}
