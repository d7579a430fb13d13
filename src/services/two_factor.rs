// Two-factor authentication: TOTP enrollment, emailed login codes and
// backup codes. Secrets are AES-256-GCM sealed at rest (`utils::crypto`);
// backup codes are stored as SHA-256 hashes, never in the clear.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use totp_rs::{Algorithm, TOTP};
use uuid::Uuid;

use crate::{
    db::{kvs::keys, DieselPool, RedisPool},
    models::{User, UserUpdate},
    schema::users,
    services::email::EmailService,
    utils::{
        auth_errors::AppError,
        crypto::{constant_time_eq, decrypt_secret, encrypt_secret, random_bytes, random_numeric_code},
    },
};

const TOTP_SECRET_BYTES: usize = 20; // 160 bits
const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;
const TOTP_SKEW_STEPS: u8 = 1; // +/- one 30s step, per clock drift tolerance
const BACKUP_CODE_COUNT: usize = 8;
const LOGIN_CODE_TTL_SECONDS: usize = 300; // 5 minutes
const LOGIN_SESSION_TTL_SECONDS: usize = 900; // 15 minutes
const MAX_CONSECUTIVE_FAILURES: u64 = 3;
const LOCKOUT_TTL_SECONDS: usize = 300; // 5 minutes

/// Everything returned to the client when enrollment starts: the otpauth
/// URI for a QR code and the backup codes, shown exactly once.
#[derive(Debug)]
pub struct TwoFactorSetup {
    pub otpauth_uri: String,
    pub backup_codes: Vec<String>,
}

/// A login in progress pending a second factor.
#[derive(Debug)]
pub struct PendingTwoFactor {
    pub pending_token: String,
    pub expires_in_seconds: usize,
}

#[derive(Clone)]
pub struct TwoFactorService {
    pool: DieselPool,
    redis: RedisPool,
    email: Arc<EmailService>,
    encryption_key: Vec<u8>,
    issuer: String,
}

impl TwoFactorService {
    pub fn new(
        pool: DieselPool,
        redis: RedisPool,
        email: Arc<EmailService>,
        encryption_key: Vec<u8>,
        issuer: String,
    ) -> Self {
        Self {
            pool,
            redis,
            email,
            encryption_key,
            issuer,
        }
    }

    fn totp_for(&self, secret_bytes: Vec<u8>, account_email: &str) -> Result<TOTP, AppError> {
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW_STEPS,
            TOTP_STEP_SECONDS,
            secret_bytes,
            Some(self.issuer.clone()),
            account_email.to_string(),
        )
        .map_err(|e| AppError::Internal(format!("failed to build TOTP: {}", e)))
    }

    fn hash_backup_code(code: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(code.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn generate_backup_codes() -> (Vec<String>, Vec<String>) {
        let mut plaintext = Vec::with_capacity(BACKUP_CODE_COUNT);
        let mut hashed = Vec::with_capacity(BACKUP_CODE_COUNT);
        for _ in 0..BACKUP_CODE_COUNT {
            let mut buf = [0u8; 5];
            rand::rngs::OsRng.fill_bytes(&mut buf);
            let code: String = buf.iter().map(|b| format!("{:02x}", b)).collect();
            hashed.push(Self::hash_backup_code(&code));
            plaintext.push(code);
        }
        (plaintext, hashed)
    }

    /// Begin TOTP enrollment. Stores the encrypted secret and hashed backup
    /// codes, but `two_factor_enabled` stays false until `confirm_setup`
    /// verifies the user actually has the secret loaded in an authenticator.
    pub async fn enable(&self, user_id: Uuid) -> Result<TwoFactorSetup, AppError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::Internal(format!("database connection failed: {}", e)))?;

        let user = User::find_by_id(&mut conn, user_id)
            .await
            .map_err(|_| AppError::NotFound("user"))?;

        let secret_bytes = random_bytes(TOTP_SECRET_BYTES);
        let totp = self.totp_for(secret_bytes.clone(), &user.email)?;
        let otpauth_uri = totp.get_url();

        let sealed_secret = encrypt_secret(&self.encryption_key, &secret_bytes)
            .map_err(|e| AppError::Internal(format!("failed to seal TOTP secret: {}", e)))?;

        let (plaintext_codes, hashed_codes) = Self::generate_backup_codes();

        let update = UserUpdate {
            two_factor_secret_encrypted: Some(Some(sealed_secret)),
            two_factor_backup_codes: Some(Some(hashed_codes)),
            ..Default::default()
        };

        diesel::update(users::table.find(user_id))
            .set(&update)
            .execute(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("failed to store 2FA secret: {}", e)))?;

        Ok(TwoFactorSetup {
            otpauth_uri,
            backup_codes: plaintext_codes,
        })
    }

    /// Confirms enrollment by verifying one TOTP code, then flips
    /// `two_factor_enabled` on.
    pub async fn confirm_setup(&self, user_id: Uuid, code: &str) -> Result<(), AppError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::Internal(format!("database connection failed: {}", e)))?;

        let user = User::find_by_id(&mut conn, user_id)
            .await
            .map_err(|_| AppError::NotFound("user"))?;

        let sealed = user
            .two_factor_secret_encrypted
            .as_ref()
            .ok_or(AppError::TwoFactorInvalid)?;
        let secret_bytes = decrypt_secret(&self.encryption_key, sealed)
            .map_err(|_| AppError::Internal("failed to open TOTP secret".to_string()))?;

        let totp = self.totp_for(secret_bytes, &user.email)?;
        let valid = totp
            .check_current(code)
            .map_err(|e| AppError::Internal(format!("TOTP check failed: {}", e)))?;
        if !valid {
            return Err(AppError::TwoFactorInvalid);
        }

        let update = UserUpdate {
            two_factor_enabled: Some(true),
            ..Default::default()
        };
        diesel::update(users::table.find(user_id))
            .set(&update)
            .execute(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("failed to enable 2FA: {}", e)))?;

        Ok(())
    }

    /// Disables 2FA. Requires the caller to have already re-verified the
    /// account password; this only checks the second factor itself.
    pub async fn disable(&self, user_id: Uuid, code: &str) -> Result<(), AppError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::Internal(format!("database connection failed: {}", e)))?;

        let user = User::find_by_id(&mut conn, user_id)
            .await
            .map_err(|_| AppError::NotFound("user"))?;

        if !user.two_factor_enabled {
            return Err(AppError::TwoFactorInvalid);
        }

        self.verify_totp_or_backup(&mut conn, &user, code).await?;

        let update = UserUpdate {
            two_factor_enabled: Some(false),
            two_factor_secret_encrypted: Some(None),
            two_factor_backup_codes: Some(None),
            ..Default::default()
        };
        diesel::update(users::table.find(user_id))
            .set(&update)
            .execute(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("failed to disable 2FA: {}", e)))?;

        Ok(())
    }

    /// Starts the post-password login challenge: mints a pending-session
    /// token, generates and emails a 6-digit code.
    pub async fn start_login_challenge(&self, user: &User) -> Result<PendingTwoFactor, AppError> {
        let pending_token = crate::utils::crypto::random_token(32);
        self.redis
            .set_with_expiry(
                &keys::two_factor_session(&pending_token),
                user.id.to_string(),
                LOGIN_SESSION_TTL_SECONDS,
            )
            .await
            .map_err(|e| AppError::Internal(format!("failed to store 2FA session: {}", e)))?;

        let code = random_numeric_code(6);
        self.redis
            .set_with_expiry(
                &keys::two_factor_code(&user.id.to_string(), "login"),
                code.clone(),
                LOGIN_CODE_TTL_SECONDS,
            )
            .await
            .map_err(|e| AppError::Internal(format!("failed to store 2FA code: {}", e)))?;

        self.email
            .send_verification_code(&user.email, &user.username, &code)
            .await
            .map_err(|e| AppError::Internal(format!("failed to send 2FA code: {}", e)))?;

        Ok(PendingTwoFactor {
            pending_token,
            expires_in_seconds: LOGIN_SESSION_TTL_SECONDS,
        })
    }

    /// Verifies a login challenge response. Accepts the emailed code, a
    /// valid current TOTP, or an unused backup code. Three consecutive
    /// failures lock the challenge for five minutes.
    pub async fn verify_login_challenge(
        &self,
        pending_token: &str,
        code: &str,
    ) -> Result<Uuid, AppError> {
        let user_id_str = self
            .redis
            .get_string(&keys::two_factor_session(pending_token))
            .await
            .map_err(|e| AppError::Internal(format!("failed to read 2FA session: {}", e)))?
            .ok_or(AppError::InvalidToken)?;
        let user_id = Uuid::parse_str(&user_id_str)
            .map_err(|_| AppError::Internal("corrupt 2FA session value".to_string()))?;

        let attempts_key = keys::attempts(&user_id.to_string(), "2fa_login");
        if self
            .redis
            .get_string(&attempts_key)
            .await
            .map_err(|e| AppError::Internal(format!("failed to read 2FA lockout: {}", e)))?
            .is_some_and(|v| v.parse::<u64>().unwrap_or(0) >= MAX_CONSECUTIVE_FAILURES)
        {
            return Err(AppError::TwoFactorLocked);
        }

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AppError::Internal(format!("database connection failed: {}", e)))?;
        let user = User::find_by_id(&mut conn, user_id)
            .await
            .map_err(|_| AppError::NotFound("user"))?;

        let emailed_code = self
            .redis
            .get_string(&keys::two_factor_code(&user_id.to_string(), "login"))
            .await
            .map_err(|e| AppError::Internal(format!("failed to read 2FA code: {}", e)))?;

        let matched_email_code = emailed_code
            .as_deref()
            .is_some_and(|expected| constant_time_eq(expected, code));

        let matched_second_factor = if matched_email_code {
            true
        } else {
            self.verify_totp_or_backup(&mut conn, &user, code)
                .await
                .is_ok()
        };

        if !matched_second_factor {
            let attempts = self
                .redis
                .incr(&attempts_key, LOCKOUT_TTL_SECONDS)
                .await
                .map_err(|e| AppError::Internal(format!("failed to record 2FA attempt: {}", e)))?;
            if attempts >= MAX_CONSECUTIVE_FAILURES {
                return Err(AppError::TwoFactorLocked);
            }
            return Err(AppError::TwoFactorInvalid);
        }

        self.redis
            .del(&keys::two_factor_code(&user_id.to_string(), "login"))
            .await
            .ok();
        self.redis
            .del(&keys::two_factor_session(pending_token))
            .await
            .ok();
        self.redis.del(&attempts_key).await.ok();

        Ok(user_id)
    }

    /// Checks `code` against the user's current TOTP window, falling back
    /// to backup codes. A matched backup code is consumed (removed from
    /// the stored set) so it can't be reused.
    async fn verify_totp_or_backup(
        &self,
        conn: &mut diesel_async::AsyncPgConnection,
        user: &User,
        code: &str,
    ) -> Result<(), AppError> {
        if let Some(sealed) = &user.two_factor_secret_encrypted {
            let secret_bytes = decrypt_secret(&self.encryption_key, sealed)
                .map_err(|_| AppError::Internal("failed to open TOTP secret".to_string()))?;
            let totp = self.totp_for(secret_bytes, &user.email)?;
            if totp
                .check_current(code)
                .map_err(|e| AppError::Internal(format!("TOTP check failed: {}", e)))?
            {
                return Ok(());
            }
        }

        let hashed = Self::hash_backup_code(code);
        if let Some(codes) = &user.two_factor_backup_codes {
            if let Some(pos) = codes.iter().position(|c| constant_time_eq(c, &hashed)) {
                let mut remaining = codes.clone();
                remaining.remove(pos);
                let update = UserUpdate {
                    two_factor_backup_codes: Some(Some(remaining)),
                    ..Default::default()
                };
                diesel::update(users::table.find(user.id))
                    .set(&update)
                    .execute(conn)
                    .await
                    .map_err(|e| AppError::Internal(format!("failed to consume backup code: {}", e)))?;
                return Ok(());
            }
        }

        Err(AppError::TwoFactorInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_codes_are_unique_and_hashed() {
        let (plaintext, hashed) = TwoFactorService::generate_backup_codes();
        assert_eq!(plaintext.len(), BACKUP_CODE_COUNT);
        assert_eq!(hashed.len(), BACKUP_CODE_COUNT);
        for (code, hash) in plaintext.iter().zip(hashed.iter()) {
            assert_eq!(TwoFactorService::hash_backup_code(code), *hash);
        }
        let unique: std::collections::HashSet<_> = plaintext.iter().collect();
        assert_eq!(unique.len(), BACKUP_CODE_COUNT);
    }

    #[test]
    fn hash_backup_code_is_deterministic() {
        let a = TwoFactorService::hash_backup_code("abcde");
        let b = TwoFactorService::hash_backup_code("abcde");
        assert_eq!(a, b);
        assert_ne!(a, TwoFactorService::hash_backup_code("fghij"));
    }
}
