// JWT token issuance, validation and rotation.
// HS256 and RS256 are both supported; refresh token rotation is single-use
// with same-family revocation on reuse.

use diesel_async::AsyncPgConnection;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use redis::AsyncCommands;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{DieselPool, RedisPool};
use crate::models::auth::{AccessTokenClaims, RefreshTokenClaims};
use crate::models::refresh_token::{DeviceInfo, RefreshToken, RefreshTokenError};
use crate::models::user::{User, UserError};

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("JWT encoding error: {0}")]
    EncodingError(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Database error: {0}")]
    DatabaseError(#[from] RefreshTokenError),

    #[error("User error: {0}")]
    UserError(#[from] UserError),

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Pool error: {0}")]
    PoolError(String),

    #[error("Token reuse detected - possible security breach")]
    TokenReuseDetected,

    #[error("Diesel error: {0}")]
    DieselError(#[from] diesel::result::Error),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::TokenExpired,
            ErrorKind::InvalidToken => JwtError::InvalidToken,
            _ => JwtError::EncodingError(err.to_string()),
        }
    }
}

fn parse_algorithm(s: &str) -> Result<Algorithm, JwtError> {
    match s {
        "HS256" => Ok(Algorithm::HS256),
        "RS256" => Ok(Algorithm::RS256),
        other => Err(JwtError::InvalidKeyFormat(format!(
            "unsupported JWT algorithm: {other}"
        ))),
    }
}

fn encoding_key_for(algorithm: Algorithm, secret: &str) -> Result<EncodingKey, JwtError> {
    match algorithm {
        Algorithm::HS256 => Ok(EncodingKey::from_secret(secret.as_bytes())),
        Algorithm::RS256 => EncodingKey::from_rsa_pem(secret.as_bytes())
            .map_err(|e| JwtError::InvalidKeyFormat(format!("invalid RS256 private key: {e}"))),
        other => Err(JwtError::InvalidKeyFormat(format!(
            "unsupported algorithm: {other:?}"
        ))),
    }
}

fn decoding_key_for(algorithm: Algorithm, secret: &str) -> Result<DecodingKey, JwtError> {
    match algorithm {
        Algorithm::HS256 => Ok(DecodingKey::from_secret(secret.as_bytes())),
        Algorithm::RS256 => DecodingKey::from_rsa_pem(secret.as_bytes())
            .map_err(|e| JwtError::InvalidKeyFormat(format!("invalid RS256 public key: {e}"))),
        other => Err(JwtError::InvalidKeyFormat(format!(
            "unsupported algorithm: {other:?}"
        ))),
    }
}

// JWT configuration with separate keys for access and refresh tokens
#[derive(Clone)]
pub struct JwtConfig {
    pub access_token_expiry: u64,  // seconds, <=900 per policy
    pub refresh_token_expiry: u64, // seconds, <=30 days per policy
    pub algorithm: Algorithm,

    pub audience: String,
    pub issuer: String,

    pub access_encoding_key: EncodingKey,
    pub access_decoding_key: DecodingKey,

    pub refresh_encoding_key: EncodingKey,
    pub refresh_decoding_key: DecodingKey,

    pub key_version: u32,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .field("algorithm", &self.algorithm)
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("access_encoding_key", &"<redacted>")
            .field("access_decoding_key", &"<redacted>")
            .field("refresh_encoding_key", &"<redacted>")
            .field("refresh_decoding_key", &"<redacted>")
            .field("key_version", &self.key_version)
            .finish()
    }
}

impl JwtConfig {
    /// Build JWT config from provided parameters - shared logic for from_env and for_test
    #[allow(clippy::too_many_arguments)]
    fn build_from_params(
        algorithm: Algorithm,
        access_secret: String,
        refresh_secret: String,
        access_expiry: u64,
        refresh_expiry: u64,
        audience: String,
        issuer: String,
        key_version: u32,
    ) -> Result<Self, JwtError> {
        let access_encoding_key = encoding_key_for(algorithm, &access_secret)?;
        let access_decoding_key = decoding_key_for(algorithm, &access_secret)?;

        let refresh_encoding_key = encoding_key_for(algorithm, &refresh_secret)?;
        let refresh_decoding_key = decoding_key_for(algorithm, &refresh_secret)?;

        Ok(JwtConfig {
            access_token_expiry: access_expiry,
            refresh_token_expiry: refresh_expiry,
            algorithm,
            audience,
            issuer,
            access_encoding_key,
            access_decoding_key,
            refresh_encoding_key,
            refresh_decoding_key,
            key_version,
        })
    }

    /// Create JWT config from centralized app configuration
    pub fn from_env() -> Result<Self, JwtError> {
        let crate::app_config::JwtConfig {
            access_secret,
            refresh_secret,
            access_expiry,
            refresh_expiry,
            audience,
            issuer,
            key_version,
            algorithm,
        } = &crate::CONFIG.jwt;

        Self::build_from_params(
            parse_algorithm(algorithm)?,
            access_secret.clone(),
            refresh_secret.clone(),
            *access_expiry,
            *refresh_expiry,
            audience.clone(),
            issuer.clone(),
            *key_version,
        )
    }

    /// Create JWT config for tests without using lazy static
    #[cfg(test)]
    pub fn for_test() -> Self {
        let access_secret = "test-access-secret-hs256".to_string();
        let refresh_secret = "test-refresh-secret-hs256".to_string();

        Self::build_from_params(
            Algorithm::HS256,
            access_secret,
            refresh_secret,
            900,
            2592000,
            "test.authority-core".to_string(),
            "test.authority-core".to_string(),
            1,
        )
        .expect("test config must build")
    }
}

// JWT service with Diesel database integration
pub struct JwtService {
    config: JwtConfig,
    db_pool: Option<DieselPool>,
    redis_pool: Option<RedisPool>,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        Self {
            config,
            db_pool: None,
            redis_pool: None,
        }
    }

    pub fn new_with_diesel(config: JwtConfig, db_pool: DieselPool) -> Self {
        Self {
            config,
            db_pool: Some(db_pool),
            redis_pool: None,
        }
    }

    pub fn new_with_full_integration(
        config: JwtConfig,
        db_pool: DieselPool,
        redis_pool: RedisPool,
    ) -> Self {
        Self {
            config,
            db_pool: Some(db_pool),
            redis_pool: Some(redis_pool),
        }
    }

    pub fn from_env() -> Result<Self, JwtError> {
        let config = JwtConfig::from_env()?;
        Ok(Self::new(config))
    }

    pub fn from_env_with_diesel(
        db_pool: DieselPool,
        redis_pool: RedisPool,
    ) -> Result<Self, JwtError> {
        let config = JwtConfig::from_env()?;
        Ok(Self::new_with_full_integration(config, db_pool, redis_pool))
    }

    #[allow(dead_code)]
    fn require_db_pool(&self) -> Result<&DieselPool, JwtError> {
        self.db_pool
            .as_ref()
            .ok_or_else(|| JwtError::PoolError("Database pool not configured".to_string()))
    }

    #[allow(dead_code)]
    async fn get_db_connection(
        &self,
    ) -> Result<
        bb8::PooledConnection<
            '_,
            diesel_async::pooled_connection::AsyncDieselConnectionManager<AsyncPgConnection>,
        >,
        JwtError,
    > {
        self.require_db_pool()?
            .get()
            .await
            .map_err(|e| JwtError::PoolError(e.to_string()))
    }

    /// Generate access token. `roles` is informational only - every
    /// authorization decision is re-derived by the PDP, never read from
    /// this claim.
    pub fn generate_access_token(
        &self,
        user_id: &str,
        email: &str,
        roles: Vec<String>,
    ) -> Result<String, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| JwtError::KeyGenerationError(e.to_string()))?
            .as_secs();

        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            email: email.to_string(),
            roles,
            aud: self.config.audience.clone(),
            iss: self.config.issuer.clone(),
            iat: now,
            exp: now + self.config.access_token_expiry,
        };

        let mut header = Header::new(self.config.algorithm);
        header.kid = Some(self.config.key_version.to_string());

        encode(&header, &claims, &self.config.access_encoding_key).map_err(Into::into)
    }

    /// Generate refresh token with database storage
    pub async fn generate_refresh_token(&self, user_id: &str) -> Result<String, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| JwtError::KeyGenerationError(e.to_string()))?
            .as_secs();

        let jti = Uuid::new_v4().to_string();
        let token_family = Uuid::new_v4().to_string();

        let claims = RefreshTokenClaims {
            sub: user_id.to_string(),
            jti: jti.clone(),
            iat: now,
            exp: now + self.config.refresh_token_expiry,
            remember_me: false,
        };

        if let Some(pool) = &self.db_pool {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| JwtError::PoolError(e.to_string()))?;

            let expires_at = chrono::Utc::now()
                + chrono::Duration::seconds(self.config.refresh_token_expiry as i64);
            RefreshToken::store(
                &mut conn,
                Uuid::parse_str(user_id).map_err(|_| JwtError::InvalidToken)?,
                &jti,
                expires_at,
                token_family,
                DeviceInfo::default(),
            )
            .await?;
        }

        let mut header = Header::new(self.config.algorithm);
        header.kid = Some(self.config.key_version.to_string());

        encode(&header, &claims, &self.config.refresh_encoding_key).map_err(Into::into)
    }

    /// Validates an access token and returns the decoded claims
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        let mut validation = Validation::new(self.config.algorithm);
        validation.set_audience(&[self.config.audience.clone()]);
        validation.set_issuer(&[self.config.issuer.clone()]);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.leeway = 0;

        let token_data =
            decode::<AccessTokenClaims>(token, &self.config.access_decoding_key, &validation)?;

        Ok(token_data.claims)
    }

    /// Validate refresh token with database check
    pub async fn validate_refresh_token(
        &self,
        token: &str,
    ) -> Result<RefreshTokenClaims, JwtError> {
        let mut validation = Validation::new(self.config.algorithm);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        let token_data =
            decode::<RefreshTokenClaims>(token, &self.config.refresh_decoding_key, &validation)
                .map_err(|e| match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                    jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::InvalidToken,
                    _ => JwtError::EncodingError(e.to_string()),
                })?;

        if let Some(pool) = &self.db_pool {
            let mut conn = pool.get().await.map_err(|e| {
                JwtError::PoolError(format!(
                    "Failed to get database connection for refresh token validation: {}",
                    e
                ))
            })?;

            RefreshToken::validate(&mut conn, &token_data.claims.jti)
                .await
                .map_err(|e| match e {
                    RefreshTokenError::Expired => JwtError::TokenExpired,
                    RefreshTokenError::Revoked => JwtError::TokenRevoked,
                    RefreshTokenError::NotFound => JwtError::InvalidToken,
                    _ => JwtError::DatabaseError(e),
                })?;
        }

        Ok(token_data.claims)
    }

    /// Refresh tokens with rotation - validates, revokes the old token, issues a new pair
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<(String, String), JwtError> {
        let claims = self
            .validate_refresh_token(refresh_token)
            .await
            .map_err(|e| match e {
                JwtError::TokenExpired => JwtError::TokenExpired,
                JwtError::TokenRevoked => JwtError::TokenRevoked,
                _ => JwtError::InvalidToken,
            })?;

        let user = if let Some(pool) = &self.db_pool {
            let mut conn = pool.get().await.map_err(|e| {
                JwtError::PoolError(format!(
                    "Failed to get database connection for user lookup: {}",
                    e
                ))
            })?;

            let user_id = Uuid::parse_str(&claims.sub).map_err(|_| JwtError::InvalidToken)?;
            User::find_by_id(&mut conn, user_id)
                .await
                .map_err(|e| match e {
                    UserError::NotFound => JwtError::InvalidToken,
                    _ => JwtError::UserError(e),
                })?
        } else {
            return Err(JwtError::PoolError(
                "Database pool not configured for token refresh".to_string(),
            ));
        };

        if let Some(pool) = &self.db_pool {
            let mut conn = pool.get().await.map_err(|e| {
                JwtError::PoolError(format!(
                    "Failed to get database connection for token revocation: {}",
                    e
                ))
            })?;

            RefreshToken::revoke(&mut conn, &claims.jti)
                .await
                .map_err(JwtError::DatabaseError)?;
        }

        let access_token = self.generate_access_token(&user.id.to_string(), &user.email, vec![])?;
        let refresh_token = self.generate_refresh_token(&user.id.to_string()).await?;

        Ok((access_token, refresh_token))
    }

    /// Logout token - blacklist in Redis
    pub async fn logout_token(&self, jti: &str, ttl_seconds: u64) -> Result<(), JwtError> {
        if let Some(redis_pool) = &self.redis_pool {
            let mut conn = redis_pool
                .get_connection()
                .await
                .map_err(|e| JwtError::PoolError(e.to_string()))?;

            let key = format!("blacklist:token:{}", jti);
            conn.set_ex::<_, _, ()>(key, "1", ttl_seconds)
                .await
                .map_err(|e| JwtError::PoolError(e.to_string()))?;
        }
        Ok(())
    }

    /// Check if token is blacklisted
    pub async fn is_token_blacklisted(&self, jti: &str) -> Result<bool, JwtError> {
        if let Some(redis_pool) = &self.redis_pool {
            let mut conn = redis_pool
                .get_connection()
                .await
                .map_err(|e| JwtError::PoolError(e.to_string()))?;

            let key = format!("blacklist:token:{}", jti);
            let exists: bool = conn
                .exists(&key)
                .await
                .map_err(|e| JwtError::PoolError(e.to_string()))?;
            Ok(exists)
        } else {
            Ok(false)
        }
    }

    /// Revoke all user tokens
    pub async fn revoke_all_user_tokens(&self, user_id: &str) -> Result<usize, JwtError> {
        if let Some(pool) = &self.db_pool {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| JwtError::PoolError(e.to_string()))?;

            let user_uuid = Uuid::parse_str(user_id).map_err(|_| JwtError::InvalidToken)?;
            Ok(RefreshToken::revoke_all_for_user(&mut conn, user_uuid).await?)
        } else {
            Ok(0)
        }
    }

    /// Revoke every refresh token for `user_id` except the family that
    /// `current_refresh_token` belongs to. Used by password change: the
    /// session making the request stays logged in, every other session is
    /// kicked out. Falls back to revoking everything if the supplied token
    /// doesn't resolve to an active record.
    pub async fn revoke_all_user_tokens_except_current(
        &self,
        user_id: &str,
        current_refresh_token: &str,
    ) -> Result<usize, JwtError> {
        let pool = self
            .db_pool
            .as_ref()
            .ok_or_else(|| JwtError::PoolError("database pool not configured".to_string()))?;
        let mut conn = pool.get().await.map_err(|e| JwtError::PoolError(e.to_string()))?;

        let user_uuid = Uuid::parse_str(user_id).map_err(|_| JwtError::InvalidToken)?;

        let mut validation = Validation::new(self.config.algorithm);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        let claims = decode::<RefreshTokenClaims>(
            current_refresh_token,
            &self.config.refresh_decoding_key,
            &validation,
        )
        .map(|data| data.claims)
        .ok();

        let current_family = match claims {
            Some(claims) => RefreshToken::validate(&mut conn, &claims.jti).await.ok().map(|t| t.token_family),
            None => None,
        };

        match current_family {
            Some(family) => {
                Ok(RefreshToken::revoke_all_for_user_except_family(&mut conn, user_uuid, &family).await?)
            },
            None => Ok(RefreshToken::revoke_all_for_user(&mut conn, user_uuid).await?),
        }
    }

    /// Generate refresh token, recording device/IP for the audit trail
    pub async fn generate_refresh_token_with_device(
        &self,
        user_id: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<String, JwtError> {
        self.generate_refresh_token_with_device_and_remember(
            user_id,
            ip_address,
            user_agent,
            false,
        )
        .await
    }

    /// Generate refresh token with remember_me option
    pub async fn generate_refresh_token_with_device_and_remember(
        &self,
        user_id: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
        remember_me: bool,
    ) -> Result<String, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| JwtError::KeyGenerationError(e.to_string()))?
            .as_secs();

        let jti = Uuid::new_v4().to_string();
        let token_family = Uuid::new_v4().to_string();

        let expiry = if remember_me {
            let config = crate::app_config::config();
            let remember_me_seconds = config.security.remember_me_duration_days as u64 * 86400;
            now + remember_me_seconds
        } else {
            now + self.config.refresh_token_expiry
        };

        let claims = RefreshTokenClaims {
            sub: user_id.to_string(),
            jti: jti.clone(),
            iat: now,
            exp: expiry,
            remember_me,
        };

        if let Some(pool) = &self.db_pool {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| JwtError::PoolError(e.to_string()))?;

            let expires_at = chrono::Utc::now() + chrono::Duration::seconds((expiry - now) as i64);

            RefreshToken::store(
                &mut conn,
                Uuid::parse_str(user_id).map_err(|_| JwtError::InvalidToken)?,
                &jti,
                expires_at,
                token_family,
                DeviceInfo {
                    ip_address,
                    user_agent,
                },
            )
            .await?;
        }

        let mut header = Header::new(self.config.algorithm);
        header.kid = Some(self.config.key_version.to_string());

        encode(&header, &claims, &self.config.refresh_encoding_key).map_err(Into::into)
    }

    /// Rotate refresh token - validates old token, generates new pair, revokes old.
    /// Single-use: any attempt to present an already-rotated token revokes the
    /// entire token family and surfaces `TokenReuseDetected`.
    pub async fn rotate_refresh_token(
        &self,
        old_refresh_token: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<(String, String), JwtError> {
        let old_claims = match self.validate_refresh_token(old_refresh_token).await {
            Ok(claims) => claims,
            Err(JwtError::TokenRevoked) => {
                let _header = decode_header(old_refresh_token)?;
                let key = &self.config.refresh_decoding_key;
                let mut validation = Validation::new(self.config.algorithm);
                validation.validate_exp = false;
                validation.validate_nbf = false;
                validation.set_audience(&[&self.config.audience]);
                validation.set_issuer(&[&self.config.issuer]);

                let token_data = decode::<RefreshTokenClaims>(old_refresh_token, key, &validation)
                    .map_err(|_| JwtError::TokenRevoked)?;

                if let Some(pool) = &self.db_pool {
                    let mut conn = pool
                        .get()
                        .await
                        .map_err(|e| JwtError::PoolError(e.to_string()))?;

                    use crate::schema::refresh_tokens::dsl::*;
                    use diesel::prelude::*;
                    use diesel_async::RunQueryDsl;

                    let jti_hash_val = RefreshToken::hash_jti(&token_data.claims.jti);
                    let token_info = refresh_tokens
                        .filter(jti_hash.eq(&jti_hash_val))
                        .first::<RefreshToken>(&mut conn)
                        .await
                        .optional()
                        .map_err(|e| JwtError::DatabaseError(RefreshTokenError::Database(e)))?;

                    if let Some(token) = token_info {
                        if token.revoked_reason.as_deref() == Some("rotation") {
                            tracing::warn!(
                                token_family = %token.token_family,
                                "reuse of rotated refresh token detected, revoking family"
                            );
                            RefreshToken::revoke_token_family(
                                &mut conn,
                                &token.token_family,
                                "token_reuse_detected",
                            )
                            .await?;
                            return Err(JwtError::TokenReuseDetected);
                        }
                    }
                }
                return Err(JwtError::TokenRevoked);
            },
            Err(e) => return Err(e),
        };

        let pool = self
            .db_pool
            .as_ref()
            .ok_or_else(|| JwtError::PoolError("Database pool not available".to_string()))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| JwtError::PoolError(e.to_string()))?;

        use diesel_async::AsyncConnection;
        let result: Result<(String, String), JwtError> = conn
            .transaction::<_, JwtError, _>(|tx| {
                Box::pin(async move {
                    let validation_result =
                        RefreshToken::validate_and_lock(tx, &old_claims.jti).await;

                    let existing_token = match validation_result {
                        Ok(token) => token,
                        Err(RefreshTokenError::Revoked) => {
                            use crate::schema::refresh_tokens::dsl::*;
                            use diesel::prelude::*;
                            use diesel_async::RunQueryDsl;

                            let jti_hash_val = RefreshToken::hash_jti(&old_claims.jti);
                            let token_info = refresh_tokens
                                .filter(jti_hash.eq(&jti_hash_val))
                                .first::<RefreshToken>(tx)
                                .await
                                .optional()
                                .map_err(|e| {
                                    JwtError::DatabaseError(RefreshTokenError::Database(e))
                                })?;

                            if let Some(token) = token_info {
                                if token.revoked_reason.as_deref() == Some("rotation") {
                                    let _revoked_count = RefreshToken::revoke_token_family(
                                        tx,
                                        &token.token_family,
                                        "token_reuse_detected",
                                    )
                                    .await?;
                                    return Err(JwtError::TokenReuseDetected);
                                }
                            }
                            return Err(JwtError::TokenRevoked);
                        },
                        Err(e) => return Err(e.into()),
                    };

                    // Revoke the old token immediately; this must happen
                    // before any other operation so a concurrent rotation
                    // attempt against the same token fails.
                    RefreshToken::revoke_in_transaction(tx, &old_claims.jti, Some("rotation"))
                        .await?;

                    let user = User::find_by_id(tx, existing_token.user_id).await?;

                    let new_access_token =
                        self.generate_access_token(&existing_token.user_id.to_string(), &user.email, vec![])?;

                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map_err(|e| JwtError::KeyGenerationError(e.to_string()))?
                        .as_secs();

                    let new_jti = Uuid::new_v4().to_string();
                    let new_claims = RefreshTokenClaims {
                        sub: old_claims.sub.clone(),
                        jti: new_jti.clone(),
                        iat: now,
                        exp: now + self.config.refresh_token_expiry,
                        remember_me: false,
                    };

                    let expires_at = chrono::Utc::now()
                        + chrono::Duration::seconds(self.config.refresh_token_expiry as i64);

                    RefreshToken::store_in_transaction(
                        tx,
                        existing_token.user_id,
                        &new_jti,
                        expires_at,
                        existing_token.token_family.clone(),
                        DeviceInfo {
                            ip_address,
                            user_agent: user_agent.clone(),
                        },
                    )
                    .await?;

                    let mut header = Header::new(self.config.algorithm);
                    header.kid = Some(self.config.key_version.to_string());

                    let new_refresh_token =
                        encode(&header, &new_claims, &self.config.refresh_encoding_key)?;

                    Ok((new_access_token, new_refresh_token))
                })
            })
            .await;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_generation() {
        let config = JwtConfig::for_test();
        let service = JwtService::new(config);

        let token = service
            .generate_access_token("test-user-id", "test@example.com", vec!["member".to_string()])
            .unwrap();

        assert!(!token.is_empty());
    }

    #[tokio::test]
    async fn test_token_validation() {
        let config = JwtConfig::for_test();
        let service = JwtService::new(config);

        let token = service
            .generate_access_token("test-user-id", "test@example.com", vec!["member".to_string()])
            .unwrap();

        let claims = service.validate_access_token(&token).unwrap();
        assert_eq!(claims.sub, "test-user-id");
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.roles, vec!["member".to_string()]);
    }

    #[test]
    fn test_parse_algorithm_rejects_unknown() {
        assert!(parse_algorithm("ES256").is_err());
        assert!(matches!(parse_algorithm("HS256"), Ok(Algorithm::HS256)));
        assert!(matches!(parse_algorithm("RS256"), Ok(Algorithm::RS256)));
    }
}
