// Periodic maintenance jobs: expired refresh tokens, stale unverified
// accounts, and an audit-chain integrity sweep. Two-factor login codes and
// lockout markers expire on their own via Redis TTL and need no janitor.

use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::models::audit::AuditLogRow;
use crate::schema::{refresh_tokens, users};
use crate::services::audit;

const REFRESH_TOKEN_CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(86400);
const UNVERIFIED_USER_CLEANUP_INTERVAL: std::time::Duration =
    std::time::Duration::from_secs(86400);
const AUDIT_VERIFY_SAMPLE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

const REFRESH_TOKEN_EXPIRY_GRACE: Duration = Duration::days(7);
const UNVERIFIED_USER_MAX_AGE_DAYS: i64 = 7;
const AUDIT_VERIFY_SAMPLE_SIZE: i64 = 5000;

pub struct BackgroundTaskManager {
    state: AppState,
}

impl BackgroundTaskManager {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn start_all_tasks(&self) {
        info!("Starting background janitors");

        self.spawn_refresh_token_cleanup();
        self.spawn_unverified_user_cleanup();
        self.spawn_audit_verify_sample();
    }

    fn spawn_refresh_token_cleanup(&self) {
        let pool = self.state.diesel_pool.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REFRESH_TOKEN_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                match pool.get().await {
                    Ok(mut conn) => {
                        let cutoff = Utc::now() - REFRESH_TOKEN_EXPIRY_GRACE;
                        match diesel::delete(
                            refresh_tokens::table.filter(refresh_tokens::expires_at.lt(cutoff)),
                        )
                        .execute(&mut conn)
                        .await
                        {
                            Ok(deleted) if deleted > 0 => {
                                info!("janitor: deleted {} expired refresh tokens", deleted)
                            },
                            Ok(_) => {},
                            Err(e) => error!("janitor: refresh token cleanup failed: {}", e),
                        }
                    },
                    Err(e) => warn!("janitor: could not get DB connection: {}", e),
                }
            }
        });
    }

    fn spawn_unverified_user_cleanup(&self) {
        let pool = self.state.diesel_pool.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(UNVERIFIED_USER_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                match pool.get().await {
                    Ok(mut conn) => {
                        let cutoff = Utc::now() - Duration::days(UNVERIFIED_USER_MAX_AGE_DAYS);
                        match diesel::delete(
                            users::table
                                .filter(users::email_verified.eq(false))
                                .filter(users::created_at.lt(cutoff)),
                        )
                        .execute(&mut conn)
                        .await
                        {
                            Ok(deleted) if deleted > 0 => {
                                info!("janitor: deleted {} stale unverified accounts", deleted)
                            },
                            Ok(_) => {},
                            Err(e) => error!("janitor: unverified account cleanup failed: {}", e),
                        }
                    },
                    Err(e) => warn!("janitor: could not get DB connection: {}", e),
                }
            }
        });
    }

    /// Samples the most recent slice of the audit chain and verifies it.
    /// Catches silent tampering between full, operator-triggered verifies.
    fn spawn_audit_verify_sample(&self) {
        let pool = self.state.diesel_pool.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(AUDIT_VERIFY_SAMPLE_INTERVAL);
            loop {
                interval.tick().await;
                match pool.get().await {
                    Ok(mut conn) => match AuditLogRow::latest(&mut conn).await {
                        Ok(Some(latest)) => {
                            let from_seq = (latest.seq - AUDIT_VERIFY_SAMPLE_SIZE + 1).max(1);
                            match audit::verify(&mut conn, from_seq, latest.seq).await {
                                Ok(report) if report.valid => {
                                    info!(
                                        "janitor: audit chain sample ({}..{}) verified clean",
                                        from_seq, latest.seq
                                    )
                                },
                                Ok(report) => error!(
                                    "janitor: audit chain broken at seq {:?}",
                                    report.first_broken_seq
                                ),
                                Err(e) => error!("janitor: audit verify sample failed: {}", e),
                            }
                        },
                        Ok(None) => {},
                        Err(e) => warn!("janitor: could not read audit tail: {}", e),
                    },
                    Err(e) => warn!("janitor: could not get DB connection: {}", e),
                }
            }
        });
    }
}

/// Initialize background tasks (call this in main.rs)
pub async fn initialize_background_tasks(state: AppState) {
    let task_manager = BackgroundTaskManager::new(state);
    task_manager.start_all_tasks().await;
}
