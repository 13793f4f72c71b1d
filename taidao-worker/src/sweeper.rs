/// Periodic cleanup of expired login state
///
/// Sessions expire after a week and emailed codes after ten minutes. Reads
/// already ignore expired rows, so sweeping only keeps the tables small.

use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;
use taidao_shared::auth::{OTP_TTL, SESSION_TTL};
use taidao_shared::models::{
    email_token::{LogInToken, SignUpToken},
    session::Session,
};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const TOKEN_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct Sweeper {
    db: SqlitePool,
}

impl Sweeper {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Deletes sessions older than [`SESSION_TTL`]
    pub async fn sweep_sessions(&self) -> Result<u64, sqlx::Error> {
        Session::delete_expired(&self.db, Utc::now() - SESSION_TTL).await
    }

    /// Deletes sign-up and log-in codes older than [`OTP_TTL`]
    pub async fn sweep_tokens(&self) -> Result<u64, sqlx::Error> {
        let cutoff = Utc::now() - OTP_TTL;
        let sign_up = SignUpToken::delete_expired(&self.db, cutoff).await?;
        let log_in = LogInToken::delete_expired(&self.db, cutoff).await?;
        Ok(sign_up + log_in)
    }

    /// Sweeps on both schedules until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let mut sessions = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        sessions.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tokens = tokio::time::interval(TOKEN_SWEEP_INTERVAL);
        tokens.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sessions.tick() => match self.sweep_sessions().await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(removed = n, "Swept expired sessions"),
                    Err(e) => tracing::error!(error = %e, "Session sweep failed"),
                },
                _ = tokens.tick() => match self.sweep_tokens().await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!(removed = n, "Swept expired email codes"),
                    Err(e) => tracing::error!(error = %e, "Email code sweep failed"),
                },
            }
        }

        tracing::info!("Sweeper stopped");
    }
}
