//! OTP login flow.
//!
//! Token issuance and validation are the auth collaborator's job; the
//! client sequences the two-step exchange (request a code by email, verify
//! it), persists the resulting user record, and puts a deadline on the
//! verification round-trip so an expired code surfaces as
//! [`ClientError::InvalidOrExpiredCode`] instead of hanging.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::info;

use parley_shared::constants::VERIFY_TIMEOUT_SECS;

use crate::error::{ApiError, ClientError, Result};
use crate::session::{CurrentUser, SessionStore};

/// The auth collaborator contract.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Email a short-lived login code to `email`.
    async fn request_login_code(&self, email: &str) -> std::result::Result<(), ApiError>;

    /// Exchange the emailed code for the account record.
    async fn verify_login_code(
        &self,
        email: &str,
        code: &str,
    ) -> std::result::Result<CurrentUser, ApiError>;
}

pub struct Auth<A> {
    api: A,
    session: SessionStore,
}

impl<A: AuthApi> Auth<A> {
    pub fn new(api: A, session: SessionStore) -> Self {
        Self { api, session }
    }

    /// Step one: have a code emailed out.
    pub async fn request_code(&self, email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ClientError::InvalidInput("invalid email address".into()));
        }
        self.api.request_login_code(email).await?;
        Ok(())
    }

    /// Step two: verify the code and persist the session.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<CurrentUser> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ClientError::InvalidInput("empty login code".into()));
        }

        let verified = timeout(
            Duration::from_secs(VERIFY_TIMEOUT_SECS),
            self.api.verify_login_code(email.trim(), code),
        )
        .await;

        match verified {
            Ok(Ok(user)) => {
                self.session.save(&user)?;
                info!(user = %user.id.short(), "signed in");
                Ok(user)
            }
            Ok(Err(e)) => Err(e.into()),
            // Server-enforced expiry means a hung verification is an
            // expired code from the user's point of view.
            Err(_) => Err(ClientError::InvalidOrExpiredCode),
        }
    }

    /// Restore a previous session without network traffic.
    pub fn restore(&self) -> Option<CurrentUser> {
        self.session.restore()
    }

    pub fn logout(&self) {
        self.session.clear();
        info!("signed out");
    }
}
