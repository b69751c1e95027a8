//! Connection-code exchange.
//!
//! Codes are issued and validated by the backend; the client never writes
//! code rows itself.  Two guards live here regardless: redemption runs
//! under a deadline (an expired code must fail, not hang), and redeeming
//! one's own code is rejected even if the backend were to allow it.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::info;

use parley_shared::constants::VERIFY_TIMEOUT_SECS;
use parley_shared::models::{CodePolicy, ConnectionCode};
use parley_shared::types::UserId;

use crate::error::{ApiError, ClientError, Result};

/// The connection-code endpoints of the serverless API.
#[async_trait]
pub trait CodeApi: Send + Sync {
    /// Issue a fresh code owned by `owner` under the given policy.
    async fn generate_code(
        &self,
        owner: UserId,
        policy: CodePolicy,
    ) -> std::result::Result<ConnectionCode, ApiError>;

    /// Validate and consume a code.  Returns the code owner's id.
    ///
    /// The backend enforces expiry, the use limit, and the no-self-connect
    /// rule; any violation comes back as [`ApiError::InvalidCode`].
    async fn redeem_code(
        &self,
        code: &str,
        redeemer: UserId,
    ) -> std::result::Result<UserId, ApiError>;
}

pub struct Connector<C> {
    api: C,
    user: UserId,
}

impl<C: CodeApi> Connector<C> {
    pub fn new(api: C, user: UserId) -> Self {
        Self { api, user }
    }

    /// Issue a code for others to redeem.  Single-use, 15-minute expiry.
    pub async fn generate(&self) -> Result<ConnectionCode> {
        let code = self
            .api
            .generate_code(self.user, CodePolicy::default())
            .await?;
        info!(expires = %code.expires_at, "connection code issued");
        Ok(code)
    }

    /// Redeem a code someone shared.  Returns the other user's id, ready to
    /// hand to thread creation.
    pub async fn redeem(&self, code: &str) -> Result<UserId> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ClientError::InvalidInput("empty connection code".into()));
        }

        let redeemed = timeout(
            Duration::from_secs(VERIFY_TIMEOUT_SECS),
            self.api.redeem_code(code, self.user),
        )
        .await;

        let owner = match redeemed {
            Ok(Ok(owner)) => owner,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ClientError::InvalidOrExpiredCode),
        };

        if owner == self.user {
            return Err(ClientError::InvalidInput(
                "cannot connect to yourself".into(),
            ));
        }

        info!(owner = %owner.short(), "connection code redeemed");
        Ok(owner)
    }
}
