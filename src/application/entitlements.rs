use crate::domain::{Account, LimitAction, LimitCheck};
use crate::infrastructure::{AccountRepository, RepositoryError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EntitlementError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Account provisioning and the read-only limit checker.
pub struct EntitlementService<A>
where
    A: AccountRepository,
{
    account_repo: Arc<A>,
}

impl<A> EntitlementService<A>
where
    A: AccountRepository,
{
    pub fn new(account_repo: Arc<A>) -> Self {
        Self { account_repo }
    }

    pub async fn create_account(
        &self,
        external_id: String,
        email: String,
    ) -> Result<Account, EntitlementError> {
        let external_id = external_id.trim().to_string();
        let email = email.trim().to_string();
        if external_id.is_empty() {
            return Err(EntitlementError::InvalidArgument(
                "external_id is required".to_string(),
            ));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(EntitlementError::InvalidArgument(
                "a valid email is required".to_string(),
            ));
        }

        match self.account_repo.get_by_external_id(&external_id).await {
            Ok(existing) => {
                warn!(account_id = %existing.id, "Account already provisioned for external id");
                return Err(RepositoryError::Conflict(format!(
                    "Account for {} already exists",
                    external_id
                ))
                .into());
            }
            Err(RepositoryError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let account = Account::new(external_id, email);
        self.account_repo.create(&account).await?;
        info!(account_id = %account.id, "Created account on free plan");

        Ok(account)
    }

    pub async fn get_account(&self, account_id: Uuid) -> Result<Account, EntitlementError> {
        Ok(self.account_repo.get_by_id(account_id).await?)
    }

    /// Whether `action` is currently allowed. Applies a due monthly reset
    /// first but never consumes quota.
    pub async fn check_limits(
        &self,
        account_id: Uuid,
        action: LimitAction,
        now: DateTime<Utc>,
    ) -> Result<LimitCheck, EntitlementError> {
        let account = self.account_repo.reset_usage_if_stale(account_id, now).await?;
        let check = account.evaluate(action);

        if !check.can_proceed {
            warn!(
                account_id = %account_id,
                action = %action,
                plan = %check.plan,
                "Limit check denied"
            );
        }

        Ok(check)
    }
}
