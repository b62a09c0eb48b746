use super::clamp_page;
use crate::domain::{Account, AccountStatus, BuildStatus, Plan};
use crate::infrastructure::{AccountRepository, BuildRepository, IdeaRepository, RepositoryError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: i64,
    /// Monthly recurring revenue in USD at list prices.
    pub mrr: i64,
    pub ideas_generated: i64,
    pub builds_completed: i64,
    pub users_by_plan: BTreeMap<String, i64>,
}

impl AdminStats {
    fn from_plan_counts(counts: &[(Plan, i64)], ideas_generated: i64, builds_completed: i64) -> Self {
        let mut users_by_plan: BTreeMap<String, i64> =
            Plan::ALL.iter().map(|p| (p.to_string(), 0)).collect();
        let mut total_users = 0;
        let mut mrr = 0;

        for (plan, count) in counts {
            total_users += count;
            mrr += plan.monthly_price_usd() * count;
            *users_by_plan.entry(plan.to_string()).or_insert(0) += count;
        }

        Self {
            total_users,
            mrr,
            ideas_generated,
            builds_completed,
            users_by_plan,
        }
    }
}

pub struct AdminService<A, I, B>
where
    A: AccountRepository,
    I: IdeaRepository,
    B: BuildRepository,
{
    account_repo: Arc<A>,
    idea_repo: Arc<I>,
    build_repo: Arc<B>,
}

impl<A, I, B> AdminService<A, I, B>
where
    A: AccountRepository,
    I: IdeaRepository,
    B: BuildRepository,
{
    pub fn new(account_repo: Arc<A>, idea_repo: Arc<I>, build_repo: Arc<B>) -> Self {
        Self {
            account_repo,
            idea_repo,
            build_repo,
        }
    }

    async fn require_admin(&self, actor_id: Uuid) -> Result<Account, AdminError> {
        let actor = match self.account_repo.get_by_id(actor_id).await {
            Ok(actor) => actor,
            Err(RepositoryError::NotFound(_)) => {
                return Err(AdminError::PermissionDenied("Unknown actor".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !actor.is_admin() || actor.is_suspended() {
            warn!(actor_id = %actor_id, "Non-admin attempted an admin operation");
            return Err(AdminError::PermissionDenied(
                "Admin role required".to_string(),
            ));
        }
        Ok(actor)
    }

    pub async fn stats(&self, actor_id: Uuid) -> Result<AdminStats, AdminError> {
        self.require_admin(actor_id).await?;

        let counts = self.account_repo.count_by_plan().await?;
        let ideas = self.idea_repo.count().await?;
        let builds = self.build_repo.count_by_status(BuildStatus::Success).await?;

        Ok(AdminStats::from_plan_counts(&counts, ideas, builds))
    }

    pub async fn list_accounts(
        &self,
        actor_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Account>, AdminError> {
        self.require_admin(actor_id).await?;
        let (limit, offset) = clamp_page(limit, offset);
        Ok(self.account_repo.list_paginated(limit, offset).await?)
    }

    pub async fn set_suspended(
        &self,
        actor_id: Uuid,
        account_id: Uuid,
        suspend: bool,
    ) -> Result<Account, AdminError> {
        self.require_admin(actor_id).await?;
        if actor_id == account_id && suspend {
            return Err(AdminError::InvalidArgument(
                "Admins cannot suspend themselves".to_string(),
            ));
        }

        let status = if suspend {
            AccountStatus::Suspended
        } else {
            AccountStatus::Active
        };
        self.account_repo.set_status(account_id, status).await?;
        info!(actor_id = %actor_id, account_id = %account_id, status = %status, "Account status changed");

        Ok(self.account_repo.get_by_id(account_id).await?)
    }
}
