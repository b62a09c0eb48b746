use crate::domain::{
    Account, AccountStatus, Build, BuildStatus, Idea, Plan, PlanChange, QuotaCounter,
    QuotaOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    #[must_use]
    async fn create(&self, account: &Account) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError>;
    #[must_use]
    async fn get_by_external_id(&self, external_id: &str) -> Result<Account, RepositoryError>;
    /// Exactly one account must carry the customer id: `NotFound` for none,
    /// `Conflict` when several match.
    #[must_use]
    async fn get_by_customer_id(&self, customer_id: &str) -> Result<Account, RepositoryError>;
    /// Zeroes the monthly counters in one conditional update when
    /// `last_reset_at` is in a different UTC month than `now`, then returns
    /// the current record. Concurrent callers reset at most once.
    #[must_use]
    async fn reset_usage_if_stale(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Account, RepositoryError>;
    /// Reset-if-stale followed by a conditional increment of `counter`
    /// guarded by the matching limit, in one transaction.
    #[must_use]
    async fn consume_quota(
        &self,
        id: Uuid,
        counter: QuotaCounter,
        now: DateTime<Utc>,
    ) -> Result<QuotaOutcome, RepositoryError>;
    /// Writes plan, limits and subscription linkage together. Returns
    /// `false` without writing when [`PlanChange::supersedes`] does not hold:
    /// a newer billing event was already applied, or the change targets a
    /// subscription that already ended.
    #[must_use]
    async fn apply_plan_change(
        &self,
        id: Uuid,
        change: &PlanChange,
        event_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
    #[must_use]
    async fn set_status(&self, id: Uuid, status: AccountStatus) -> Result<(), RepositoryError>;
    #[must_use]
    async fn list_paginated(&self, limit: i64, offset: i64) -> Result<Vec<Account>, RepositoryError>;
    #[must_use]
    async fn count_by_plan(&self) -> Result<Vec<(Plan, i64)>, RepositoryError>;
}

#[async_trait]
pub trait IdeaRepository: Send + Sync {
    #[must_use]
    async fn create(&self, idea: &Idea) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Idea, RepositoryError>;
    #[must_use]
    async fn list_by_account_paginated(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Idea>, RepositoryError>;
    #[must_use]
    async fn count(&self) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait BuildRepository: Send + Sync {
    /// Inserts the queued build and advances its idea from pending to
    /// building in a single transaction.
    #[must_use]
    async fn create_for_idea(&self, build: &Build) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Build, RepositoryError>;
    #[must_use]
    async fn list_by_account_paginated(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Build>, RepositoryError>;
    /// Stores `build` only if the stored status still equals `expected`.
    /// Returns whether the write happened.
    #[must_use]
    async fn compare_and_set(
        &self,
        build: &Build,
        expected: BuildStatus,
    ) -> Result<bool, RepositoryError>;
    /// Stores a build that just reached success together with its side
    /// effects in one transaction: the owner's `active_projects` bump and
    /// latest project URL, and the idea's forward move to staging. Returns
    /// `false` without writing anything when the status CAS loses.
    #[must_use]
    async fn complete_success(
        &self,
        build: &Build,
        expected: BuildStatus,
    ) -> Result<bool, RepositoryError>;
    #[must_use]
    async fn count_by_status(&self, status: BuildStatus) -> Result<i64, RepositoryError>;
}

/// Webhook event ids that were already applied.
#[async_trait]
pub trait BillingEventRepository: Send + Sync {
    /// Records the event id unless it is already present. Returns `false`
    /// when another delivery claimed it first.
    #[must_use]
    async fn claim(&self, event_id: &str, event_type: &str) -> Result<bool, RepositoryError>;
    /// Drops a claim so a failed delivery can be retried.
    #[must_use]
    async fn release(&self, event_id: &str) -> Result<(), RepositoryError>;
}
