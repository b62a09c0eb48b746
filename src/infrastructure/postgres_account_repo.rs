use super::repository::{AccountRepository, RepositoryError};
use crate::domain::{
    Account, AccountStatus, Limits, Plan, PlanChange, QuotaCounter, QuotaOutcome,
    SubscriptionLink, SubscriptionStatus, Usage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = r#"
    id, external_id, email, plan,
    ideas_generated, builds_started, active_projects, storage_used, bandwidth_used,
    ideas_per_month, builds_per_month, max_active_projects, storage_limit, bandwidth_limit, seats,
    last_reset_at, stripe_customer_id, subscription_id, ended_subscription_id,
    subscription_status, billing_event_at, role, status, latest_project_url, created_at, updated_at
"#;

/// Monthly reset guarded by the month comparison, so a second concurrent
/// caller matches zero rows.
const RESET_IF_STALE: &str = r#"
    UPDATE accounts
    SET ideas_generated = 0, builds_started = 0, last_reset_at = $2, updated_at = $2
    WHERE id = $1
      AND date_trunc('month', last_reset_at AT TIME ZONE 'UTC')
          <> date_trunc('month', $2::timestamptz AT TIME ZONE 'UTC')
"#;

pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_id<'e, E>(executor: E, id: Uuid) -> Result<Account, RepositoryError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))?;
        row_to_account(&row)
    }
}

fn quota_columns(counter: QuotaCounter) -> (&'static str, &'static str) {
    match counter {
        QuotaCounter::IdeasGenerated => ("ideas_generated", "ideas_per_month"),
        QuotaCounter::BuildsStarted => ("builds_started", "builds_per_month"),
    }
}

fn subscription_link_parts(link: &SubscriptionLink) -> (&'static str, Option<&str>) {
    match link {
        SubscriptionLink::Keep => ("keep", None),
        SubscriptionLink::Set(id) => ("set", Some(id.as_str())),
        SubscriptionLink::End(id) => ("end", Some(id.as_str())),
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, external_id, email, plan,
                ideas_generated, builds_started, active_projects, storage_used, bandwidth_used,
                ideas_per_month, builds_per_month, max_active_projects, storage_limit,
                bandwidth_limit, seats, last_reset_at, stripe_customer_id, subscription_id,
                ended_subscription_id, subscription_status, billing_event_at, role, status,
                latest_project_url, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, $25, $26)
            "#,
        )
        .bind(account.id)
        .bind(&account.external_id)
        .bind(&account.email)
        .bind(account.plan.to_string())
        .bind(account.usage.ideas_generated)
        .bind(account.usage.builds_started)
        .bind(account.usage.active_projects)
        .bind(account.usage.storage_used)
        .bind(account.usage.bandwidth_used)
        .bind(account.limits.ideas_per_month)
        .bind(account.limits.builds_per_month)
        .bind(account.limits.max_active_projects)
        .bind(account.limits.storage_limit)
        .bind(account.limits.bandwidth_limit)
        .bind(account.limits.seats)
        .bind(account.last_reset_at)
        .bind(&account.stripe_customer_id)
        .bind(&account.subscription_id)
        .bind(&account.ended_subscription_id)
        .bind(account.subscription_status.map(|s| s.to_string()))
        .bind(account.billing_event_at)
        .bind(account.role.to_string())
        .bind(account.status.to_string())
        .bind(&account.latest_project_url)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => RepositoryError::Conflict(
                format!("Account for {} already exists", account.external_id),
            ),
            _ => RepositoryError::DatabaseError(e),
        })?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError> {
        Self::fetch_by_id(&self.pool, id).await
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Account, RepositoryError> {
        let sql = format!("SELECT {} FROM accounts WHERE external_id = $1", ACCOUNT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", external_id)))?;

        row_to_account(&row)
    }

    async fn get_by_customer_id(&self, customer_id: &str) -> Result<Account, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE stripe_customer_id = $1 LIMIT 2",
            ACCOUNT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;

        match rows.as_slice() {
            [] => Err(RepositoryError::NotFound(format!(
                "Account for customer {}",
                customer_id
            ))),
            [row] => row_to_account(row),
            _ => Err(RepositoryError::Conflict(format!(
                "Multiple accounts for customer {}",
                customer_id
            ))),
        }
    }

    async fn reset_usage_if_stale(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Account, RepositoryError> {
        sqlx::query(RESET_IF_STALE)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Self::fetch_by_id(&self.pool, id).await
    }

    async fn consume_quota(
        &self,
        id: Uuid,
        counter: QuotaCounter,
        now: DateTime<Utc>,
    ) -> Result<QuotaOutcome, RepositoryError> {
        let (used, limit) = quota_columns(counter);
        let mut tx = self.pool.begin().await?;

        sqlx::query(RESET_IF_STALE)
            .bind(id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            r#"
            UPDATE accounts
            SET {used} = {used} + 1, updated_at = $2
            WHERE id = $1
              AND status = 'active'
              AND ({limit} = -1 OR {used} < {limit})
            RETURNING {cols}
            "#,
            used = used,
            limit = limit,
            cols = ACCOUNT_COLUMNS
        );
        let consumed = sqlx::query(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = match consumed {
            Some(row) => QuotaOutcome::Consumed(row_to_account(&row)?),
            None => QuotaOutcome::Exhausted(Self::fetch_by_id(&mut *tx, id).await?),
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn apply_plan_change(
        &self,
        id: Uuid,
        change: &PlanChange,
        event_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let limits = change.plan.limits();
        let (link_mode, link_value) = subscription_link_parts(&change.subscription);

        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET plan = $2,
                ideas_per_month = $3,
                builds_per_month = $4,
                max_active_projects = $5,
                storage_limit = $6,
                bandwidth_limit = $7,
                seats = $8,
                subscription_status = $9,
                stripe_customer_id = COALESCE($10::text, stripe_customer_id),
                subscription_id = CASE $11::text
                    WHEN 'set' THEN $12::text
                    WHEN 'end' THEN NULL
                    ELSE subscription_id
                END,
                ended_subscription_id = CASE $11::text
                    WHEN 'end' THEN $12::text
                    ELSE ended_subscription_id
                END,
                billing_event_at = $13,
                updated_at = $14
            WHERE id = $1
              AND (billing_event_at IS NULL OR billing_event_at <= $13)
              AND NOT ($11::text = 'set' AND ended_subscription_id IS NOT DISTINCT FROM $12::text)
            "#,
        )
        .bind(id)
        .bind(change.plan.to_string())
        .bind(limits.ideas_per_month)
        .bind(limits.builds_per_month)
        .bind(limits.max_active_projects)
        .bind(limits.storage_limit)
        .bind(limits.bandwidth_limit)
        .bind(limits.seats)
        .bind(change.status.to_string())
        .bind(change.customer_id.as_deref())
        .bind(link_mode)
        .bind(link_value)
        .bind(event_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Zero rows: the account is gone, a newer event won, or the subscription ended.
        let exists = sqlx::query("SELECT 1 FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound(format!("Account {}", id))),
        }
    }

    async fn set_status(&self, id: Uuid, status: AccountStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET status = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Account {}", id)));
        }
        Ok(())
    }

    async fn list_paginated(&self, limit: i64, offset: i64) -> Result<Vec<Account>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM accounts ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            ACCOUNT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_account).collect()
    }

    async fn count_by_plan(&self) -> Result<Vec<(Plan, i64)>, RepositoryError> {
        let rows = sqlx::query("SELECT plan, COUNT(*) AS total FROM accounts GROUP BY plan")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let plan_str: String = row.try_get("plan")?;
                let plan = Plan::from_str(&plan_str).map_err(|_| {
                    RepositoryError::InvalidData(format!("Unknown plan: {}", plan_str))
                })?;
                Ok((plan, row.try_get("total")?))
            })
            .collect()
    }
}

fn parse_column<T: FromStr>(row: &sqlx::postgres::PgRow, column: &str) -> Result<T, RepositoryError> {
    let raw: String = row.try_get(column)?;
    T::from_str(&raw)
        .map_err(|_| RepositoryError::InvalidData(format!("Unknown {}: {}", column, raw)))
}

fn row_to_account(row: &sqlx::postgres::PgRow) -> Result<Account, RepositoryError> {
    let subscription_status = row
        .try_get::<Option<String>, _>("subscription_status")?
        .map(|raw| {
            raw.parse::<SubscriptionStatus>().map_err(|_| {
                RepositoryError::InvalidData(format!("Unknown subscription_status: {}", raw))
            })
        })
        .transpose()?;

    Ok(Account {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        email: row.try_get("email")?,
        plan: parse_column(row, "plan")?,
        usage: Usage {
            ideas_generated: row.try_get("ideas_generated")?,
            builds_started: row.try_get("builds_started")?,
            active_projects: row.try_get("active_projects")?,
            storage_used: row.try_get("storage_used")?,
            bandwidth_used: row.try_get("bandwidth_used")?,
        },
        limits: Limits {
            ideas_per_month: row.try_get("ideas_per_month")?,
            builds_per_month: row.try_get("builds_per_month")?,
            max_active_projects: row.try_get("max_active_projects")?,
            storage_limit: row.try_get("storage_limit")?,
            bandwidth_limit: row.try_get("bandwidth_limit")?,
            seats: row.try_get("seats")?,
        },
        last_reset_at: row.try_get("last_reset_at")?,
        stripe_customer_id: row.try_get("stripe_customer_id")?,
        subscription_id: row.try_get("subscription_id")?,
        ended_subscription_id: row.try_get("ended_subscription_id")?,
        subscription_status,
        billing_event_at: row.try_get("billing_event_at")?,
        role: parse_column(row, "role")?,
        status: parse_column(row, "status")?,
        latest_project_url: row.try_get("latest_project_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_columns_pair_counter_with_its_limit() {
        assert_eq!(
            quota_columns(QuotaCounter::IdeasGenerated),
            ("ideas_generated", "ideas_per_month")
        );
        assert_eq!(
            quota_columns(QuotaCounter::BuildsStarted),
            ("builds_started", "builds_per_month")
        );
    }

    #[test]
    fn subscription_link_modes() {
        assert_eq!(subscription_link_parts(&SubscriptionLink::Keep), ("keep", None));
        let end = SubscriptionLink::End("sub_0".to_string());
        assert_eq!(subscription_link_parts(&end), ("end", Some("sub_0")));
        let set = SubscriptionLink::Set("sub_1".to_string());
        assert_eq!(subscription_link_parts(&set), ("set", Some("sub_1")));
    }
}
