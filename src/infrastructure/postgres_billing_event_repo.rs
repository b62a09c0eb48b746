use super::repository::{BillingEventRepository, RepositoryError};
use async_trait::async_trait;
use sqlx::PgPool;

pub struct PostgresBillingEventRepository {
    pool: PgPool,
}

impl PostgresBillingEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingEventRepository for PostgresBillingEventRepository {
    async fn claim(&self, event_id: &str, event_type: &str) -> Result<bool, RepositoryError> {
        let claimed: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO billing_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING event_id
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed.is_some())
    }

    async fn release(&self, event_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM billing_events WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
