use super::repository::{IdeaRepository, RepositoryError};
use crate::domain::{GeneratedIdea, Idea, IdeaStatus};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

const IDEA_COLUMNS: &str = r#"
    id, account_id, title, description, problem, solution, target_audience, tech_stack,
    features, monetization, market_size, competitors, score, status, staging_url,
    production_url, created_at, updated_at
"#;

pub struct PostgresIdeaRepository {
    pool: PgPool,
}

impl PostgresIdeaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdeaRepository for PostgresIdeaRepository {
    async fn create(&self, idea: &Idea) -> Result<(), RepositoryError> {
        let content = &idea.content;
        sqlx::query(
            r#"
            INSERT INTO ideas (id, account_id, title, description, problem, solution,
                               target_audience, tech_stack, features, monetization, market_size,
                               competitors, score, status, staging_url, production_url,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(idea.id)
        .bind(idea.account_id)
        .bind(&content.title)
        .bind(&content.description)
        .bind(&content.problem)
        .bind(&content.solution)
        .bind(&content.target_audience)
        .bind(&content.tech_stack)
        .bind(&content.features)
        .bind(&content.monetization)
        .bind(&content.market_size)
        .bind(&content.competitors)
        .bind(content.score)
        .bind(idea.status.to_string())
        .bind(&idea.staging_url)
        .bind(&idea.production_url)
        .bind(idea.created_at)
        .bind(idea.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Idea, RepositoryError> {
        let sql = format!("SELECT {} FROM ideas WHERE id = $1", IDEA_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Idea {}", id)))?;

        row_to_idea(&row)
    }

    async fn list_by_account_paginated(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Idea>, RepositoryError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM ideas
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            IDEA_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(account_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_idea).collect()
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ideas")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn row_to_idea(row: &sqlx::postgres::PgRow) -> Result<Idea, RepositoryError> {
    let status_str: String = row.try_get("status")?;

    Ok(Idea {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        content: GeneratedIdea {
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            problem: row.try_get("problem")?,
            solution: row.try_get("solution")?,
            target_audience: row.try_get("target_audience")?,
            tech_stack: row.try_get("tech_stack")?,
            features: row.try_get("features")?,
            monetization: row.try_get("monetization")?,
            market_size: row.try_get("market_size")?,
            competitors: row.try_get("competitors")?,
            score: row.try_get("score")?,
        },
        status: IdeaStatus::from_str(&status_str)
            .map_err(|_| RepositoryError::InvalidData(format!("Unknown status: {}", status_str)))?,
        staging_url: row.try_get("staging_url")?,
        production_url: row.try_get("production_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
