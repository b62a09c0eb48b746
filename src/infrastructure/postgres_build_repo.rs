use super::repository::{BuildRepository, RepositoryError};
use crate::domain::{Build, BuildStatus, DeploymentTarget, IdeaStatus, TestResults};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

const BUILD_COLUMNS: &str = r#"
    id, idea_id, idea_title, account_id, status, deployment_target, tests_total, tests_passed,
    tests_failed, test_coverage, staging_url, production_url, ci_run_id, started_at,
    completed_at, updated_at
"#;

pub struct PostgresBuildRepository {
    pool: PgPool,
}

impl PostgresBuildRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BuildRepository for PostgresBuildRepository {
    async fn create_for_idea(&self, build: &Build) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let tests = split_test_results(build.test_results);

        sqlx::query(
            r#"
            INSERT INTO builds (id, idea_id, idea_title, account_id, status, deployment_target,
                                tests_total, tests_passed, tests_failed, test_coverage,
                                staging_url, production_url, ci_run_id, started_at,
                                completed_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(build.id)
        .bind(build.idea_id)
        .bind(&build.idea_title)
        .bind(build.account_id)
        .bind(build.status.to_string())
        .bind(build.deployment_target.to_string())
        .bind(tests.0)
        .bind(tests.1)
        .bind(tests.2)
        .bind(tests.3)
        .bind(&build.staging_url)
        .bind(&build.production_url)
        .bind(&build.ci_run_id)
        .bind(build.started_at)
        .bind(build.completed_at)
        .bind(build.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE ideas
            SET status = $1, updated_at = $2
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(IdeaStatus::Building.to_string())
        .bind(build.started_at)
        .bind(build.idea_id)
        .bind(IdeaStatus::Pending.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Build, RepositoryError> {
        let sql = format!("SELECT {} FROM builds WHERE id = $1", BUILD_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Build {}", id)))?;

        row_to_build(&row)
    }

    async fn list_by_account_paginated(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Build>, RepositoryError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM builds
            WHERE account_id = $1
            ORDER BY started_at DESC
            LIMIT $2 OFFSET $3
            "#,
            BUILD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(account_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_build).collect()
    }

    async fn compare_and_set(
        &self,
        build: &Build,
        expected: BuildStatus,
    ) -> Result<bool, RepositoryError> {
        update_if_status(&self.pool, build, expected).await
    }

    async fn complete_success(
        &self,
        build: &Build,
        expected: BuildStatus,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if !update_if_status(&mut *tx, build, expected).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        let project_url = build.project_url();

        if let Some(account_id) = build.account_id {
            sqlx::query(
                r#"
                UPDATE accounts
                SET active_projects = active_projects + 1,
                    latest_project_url = COALESCE($2, latest_project_url),
                    updated_at = $3
                WHERE id = $1
                "#,
            )
            .bind(account_id)
            .bind(project_url)
            .bind(build.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        let from: Vec<String> = IdeaStatus::predecessors(IdeaStatus::Staging)
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        sqlx::query(
            r#"
            UPDATE ideas
            SET status = $1,
                staging_url = COALESCE($2, staging_url),
                updated_at = $3
            WHERE id = $4 AND status = ANY($5)
            "#,
        )
        .bind(IdeaStatus::Staging.to_string())
        .bind(project_url)
        .bind(build.updated_at)
        .bind(build.idea_id)
        .bind(&from)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn count_by_status(&self, status: BuildStatus) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM builds WHERE status = $1")
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn update_if_status<'e, E>(
    executor: E,
    build: &Build,
    expected: BuildStatus,
) -> Result<bool, RepositoryError>
where
    E: sqlx::PgExecutor<'e>,
{
    let tests = split_test_results(build.test_results);

    let result = sqlx::query(
        r#"
        UPDATE builds
        SET status = $1,
            tests_total = $2,
            tests_passed = $3,
            tests_failed = $4,
            test_coverage = $5,
            staging_url = $6,
            production_url = $7,
            ci_run_id = $8,
            completed_at = $9,
            updated_at = $10
        WHERE id = $11 AND status = $12
        "#,
    )
    .bind(build.status.to_string())
    .bind(tests.0)
    .bind(tests.1)
    .bind(tests.2)
    .bind(tests.3)
    .bind(&build.staging_url)
    .bind(&build.production_url)
    .bind(&build.ci_run_id)
    .bind(build.completed_at)
    .bind(build.updated_at)
    .bind(build.id)
    .bind(expected.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

type TestColumns = (Option<i32>, Option<i32>, Option<i32>, Option<f64>);

fn split_test_results(results: Option<TestResults>) -> TestColumns {
    match results {
        Some(r) => (Some(r.total), Some(r.passed), Some(r.failed), Some(r.coverage)),
        None => (None, None, None, None),
    }
}

fn join_test_results(columns: TestColumns) -> Option<TestResults> {
    match columns {
        (Some(total), Some(passed), Some(failed), coverage) => Some(TestResults {
            total,
            passed,
            failed,
            coverage: coverage.unwrap_or(0.0),
        }),
        _ => None,
    }
}

fn row_to_build(row: &sqlx::postgres::PgRow) -> Result<Build, RepositoryError> {
    let status_str: String = row.try_get("status")?;
    let target_str: String = row.try_get("deployment_target")?;

    let test_results = join_test_results((
        row.try_get("tests_total")?,
        row.try_get("tests_passed")?,
        row.try_get("tests_failed")?,
        row.try_get("test_coverage")?,
    ));

    Ok(Build {
        id: row.try_get("id")?,
        idea_id: row.try_get("idea_id")?,
        idea_title: row.try_get("idea_title")?,
        account_id: row.try_get("account_id")?,
        status: BuildStatus::from_str(&status_str)
            .map_err(|_| RepositoryError::InvalidData(format!("Unknown status: {}", status_str)))?,
        deployment_target: DeploymentTarget::from_str(&target_str).map_err(|_| {
            RepositoryError::InvalidData(format!("Unknown deployment target: {}", target_str))
        })?,
        test_results,
        staging_url: row.try_get("staging_url")?,
        production_url: row.try_get("production_url")?,
        ci_run_id: row.try_get("ci_run_id")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_split_and_join() {
        let results = TestResults {
            total: 12,
            passed: 11,
            failed: 1,
            coverage: 84.5,
        };
        assert_eq!(join_test_results(split_test_results(Some(results))), Some(results));
        assert_eq!(join_test_results(split_test_results(None)), None);
    }

    #[test]
    fn partial_test_columns_read_as_missing() {
        assert_eq!(join_test_results((Some(3), None, Some(0), None)), None);
        let missing_coverage = join_test_results((Some(3), Some(3), Some(0), None));
        assert_eq!(missing_coverage.map(|r| r.coverage), Some(0.0));
    }
}
