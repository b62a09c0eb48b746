use crate::domain::{Account, Build, BuildUpdate, Idea, LimitCheck, TestResults};
use crate::infrastructure::ChangeEvent;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Serialize, ToSchema)]
pub(super) struct HealthResponse {
    pub(super) status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) error: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateAccountRequest {
    #[validate(length(min = 1, max = 128))]
    #[schema(example = "firebase-uid-123")]
    pub(super) external_id: String,
    #[validate(email)]
    #[schema(example = "founder@example.com")]
    pub(super) email: String,
}

#[derive(Deserialize, Debug, IntoParams, ToSchema)]
pub(super) struct PaginationParams {
    #[serde(default = "default_limit")]
    #[param(default = 50, maximum = 100)]
    pub(super) limit: i64,
    #[serde(default)]
    #[param(default = 0)]
    pub(super) offset: i64,
}

pub(super) fn default_limit() -> i64 {
    50
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct CheckLimitsRequest {
    pub(super) account_id: Uuid,
    #[schema(example = "generate_idea")]
    pub(super) action: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct GenerateIdeaRequest {
    pub(super) account_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct StartBuildRequest {
    pub(super) account_id: Uuid,
    pub(super) idea_id: Uuid,
    /// "Vercel" or "Firebase Hosting"; anything else falls back to Vercel.
    #[schema(example = "Vercel")]
    pub(super) target: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct TestResultsBody {
    #[validate(range(min = 0))]
    pub(super) total: i32,
    #[validate(range(min = 0))]
    pub(super) passed: i32,
    #[validate(range(min = 0))]
    pub(super) failed: i32,
    #[validate(range(min = 0.0, max = 100.0))]
    pub(super) coverage: f64,
}

#[derive(Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct BuildStatusRequest {
    #[schema(example = "running")]
    pub(super) status: Option<String>,
    #[validate]
    pub(super) test_results: Option<TestResultsBody>,
    #[validate(url)]
    pub(super) staging_url: Option<String>,
    #[validate(url)]
    pub(super) production_url: Option<String>,
    #[validate(length(max = 256))]
    pub(super) ci_run_id: Option<String>,
}

impl BuildStatusRequest {
    pub(super) fn into_update(self, status: Option<crate::domain::BuildStatus>) -> BuildUpdate {
        BuildUpdate {
            status,
            test_results: self.test_results.map(|t| TestResults {
                total: t.total,
                passed: t.passed,
                failed: t.failed,
                coverage: t.coverage,
            }),
            staging_url: self.staging_url,
            production_url: self.production_url,
            ci_run_id: self.ci_run_id,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct CheckoutSessionRequest {
    pub(super) account_id: Uuid,
    #[schema(example = "founder")]
    pub(super) plan: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct CheckoutSessionResponse {
    pub(super) session_id: String,
    pub(super) url: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct SuspendRequest {
    #[serde(default = "default_suspend")]
    pub(super) suspend: bool,
}

fn default_suspend() -> bool {
    true
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct LimitCheckResponse {
    pub(super) can_proceed: bool,
    pub(super) reason: String,
    #[schema(value_type = Object)]
    pub(super) usage: crate::domain::Usage,
    #[schema(value_type = Object)]
    pub(super) limits: crate::domain::Limits,
    #[schema(example = "free")]
    pub(super) plan: String,
}

impl From<LimitCheck> for LimitCheckResponse {
    fn from(check: LimitCheck) -> Self {
        Self {
            can_proceed: check.can_proceed,
            reason: check.reason,
            usage: check.usage,
            limits: check.limits,
            plan: check.plan.to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct AccountResponse {
    pub(super) id: Uuid,
    pub(super) external_id: String,
    pub(super) email: String,
    pub(super) plan: String,
    #[schema(value_type = Object)]
    pub(super) usage: crate::domain::Usage,
    #[schema(value_type = Object)]
    pub(super) limits: crate::domain::Limits,
    pub(super) subscription_status: Option<String>,
    pub(super) role: String,
    pub(super) status: String,
    pub(super) latest_project_url: Option<String>,
    pub(super) last_reset_at: chrono::DateTime<chrono::Utc>,
    pub(super) created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            external_id: account.external_id,
            email: account.email,
            plan: account.plan.to_string(),
            usage: account.usage,
            limits: account.limits,
            subscription_status: account.subscription_status.map(|s| s.to_string()),
            role: account.role.to_string(),
            status: account.status.to_string(),
            latest_project_url: account.latest_project_url,
            last_reset_at: account.last_reset_at,
            created_at: account.created_at,
        }
    }
}

/// SSE frame body. Account changes go out in their public shape, without
/// billing identifiers.
pub(super) fn change_event_payload(event: ChangeEvent) -> Option<String> {
    match event {
        ChangeEvent::AccountChanged { account } => serde_json::to_string(&serde_json::json!({
            "type": "account_changed",
            "account": AccountResponse::from(account),
        }))
        .ok(),
        other => serde_json::to_string(&other).ok(),
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct IdeaCreatedResponse {
    pub(super) id: Uuid,
    #[schema(value_type = Object)]
    pub(super) idea: Idea,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct BuildResponse {
    pub(super) id: Uuid,
    pub(super) idea_id: Uuid,
    pub(super) idea_title: String,
    pub(super) account_id: Option<Uuid>,
    pub(super) status: String,
    pub(super) deployment_target: String,
    #[schema(value_type = Option<Object>)]
    pub(super) test_results: Option<TestResults>,
    pub(super) staging_url: Option<String>,
    pub(super) production_url: Option<String>,
    pub(super) ci_run_id: Option<String>,
    pub(super) started_at: chrono::DateTime<chrono::Utc>,
    #[schema(format = "date-time")]
    pub(super) completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<Build> for BuildResponse {
    fn from(build: Build) -> Self {
        Self {
            id: build.id,
            idea_id: build.idea_id,
            idea_title: build.idea_title,
            account_id: build.account_id,
            status: build.status.to_string(),
            deployment_target: build.deployment_target.to_string(),
            test_results: build.test_results,
            staging_url: build.staging_url,
            production_url: build.production_url,
            ci_run_id: build.ci_run_id,
            started_at: build.started_at,
            completed_at: build.completed_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct BuildUpdateResponse {
    /// False when the report repeated the stored status.
    pub(super) applied: bool,
    pub(super) build: BuildResponse,
}

#[derive(Serialize, ToSchema)]
pub(super) struct WebhookResponse {
    pub(super) received: bool,
    #[schema(example = "applied")]
    pub(super) outcome: String,
}
