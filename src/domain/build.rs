use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Build {
    pub id: Uuid,
    pub idea_id: Uuid,
    pub idea_title: String,
    /// Owner. Older build records may lack it.
    pub account_id: Option<Uuid>,
    pub status: BuildStatus,
    pub deployment_target: DeploymentTarget,
    pub test_results: Option<TestResults>,
    pub staging_url: Option<String>,
    pub production_url: Option<String>,
    pub ci_run_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BuildStatus {
    Queued,
    Running,
    Testing,
    Deploying,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum DeploymentTarget {
    #[default]
    Vercel,
    #[serde(rename = "Firebase Hosting")]
    #[strum(serialize = "Firebase Hosting")]
    FirebaseHosting,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    pub total: i32,
    pub passed: i32,
    pub failed: i32,
    pub coverage: f64,
}

/// What happens when a status report is applied to a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Moves the build to a new status.
    Advance,
    /// The build is already in the reported status.
    Duplicate,
    /// The report would move the build backwards or out of a terminal status.
    Rejected,
}

impl BuildStatus {
    pub const SEQUENCE: [BuildStatus; 6] = [
        BuildStatus::Queued,
        BuildStatus::Running,
        BuildStatus::Testing,
        BuildStatus::Deploying,
        BuildStatus::Success,
        BuildStatus::Failed,
    ];

    fn rank(self) -> u8 {
        match self {
            BuildStatus::Queued => 0,
            BuildStatus::Running => 1,
            BuildStatus::Testing => 2,
            BuildStatus::Deploying => 3,
            BuildStatus::Success | BuildStatus::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Failed)
    }

    /// Forward moves may skip intermediate steps (a build can fail while
    /// queued, or report success straight from running).
    pub fn transition_to(self, next: BuildStatus) -> Transition {
        if self == next {
            Transition::Duplicate
        } else if !self.is_terminal() && next.rank() > self.rank() {
            Transition::Advance
        } else {
            Transition::Rejected
        }
    }
}

impl DeploymentTarget {
    /// Unknown or missing targets fall back to Vercel.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.parse().ok()).unwrap_or_default()
    }
}

/// A status report from the build runner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildUpdate {
    pub status: Option<BuildStatus>,
    pub test_results: Option<TestResults>,
    pub staging_url: Option<String>,
    pub production_url: Option<String>,
    pub ci_run_id: Option<String>,
}

impl Build {
    pub fn new(
        idea_id: Uuid,
        idea_title: String,
        account_id: Uuid,
        deployment_target: DeploymentTarget,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            idea_id,
            idea_title,
            account_id: Some(account_id),
            status: BuildStatus::Queued,
            deployment_target,
            test_results: None,
            staging_url: None,
            production_url: None,
            ci_run_id: None,
            started_at: now,
            completed_at: None,
            updated_at: now,
        }
    }

    /// URL recorded as the account's latest project once the build succeeds.
    pub fn project_url(&self) -> Option<&str> {
        self.staging_url
            .as_deref()
            .or(self.production_url.as_deref())
    }

    /// Returns a copy with `update` applied and the status set to `next`.
    pub fn with_update(&self, next: BuildStatus, update: &BuildUpdate, now: DateTime<Utc>) -> Build {
        let mut build = self.clone();
        build.status = next;
        if update.test_results.is_some() {
            build.test_results = update.test_results;
        }
        if update.staging_url.is_some() {
            build.staging_url = update.staging_url.clone();
        }
        if update.production_url.is_some() {
            build.production_url = update.production_url.clone();
        }
        if update.ci_run_id.is_some() {
            build.ci_run_id = update.ci_run_id.clone();
        }
        if next.is_terminal() && build.completed_at.is_none() {
            build.completed_at = Some(now);
        }
        build.updated_at = now;
        build
    }
}
