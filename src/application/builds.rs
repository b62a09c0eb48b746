use super::{clamp_page, notify_best_effort};
use crate::domain::{
    Build, BuildStatus, BuildUpdate, DeploymentTarget, LimitAction, LimitCheck, QuotaCounter,
    QuotaOutcome, Transition,
};
use crate::infrastructure::{
    AccountRepository, BuildRepository, ChangeEvent, ChangeFeed, IdeaRepository, Notification,
    Notifier, RepositoryError,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Reloads allowed when a concurrent report changes the build underneath us.
const MAX_UPDATE_ATTEMPTS: usize = 3;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Quota exceeded: {}", .0.reason)]
    QuotaExceeded(LimitCheck),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: BuildStatus, to: BuildStatus },
    #[error("Build {0} kept changing during update")]
    Contended(Uuid),
}

/// What a status report did to the stored build.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildUpdateOutcome {
    Applied(Build),
    /// The build already had the reported status; no side effects ran.
    Duplicate(Build),
}

impl BuildUpdateOutcome {
    pub fn build(&self) -> &Build {
        match self {
            BuildUpdateOutcome::Applied(build) | BuildUpdateOutcome::Duplicate(build) => build,
        }
    }
}

pub struct BuildService<A, I, B>
where
    A: AccountRepository,
    I: IdeaRepository,
    B: BuildRepository,
{
    account_repo: Arc<A>,
    idea_repo: Arc<I>,
    build_repo: Arc<B>,
    notifier: Arc<dyn Notifier>,
    feed: ChangeFeed,
    notify_timeout: Duration,
}

impl<A, I, B> BuildService<A, I, B>
where
    A: AccountRepository,
    I: IdeaRepository,
    B: BuildRepository,
{
    pub fn new(
        account_repo: Arc<A>,
        idea_repo: Arc<I>,
        build_repo: Arc<B>,
        notifier: Arc<dyn Notifier>,
        feed: ChangeFeed,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            account_repo,
            idea_repo,
            build_repo,
            notifier,
            feed,
            notify_timeout,
        }
    }

    /// Consumes one build credit and queues a build for an idea the account
    /// owns. The build row and the idea's move to building commit together.
    pub async fn start_build(
        &self,
        account_id: Uuid,
        idea_id: Uuid,
        target: Option<&str>,
    ) -> Result<Build, BuildError> {
        let idea = self.idea_repo.get_by_id(idea_id).await?;
        if idea.account_id != account_id {
            warn!(account_id = %account_id, idea_id = %idea_id, "Build requested for foreign idea");
            return Err(BuildError::PermissionDenied(
                "Idea does not belong to this account".to_string(),
            ));
        }

        match self
            .account_repo
            .consume_quota(account_id, QuotaCounter::BuildsStarted, Utc::now())
            .await?
        {
            QuotaOutcome::Consumed(account) => {
                self.feed.publish(ChangeEvent::AccountChanged { account });
            }
            QuotaOutcome::Exhausted(account) => {
                let check = account.evaluate(LimitAction::StartBuild);
                warn!(account_id = %account_id, reason = %check.reason, "Build quota exhausted");
                return Err(BuildError::QuotaExceeded(check));
            }
        }

        let target = DeploymentTarget::parse_or_default(target);
        let build = Build::new(idea.id, idea.content.title.clone(), account_id, target);
        self.build_repo.create_for_idea(&build).await?;
        info!(
            account_id = %account_id,
            build_id = %build.id,
            idea_id = %idea_id,
            target = %target,
            "Queued build"
        );

        self.feed.publish(ChangeEvent::BuildChanged { build: build.clone() });
        Ok(build)
    }

    pub async fn get_build(&self, build_id: Uuid) -> Result<Build, BuildError> {
        Ok(self.build_repo.get_by_id(build_id).await?)
    }

    pub async fn list_builds(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Build>, BuildError> {
        let (limit, offset) = clamp_page(limit, offset);
        Ok(self
            .build_repo
            .list_by_account_paginated(account_id, limit, offset)
            .await?)
    }

    /// Applies a runner status report. The status write is a compare-and-set,
    /// so success side effects and the completion notice run at most once
    /// per build however often the report is delivered.
    pub async fn apply_build_update(
        &self,
        build_id: Uuid,
        update: BuildUpdate,
    ) -> Result<BuildUpdateOutcome, BuildError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let current = self.build_repo.get_by_id(build_id).await?;
            let next = update.status.unwrap_or(current.status);

            match current.status.transition_to(next) {
                Transition::Rejected => {
                    warn!(
                        build_id = %build_id,
                        from = %current.status,
                        to = %next,
                        "Rejected build transition"
                    );
                    return Err(BuildError::InvalidTransition {
                        from: current.status,
                        to: next,
                    });
                }
                Transition::Duplicate => {
                    let mut updated = current.with_update(next, &update, current.updated_at);
                    if updated == current {
                        return Ok(BuildUpdateOutcome::Duplicate(current));
                    }
                    // Same status with new details (test results, URLs).
                    updated.updated_at = Utc::now();
                    if self.build_repo.compare_and_set(&updated, current.status).await? {
                        self.feed.publish(ChangeEvent::BuildChanged { build: updated.clone() });
                        return Ok(BuildUpdateOutcome::Duplicate(updated));
                    }
                }
                Transition::Advance => {
                    let updated = current.with_update(next, &update, Utc::now());
                    let stored = if next == BuildStatus::Success {
                        self.build_repo.complete_success(&updated, current.status).await?
                    } else {
                        self.build_repo.compare_and_set(&updated, current.status).await?
                    };

                    if stored {
                        info!(
                            build_id = %build_id,
                            from = %current.status,
                            to = %next,
                            "Build advanced"
                        );
                        self.after_transition(&updated).await;
                        return Ok(BuildUpdateOutcome::Applied(updated));
                    }
                }
            }
        }

        warn!(build_id = %build_id, "Build update lost every compare-and-set");
        Err(BuildError::Contended(build_id))
    }

    async fn after_transition(&self, build: &Build) {
        self.feed.publish(ChangeEvent::BuildChanged { build: build.clone() });

        if !build.status.is_terminal() {
            return;
        }

        let Some(account_id) = build.account_id else {
            warn!(build_id = %build.id, "Finished build has no owner; skipping owner updates");
            return;
        };

        let account = match self.account_repo.get_by_id(account_id).await {
            Ok(account) => account,
            Err(e) => {
                warn!(build_id = %build.id, account_id = %account_id, error = %e, "Owner lookup failed");
                return;
            }
        };

        let notification = Notification::BuildComplete {
            idea_title: build.idea_title.clone(),
            status: build.status,
            url: build.project_url().map(str::to_string),
        };
        let email = account.email.clone();
        if build.status == BuildStatus::Success {
            self.feed.publish(ChangeEvent::AccountChanged { account });
        }

        notify_best_effort(self.notifier.as_ref(), self.notify_timeout, email, notification).await;
    }
}
