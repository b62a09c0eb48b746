use super::{clamp_page, notify_best_effort};
use crate::domain::{Idea, LimitAction, LimitCheck, QuotaCounter, QuotaOutcome};
use crate::infrastructure::{
    AccountRepository, ChangeEvent, ChangeFeed, GenerationError, IdeaGenerator, IdeaRepository,
    Notification, Notifier, RepositoryError,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum IdeaError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Quota exceeded: {}", .0.reason)]
    QuotaExceeded(LimitCheck),
    #[error("Idea generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("Idea generation timed out after {0:?}")]
    Timeout(Duration),
}

pub struct IdeaService<A, I>
where
    A: AccountRepository,
    I: IdeaRepository,
{
    account_repo: Arc<A>,
    idea_repo: Arc<I>,
    generator: Arc<dyn IdeaGenerator>,
    notifier: Arc<dyn Notifier>,
    feed: ChangeFeed,
    call_timeout: Duration,
}

impl<A, I> IdeaService<A, I>
where
    A: AccountRepository,
    I: IdeaRepository,
{
    pub fn new(
        account_repo: Arc<A>,
        idea_repo: Arc<I>,
        generator: Arc<dyn IdeaGenerator>,
        notifier: Arc<dyn Notifier>,
        feed: ChangeFeed,
        call_timeout: Duration,
    ) -> Self {
        Self {
            account_repo,
            idea_repo,
            generator,
            notifier,
            feed,
            call_timeout,
        }
    }

    /// Consumes one idea credit, then asks the generator for an idea and
    /// stores it as pending. The credit stays spent if generation fails.
    pub async fn generate_idea(&self, account_id: Uuid) -> Result<Idea, IdeaError> {
        let account = match self
            .account_repo
            .consume_quota(account_id, QuotaCounter::IdeasGenerated, Utc::now())
            .await?
        {
            QuotaOutcome::Consumed(account) => account,
            QuotaOutcome::Exhausted(account) => {
                let check = account.evaluate(LimitAction::GenerateIdea);
                warn!(account_id = %account_id, reason = %check.reason, "Idea quota exhausted");
                return Err(IdeaError::QuotaExceeded(check));
            }
        };

        let content = match timeout(self.call_timeout, self.generator.generate()).await {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                error!(account_id = %account_id, error = %e, "Idea generation failed");
                return Err(e.into());
            }
            Err(_) => {
                error!(account_id = %account_id, "Idea generation timed out");
                return Err(IdeaError::Timeout(self.call_timeout));
            }
        };

        let idea = Idea::new(account_id, content);
        self.idea_repo.create(&idea).await?;
        info!(
            account_id = %account_id,
            idea_id = %idea.id,
            ideas_generated = account.usage.ideas_generated,
            "Generated idea"
        );

        self.feed.publish(ChangeEvent::IdeaCreated { idea: idea.clone() });
        self.feed.publish(ChangeEvent::AccountChanged { account: account.clone() });

        let notification = Notification::IdeaGenerated {
            title: idea.content.title.clone(),
            description: idea.content.description.clone(),
            score: idea.content.score,
        };
        notify_best_effort(
            self.notifier.as_ref(),
            self.call_timeout,
            account.email.clone(),
            notification,
        )
        .await;

        Ok(idea)
    }

    pub async fn list_ideas(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Idea>, IdeaError> {
        let (limit, offset) = clamp_page(limit, offset);
        Ok(self
            .idea_repo
            .list_by_account_paginated(account_id, limit, offset)
            .await?)
    }
}
