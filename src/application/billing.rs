use super::notify_best_effort;
use crate::domain::{
    decode_event, Account, BillingEnvelope, BillingEvent, BillingEventError, CheckoutCompleted,
    Plan, PlanChange, PriceCatalog, SubscriptionChange, SubscriptionLink, SubscriptionStatus,
};
use crate::infrastructure::{
    AccountRepository, BillingEventRepository, ChangeEvent, ChangeFeed, CheckoutRequest,
    CheckoutSession, Notification, Notifier, PaymentError, PaymentProvider, RepositoryError,
    SignatureError, WebhookVerifier,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Invalid signature: {0}")]
    Signature(#[from] SignatureError),
    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] BillingEventError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Payment provider error: {0}")]
    Payment(#[from] PaymentError),
    #[error("Payment provider timed out after {0:?}")]
    Timeout(Duration),
}

/// What a verified webhook delivery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    /// The event id was handled before.
    Duplicate,
    /// A newer billing event already set the account's plan, or the
    /// event targets a subscription that already ended.
    Stale,
    /// Event type this service does not act on.
    Ignored,
}

pub struct BillingSettings {
    pub catalog: PriceCatalog,
    pub verifier: WebhookVerifier,
    /// Base of the checkout success and cancel redirects.
    pub app_url: String,
    pub call_timeout: Duration,
}

pub struct BillingService<A, E>
where
    A: AccountRepository,
    E: BillingEventRepository,
{
    account_repo: Arc<A>,
    event_repo: Arc<E>,
    payments: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn Notifier>,
    feed: ChangeFeed,
    settings: BillingSettings,
}

impl<A, E> BillingService<A, E>
where
    A: AccountRepository,
    E: BillingEventRepository,
{
    pub fn new(
        account_repo: Arc<A>,
        event_repo: Arc<E>,
        payments: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn Notifier>,
        feed: ChangeFeed,
        settings: BillingSettings,
    ) -> Self {
        Self {
            account_repo,
            event_repo,
            payments,
            notifier,
            feed,
            settings,
        }
    }

    pub async fn create_checkout_session(
        &self,
        account_id: Uuid,
        plan: Plan,
    ) -> Result<CheckoutSession, BillingError> {
        if !plan.is_paid() {
            return Err(BillingError::InvalidArgument(format!(
                "{} is not a purchasable plan",
                plan
            )));
        }
        let price_id = self
            .settings
            .catalog
            .price_for_plan(plan)
            .ok_or_else(|| {
                BillingError::InvalidArgument(format!("No price configured for {}", plan))
            })?
            .to_string();

        let account = self.account_repo.get_by_id(account_id).await?;
        let app_url = self.settings.app_url.trim_end_matches('/');
        let request = CheckoutRequest {
            account_id,
            email: account.email,
            customer_id: account.stripe_customer_id,
            plan,
            price_id,
            success_url: format!("{}/#/dashboard?success=true", app_url),
            cancel_url: format!("{}/#/pricing?canceled=true", app_url),
        };

        let call_timeout = self.settings.call_timeout;
        let session = match timeout(call_timeout, self.payments.create_checkout_session(&request)).await
        {
            Ok(result) => result?,
            Err(_) => {
                error!(account_id = %account_id, "Checkout session creation timed out");
                return Err(BillingError::Timeout(call_timeout));
            }
        };

        info!(account_id = %account_id, plan = %plan, session_id = %session.id, "Created checkout session");
        Ok(session)
    }

    /// Verifies, decodes and applies one webhook delivery. Nothing is written
    /// unless the signature checks out.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, BillingError> {
        if let Err(e) = self.settings.verifier.verify(signature, payload, Utc::now()) {
            warn!(error = %e, "Rejected webhook signature");
            return Err(e.into());
        }

        let envelope = decode_event(payload)?;
        let kind = envelope.event.kind().to_string();

        // Claimed before applying so concurrent redeliveries act once.
        if !self.event_repo.claim(&envelope.id, &kind).await? {
            info!(event_id = %envelope.id, event_type = %kind, "Webhook event already processed");
            return Ok(WebhookOutcome::Duplicate);
        }

        let outcome = match self.apply_event(&envelope).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(release_err) = self.event_repo.release(&envelope.id).await {
                    error!(event_id = %envelope.id, error = %release_err, "Failed to release webhook event claim");
                }
                return Err(e);
            }
        };
        info!(event_id = %envelope.id, event_type = %kind, outcome = ?outcome, "Webhook event handled");

        Ok(outcome)
    }

    async fn apply_event(&self, envelope: &BillingEnvelope) -> Result<WebhookOutcome, BillingError> {
        match &envelope.event {
            BillingEvent::CheckoutCompleted(checkout) => {
                self.on_checkout_completed(envelope, checkout).await
            }
            BillingEvent::SubscriptionUpdated(change) => {
                let plan_change = if change.status.is_terminal() {
                    PlanChange {
                        plan: Plan::Free,
                        status: change.status,
                        customer_id: None,
                        subscription: SubscriptionLink::End(change.subscription_id.clone()),
                    }
                } else {
                    PlanChange {
                        plan: self
                            .settings
                            .catalog
                            .plan_for_price_or_free(change.price_id.as_deref()),
                        status: change.status,
                        customer_id: None,
                        subscription: SubscriptionLink::Set(change.subscription_id.clone()),
                    }
                };
                self.on_subscription_change(envelope, change, plan_change, false)
                    .await
            }
            BillingEvent::SubscriptionDeleted(change) => {
                let plan_change = PlanChange {
                    plan: Plan::Free,
                    status: SubscriptionStatus::Canceled,
                    customer_id: None,
                    subscription: SubscriptionLink::End(change.subscription_id.clone()),
                };
                self.on_subscription_change(envelope, change, plan_change, true)
                    .await
            }
            BillingEvent::Ignored { event_type } => {
                info!(event_id = %envelope.id, event_type = %event_type, "Ignoring billing event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn on_checkout_completed(
        &self,
        envelope: &BillingEnvelope,
        checkout: &CheckoutCompleted,
    ) -> Result<WebhookOutcome, BillingError> {
        // The price actually paid wins over the plan key echoed in metadata.
        let plan = checkout
            .price_id
            .as_deref()
            .and_then(|price| self.settings.catalog.plan_for_price(price))
            .unwrap_or(checkout.plan);
        if plan != checkout.plan {
            warn!(
                session_id = %checkout.session_id,
                metadata_plan = %checkout.plan,
                price_plan = %plan,
                "Checkout metadata plan disagrees with price"
            );
        }

        let change = PlanChange {
            plan,
            status: SubscriptionStatus::Active,
            customer_id: checkout.customer_id.clone(),
            subscription: checkout
                .subscription_id
                .clone()
                .map(SubscriptionLink::Set)
                .unwrap_or(SubscriptionLink::Keep),
        };

        self.apply_plan_change(checkout.account_id, &change, envelope, true)
            .await
    }

    async fn on_subscription_change(
        &self,
        envelope: &BillingEnvelope,
        change: &SubscriptionChange,
        plan_change: PlanChange,
        notify: bool,
    ) -> Result<WebhookOutcome, BillingError> {
        let account = self
            .account_repo
            .get_by_customer_id(&change.customer_id)
            .await
            .map_err(|e| {
                error!(
                    customer_id = %change.customer_id,
                    subscription_id = %change.subscription_id,
                    error = %e,
                    "Could not resolve billing customer"
                );
                e
            })?;

        self.apply_plan_change(account.id, &plan_change, envelope, notify)
            .await
    }

    async fn apply_plan_change(
        &self,
        account_id: Uuid,
        change: &PlanChange,
        envelope: &BillingEnvelope,
        notify: bool,
    ) -> Result<WebhookOutcome, BillingError> {
        let applied = self
            .account_repo
            .apply_plan_change(account_id, change, envelope.created)
            .await?;
        if !applied {
            warn!(
                account_id = %account_id,
                event_id = %envelope.id,
                "Skipping billing event superseded by an applied one"
            );
            return Ok(WebhookOutcome::Stale);
        }

        info!(
            account_id = %account_id,
            plan = %change.plan,
            status = %change.status,
            "Synchronized plan from billing"
        );

        let account: Account = self.account_repo.get_by_id(account_id).await?;
        let email = account.email.clone();
        self.feed.publish(ChangeEvent::AccountChanged { account });

        if !notify {
            return Ok(WebhookOutcome::Applied);
        }

        let notification = Notification::SubscriptionUpdate {
            plan: change.plan,
            status: change.status.to_string(),
        };
        notify_best_effort(
            self.notifier.as_ref(),
            self.settings.call_timeout,
            email,
            notification,
        )
        .await;

        Ok(WebhookOutcome::Applied)
    }
}
