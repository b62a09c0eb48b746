use super::plan::{within_limit, Limits, Plan, UNLIMITED};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    /// Identity-provider user id.
    pub external_id: String,
    pub email: String,
    pub plan: Plan,
    pub usage: Usage,
    pub limits: Limits,
    pub last_reset_at: DateTime<Utc>,
    pub stripe_customer_id: Option<String>,
    pub subscription_id: Option<String>,
    /// Last subscription ended by billing. Later updates for it are ignored.
    #[serde(skip_serializing)]
    pub ended_subscription_id: Option<String>,
    pub subscription_status: Option<SubscriptionStatus>,
    /// `created` timestamp of the newest billing event applied to this account.
    pub billing_event_at: Option<DateTime<Utc>>,
    pub role: Role,
    pub status: AccountStatus,
    pub latest_project_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub ideas_generated: i32,
    pub builds_started: i32,
    pub active_projects: i32,
    /// GB
    pub storage_used: f64,
    /// GB
    pub bandwidth_used: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin,
    Owner,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Suspended,
}

/// Stripe subscription states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Unpaid,
    Incomplete,
    IncompleteExpired,
    Paused,
    Canceled,
}

impl SubscriptionStatus {
    /// Statuses after which the subscription can never bill again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Canceled | SubscriptionStatus::IncompleteExpired
        )
    }
}

/// Actions gated by a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LimitAction {
    GenerateIdea,
    StartBuild,
    DeployProject,
}

/// Monthly counters that quota-consuming actions increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCounter {
    IdeasGenerated,
    BuildsStarted,
}

impl QuotaCounter {
    pub fn action(self) -> LimitAction {
        match self {
            QuotaCounter::IdeasGenerated => LimitAction::GenerateIdea,
            QuotaCounter::BuildsStarted => LimitAction::StartBuild,
        }
    }
}

/// Outcome of a limit check, shaped so a client can render a paywall
/// without another fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitCheck {
    pub can_proceed: bool,
    pub reason: String,
    pub usage: Usage,
    pub limits: Limits,
    pub plan: Plan,
}

/// Result of an atomic reset-then-conditional-increment on a quota counter.
#[derive(Debug, Clone, PartialEq)]
pub enum QuotaOutcome {
    /// The counter was incremented; the account reflects the new value.
    Consumed(Account),
    /// The counter is at its limit; nothing was written except a due reset.
    Exhausted(Account),
}

/// How a billing sync treats the stored subscription id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionLink {
    Keep,
    Set(String),
    /// The subscription is over: unlink it and refuse later updates for it.
    End(String),
}

/// A plan transition produced by billing. Limits are always derived from
/// `plan`, so the pair cannot drift apart.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanChange {
    pub plan: Plan,
    pub status: SubscriptionStatus,
    /// Overwrites the stored customer id when present.
    pub customer_id: Option<String>,
    pub subscription: SubscriptionLink,
}

impl PlanChange {
    /// Whether this change may overwrite `account`. Events with equal
    /// timestamps apply in arrival order, except that an ended subscription
    /// stays ended.
    pub fn supersedes(&self, account: &Account, event_at: DateTime<Utc>) -> bool {
        if account.billing_event_at.map_or(false, |last| last > event_at) {
            return false;
        }
        match &self.subscription {
            SubscriptionLink::Set(id) => account.ended_subscription_id.as_deref() != Some(id),
            _ => true,
        }
    }

    pub fn apply_to(&self, account: &mut Account, event_at: DateTime<Utc>) {
        account.set_plan(self.plan);
        account.subscription_status = Some(self.status);
        if let Some(customer_id) = &self.customer_id {
            account.stripe_customer_id = Some(customer_id.clone());
        }
        match &self.subscription {
            SubscriptionLink::Keep => {}
            SubscriptionLink::Set(id) => account.subscription_id = Some(id.clone()),
            SubscriptionLink::End(id) => {
                account.subscription_id = None;
                account.ended_subscription_id = Some(id.clone());
            }
        }
        account.billing_event_at = Some(event_at);
        account.updated_at = Utc::now();
    }
}

impl Account {
    /// A fresh sign-up: free plan, zero usage, owner of its own workspace.
    pub fn new(external_id: String, email: String) -> Self {
        let now = Utc::now();
        let plan = Plan::most_restrictive();

        Self {
            id: Uuid::new_v4(),
            external_id,
            email,
            plan,
            usage: Usage::default(),
            limits: plan.limits(),
            last_reset_at: now,
            stripe_customer_id: None,
            subscription_id: None,
            ended_subscription_id: None,
            subscription_status: None,
            billing_event_at: None,
            role: Role::Owner,
            status: AccountStatus::Active,
            latest_project_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_suspended(&self) -> bool {
        self.status == AccountStatus::Suspended
    }

    /// True when the monthly counters belong to an earlier (or later, after
    /// clock skew) UTC calendar month than `now`.
    pub fn needs_monthly_reset(&self, now: DateTime<Utc>) -> bool {
        self.last_reset_at.year() != now.year() || self.last_reset_at.month() != now.month()
    }

    /// Applies the monthly reset in memory. Returns whether anything changed.
    pub fn apply_monthly_reset(&mut self, now: DateTime<Utc>) -> bool {
        if !self.needs_monthly_reset(now) {
            return false;
        }
        self.usage.ideas_generated = 0;
        self.usage.builds_started = 0;
        self.last_reset_at = now;
        self.updated_at = now;
        true
    }

    /// (used, limit) for the counter governing `action`.
    pub fn quota_for(&self, action: LimitAction) -> (i32, i32) {
        match action {
            LimitAction::GenerateIdea => (self.usage.ideas_generated, self.limits.ideas_per_month),
            LimitAction::StartBuild => (self.usage.builds_started, self.limits.builds_per_month),
            LimitAction::DeployProject => {
                (self.usage.active_projects, self.limits.max_active_projects)
            }
        }
    }

    /// Evaluates `action` against current usage. Does not reset or mutate.
    pub fn evaluate(&self, action: LimitAction) -> LimitCheck {
        let (can_proceed, reason) = if self.is_suspended() {
            (false, "Your account is suspended. Contact support.".to_string())
        } else {
            let (used, limit) = self.quota_for(action);
            if within_limit(used, limit) {
                (true, String::new())
            } else {
                (false, denial_reason(action, used, limit))
            }
        };

        LimitCheck {
            can_proceed,
            reason,
            usage: self.usage,
            limits: self.limits,
            plan: self.plan,
        }
    }

    /// Reset-if-due, then increment `counter` when the quota allows it.
    pub fn try_consume(&mut self, counter: QuotaCounter, now: DateTime<Utc>) -> bool {
        self.apply_monthly_reset(now);
        if !self.evaluate(counter.action()).can_proceed {
            return false;
        }
        match counter {
            QuotaCounter::IdeasGenerated => self.usage.ideas_generated += 1,
            QuotaCounter::BuildsStarted => self.usage.builds_started += 1,
        }
        self.updated_at = now;
        true
    }

    /// Plan and limits only ever change together.
    pub fn set_plan(&mut self, plan: Plan) {
        self.plan = plan;
        self.limits = plan.limits();
    }
}

fn denial_reason(action: LimitAction, used: i32, limit: i32) -> String {
    debug_assert!(limit != UNLIMITED);
    match action {
        LimitAction::GenerateIdea => format!(
            "You've used {}/{} ideas this month. Upgrade for more.",
            used, limit
        ),
        LimitAction::StartBuild => format!(
            "You've used {}/{} builds this month. Upgrade for more.",
            used, limit
        ),
        LimitAction::DeployProject => format!(
            "You have {}/{} active projects. Upgrade for more.",
            used, limit
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn account_with(ideas_generated: i32, ideas_per_month: i32) -> Account {
        let mut account = Account::new("u1".to_string(), "u1@example.com".to_string());
        account.usage.ideas_generated = ideas_generated;
        account.limits.ideas_per_month = ideas_per_month;
        account
    }

    #[test]
    fn new_account_starts_on_free_plan() {
        let account = Account::new("uid".to_string(), "a@b.c".to_string());
        assert_eq!(account.plan, Plan::Free);
        assert_eq!(account.limits, Plan::Free.limits());
        assert_eq!(account.usage, Usage::default());
        assert_eq!(account.role, Role::Owner);
        assert_eq!(account.status, AccountStatus::Active);
    }

    #[test]
    fn at_limit_is_denied_with_counts_in_reason() {
        let check = account_with(5, 5).evaluate(LimitAction::GenerateIdea);
        assert!(!check.can_proceed);
        assert!(check.reason.contains("5/5"));
    }

    #[test]
    fn below_limit_is_allowed() {
        let check = account_with(4, 5).evaluate(LimitAction::GenerateIdea);
        assert!(check.can_proceed);
        assert!(check.reason.is_empty());
    }

    #[test]
    fn unlimited_sentinel_always_allows() {
        let check = account_with(1_000_000, UNLIMITED).evaluate(LimitAction::GenerateIdea);
        assert!(check.can_proceed);
    }

    #[test]
    fn deploy_project_uses_active_project_cap() {
        let mut account = account_with(0, 5);
        account.usage.active_projects = 1;
        let check = account.evaluate(LimitAction::DeployProject);
        assert!(!check.can_proceed);
        assert!(check.reason.contains("1/1"));
    }

    #[test]
    fn suspended_account_is_denied() {
        let mut account = account_with(0, 5);
        account.status = AccountStatus::Suspended;
        assert!(!account.evaluate(LimitAction::StartBuild).can_proceed);
    }

    #[test]
    fn monthly_reset_triggers_on_month_or_year_change() {
        let mut account = account_with(3, 5);
        account.usage.builds_started = 2;
        account.usage.active_projects = 1;
        account.last_reset_at = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 0).unwrap();

        let same_month = Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap();
        assert!(!account.needs_monthly_reset(same_month));

        let next_year = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 1).unwrap();
        assert!(account.apply_monthly_reset(next_year));
        assert_eq!(account.usage.ideas_generated, 0);
        assert_eq!(account.usage.builds_started, 0);
        assert_eq!(account.usage.active_projects, 1);
        assert_eq!(account.last_reset_at, next_year);

        // Second application within the same month is a no-op.
        assert!(!account.apply_monthly_reset(next_year));
    }

    #[test]
    fn same_month_different_year_still_resets() {
        let mut account = account_with(3, 5);
        account.last_reset_at = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        assert!(account.needs_monthly_reset(now));
    }

    #[test]
    fn try_consume_stops_at_limit() {
        let mut account = account_with(4, 5);
        let now = Utc::now();
        assert!(account.try_consume(QuotaCounter::IdeasGenerated, now));
        assert_eq!(account.usage.ideas_generated, 5);
        assert!(!account.try_consume(QuotaCounter::IdeasGenerated, now));
        assert_eq!(account.usage.ideas_generated, 5);
    }

    #[test]
    fn plan_change_clears_subscription_on_cancel() {
        let mut account = account_with(0, 5);
        account.set_plan(Plan::Founder);
        account.subscription_id = Some("sub_1".to_string());
        let at = Utc::now();

        PlanChange {
            plan: Plan::Free,
            status: SubscriptionStatus::Canceled,
            customer_id: None,
            subscription: SubscriptionLink::End("sub_1".to_string()),
        }
        .apply_to(&mut account, at);

        assert_eq!(account.plan, Plan::Free);
        assert_eq!(account.limits, Plan::Free.limits());
        assert_eq!(account.subscription_id, None);
        assert_eq!(account.ended_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(account.subscription_status, Some(SubscriptionStatus::Canceled));
        assert_eq!(account.billing_event_at, Some(at));
    }

    #[test]
    fn set_plan_keeps_limits_paired() {
        let mut account = account_with(0, 5);
        account.set_plan(Plan::Team);
        assert_eq!(account.plan, Plan::Team);
        assert_eq!(account.limits, Plan::Team.limits());
    }

    #[test]
    fn ended_subscription_is_not_revived_by_same_second_update() {
        let mut account = account_with(0, 5);
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
        PlanChange {
            plan: Plan::Free,
            status: SubscriptionStatus::Canceled,
            customer_id: None,
            subscription: SubscriptionLink::End("sub_1".to_string()),
        }
        .apply_to(&mut account, at);

        let revive = PlanChange {
            plan: Plan::Team,
            status: SubscriptionStatus::Active,
            customer_id: None,
            subscription: SubscriptionLink::Set("sub_1".to_string()),
        };
        assert!(!revive.supersedes(&account, at));
        assert!(!revive.supersedes(&account, at + chrono::Duration::seconds(5)));

        let replacement = PlanChange {
            subscription: SubscriptionLink::Set("sub_2".to_string()),
            ..revive
        };
        assert!(replacement.supersedes(&account, at));
        assert!(!replacement.supersedes(&account, at - chrono::Duration::seconds(1)));
    }

    #[test]
    fn terminal_statuses() {
        assert!(SubscriptionStatus::Canceled.is_terminal());
        assert!(SubscriptionStatus::IncompleteExpired.is_terminal());
        assert!(!SubscriptionStatus::PastDue.is_terminal());
        assert!(!SubscriptionStatus::Active.is_terminal());
    }
}
