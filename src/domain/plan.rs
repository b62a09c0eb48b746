use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};

/// Sentinel stored in a limit field meaning "no cap".
pub const UNLIMITED: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Plan {
    Free,
    Founder,
    Team,
    Enterprise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    pub ideas_per_month: i32,
    pub builds_per_month: i32,
    pub max_active_projects: i32,
    /// GB
    pub storage_limit: i32,
    /// GB
    pub bandwidth_limit: i32,
    pub seats: i32,
}

const FREE_LIMITS: Limits = Limits {
    ideas_per_month: 5,
    builds_per_month: 2,
    max_active_projects: 1,
    storage_limit: 1,
    bandwidth_limit: 5,
    seats: 1,
};

const FOUNDER_LIMITS: Limits = Limits {
    ideas_per_month: 50,
    builds_per_month: 20,
    max_active_projects: 5,
    storage_limit: 10,
    bandwidth_limit: 50,
    seats: 1,
};

const TEAM_LIMITS: Limits = Limits {
    ideas_per_month: 1000,
    builds_per_month: 100,
    max_active_projects: 20,
    storage_limit: 50,
    bandwidth_limit: 250,
    seats: 5,
};

const ENTERPRISE_LIMITS: Limits = Limits {
    ideas_per_month: UNLIMITED,
    builds_per_month: UNLIMITED,
    max_active_projects: UNLIMITED,
    storage_limit: 1000,
    bandwidth_limit: 5000,
    seats: 50,
};

impl Plan {
    pub const ALL: [Plan; 4] = [Plan::Free, Plan::Founder, Plan::Team, Plan::Enterprise];

    /// Plans that can be bought through checkout.
    pub const PAID: [Plan; 3] = [Plan::Founder, Plan::Team, Plan::Enterprise];

    /// The most restrictive plan, used for new accounts and as the fallback
    /// for anything billing cannot resolve.
    pub fn most_restrictive() -> Self {
        Plan::Free
    }

    pub fn limits(self) -> Limits {
        match self {
            Plan::Free => FREE_LIMITS,
            Plan::Founder => FOUNDER_LIMITS,
            Plan::Team => TEAM_LIMITS,
            Plan::Enterprise => ENTERPRISE_LIMITS,
        }
    }

    /// Monthly list price in USD, used for the admin MRR figure.
    pub fn monthly_price_usd(self) -> i64 {
        match self {
            Plan::Free => 0,
            Plan::Founder => 49,
            Plan::Team => 99,
            Plan::Enterprise => 999,
        }
    }

    pub fn is_paid(self) -> bool {
        self != Plan::Free
    }

    /// Human facing name used in notification copy.
    pub fn display_name(self) -> &'static str {
        match self {
            Plan::Free => "Free",
            Plan::Founder => "Founder",
            Plan::Team => "Team",
            Plan::Enterprise => "Enterprise",
        }
    }
}

/// True when `used` still fits under `limit`, honouring the unlimited sentinel.
pub fn within_limit(used: i32, limit: i32) -> bool {
    limit == UNLIMITED || used < limit
}

/// Maps payment-provider price ids onto plans.
///
/// Kept apart from [`Plan::limits`] so an unknown price id is an explicit
/// `None` that callers resolve to [`Plan::most_restrictive`].
#[derive(Debug, Clone, Default)]
pub struct PriceCatalog {
    by_price: HashMap<String, Plan>,
}

impl PriceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a price id for a paid plan. Empty ids are ignored so an
    /// unset config value never matches anything.
    pub fn with_price(mut self, plan: Plan, price_id: impl Into<String>) -> Self {
        let price_id = price_id.into();
        if !price_id.trim().is_empty() && plan.is_paid() {
            self.by_price.insert(price_id, plan);
        }
        self
    }

    pub fn plan_for_price(&self, price_id: &str) -> Option<Plan> {
        self.by_price.get(price_id).copied()
    }

    /// Resolves a price id, falling back to the free plan when it is unknown.
    pub fn plan_for_price_or_free(&self, price_id: Option<&str>) -> Plan {
        price_id
            .and_then(|id| self.plan_for_price(id))
            .unwrap_or_else(Plan::most_restrictive)
    }

    pub fn price_for_plan(&self, plan: Plan) -> Option<&str> {
        self.by_price
            .iter()
            .find(|(_, p)| **p == plan)
            .map(|(id, _)| id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn plan_keys_round_trip_through_strum() {
        for plan in Plan::ALL {
            assert_eq!(Plan::from_str(&plan.to_string()).unwrap(), plan);
        }
        assert!(Plan::from_str("platinum").is_err());
    }

    #[test]
    fn enterprise_has_unlimited_monthly_quotas() {
        let limits = Plan::Enterprise.limits();
        assert_eq!(limits.ideas_per_month, UNLIMITED);
        assert_eq!(limits.builds_per_month, UNLIMITED);
        assert_eq!(limits.max_active_projects, UNLIMITED);
    }

    #[test]
    fn within_limit_is_strict() {
        assert!(within_limit(4, 5));
        assert!(!within_limit(5, 5));
        assert!(!within_limit(6, 5));
        assert!(within_limit(10_000, UNLIMITED));
        assert!(!within_limit(0, 0));
    }

    #[test]
    fn unknown_price_falls_back_to_free() {
        let catalog = PriceCatalog::new()
            .with_price(Plan::Founder, "price_founder")
            .with_price(Plan::Team, "");

        assert_eq!(catalog.plan_for_price("price_founder"), Some(Plan::Founder));
        assert_eq!(catalog.plan_for_price(""), None);
        assert_eq!(catalog.plan_for_price_or_free(Some("price_nope")), Plan::Free);
        assert_eq!(catalog.plan_for_price_or_free(None), Plan::Free);
        assert_eq!(catalog.price_for_plan(Plan::Founder), Some("price_founder"));
        assert_eq!(catalog.price_for_plan(Plan::Team), None);
    }
}
