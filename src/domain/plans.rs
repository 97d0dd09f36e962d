//! Subscription plans and their limits.

use serde::{Deserialize, Serialize};

/// Limit value meaning "no limit".
pub const UNLIMITED: i32 = -1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Starter,
    Pro,
    Enterprise,
}

impl Default for Plan {
    fn default() -> Self {
        Self::Starter
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PlanLimits {
    pub max_users: i32,
    pub max_storage_gb: i32,
}

/// Public catalogue entry for a plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanDetails {
    pub name: &'static str,
    pub value: Plan,
    pub price: u32,
    pub currency: &'static str,
    pub period: &'static str,
    pub features: &'static [&'static str],
    pub limits: PlanLimits,
    pub popular: bool,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Starter, Plan::Pro, Plan::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "starter" => Some(Self::Starter),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Starter => "Starter",
            Self::Pro => "Pro",
            Self::Enterprise => "Enterprise",
        }
    }

    /// Monthly price in whole US dollars.
    pub fn monthly_price(&self) -> u32 {
        match self {
            Self::Starter => 29,
            Self::Pro => 79,
            Self::Enterprise => 199,
        }
    }

    /// Price in the smallest currency unit (cents / paise).
    pub fn price_minor_units(&self) -> u64 {
        u64::from(self.monthly_price()) * 100
    }

    pub fn limits(&self) -> PlanLimits {
        match self {
            Self::Starter => PlanLimits {
                max_users: 5,
                max_storage_gb: 10,
            },
            Self::Pro => PlanLimits {
                max_users: 20,
                max_storage_gb: 100,
            },
            Self::Enterprise => PlanLimits {
                max_users: UNLIMITED,
                max_storage_gb: UNLIMITED,
            },
        }
    }

    pub fn features(&self) -> &'static [&'static str] {
        match self {
            Self::Starter => &[
                "Up to 5 users",
                "100 leads",
                "Basic reporting",
                "Email support",
                "10GB storage",
            ],
            Self::Pro => &[
                "Up to 20 users",
                "Unlimited leads",
                "Advanced reporting",
                "Priority support",
                "100GB storage",
                "WhatsApp integration",
                "Custom branding",
            ],
            Self::Enterprise => &[
                "Unlimited users",
                "Unlimited everything",
                "Custom integrations",
                "Dedicated support",
                "Unlimited storage",
                "API access",
                "White-label solution",
            ],
        }
    }

    /// Only moves to a strictly higher tier are allowed.
    pub fn can_upgrade_to(&self, target: Plan) -> bool {
        target > *self
    }

    pub fn details(&self) -> PlanDetails {
        PlanDetails {
            name: self.display_name(),
            value: *self,
            price: self.monthly_price(),
            currency: "USD",
            period: "month",
            features: self.features(),
            limits: self.limits(),
            popular: matches!(self, Self::Pro),
        }
    }

    pub fn catalogue() -> Vec<PlanDetails> {
        Self::ALL.iter().map(Plan::details).collect()
    }
}

/// Whether adding one more user would exceed `max_users`.
pub fn user_limit_reached(current_users: i64, max_users: i32) -> bool {
    max_users != UNLIMITED && current_users >= i64::from(max_users)
}

/// Usage as a percentage of the limit, 0 for unlimited or zero limits.
pub fn usage_percentage(current: f64, limit: i32) -> f64 {
    if limit <= 0 {
        return 0.0;
    }
    ((current / f64::from(limit)) * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrades_only_move_up() {
        assert!(Plan::Starter.can_upgrade_to(Plan::Pro));
        assert!(Plan::Starter.can_upgrade_to(Plan::Enterprise));
        assert!(Plan::Pro.can_upgrade_to(Plan::Enterprise));
        assert!(!Plan::Pro.can_upgrade_to(Plan::Pro));
        assert!(!Plan::Enterprise.can_upgrade_to(Plan::Starter));
    }

    #[test]
    fn catalogue_marks_pro_as_popular() {
        let plans = Plan::catalogue();
        assert_eq!(plans.len(), 3);
        let popular: Vec<_> = plans.iter().filter(|p| p.popular).map(|p| p.value).collect();
        assert_eq!(popular, vec![Plan::Pro]);
        assert_eq!(plans[2].limits.max_users, UNLIMITED);
    }

    #[test]
    fn parse_round_trips_known_names() {
        for plan in Plan::ALL {
            assert_eq!(Plan::parse(plan.as_str()), Some(plan));
        }
        assert_eq!(Plan::parse("gold"), None);
    }

    #[test]
    fn user_limit_respects_unlimited() {
        assert!(user_limit_reached(5, 5));
        assert!(!user_limit_reached(4, 5));
        assert!(!user_limit_reached(10_000, UNLIMITED));
    }

    #[test]
    fn usage_percentage_rounds_to_one_decimal() {
        assert_eq!(usage_percentage(1.0, 3), 33.3);
        assert_eq!(usage_percentage(5.0, UNLIMITED), 0.0);
        assert_eq!(Plan::Pro.price_minor_units(), 7900);
    }
}
