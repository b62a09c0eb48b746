use crate::domain::{BuildStatus, LimitAction, Plan};
use std::str::FromStr;

pub(super) fn parse_plan(plan: &str) -> Option<Plan> {
    Plan::from_str(plan.trim()).ok()
}

pub(super) fn parse_paid_plan(plan: &str) -> Option<Plan> {
    parse_plan(plan).filter(|p| p.is_paid())
}

/// Accepts both the snake_case wire names and the camelCase names web
/// clients send (`generateIdea`).
pub(super) fn parse_limit_action(action: &str) -> Option<LimitAction> {
    match action.trim() {
        "generate_idea" | "generateIdea" => Some(LimitAction::GenerateIdea),
        "start_build" | "startBuild" => Some(LimitAction::StartBuild),
        "deploy_project" | "deployProject" => Some(LimitAction::DeployProject),
        _ => None,
    }
}

pub(super) fn parse_build_status(status: &str) -> Option<BuildStatus> {
    BuildStatus::from_str(status.trim()).ok()
}

pub(super) fn allowed_plans() -> Vec<String> {
    Plan::PAID.iter().map(|p| p.to_string()).collect()
}

pub(super) fn allowed_build_statuses() -> Vec<String> {
    BuildStatus::SEQUENCE.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_values() {
        assert_eq!(parse_plan("team"), Some(Plan::Team));
        assert_eq!(parse_paid_plan("founder"), Some(Plan::Founder));
        assert_eq!(parse_limit_action("generateIdea"), Some(LimitAction::GenerateIdea));
        assert_eq!(parse_limit_action("deploy_project"), Some(LimitAction::DeployProject));
        assert_eq!(parse_build_status("deploying"), Some(BuildStatus::Deploying));
    }

    #[test]
    fn parse_invalid_inputs_return_none() {
        assert!(parse_plan("gold").is_none());
        assert!(parse_paid_plan("free").is_none());
        assert!(parse_limit_action("delete_everything").is_none());
        assert!(parse_build_status("done").is_none());
    }

    #[test]
    fn allowed_plans_are_paid_only() {
        assert_eq!(allowed_plans(), vec!["founder", "team", "enterprise"]);
    }
}
