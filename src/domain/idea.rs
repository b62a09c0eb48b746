use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Idea {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(flatten)]
    pub content: GeneratedIdea,
    pub status: IdeaStatus,
    pub staging_url: Option<String>,
    pub production_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IdeaStatus {
    Pending,
    Building,
    Staging,
    Deployed,
}

impl IdeaStatus {
    /// Ideas only move forward through their lifecycle.
    pub fn can_advance_to(self, next: IdeaStatus) -> bool {
        next > self
    }

    /// Statuses from which `next` is reachable.
    pub fn predecessors(next: IdeaStatus) -> Vec<IdeaStatus> {
        [
            IdeaStatus::Pending,
            IdeaStatus::Building,
            IdeaStatus::Staging,
            IdeaStatus::Deployed,
        ]
        .into_iter()
        .filter(|s| s.can_advance_to(next))
        .collect()
    }
}

/// Structured fields returned by the idea generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedIdea {
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub description: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub monetization: String,
    #[serde(default)]
    pub market_size: String,
    #[serde(default)]
    pub competitors: Vec<String>,
    #[serde(alias = "slavkoScore")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub score: f64,
}

impl GeneratedIdea {
    /// Rejects generator output that would not make a usable idea record.
    pub fn check_output(&self) -> Result<(), Vec<String>> {
        let mut errors: Vec<String> = match self.validate() {
            Ok(()) => Vec::new(),
            Err(e) => {
                let mut fields: Vec<&str> = e.field_errors().keys().copied().collect();
                fields.sort_unstable();
                fields
                    .into_iter()
                    .map(|field| format!("{} is invalid", field))
                    .collect()
            }
        };

        // length(min = 1) accepts whitespace; range accepts NaN.
        if !self.title.is_empty() && self.title.trim().is_empty() {
            errors.push("title must not be blank".to_string());
        }
        if !self.description.is_empty() && self.description.trim().is_empty() {
            errors.push("description must not be blank".to_string());
        }
        if self.score.is_nan() {
            errors.push("score must be a number".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Idea {
    pub fn new(account_id: Uuid, content: GeneratedIdea) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id,
            content,
            status: IdeaStatus::Pending,
            staging_url: None,
            production_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GeneratedIdea {
        serde_json::from_value(serde_json::json!({
            "title": "ShipFast",
            "description": "Launch kits for indie hackers",
            "techStack": ["Rust", "Postgres"],
            "slavkoScore": 87
        }))
        .unwrap()
    }

    #[test]
    fn decodes_generator_payload_with_optional_fields_missing() {
        let idea = sample();
        assert_eq!(idea.title, "ShipFast");
        assert_eq!(idea.tech_stack, vec!["Rust".to_string(), "Postgres".to_string()]);
        assert!(idea.competitors.is_empty());
        assert_eq!(idea.score, 87.0);
        assert!(idea.check_output().is_ok());
    }

    #[test]
    fn rejects_missing_required_fields() {
        let res: Result<GeneratedIdea, _> =
            serde_json::from_value(serde_json::json!({ "title": "x" }));
        assert!(res.is_err());
    }

    #[test]
    fn validate_flags_blank_title_and_out_of_range_score() {
        let mut idea = sample();
        idea.title = "  ".to_string();
        idea.score = 140.0;
        let errors = idea.check_output().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("title")));
        assert!(errors.iter().any(|e| e.contains("score")));
    }

    #[test]
    fn validate_flags_empty_description_and_nan_score() {
        let mut idea = sample();
        idea.description = String::new();
        idea.score = f64::NAN;
        let errors = idea.check_output().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("description")));
        assert!(errors.iter().any(|e| e.contains("score")));

        let mut idea = sample();
        idea.score = 100.0;
        assert!(idea.check_output().is_ok());
    }

    #[test]
    fn status_only_moves_forward() {
        assert!(IdeaStatus::Pending.can_advance_to(IdeaStatus::Building));
        assert!(IdeaStatus::Building.can_advance_to(IdeaStatus::Staging));
        assert!(!IdeaStatus::Staging.can_advance_to(IdeaStatus::Building));
        assert!(!IdeaStatus::Building.can_advance_to(IdeaStatus::Building));
        assert_eq!(
            IdeaStatus::predecessors(IdeaStatus::Staging),
            vec![IdeaStatus::Pending, IdeaStatus::Building]
        );
    }
}
