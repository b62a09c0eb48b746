use crate::domain::{Account, Build, Idea};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const DEFAULT_CHANNEL_SIZE: usize = 256;

/// Record changes pushed to connected dashboards.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    IdeaCreated { idea: Idea },
    BuildChanged { build: Build },
    AccountChanged { account: Account },
}

impl ChangeEvent {
    /// Account the change belongs to, if any.
    pub fn account_id(&self) -> Option<Uuid> {
        match self {
            ChangeEvent::IdeaCreated { idea } => Some(idea.account_id),
            ChangeEvent::BuildChanged { build } => build.account_id,
            ChangeEvent::AccountChanged { account } => Some(account.id),
        }
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_SIZE)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Best effort: with no subscribers the event is dropped.
    pub fn publish(&self, event: ChangeEvent) {
        if self.tx.send(event).is_err() && self.tx.receiver_count() > 0 {
            tracing::warn!("Failed to publish change event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GeneratedIdea;

    fn idea() -> Idea {
        Idea::new(
            Uuid::new_v4(),
            GeneratedIdea {
                title: "Pagewise".to_string(),
                description: "Docs search".to_string(),
                problem: String::new(),
                solution: String::new(),
                target_audience: String::new(),
                tech_stack: vec![],
                features: vec![],
                monetization: String::new(),
                market_size: String::new(),
                competitors: vec![],
                score: 60.0,
            },
        )
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let feed = ChangeFeed::default();
        let mut rx = feed.subscribe();
        let idea = idea();
        let owner = idea.account_id;

        feed.publish(ChangeEvent::IdeaCreated { idea });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.account_id(), Some(owner));
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        let feed = ChangeFeed::new(4);
        feed.publish(ChangeEvent::IdeaCreated { idea: idea() });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let value = serde_json::to_value(ChangeEvent::IdeaCreated { idea: idea() }).unwrap();
        assert_eq!(value["type"], "idea_created");
        assert_eq!(value["idea"]["title"], "Pagewise");
    }
}
