//! Payment-provider webhook events, decoded into a closed set at the boundary.

use super::account::SubscriptionStatus;
use super::plan::Plan;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// Metadata keys written on checkout sessions we create.
pub const METADATA_ACCOUNT_ID: &str = "account_id";
pub const METADATA_PLAN: &str = "plan";
pub const METADATA_PRICE_ID: &str = "price_id";

#[derive(Error, Debug, PartialEq)]
pub enum BillingEventError {
    #[error("Malformed event payload: {0}")]
    Malformed(String),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Invalid account id in metadata: {0}")]
    InvalidAccountId(String),
    #[error("Unrecognized plan key: {0}")]
    InvalidPlan(String),
    #[error("Unrecognized subscription status: {0}")]
    InvalidStatus(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BillingEnvelope {
    pub id: String,
    pub created: DateTime<Utc>,
    pub event: BillingEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BillingEvent {
    CheckoutCompleted(CheckoutCompleted),
    SubscriptionUpdated(SubscriptionChange),
    SubscriptionDeleted(SubscriptionChange),
    /// Any event type this service does not act on.
    Ignored { event_type: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutCompleted {
    pub session_id: String,
    pub account_id: Uuid,
    pub plan: Plan,
    pub price_id: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionChange {
    pub subscription_id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
}

impl BillingEvent {
    pub fn kind(&self) -> &str {
        match self {
            BillingEvent::CheckoutCompleted(_) => CHECKOUT_SESSION_COMPLETED,
            BillingEvent::SubscriptionUpdated(_) => SUBSCRIPTION_UPDATED,
            BillingEvent::SubscriptionDeleted(_) => SUBSCRIPTION_DELETED,
            BillingEvent::Ignored { event_type } => event_type,
        }
    }
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: Value,
}

#[derive(Deserialize)]
struct RawCheckoutSession {
    id: String,
    #[serde(default)]
    customer: Option<Value>,
    #[serde(default)]
    subscription: Option<Value>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    line_items: Option<RawList<RawLineItem>>,
}

#[derive(Deserialize)]
struct RawSubscription {
    id: String,
    customer: Value,
    status: String,
    #[serde(default)]
    items: Option<RawList<RawLineItem>>,
}

#[derive(Deserialize)]
struct RawList<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct RawLineItem {
    #[serde(default)]
    price: Option<RawPrice>,
}

#[derive(Deserialize)]
struct RawPrice {
    id: String,
}

/// Stripe fields that may be either an id string or an expanded object.
fn expandable_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn first_price(list: Option<RawList<RawLineItem>>) -> Option<String> {
    list?.data.into_iter().find_map(|item| item.price.map(|p| p.id))
}

fn malformed(err: serde_json::Error) -> BillingEventError {
    BillingEventError::Malformed(err.to_string())
}

/// Decodes a verified webhook body.
pub fn decode_event(payload: &[u8]) -> Result<BillingEnvelope, BillingEventError> {
    let raw: RawEvent = serde_json::from_slice(payload).map_err(malformed)?;
    let created = Utc
        .timestamp_opt(raw.created, 0)
        .single()
        .ok_or_else(|| BillingEventError::Malformed(format!("bad created timestamp {}", raw.created)))?;

    let event = match raw.event_type.as_str() {
        CHECKOUT_SESSION_COMPLETED => {
            BillingEvent::CheckoutCompleted(decode_checkout(raw.data.object)?)
        }
        SUBSCRIPTION_UPDATED => BillingEvent::SubscriptionUpdated(decode_subscription(raw.data.object)?),
        SUBSCRIPTION_DELETED => BillingEvent::SubscriptionDeleted(decode_subscription(raw.data.object)?),
        _ => BillingEvent::Ignored {
            event_type: raw.event_type,
        },
    };

    Ok(BillingEnvelope {
        id: raw.id,
        created,
        event,
    })
}

fn decode_checkout(object: Value) -> Result<CheckoutCompleted, BillingEventError> {
    let session: RawCheckoutSession = serde_json::from_value(object).map_err(malformed)?;
    let metadata = session.metadata.unwrap_or_default();

    let account_raw = metadata
        .get(METADATA_ACCOUNT_ID)
        .or_else(|| metadata.get("userId"))
        .filter(|s| !s.is_empty())
        .ok_or(BillingEventError::MissingField("metadata.account_id"))?;
    let account_id = Uuid::parse_str(account_raw)
        .map_err(|_| BillingEventError::InvalidAccountId(account_raw.clone()))?;

    let plan_raw = metadata
        .get(METADATA_PLAN)
        .filter(|s| !s.is_empty())
        .ok_or(BillingEventError::MissingField("metadata.plan"))?;
    let plan = Plan::from_str(plan_raw)
        .ok()
        .filter(|p| p.is_paid())
        .ok_or_else(|| BillingEventError::InvalidPlan(plan_raw.clone()))?;

    let price_id = first_price(session.line_items).or_else(|| {
        metadata
            .get(METADATA_PRICE_ID)
            .filter(|s| !s.is_empty())
            .cloned()
    });

    Ok(CheckoutCompleted {
        session_id: session.id,
        account_id,
        plan,
        price_id,
        customer_id: expandable_id(session.customer.as_ref()),
        subscription_id: expandable_id(session.subscription.as_ref()),
    })
}

fn decode_subscription(object: Value) -> Result<SubscriptionChange, BillingEventError> {
    let sub: RawSubscription = serde_json::from_value(object).map_err(malformed)?;
    let customer_id =
        expandable_id(Some(&sub.customer)).ok_or(BillingEventError::MissingField("customer"))?;
    let status = SubscriptionStatus::from_str(&sub.status)
        .map_err(|_| BillingEventError::InvalidStatus(sub.status.clone()))?;

    Ok(SubscriptionChange {
        subscription_id: sub.id,
        customer_id,
        status,
        price_id: first_price(sub.items),
    })
}
