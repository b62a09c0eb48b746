use crate::application::{AdminError, BillingError, BuildError, EntitlementError, IdeaError};
use crate::domain::LimitCheck;
use crate::infrastructure::{GenerationError, PaymentError, RepositoryError, SignatureError};
use axum::http::StatusCode;
use serde_json::json;

pub(super) type ErrorResponse = (StatusCode, serde_json::Value);

fn error_body(status: StatusCode, message: impl Into<String>) -> ErrorResponse {
    (status, json!({ "error": message.into() }))
}

/// 403 body a client can render a paywall from.
pub(super) fn quota_exceeded(check: &LimitCheck) -> ErrorResponse {
    (
        StatusCode::FORBIDDEN,
        json!({
            "error": "Quota exceeded",
            "canProceed": false,
            "reason": check.reason,
            "usage": check.usage,
            "limits": check.limits,
            "plan": check.plan,
        }),
    )
}

pub(super) fn map_repository_error(err: &RepositoryError, entity: &str) -> ErrorResponse {
    match err {
        RepositoryError::NotFound(_) => {
            error_body(StatusCode::NOT_FOUND, format!("{} not found", entity))
        }
        RepositoryError::Conflict(msg) => error_body(StatusCode::CONFLICT, msg.clone()),
        _ => error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
    }
}

pub(super) fn map_entitlement_error(err: &EntitlementError) -> ErrorResponse {
    match err {
        EntitlementError::InvalidArgument(msg) => error_body(StatusCode::BAD_REQUEST, msg.clone()),
        EntitlementError::Repository(e) => map_repository_error(e, "Account"),
    }
}

pub(super) fn map_idea_error(err: &IdeaError) -> ErrorResponse {
    match err {
        IdeaError::QuotaExceeded(check) => quota_exceeded(check),
        IdeaError::Generation(GenerationError::RateLimited) => error_body(
            StatusCode::TOO_MANY_REQUESTS,
            "Idea generator is rate limited, please retry",
        ),
        IdeaError::Generation(_) => {
            error_body(StatusCode::BAD_GATEWAY, "Failed to generate idea")
        }
        IdeaError::Timeout(_) => {
            error_body(StatusCode::GATEWAY_TIMEOUT, "Idea generation timed out")
        }
        IdeaError::Repository(e) => map_repository_error(e, "Account"),
    }
}

pub(super) fn map_build_error(err: &BuildError) -> ErrorResponse {
    match err {
        BuildError::QuotaExceeded(check) => quota_exceeded(check),
        BuildError::PermissionDenied(msg) => error_body(StatusCode::FORBIDDEN, msg.clone()),
        BuildError::InvalidTransition { from, to } => (
            StatusCode::CONFLICT,
            json!({
                "error": "Invalid build transition",
                "from": from,
                "to": to,
            }),
        ),
        BuildError::Contended(_) => {
            error_body(StatusCode::CONFLICT, "Build changed concurrently, please retry")
        }
        BuildError::Repository(e) => map_repository_error(e, "Build"),
    }
}

pub(super) fn map_billing_error(err: &BillingError) -> ErrorResponse {
    match err {
        BillingError::Signature(SignatureError::NotConfigured) => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook verification is not configured",
        ),
        BillingError::Signature(_) => {
            error_body(StatusCode::BAD_REQUEST, "Webhook signature verification failed")
        }
        BillingError::InvalidEvent(e) => {
            error_body(StatusCode::BAD_REQUEST, format!("Webhook error: {}", e))
        }
        BillingError::InvalidArgument(msg) => error_body(StatusCode::BAD_REQUEST, msg.clone()),
        BillingError::Payment(PaymentError::RateLimited) => error_body(
            StatusCode::TOO_MANY_REQUESTS,
            "Payment provider is rate limited, please retry",
        ),
        BillingError::Payment(_) => {
            error_body(StatusCode::BAD_GATEWAY, "Failed to create checkout session")
        }
        BillingError::Timeout(_) => {
            error_body(StatusCode::GATEWAY_TIMEOUT, "Payment provider timed out")
        }
        BillingError::Repository(e) => map_repository_error(e, "Account"),
    }
}

pub(super) fn map_admin_error(err: &AdminError) -> ErrorResponse {
    match err {
        AdminError::PermissionDenied(msg) => error_body(StatusCode::FORBIDDEN, msg.clone()),
        AdminError::InvalidArgument(msg) => error_body(StatusCode::BAD_REQUEST, msg.clone()),
        AdminError::Repository(e) => map_repository_error(e, "Account"),
    }
}

pub(super) fn unauthorized() -> ErrorResponse {
    error_body(StatusCode::UNAUTHORIZED, "Unauthorized")
}

pub(super) fn bad_request(message: impl Into<String>) -> ErrorResponse {
    error_body(StatusCode::BAD_REQUEST, message)
}
