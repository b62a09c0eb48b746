use super::http_auth::{extract_actor, has_service_token, ACTOR_HEADER};
use super::http_errors::{
    bad_request, map_admin_error, map_billing_error, map_build_error, map_entitlement_error,
    map_idea_error, unauthorized, ErrorResponse,
};
use super::http_parse::{
    allowed_build_statuses, allowed_plans, parse_build_status, parse_limit_action,
    parse_paid_plan,
};
use super::http_types::{
    change_event_payload, AccountResponse, BuildResponse, BuildStatusRequest,
    BuildUpdateResponse, CheckLimitsRequest, CheckoutSessionRequest, CheckoutSessionResponse,
    CreateAccountRequest, GenerateIdeaRequest, HealthResponse, IdeaCreatedResponse,
    LimitCheckResponse, PaginationParams, StartBuildRequest, SuspendRequest, TestResultsBody,
    WebhookResponse,
};
use super::state::AppState;
use crate::application::{BuildUpdateOutcome, WebhookOutcome};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;
use validator::Validate;

/// Header the billing provider signs webhook deliveries with.
const SIGNATURE_HEADER: &str = "stripe-signature";

type JsonResponse = (StatusCode, Json<serde_json::Value>);

fn reply(status: StatusCode, body: impl serde::Serialize) -> JsonResponse {
    (status, Json(json!(body)))
}

fn reply_error((status, body): ErrorResponse) -> JsonResponse {
    (status, Json(body))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/accounts", post(create_account))
        .route("/accounts/:id", get(get_account))
        .route("/accounts/:id/ideas", get(list_ideas))
        .route("/accounts/:id/builds", get(list_builds))
        .route("/accounts/:id/events", get(account_events))
        .route("/limits/check", post(check_limits))
        .route("/ideas", post(generate_idea))
        .route("/builds", post(start_build))
        .route("/builds/:id", get(get_build))
        .route("/builds/:id/status", post(report_build_status))
        .route("/billing/checkout", post(create_checkout_session))
        .route("/billing/webhook", post(billing_webhook))
        .route("/admin/stats", get(admin_stats))
        .route("/admin/users", get(admin_list_users))
        .route("/admin/users/:id/suspend", post(admin_suspend_user))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        create_account,
        get_account,
        list_ideas,
        list_builds,
        account_events,
        check_limits,
        generate_idea,
        start_build,
        get_build,
        report_build_status,
        create_checkout_session,
        billing_webhook,
        admin_stats,
        admin_list_users,
        admin_suspend_user,
    ),
    components(
        schemas(
            HealthResponse,
            CreateAccountRequest,
            AccountResponse,
            CheckLimitsRequest,
            LimitCheckResponse,
            GenerateIdeaRequest,
            IdeaCreatedResponse,
            StartBuildRequest,
            BuildResponse,
            BuildStatusRequest,
            TestResultsBody,
            BuildUpdateResponse,
            CheckoutSessionRequest,
            CheckoutSessionResponse,
            WebhookResponse,
            SuspendRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Accounts", description = "Account provisioning and profile"),
        (name = "Limits", description = "Plan limit checks"),
        (name = "Ideas", description = "Idea generation"),
        (name = "Builds", description = "Build lifecycle"),
        (name = "Billing", description = "Checkout and billing webhooks"),
        (name = "Admin", description = "Operator endpoints"),
    ),
    info(
        title = "InnovaForge API",
        version = "0.1.0",
        description = "Entitlements, quota-gated idea and build actions, and billing sync",
        license(name = "MIT")
    )
)]
struct ApiDoc;

/// Verifies database connectivity and returns service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    )
)]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                error: None,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Health check failed: DB connectivity issue");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    error: Some("Database connectivity failed".to_string()),
                }),
            )
        }
    }
}

/// Create the account record for a new sign-up (free plan).
#[utoipa::path(
    post,
    path = "/accounts",
    tag = "Accounts",
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created", body = AccountResponse),
        (status = 400, description = "Invalid input", body = Object),
        (status = 409, description = "Account already exists", body = Object)
    )
)]
async fn create_account(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> impl IntoResponse {
    if let Err(e) = req.validate() {
        return reply_error(bad_request(format!("Invalid account: {}", e)));
    }

    match state.entitlements.create_account(req.external_id, req.email).await {
        Ok(account) => reply(StatusCode::CREATED, AccountResponse::from(account)),
        Err(e) => {
            error!(error = %e, "Failed to create account");
            reply_error(map_entitlement_error(&e))
        }
    }
}

#[utoipa::path(
    get,
    path = "/accounts/{id}",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account profile", body = AccountResponse),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn get_account(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.entitlements.get_account(id).await {
        Ok(account) => reply(StatusCode::OK, AccountResponse::from(account)),
        Err(e) => reply_error(map_entitlement_error(&e)),
    }
}

#[utoipa::path(
    get,
    path = "/accounts/{id}/ideas",
    tag = "Ideas",
    params(("id" = Uuid, Path, description = "Account ID"), PaginationParams),
    responses(
        (status = 200, description = "Ideas, newest first", body = Object),
        (status = 500, description = "Failed to list ideas", body = Object)
    )
)]
async fn list_ideas(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    match state
        .ideas
        .list_ideas(account_id, params.limit, params.offset)
        .await
    {
        Ok(ideas) => reply(StatusCode::OK, ideas),
        Err(e) => {
            error!(error = %e, "Failed to list ideas");
            reply_error(map_idea_error(&e))
        }
    }
}

#[utoipa::path(
    get,
    path = "/accounts/{id}/builds",
    tag = "Builds",
    params(("id" = Uuid, Path, description = "Account ID"), PaginationParams),
    responses(
        (status = 200, description = "Builds, newest first", body = [BuildResponse]),
        (status = 500, description = "Failed to list builds", body = Object)
    )
)]
async fn list_builds(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    match state
        .builds
        .list_builds(account_id, params.limit, params.offset)
        .await
    {
        Ok(builds) => {
            let builds: Vec<BuildResponse> = builds.into_iter().map(Into::into).collect();
            reply(StatusCode::OK, builds)
        }
        Err(e) => {
            error!(error = %e, "Failed to list builds");
            reply_error(map_build_error(&e))
        }
    }
}

/// Server-sent stream of idea, build and account changes for one account.
#[utoipa::path(
    get,
    path = "/accounts/{id}/events",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account ID")),
    responses((status = 200, description = "text/event-stream of change events"))
)]
async fn account_events(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.feed.subscribe()).filter_map(move |result| {
        // Lagged receivers skip what they missed.
        let event = result.ok()?;
        if event.account_id() != Some(account_id) {
            return None;
        }
        let data = change_event_payload(event)?;
        Some(Ok(Event::default().data(data)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Check whether an action is within the account's plan limits. Never consumes quota.
#[utoipa::path(
    post,
    path = "/limits/check",
    tag = "Limits",
    request_body = CheckLimitsRequest,
    responses(
        (status = 200, description = "Limit decision", body = LimitCheckResponse),
        (status = 400, description = "Unknown action", body = Object),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn check_limits(
    State(state): State<AppState>,
    Json(req): Json<CheckLimitsRequest>,
) -> impl IntoResponse {
    let Some(action) = parse_limit_action(&req.action) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Invalid action",
                "allowed": ["generate_idea", "start_build", "deploy_project"]
            })),
        );
    };

    match state
        .entitlements
        .check_limits(req.account_id, action, Utc::now())
        .await
    {
        Ok(check) => reply(StatusCode::OK, LimitCheckResponse::from(check)),
        Err(e) => {
            error!(account_id = %req.account_id, error = %e, "Limit check failed");
            reply_error(map_entitlement_error(&e))
        }
    }
}

/// Generate a new idea, consuming one idea credit.
#[utoipa::path(
    post,
    path = "/ideas",
    tag = "Ideas",
    request_body = GenerateIdeaRequest,
    responses(
        (status = 200, description = "Idea generated", body = IdeaCreatedResponse),
        (status = 403, description = "Idea quota exhausted", body = Object),
        (status = 404, description = "Account not found", body = Object),
        (status = 502, description = "Generator failed", body = Object),
        (status = 504, description = "Generator timed out", body = Object)
    )
)]
async fn generate_idea(
    State(state): State<AppState>,
    Json(req): Json<GenerateIdeaRequest>,
) -> impl IntoResponse {
    match state.ideas.generate_idea(req.account_id).await {
        Ok(idea) => reply(
            StatusCode::OK,
            IdeaCreatedResponse { id: idea.id, idea },
        ),
        Err(e) => reply_error(map_idea_error(&e)),
    }
}

/// Queue a build for an owned idea, consuming one build credit.
#[utoipa::path(
    post,
    path = "/builds",
    tag = "Builds",
    request_body = StartBuildRequest,
    responses(
        (status = 201, description = "Build queued", body = Object),
        (status = 403, description = "Build quota exhausted or idea not owned", body = Object),
        (status = 404, description = "Idea or account not found", body = Object)
    )
)]
async fn start_build(
    State(state): State<AppState>,
    Json(req): Json<StartBuildRequest>,
) -> impl IntoResponse {
    match state
        .builds
        .start_build(req.account_id, req.idea_id, req.target.as_deref())
        .await
    {
        Ok(build) => reply(
            StatusCode::CREATED,
            json!({ "buildId": build.id, "build": BuildResponse::from(build) }),
        ),
        Err(e) => reply_error(map_build_error(&e)),
    }
}

#[utoipa::path(
    get,
    path = "/builds/{id}",
    tag = "Builds",
    params(("id" = Uuid, Path, description = "Build ID")),
    responses(
        (status = 200, description = "Build", body = BuildResponse),
        (status = 404, description = "Build not found", body = Object)
    )
)]
async fn get_build(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.builds.get_build(id).await {
        Ok(build) => reply(StatusCode::OK, BuildResponse::from(build)),
        Err(e) => reply_error(map_build_error(&e)),
    }
}

/// Build runner reports progress. Requires the runner bearer token.
#[utoipa::path(
    post,
    path = "/builds/{id}/status",
    tag = "Builds",
    params(("id" = Uuid, Path, description = "Build ID")),
    request_body = BuildStatusRequest,
    responses(
        (status = 200, description = "Report applied or recognised as a repeat", body = BuildUpdateResponse),
        (status = 400, description = "Invalid report", body = Object),
        (status = 401, description = "Missing or invalid runner token", body = Object),
        (status = 404, description = "Build not found", body = Object),
        (status = 409, description = "Transition not allowed", body = Object)
    )
)]
async fn report_build_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<BuildStatusRequest>,
) -> impl IntoResponse {
    if !has_service_token(&headers, &state.runner_token) {
        return reply_error(unauthorized());
    }
    if let Err(e) = req.validate() {
        return reply_error(bad_request(format!("Invalid build report: {}", e)));
    }

    let status = match req.status.as_deref() {
        None => None,
        Some(raw) => match parse_build_status(raw) {
            Some(status) => Some(status),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Invalid status",
                        "allowed": allowed_build_statuses()
                    })),
                );
            }
        },
    };

    match state.builds.apply_build_update(id, req.into_update(status)).await {
        Ok(outcome) => {
            let applied = matches!(outcome, BuildUpdateOutcome::Applied(_));
            let build = match outcome {
                BuildUpdateOutcome::Applied(b) | BuildUpdateOutcome::Duplicate(b) => b,
            };
            reply(
                StatusCode::OK,
                BuildUpdateResponse {
                    applied,
                    build: build.into(),
                },
            )
        }
        Err(e) => reply_error(map_build_error(&e)),
    }
}

/// Start a subscription checkout for a paid plan.
#[utoipa::path(
    post,
    path = "/billing/checkout",
    tag = "Billing",
    request_body = CheckoutSessionRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutSessionResponse),
        (status = 400, description = "Unknown or unpriced plan", body = Object),
        (status = 404, description = "Account not found", body = Object),
        (status = 502, description = "Payment provider failed", body = Object)
    )
)]
async fn create_checkout_session(
    State(state): State<AppState>,
    Json(req): Json<CheckoutSessionRequest>,
) -> impl IntoResponse {
    let Some(plan) = parse_paid_plan(&req.plan) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Invalid plan",
                "allowed": allowed_plans()
            })),
        );
    };

    match state
        .billing
        .create_checkout_session(req.account_id, plan)
        .await
    {
        Ok(session) => reply(
            StatusCode::OK,
            CheckoutSessionResponse {
                session_id: session.id,
                url: session.url,
            },
        ),
        Err(e) => {
            error!(account_id = %req.account_id, error = %e, "Checkout session failed");
            reply_error(map_billing_error(&e))
        }
    }
}

/// Billing provider webhook. The raw body is verified against the signature header.
#[utoipa::path(
    post,
    path = "/billing/webhook",
    tag = "Billing",
    request_body(content = String, description = "Raw event JSON", content_type = "application/json"),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookResponse),
        (status = 400, description = "Bad signature or malformed event", body = Object),
        (status = 404, description = "Customer not found", body = Object),
        (status = 409, description = "Customer matches several accounts", body = Object)
    )
)]
async fn billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.billing.handle_webhook(&body, signature).await {
        Ok(outcome) => {
            let outcome = match outcome {
                WebhookOutcome::Applied => "applied",
                WebhookOutcome::Duplicate => "duplicate",
                WebhookOutcome::Stale => "stale",
                WebhookOutcome::Ignored => "ignored",
            };
            reply(
                StatusCode::OK,
                WebhookResponse {
                    received: true,
                    outcome: outcome.to_string(),
                },
            )
        }
        Err(e) => {
            error!(error = %e, "Webhook handling failed");
            reply_error(map_billing_error(&e))
        }
    }
}

/// Resolves the acting admin for operator routes, or the response to send instead.
fn admin_actor(state: &AppState, headers: &HeaderMap) -> Result<Uuid, JsonResponse> {
    if !has_service_token(headers, &state.admin_token) {
        return Err(reply_error(unauthorized()));
    }
    extract_actor(headers).ok_or_else(|| {
        reply_error(bad_request(format!(
            "{} header with the acting account id is required",
            ACTOR_HEADER
        )))
    })
}

#[utoipa::path(
    get,
    path = "/admin/stats",
    tag = "Admin",
    responses(
        (status = 200, description = "Platform totals", body = Object),
        (status = 401, description = "Missing or invalid admin token", body = Object),
        (status = 403, description = "Actor is not an admin", body = Object)
    )
)]
async fn admin_stats(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let actor = match admin_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    match state.admin.stats(actor).await {
        Ok(stats) => reply(StatusCode::OK, stats),
        Err(e) => reply_error(map_admin_error(&e)),
    }
}

#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "Admin",
    params(PaginationParams),
    responses(
        (status = 200, description = "Accounts, newest first", body = [AccountResponse]),
        (status = 401, description = "Missing or invalid admin token", body = Object),
        (status = 403, description = "Actor is not an admin", body = Object)
    )
)]
async fn admin_list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let actor = match admin_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    match state
        .admin
        .list_accounts(actor, params.limit, params.offset)
        .await
    {
        Ok(accounts) => {
            let accounts: Vec<AccountResponse> = accounts.into_iter().map(Into::into).collect();
            reply(StatusCode::OK, accounts)
        }
        Err(e) => reply_error(map_admin_error(&e)),
    }
}

#[utoipa::path(
    post,
    path = "/admin/users/{id}/suspend",
    tag = "Admin",
    params(("id" = Uuid, Path, description = "Account ID")),
    request_body = SuspendRequest,
    responses(
        (status = 200, description = "Updated account", body = AccountResponse),
        (status = 401, description = "Missing or invalid admin token", body = Object),
        (status = 403, description = "Actor is not an admin", body = Object),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn admin_suspend_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<SuspendRequest>,
) -> impl IntoResponse {
    let actor = match admin_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(resp) => return resp,
    };

    match state.admin.set_suspended(actor, id, req.suspend).await {
        Ok(account) => {
            info!(actor_id = %actor, account_id = %id, suspended = req.suspend, "Admin changed account status");
            reply(StatusCode::OK, AccountResponse::from(account))
        }
        Err(e) => reply_error(map_admin_error(&e)),
    }
}
