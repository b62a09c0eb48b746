use crate::application::{
    AdminService, BillingService, BillingSettings, BuildService, EntitlementService, IdeaService,
};
use crate::infrastructure::{
    AppConfig, ChangeFeed, GeminiClient, IdeaGenerator, Notifier, PaymentProvider,
    PostgresAccountRepository, PostgresBillingEventRepository, PostgresBuildRepository,
    PostgresIdeaRepository, ResendClient, StripeClient, WebhookVerifier,
};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

pub type EntitlementServiceType = EntitlementService<PostgresAccountRepository>;

pub type IdeaServiceType = IdeaService<PostgresAccountRepository, PostgresIdeaRepository>;

pub type BuildServiceType =
    BuildService<PostgresAccountRepository, PostgresIdeaRepository, PostgresBuildRepository>;

pub type BillingServiceType =
    BillingService<PostgresAccountRepository, PostgresBillingEventRepository>;

pub type AdminServiceType =
    AdminService<PostgresAccountRepository, PostgresIdeaRepository, PostgresBuildRepository>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub entitlements: Arc<EntitlementServiceType>,
    pub ideas: Arc<IdeaServiceType>,
    pub builds: Arc<BuildServiceType>,
    pub billing: Arc<BillingServiceType>,
    pub admin: Arc<AdminServiceType>,
    pub feed: ChangeFeed,
    pub admin_token: String,
    pub runner_token: String,
}

/// Build full state from config + an existing pool.
///
/// Intended for embedding into a larger service that already manages a `PgPool`.
pub async fn build_state_with_pool(
    config: AppConfig,
    pool: PgPool,
    run_migrations: bool,
) -> anyhow::Result<AppState> {
    if run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
    }

    let call_timeout = Duration::from_secs(config.outbound_timeout_secs.max(1));

    let verifier = WebhookVerifier::new(
        config.stripe_webhook_secret.clone(),
        config.webhook_tolerance_secs,
    );
    if !verifier.is_configured() {
        return Err(anyhow::anyhow!("INNOVA_STRIPE_WEBHOOK_SECRET is empty"))
            .context("init webhook verifier");
    }

    let generator: Arc<dyn IdeaGenerator> = Arc::new(
        GeminiClient::new(&config.gemini_api_key, config.gemini_model.clone(), call_timeout)
            .context("init Gemini client")?,
    );
    let payments: Arc<dyn PaymentProvider> = Arc::new(
        StripeClient::new(&config.stripe_secret_key, call_timeout).context("init Stripe client")?,
    );
    let notifier: Arc<dyn Notifier> = Arc::new(
        ResendClient::new(&config.resend_api_key, config.email_from.clone(), call_timeout)
            .context("init Resend client")?,
    );

    let account_repo = Arc::new(PostgresAccountRepository::new(pool.clone()));
    let idea_repo = Arc::new(PostgresIdeaRepository::new(pool.clone()));
    let build_repo = Arc::new(PostgresBuildRepository::new(pool.clone()));
    let event_repo = Arc::new(PostgresBillingEventRepository::new(pool.clone()));
    let feed = ChangeFeed::default();

    let entitlements = Arc::new(EntitlementService::new(account_repo.clone()));

    let ideas = Arc::new(IdeaService::new(
        account_repo.clone(),
        idea_repo.clone(),
        generator,
        notifier.clone(),
        feed.clone(),
        call_timeout,
    ));

    let builds = Arc::new(BuildService::new(
        account_repo.clone(),
        idea_repo.clone(),
        build_repo.clone(),
        notifier.clone(),
        feed.clone(),
        call_timeout,
    ));

    let billing = Arc::new(BillingService::new(
        account_repo.clone(),
        event_repo,
        payments,
        notifier,
        feed.clone(),
        BillingSettings {
            catalog: config.price_catalog(),
            verifier,
            app_url: config.app_url.clone(),
            call_timeout,
        },
    ));

    let admin = Arc::new(AdminService::new(account_repo, idea_repo, build_repo));

    Ok(AppState {
        pool,
        entitlements,
        ideas,
        builds,
        billing,
        admin,
        feed,
        admin_token: config.admin_token,
        runner_token: config.runner_token,
    })
}

/// Build state for the standalone server.
///
/// Creates the `PgPool`, runs migrations, and wires repositories/services.
pub async fn build_state_from_env(config: AppConfig) -> anyhow::Result<AppState> {
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("connect database")?;
    build_state_with_pool(config, pool, true).await
}
