use crate::domain::{Plan, PriceCatalog};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Public URL of the web app, used for checkout redirects.
    pub app_url: String,

    // Stripe
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_founder_price_id: String,
    pub stripe_team_price_id: String,
    pub stripe_enterprise_price_id: String,
    pub webhook_tolerance_secs: i64,

    // Idea generation (Gemini)
    pub gemini_api_key: String,
    pub gemini_model: String,

    // Email (Resend)
    pub resend_api_key: String,
    pub email_from: String,

    // Service tokens
    pub admin_token: String,
    pub runner_token: String,

    /// Upper bound for any single outbound provider call.
    pub outbound_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("INNOVA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 8080)?
            .set_default("app_url", "http://localhost:5173")?
            .set_default("stripe_founder_price_id", "")?
            .set_default("stripe_team_price_id", "")?
            .set_default("stripe_enterprise_price_id", "")?
            .set_default("webhook_tolerance_secs", 300)?
            .set_default("gemini_model", "gemini-2.5-flash")?
            .set_default("email_from", "InnovaForge <noreply@innovaforge.app>")?
            .set_default("admin_token", "")?
            .set_default("runner_token", "")?
            .set_default("outbound_timeout_secs", 15)?
            .build()?;

        config.try_deserialize()
    }

    pub fn price_catalog(&self) -> PriceCatalog {
        PriceCatalog::new()
            .with_price(Plan::Founder, self.stripe_founder_price_id.as_str())
            .with_price(Plan::Team, self.stripe_team_price_id.as_str())
            .with_price(Plan::Enterprise, self.stripe_enterprise_price_id.as_str())
    }
}
