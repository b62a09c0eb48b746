pub mod change_feed;
pub mod config;
pub mod email;
pub mod gemini;
mod outbound;
pub mod postgres_account_repo;
pub mod postgres_billing_event_repo;
pub mod postgres_build_repo;
pub mod postgres_idea_repo;
pub mod repository;
pub mod stripe;

pub use change_feed::*;
pub use config::*;
pub use email::*;
pub use gemini::*;
pub use postgres_account_repo::*;
pub use postgres_billing_event_repo::*;
pub use postgres_build_repo::*;
pub use postgres_idea_repo::*;
pub use repository::*;
pub use stripe::*;
