pub mod admin;
pub mod billing;
pub mod builds;
pub mod entitlements;
pub mod ideas;

pub use admin::*;
pub use billing::*;
pub use builds::*;
pub use entitlements::*;
pub use ideas::*;

use crate::infrastructure::{Notification, Notifier};
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Largest page any list operation returns.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Clamps caller supplied paging to `1..=MAX_PAGE_SIZE` and a non-negative offset.
pub fn clamp_page(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, MAX_PAGE_SIZE), offset.max(0))
}

/// Sends `notification`, logging and swallowing any failure or timeout.
pub(crate) async fn notify_best_effort(
    notifier: &dyn Notifier,
    limit: Duration,
    to: String,
    notification: Notification,
) {
    let kind = notification.subject();
    match timeout(limit, notifier.send(to, notification)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(subject = %kind, error = %e, "Failed to send notification"),
        Err(_) => warn!(subject = %kind, "Notification timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_page_bounds() {
        assert_eq!(clamp_page(0, -5), (1, 0));
        assert_eq!(clamp_page(500, 20), (MAX_PAGE_SIZE, 20));
        assert_eq!(clamp_page(25, 0), (25, 0));
    }
}
