use async_trait::async_trait;
use std::time::Duration;

/// Wakes a scheduling loop when its station's settings may have changed.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    /// Returns on a change notification or after `max_wait`, whichever
    /// comes first.
    async fn wait_for_change(&self, station_id: &str, max_wait: Duration);
}

/// No notifications: every wait runs to `max_wait`.
pub struct PollingNotifier;

#[async_trait]
impl ChangeNotifier for PollingNotifier {
    async fn wait_for_change(&self, _station_id: &str, max_wait: Duration) {
        tokio::time::sleep(max_wait).await;
    }
}
