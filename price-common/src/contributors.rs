use std::sync::Arc;

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::geo::LocationResolver;
use crate::metrics::NOTIFICATIONS;
use crate::notify::{Notification, NotificationSink};

/// Announces reporters seen for the first time. Runs off the request path: the
/// submitting client never waits on, or hears about, any of it.
#[derive(Clone)]
pub struct ContributorAnnouncer {
    resolver: Arc<dyn LocationResolver + Send + Sync>,
    sink: Arc<dyn NotificationSink + Send + Sync>,
}

impl ContributorAnnouncer {
    pub fn new(
        resolver: Arc<dyn LocationResolver + Send + Sync>,
        sink: Arc<dyn NotificationSink + Send + Sync>,
    ) -> Self {
        Self { resolver, sink }
    }

    /// Spawns the lookup and notification. The handle is only there for callers
    /// that want to wait, dropping it detaches the task.
    pub fn announce(&self, client_address: String, report_count: usize) -> JoinHandle<()> {
        let resolver = self.resolver.clone();
        let sink = self.sink.clone();

        tokio::spawn(async move {
            let location = match resolver.locate(&client_address).await {
                Ok(location) => Some(location),
                Err(error) => {
                    warn!("failed to resolve contributor location: {}", error);
                    None
                }
            };

            let notification = Notification::new_contributor(report_count, location.as_ref());
            match sink.notify(notification).await {
                Ok(()) => {
                    debug!("new contributor announced");
                    counter!(NOTIFICATIONS, "result" => "sent").increment(1);
                }
                Err(error) => {
                    warn!("failed to send new contributor notification: {}", error);
                    counter!(NOTIFICATIONS, "result" => "failed").increment(1);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::geo::{EnrichmentError, Location, NoopLocationResolver};

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, notification: Notification) -> Result<(), EnrichmentError> {
            self.sent.lock().await.push(notification);
            if self.fail {
                return Err(EnrichmentError::NotConfigured);
            }
            Ok(())
        }
    }

    struct FixedResolver;

    #[async_trait]
    impl LocationResolver for FixedResolver {
        async fn locate(&self, address: &str) -> Result<Location, EnrichmentError> {
            assert_eq!(address, "203.0.113.7");
            Ok(Location {
                city: Some("Lyon".to_owned()),
                region: None,
                country: Some("France".to_owned()),
            })
        }
    }

    #[tokio::test]
    async fn announces_with_location() {
        let sink = Arc::new(RecordingSink::default());
        let announcer = ContributorAnnouncer::new(Arc::new(FixedResolver), sink.clone());

        announcer.announce("203.0.113.7".to_owned(), 4).await.unwrap();

        let sent = sink.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].content,
            "New contributor submitted 4 price reports from Lyon, France"
        );
    }

    #[tokio::test]
    async fn degrades_without_location() {
        let sink = Arc::new(RecordingSink::default());
        let announcer = ContributorAnnouncer::new(Arc::new(NoopLocationResolver), sink.clone());

        announcer.announce(String::new(), 2).await.unwrap();

        let sent = sink.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, "New contributor submitted 2 price reports");
        assert_eq!(sent[0].location, None);
    }

    #[tokio::test]
    async fn notification_failure_is_swallowed() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let announcer = ContributorAnnouncer::new(Arc::new(NoopLocationResolver), sink.clone());

        // The task completes normally and nothing is retried.
        announcer.announce("198.51.100.1".to_owned(), 1).await.unwrap();
        assert_eq!(sink.sent.lock().await.len(), 1);
    }
}
