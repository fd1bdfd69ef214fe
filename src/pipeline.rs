//! The emission pipeline: stale-change filtering, event shaping, the
//! optional object copy, and delivery.
//!
//! Order is fixed: the modified-time filter runs first, then shaping, then
//! the copier (when configured), then the emitter. Copier failures never
//! block emission.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::copier::Copier;
use crate::emitter::{EmitError, Notification};
use crate::events::to_detail;
use crate::types::{Channel, Detail};
use crate::upstream::WireChange;

/// Shapes and delivers pulled changes for a channel.
pub struct NotificationPipeline {
    notification: Arc<dyn Notification>,
    copier: Option<Copier>,
    /// When set, file changes whose `modifiedTime` is older than this
    /// window are dropped before shaping.
    within_modified_time: Option<chrono::Duration>,
}

impl NotificationPipeline {
    pub fn new(
        notification: Arc<dyn Notification>,
        copier: Option<Copier>,
        within_modified_time: Option<chrono::Duration>,
    ) -> Self {
        NotificationPipeline {
            notification,
            copier,
            within_modified_time,
        }
    }

    /// Filters, shapes, optionally copies, and emits `changes`.
    pub async fn send(&self, channel: &Channel, changes: &[WireChange]) -> Result<(), EmitError> {
        debug!(channel_id = %channel.channel_id, changes = changes.len(), "sending notifications");
        let now = Utc::now();
        let kept: Vec<&WireChange> = changes
            .iter()
            .filter(|change| self.passes_modified_time_filter(change, now))
            .collect();
        if kept.is_empty() {
            debug!(channel_id = %channel.channel_id, "no changes to send after filtering");
            return Ok(());
        }

        let mut details: Vec<Detail> = kept.into_iter().map(to_detail).collect();
        if let Some(copier) = &self.copier {
            for detail in &mut details {
                copier.apply(detail).await;
            }
        }
        self.notification.send_changes(channel, &details).await
    }

    /// The stale-change filter. Changes without a file, without a parseable
    /// `modifiedTime`, and drive-scoped changes always pass.
    fn passes_modified_time_filter(&self, change: &WireChange, now: DateTime<Utc>) -> bool {
        let Some(window) = self.within_modified_time else {
            return true;
        };
        let Some(file) = &change.file else {
            return true;
        };
        debug!(file_id = %file.id, modified_time = %file.modified_time, "checking modified time");
        let Ok(modified) = DateTime::parse_from_rfc3339(&file.modified_time) else {
            return true;
        };
        if now - modified.with_timezone(&Utc) > window {
            info!(
                file_id = %file.id,
                modified_time = %file.modified_time,
                "filtered stale change"
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::Notification;
    use crate::types::{ChannelId, DriveId, ResourceId};
    use crate::upstream::WireFile;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Captures emitted details for assertions.
    #[derive(Default)]
    struct CapturingNotification {
        sent: Mutex<Vec<Detail>>,
    }

    #[async_trait]
    impl Notification for CapturingNotification {
        async fn send_changes(
            &self,
            _channel: &Channel,
            details: &[Detail],
        ) -> Result<(), EmitError> {
            self.sent.lock().unwrap().extend(details.iter().cloned());
            Ok(())
        }
    }

    fn channel() -> Channel {
        let t = Utc::now();
        Channel {
            channel_id: ChannelId::new("c1"),
            drive_id: DriveId::new("d1"),
            page_token: "0".to_string(),
            resource_id: ResourceId::new("r"),
            expiration: t + chrono::Duration::days(7),
            page_token_fetched_at: t,
            created_at: t,
            updated_at: t,
        }
    }

    fn file_change(file_id: &str, modified_time: String) -> WireChange {
        WireChange {
            change_type: "file".to_string(),
            file_id: file_id.to_string(),
            time: Utc::now().to_rfc3339(),
            file: Some(WireFile {
                id: file_id.to_string(),
                name: file_id.to_string(),
                modified_time,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn no_filter_sends_everything() {
        let capturing = Arc::new(CapturingNotification::default());
        let pipeline = NotificationPipeline::new(capturing.clone(), None, None);

        let stale = file_change("F1", "2001-01-01T00:00:00Z".to_string());
        let fresh = file_change("F2", Utc::now().to_rfc3339());
        pipeline.send(&channel(), &[stale, fresh]).await.unwrap();

        assert_eq!(capturing.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stale_changes_are_dropped_when_window_configured() {
        let capturing = Arc::new(CapturingNotification::default());
        let pipeline = NotificationPipeline::new(
            capturing.clone(),
            None,
            Some(chrono::Duration::hours(1)),
        );

        let stale = file_change("F1", "2001-01-01T00:00:00Z".to_string());
        let fresh = file_change("F2", Utc::now().to_rfc3339());
        pipeline.send(&channel(), &[stale, fresh]).await.unwrap();

        let sent = capturing.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].change.as_ref().unwrap().file_id, "F2");
    }

    #[tokio::test]
    async fn unparseable_modified_time_passes_through() {
        let capturing = Arc::new(CapturingNotification::default());
        let pipeline = NotificationPipeline::new(
            capturing.clone(),
            None,
            Some(chrono::Duration::hours(1)),
        );

        let garbled = file_change("F1", "not-a-timestamp".to_string());
        pipeline.send(&channel(), &[garbled]).await.unwrap();
        assert_eq!(capturing.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn changes_without_file_pass_through() {
        let capturing = Arc::new(CapturingNotification::default());
        let pipeline = NotificationPipeline::new(
            capturing.clone(),
            None,
            Some(chrono::Duration::hours(1)),
        );

        let drive_change = WireChange {
            change_type: "drive".to_string(),
            drive_id: "D1".to_string(),
            time: Utc::now().to_rfc3339(),
            ..Default::default()
        };
        pipeline.send(&channel(), &[drive_change]).await.unwrap();
        assert_eq!(capturing.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn all_filtered_means_no_emitter_call() {
        // If every change is stale, the emitter must not be invoked at all.
        struct PanickingNotification;
        #[async_trait]
        impl Notification for PanickingNotification {
            async fn send_changes(
                &self,
                _channel: &Channel,
                _details: &[Detail],
            ) -> Result<(), EmitError> {
                panic!("emitter must not be called");
            }
        }

        let pipeline = NotificationPipeline::new(
            Arc::new(PanickingNotification),
            None,
            Some(chrono::Duration::hours(1)),
        );
        let stale = file_change("F1", "2001-01-01T00:00:00Z".to_string());
        pipeline.send(&channel(), &[stale]).await.unwrap();
    }

    #[tokio::test]
    async fn shaped_details_carry_subjects() {
        let capturing = Arc::new(CapturingNotification::default());
        let pipeline = NotificationPipeline::new(capturing.clone(), None, None);

        let mut change = file_change("F1", Utc::now().to_rfc3339());
        change.file.as_mut().unwrap().name = "doc".to_string();
        pipeline.send(&channel(), &[change]).await.unwrap();

        let sent = capturing.sent.lock().unwrap();
        assert!(sent[0].subject.contains("doc"));
        assert!(sent[0].actor.is_some());
    }
}
