//! User-facing notifications
//!
//! Senders never wait on or fail because of a notification; sinks log their
//! own failures.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::db::Database;
use crate::models::NewNotification;

/// Where user notifications go
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: NewNotification);
}

#[async_trait]
impl NotificationSink for Database {
    async fn notify(&self, notification: NewNotification) {
        match self.create_notification(&notification) {
            Ok(id) => info!(
                user_id = notification.user_id,
                notification_id = id,
                kind = notification.notification_type.as_str(),
                "Created notification"
            ),
            Err(e) => warn!(
                user_id = notification.user_id,
                error = %e,
                "Failed to create notification"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationType;

    #[tokio::test]
    async fn test_database_sink_stores_notification() {
        let db = Database::in_memory().unwrap();
        let user = db.get_or_create_user("alice@example.com").unwrap();

        db.notify(NewNotification::gmail_reconnect(user.id)).await;

        let notifications = db.list_notifications(user.id, true).unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(
            notifications[0].notification_type,
            NotificationType::GmailReconnect
        );
        assert_eq!(notifications[0].action_url.as_deref(), Some("/settings/gmail"));
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let db = Database::in_memory().unwrap();
        // No such user: the foreign key rejects the row, notify still returns
        db.notify(NewNotification::gmail_reconnect(999)).await;
        assert!(db.list_notifications(999, false).unwrap().is_empty());
    }
}
