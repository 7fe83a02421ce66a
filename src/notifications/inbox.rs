use chrono::{Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::notification::{Notification, NotificationSummary};

/// Per-user notification lists, newest last.
pub struct NotificationInbox {
    by_user: DashMap<Uuid, Vec<Notification>>,
}

impl Default for NotificationInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationInbox {
    pub fn new() -> Self {
        Self {
            by_user: DashMap::new(),
        }
    }

    pub fn push(&self, user_id: Uuid, title: String, message: String, order_id: Option<Uuid>) {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            title,
            message,
            is_read: false,
            related_order: order_id,
            created_at: Utc::now(),
        };

        self.by_user.entry(user_id).or_default().push(notification);
    }

    /// Newest first.
    pub fn for_user(&self, user_id: Uuid) -> Vec<Notification> {
        self.by_user
            .get(&user_id)
            .map(|entry| entry.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Marks the user's unread notifications about `order_id` as read and
    /// returns how many changed.
    pub fn mark_order_read(&self, user_id: Uuid, order_id: Uuid) -> usize {
        let Some(mut entry) = self.by_user.get_mut(&user_id) else {
            return 0;
        };

        let mut marked = 0;
        for notification in entry
            .iter_mut()
            .filter(|notification| notification.related_order == Some(order_id))
            .filter(|notification| !notification.is_read)
        {
            notification.is_read = true;
            marked += 1;
        }
        marked
    }

    pub fn summary(&self, user_id: Uuid) -> NotificationSummary {
        let week_ago = Utc::now() - Duration::days(7);
        let notifications = self.for_user(user_id);

        NotificationSummary {
            total: notifications.len(),
            unread: notifications.iter().filter(|n| !n.is_read).count(),
            order_related: notifications
                .iter()
                .filter(|n| n.related_order.is_some())
                .count(),
            recent: notifications
                .iter()
                .filter(|n| n.created_at >= week_ago)
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::NotificationInbox;

    #[test]
    fn marking_an_order_read_only_touches_that_order() {
        let inbox = NotificationInbox::new();
        let user = Uuid::new_v4();
        let order = Uuid::new_v4();

        inbox.push(user, "a".to_string(), "first".to_string(), Some(order));
        inbox.push(user, "b".to_string(), "second".to_string(), Some(order));
        inbox.push(user, "c".to_string(), "other".to_string(), Some(Uuid::new_v4()));
        inbox.push(user, "d".to_string(), "system".to_string(), None);

        assert_eq!(inbox.mark_order_read(user, order), 2);
        assert_eq!(inbox.mark_order_read(user, order), 0);

        let summary = inbox.summary(user);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.unread, 2);
        assert_eq!(summary.order_related, 3);
        assert_eq!(summary.recent, 4);
    }

    #[test]
    fn newest_notification_comes_first() {
        let inbox = NotificationInbox::new();
        let user = Uuid::new_v4();

        inbox.push(user, "old".to_string(), "old".to_string(), None);
        inbox.push(user, "new".to_string(), "new".to_string(), None);

        assert_eq!(inbox.for_user(user)[0].title, "new");
    }
}
