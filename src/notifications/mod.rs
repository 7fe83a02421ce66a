//! Event subscriber that writes per-user notifications.
//!
//! The dispatch engine only publishes [`OrderEvent`](crate::models::event::OrderEvent)s;
//! everything about wording and recipients lives here.

pub mod dispatcher;
pub mod inbox;

pub use dispatcher::{deliver, run_notification_dispatcher};
pub use inbox::NotificationInbox;
