// Realtime layer: change-feed ingest, presence tracking, notifications.

pub mod feed;
pub mod ingest;
pub mod notify;
pub mod presence;

mod error;

pub use error::SyncError;
pub use feed::RealtimeFeed;
pub use ingest::RealtimeIngest;
pub use notify::{message_notification, Notification, Notifier};
pub use presence::PresenceTracker;
