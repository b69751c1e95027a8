//! Notification side-channel.
//!
//! Fire-and-forget by contract: a notifier that fails must do so silently
//! (log and move on), because store consistency can never depend on whether
//! a banner was shown.

use serde_json::json;

use parley_shared::models::{AttachmentKind, Message};

/// What the platform notification surface consumes.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    /// Collapse key so repeated notifications for one thread replace each
    /// other instead of stacking.
    pub tag: Option<String>,
    /// Opaque payload handed back on notification click.
    pub data: serde_json::Value,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Build the new-message notification shown when the message's thread is
/// not the open one.
pub fn message_notification(sender_name: &str, msg: &Message) -> Notification {
    let body = match (&msg.body, &msg.attachment) {
        (Some(text), _) => text.clone(),
        (None, Some(att)) => match att.kind {
            AttachmentKind::Image => "Sent an image".to_string(),
            AttachmentKind::File => "Sent a file".to_string(),
        },
        (None, None) => String::new(),
    };

    Notification {
        title: format!("New message from {sender_name}"),
        body,
        icon: None,
        tag: Some(msg.thread_id.to_string()),
        data: json!({ "thread_id": msg.thread_id, "message_id": msg.id }),
    }
}
