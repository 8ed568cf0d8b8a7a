use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserKind {
    Human,
    Bot,
    System,
}

/// A stable identity. Bots may carry a webhook target consulted by the
/// post-broadcast worker; this is the only field the pipeline reads from a
/// user record beyond id and kind.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub kind: UserKind,
    pub display_name: String,
    pub webhook_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_bot_with_webhook(&self) -> bool {
        self.kind == UserKind::Bot && self.webhook_url.is_some()
    }
}
