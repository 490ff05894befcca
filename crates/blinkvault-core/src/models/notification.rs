use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PostAuthor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub message: String,
    pub link: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub sender: Option<PostAuthor>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Message with any inline markup removed.
    pub fn plain_message(&self) -> String {
        let mut out = String::with_capacity(self.message.len());
        let mut in_tag = false;
        for c in self.message.chars() {
            match c {
                '<' => in_tag = true,
                '>' if in_tag => in_tag = false,
                _ if !in_tag => out.push(c),
                _ => {}
            }
        }
        out
    }
}

pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.read).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message_strips_markup() {
        let n: Notification = serde_json::from_str(
            r#"{"_id": "n1", "message": "<b>nina</b> followed you", "sender": {"_id": "u1"}}"#,
        )
        .expect("parse notification");
        assert_eq!(n.plain_message(), "nina followed you");
        assert!(!n.read);
    }

    #[test]
    fn test_unread_count() {
        let list: Vec<Notification> = serde_json::from_str(
            r#"[{"_id": "a", "read": true}, {"_id": "b"}, {"_id": "c", "read": false}]"#,
        )
        .expect("parse notifications");
        assert_eq!(unread_count(&list), 2);
    }
}
