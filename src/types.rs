//! Core types for notifications and update fan-out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since Unix epoch, taken at local receipt.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Unique identifier for a notification.
///
/// Time of creation plus a random tie-break, so two notifications created
/// within the same microsecond still get distinct ids.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NotificationId {
    pub micros: i64,
    pub nonce: u32,
}

impl NotificationId {
    /// Generate a fresh id for the current instant.
    pub fn generate() -> Self {
        Self {
            micros: Timestamp::now().0,
            nonce: rand::random(),
        }
    }
}

impl fmt::Debug for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationId({})", self)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:08x}", self.micros, self.nonce)
    }
}

/// Coarse category of changed data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Task,
    Team,
    Generic,
    Test,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Task => "task",
            EntityKind::Team => "team",
            EntityKind::Generic => "generic",
            EntityKind::Test => "test",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbolic icon tag. Rendering picks the actual glyph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconKind {
    Edit,
    Assign,
    Unassign,
    TeamAssign,
    TeamAdd,
    TeamRemove,
    TeamEdit,
    Info,
    Bell,
}

/// A single entry in the notification feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,

    pub entity_kind: EntityKind,

    /// Short human label, e.g. "Task Assigned".
    pub title: String,

    /// Server-supplied free text.
    pub message: String,

    pub icon: IconKind,

    /// Local receipt time (not the server's event time).
    pub created_at: Timestamp,

    pub read: bool,
}

/// Input for a new notification (before id/timestamp assigned).
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationInput {
    pub entity_kind: EntityKind,
    pub title: String,
    pub message: String,
    pub icon: IconKind,
}

impl NotificationInput {
    pub fn new(
        entity_kind: EntityKind,
        title: impl Into<String>,
        message: impl Into<String>,
        icon: IconKind,
    ) -> Self {
        Self {
            entity_kind,
            title: title.into(),
            message: message.into(),
            icon,
        }
    }

    /// A locally injected notification that did not come from the server.
    pub fn test(message: impl Into<String>) -> Self {
        Self::new(EntityKind::Test, "Test Notification", message, IconKind::Bell)
    }

    /// Stamp the input with a fresh id and receipt time.
    pub fn into_record(self) -> NotificationRecord {
        NotificationRecord {
            id: NotificationId::generate(),
            entity_kind: self.entity_kind,
            title: self.title,
            message: self.message,
            icon: self.icon,
            created_at: Timestamp::now(),
            read: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_serializes_lowercase() {
        let json = serde_json::to_string(&EntityKind::Task).unwrap();
        assert_eq!(json, "\"task\"");
        let kind: EntityKind = serde_json::from_str("\"generic\"").unwrap();
        assert_eq!(kind, EntityKind::Generic);
    }

    #[test]
    fn test_ids_are_distinct() {
        let ids: std::collections::HashSet<_> =
            (0..1000).map(|_| NotificationId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_into_record_starts_unread() {
        let record = NotificationInput::test("hello").into_record();
        assert!(!record.read);
        assert_eq!(record.entity_kind, EntityKind::Test);
        assert_eq!(record.message, "hello");
        assert!(record.created_at.0 > 0);
    }
}
