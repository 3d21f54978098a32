//! Static table of recognized server events.

use crate::types::{EntityKind, IconKind};

/// How one server event is presented and fanned out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventSpec {
    pub name: &'static str,
    pub kind: EntityKind,
    /// Feed title. `None` means broadcast-only, no feed entry.
    pub title: Option<&'static str>,
    pub icon: IconKind,
}

/// Fallback event carrying no feed entry.
pub const ACTIVITY_UPDATE: &str = "activityUpdate";

pub static EVENT_TABLE: [EventSpec; 8] = [
    EventSpec {
        name: "taskUpdated",
        kind: EntityKind::Task,
        title: Some("Task Updated"),
        icon: IconKind::Edit,
    },
    EventSpec {
        name: "taskAssigned",
        kind: EntityKind::Task,
        title: Some("Task Assigned"),
        icon: IconKind::Assign,
    },
    EventSpec {
        name: "taskUnassigned",
        kind: EntityKind::Task,
        title: Some("Task Unassigned"),
        icon: IconKind::Unassign,
    },
    EventSpec {
        name: "taskAssignedToTeam",
        kind: EntityKind::Task,
        title: Some("Task Assigned to Team"),
        icon: IconKind::TeamAssign,
    },
    EventSpec {
        name: "teamAdded",
        kind: EntityKind::Team,
        title: Some("Team Added"),
        icon: IconKind::TeamAdd,
    },
    EventSpec {
        name: "teamRemoved",
        kind: EntityKind::Team,
        title: Some("Team Removed"),
        icon: IconKind::TeamRemove,
    },
    EventSpec {
        name: "teamUpdated",
        kind: EntityKind::Team,
        title: Some("Team Updated"),
        icon: IconKind::TeamEdit,
    },
    EventSpec {
        name: ACTIVITY_UPDATE,
        kind: EntityKind::Generic,
        title: None,
        icon: IconKind::Info,
    },
];

/// Look up a server event by name.
pub fn lookup(name: &str) -> Option<&'static EventSpec> {
    EVENT_TABLE.iter().find(|spec| spec.name == name)
}
