//! Which event kinds each role may record.
//!
//! Harvest is written implicitly by the farmer when a batch is created, so it
//! never appears among a role's selectable events.

use crate::types::{EventType, Role};

/// Ordered event kinds a role can pick when recording against an existing batch.
pub fn permitted_events(role: Role) -> &'static [EventType] {
    match role {
        Role::Farmer => &[],
        Role::Aggregator => &[EventType::Shipment],
        Role::Processor => &[EventType::Processing, EventType::QualityCheck],
        Role::Retailer => &[EventType::Sale],
        Role::Regulator => &[EventType::QualityCheck],
    }
}

/// Whether `role` may write an event of `kind`, including the implicit harvest.
pub fn may_record(role: Role, kind: EventType) -> bool {
    match kind {
        EventType::Harvest => role == Role::Farmer,
        _ => permitted_events(role).contains(&kind),
    }
}

pub fn has_recordable_actions(role: Role) -> bool {
    !permitted_events(role).is_empty()
}

/// Roles allowed to record `kind`.
pub fn roles_for(kind: EventType) -> Vec<Role> {
    Role::ALL
        .iter()
        .copied()
        .filter(|role| may_record(*role, kind))
        .collect()
}

impl Role {
    pub fn permitted_events(self) -> &'static [EventType] {
        permitted_events(self)
    }
}
